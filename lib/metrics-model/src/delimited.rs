//! Length-delimited protobuf framing: each message is preceded by its
//! encoded length as a protobuf varint. Used both for the protobuf variant
//! of the `/upload` exposition payload and for the cluster forwarding wire
//! format (`snappy(proto-delim(MetricFamily*))`).

use prost::Message;

#[derive(Debug, snafu::Snafu)]
pub enum DelimitedError {
    #[snafu(display("truncated varint length prefix"))]
    TruncatedLength,
    #[snafu(display("truncated message body: wanted {wanted} bytes, got {got}"))]
    TruncatedBody { wanted: usize, got: usize },
    #[snafu(display("failed to decode protobuf message: {source}"))]
    Decode { source: prost::DecodeError },
}

/// Reads every length-delimited message out of `buf`, decoding each as `M`.
pub fn read_delimited<M: Message + Default>(mut buf: &[u8]) -> Result<Vec<M>, DelimitedError> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        let len = prost::decode_length_delimiter(&mut buf)
            .ok()
            .ok_or(DelimitedError::TruncatedLength)?;
        if buf.len() < len {
            return Err(DelimitedError::TruncatedBody {
                wanted: len,
                got: buf.len(),
            });
        }
        let (body, rest) = buf.split_at(len);
        let message = M::decode(body).context(DecodeSnafu)?;
        out.push(message);
        buf = rest;
    }
    Ok(out)
}

/// Serializes a sequence of messages, each prefixed with its varint length.
pub fn write_delimited<M: Message>(messages: &[M]) -> Vec<u8> {
    let mut out = Vec::new();
    for message in messages {
        message
            .encode_length_delimited(&mut out)
            .expect("writing to a Vec<u8> never fails");
    }
    out
}

use snafu::ResultExt;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::MetricFamily;

    #[test]
    fn roundtrips_multiple_families() {
        let families = vec![
            MetricFamily {
                name: "up".into(),
                ..Default::default()
            },
            MetricFamily {
                name: "down".into(),
                ..Default::default()
            },
        ];
        let bytes = write_delimited(&families);
        let decoded: Vec<MetricFamily> = read_delimited(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "up");
        assert_eq!(decoded[1].name, "down");
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut bytes = Vec::new();
        prost::encode_length_delimiter(10usize, &mut bytes).unwrap();
        bytes.extend_from_slice(b"short");
        let result: Result<Vec<MetricFamily>, _> = read_delimited(&bytes);
        assert!(matches!(result, Err(DelimitedError::TruncatedBody { .. })));
    }
}
