//! The inter-node forwarding wire format:
//! `0x01 | msgpack({PartitionKey}) | snappy(proto-delim(MetricFamily*))`.
//!
//! The leading byte is a message-type tag; `0x01` (`MetricMessage`) is the
//! only variant this cluster speaks today, but the tag leaves room to add
//! others without breaking the framing.

use metrics_model::proto;
use serde::{Deserialize, Serialize};

const MESSAGE_TYPE_METRIC: u8 = 0x01;

#[derive(Debug, snafu::Snafu)]
pub enum ProtocolError {
    #[snafu(display("forwarded message is empty"))]
    Empty,
    #[snafu(display("forwarded message has an unrecognized type tag {tag:#x}"))]
    UnknownMessageType { tag: u8 },
    #[snafu(display("failed to decode the msgpack header: {source}"))]
    Header { source: rmp_serde::decode::Error },
    #[snafu(display("failed to snappy-decompress the message body: {source}"))]
    Decompress { source: std::io::Error },
    #[snafu(display("failed to decode the protobuf family stream: {source}"))]
    Families { source: metrics_model::DelimitedError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
}

/// A decoded forwarded batch: the partition key plus the metric families
/// it carries, still in wire-level (protobuf) shape.
pub struct MetricMessage {
    pub partition_key: String,
    pub families: Vec<proto::MetricFamily>,
}

/// Encodes `partition_key` and `families` into the wire format described
/// above.
pub fn encode(partition_key: &str, families: &[proto::MetricFamily]) -> Vec<u8> {
    let header = Header {
        partition_key: partition_key.to_string(),
    };
    let header_bytes = rmp_serde::to_vec(&header).expect("header serializes");
    let body = metrics_model::write_delimited(families);
    let compressed_body = snap::raw::Encoder::new()
        .compress_vec(&body)
        .expect("snappy compression of an in-memory buffer never fails");

    let mut out = Vec::with_capacity(1 + header_bytes.len() + compressed_body.len());
    out.push(MESSAGE_TYPE_METRIC);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&compressed_body);
    out
}

/// Decodes a buffer produced by [`encode`]. The msgpack header has no
/// length prefix of its own, so decoding it first is what determines where
/// the snappy-compressed body begins — `rmp_serde::Deserializer` stops
/// consuming bytes exactly at the end of the encoded map, and we read the
/// rest as the body.
pub fn decode(buf: &[u8]) -> Result<MetricMessage, ProtocolError> {
    let (&tag, rest) = buf.split_first().ok_or(ProtocolError::Empty)?;
    if tag != MESSAGE_TYPE_METRIC {
        return Err(ProtocolError::UnknownMessageType { tag });
    }

    let mut deserializer = rmp_serde::Deserializer::new(rest);
    let header: Header =
        Deserialize::deserialize(&mut deserializer).map_err(|source| ProtocolError::Header { source })?;
    let consumed = deserializer.position() as usize;
    let body = &rest[consumed..];

    let decompressed = snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|source| ProtocolError::Decompress {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;
    let families: Vec<proto::MetricFamily> =
        metrics_model::read_delimited(&decompressed).map_err(|source| ProtocolError::Families { source })?;

    Ok(MetricMessage {
        partition_key: header.partition_key,
        families,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_batch() {
        let families = vec![proto::MetricFamily {
            name: "up".to_string(),
            ..Default::default()
        }];
        let wire = encode("tenant-1", &families);
        let decoded = decode(&wire).unwrap();
        assert_eq!(decoded.partition_key, "tenant-1");
        assert_eq!(decoded.families.len(), 1);
        assert_eq!(decoded.families[0].name, "up");
    }

    #[test]
    fn rejects_an_empty_buffer() {
        assert!(matches!(decode(&[]), Err(ProtocolError::Empty)));
    }

    #[test]
    fn rejects_an_unknown_message_type() {
        assert!(matches!(
            decode(&[0xFF, 0, 0]),
            Err(ProtocolError::UnknownMessageType { tag: 0xFF })
        ));
    }
}
