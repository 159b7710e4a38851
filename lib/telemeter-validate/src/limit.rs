use crate::error::ValidateError;

/// Rejects `body` outright if it exceeds `limit` bytes. Stands in for
/// wrapping the request body in a byte-limited reader: every decoder in
/// this pipeline (text exposition, protobuf-delimited) works over an
/// already-materialized buffer rather than a streaming `io::Read`, so the
/// cap is enforced once, immediately before decoding, instead of
/// incrementally per read.
pub fn cap_bytes(body: &[u8], limit: usize) -> Result<&[u8], ValidateError> {
    if body.len() > limit {
        return Err(ValidateError::UploadTooLarge { limit });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_body_within_the_limit() {
        assert!(cap_bytes(b"short", 10).is_ok());
    }

    #[test]
    fn rejects_a_body_over_the_limit() {
        assert_eq!(
            cap_bytes(b"far too long", 4),
            Err(ValidateError::UploadTooLarge { limit: 4 })
        );
    }
}
