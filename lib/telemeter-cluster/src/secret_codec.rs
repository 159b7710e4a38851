//! Wraps foca's [`BincodeCodec`] in an XOR-then-checksum envelope keyed by
//! the cluster's shared secret, so a gossip datagram is both obfuscated and
//! authenticated without pulling in a dedicated encryption crate: a peer
//! without the matching secret can neither produce a datagram this node
//! accepts nor make sense of one this node sends.

use bytes::{Buf, BufMut};
use foca::{BincodeCodec, Codec, Message};

use crate::membership::Member;

/// Length of the FNV-64a checksum trailer appended to every sealed
/// datagram.
const CHECKSUM_LEN: usize = 8;

/// Keystream material is expanded to at least this many bytes so a short or
/// low-entropy secret still produces a full-width keystream instead of
/// repeating every few bytes.
const KEYSTREAM_LEN: usize = 32;

#[derive(Debug, snafu::Snafu)]
pub enum EnvelopeError {
    #[snafu(display("gossip datagram is shorter than the checksum trailer"))]
    Truncated,
    #[snafu(display("gossip datagram failed its secret-keyed checksum; dropping as unauthenticated"))]
    BadChecksum,
    #[snafu(display("failed to bincode-encode a gossip message: {source}"))]
    Encode { source: bincode::Error },
    #[snafu(display("failed to bincode-decode a gossip message: {source}"))]
    Decode { source: bincode::Error },
}

/// A [`Codec`] that encrypts and authenticates every datagram it produces
/// or consumes with a shared secret, delegating the actual message framing
/// to [`BincodeCodec`].
pub struct SecretCodec {
    inner: BincodeCodec<bincode::DefaultOptions>,
    keystream: Vec<u8>,
}

impl SecretCodec {
    pub fn new(secret: &[u8]) -> Self {
        SecretCodec {
            inner: BincodeCodec(bincode::DefaultOptions::new()),
            keystream: derive_keystream(secret),
        }
    }

    fn xor(&self, data: &mut [u8]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.keystream[i % self.keystream.len()];
        }
    }

    /// The checksum covers the keystream itself, not just the ciphertext, so
    /// a peer without the matching secret can't forge a trailer that
    /// verifies even if it guesses the ciphertext.
    fn checksum(&self, ciphertext: &[u8]) -> [u8; CHECKSUM_LEN] {
        let mut buf = Vec::with_capacity(self.keystream.len() + ciphertext.len());
        buf.extend_from_slice(&self.keystream);
        buf.extend_from_slice(ciphertext);
        telemeter_hash::fnv64a_bytes(&buf).to_be_bytes()
    }

    /// XORs `plain` against the keystream and appends the checksum trailer.
    fn seal(&self, plain: &[u8]) -> Vec<u8> {
        let mut ciphertext = plain.to_vec();
        self.xor(&mut ciphertext);
        let checksum = self.checksum(&ciphertext);
        let mut sealed = Vec::with_capacity(ciphertext.len() + CHECKSUM_LEN);
        sealed.extend_from_slice(&ciphertext);
        sealed.extend_from_slice(&checksum);
        sealed
    }

    /// Verifies the checksum trailer and returns the XORed-back plaintext.
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        if sealed.len() < CHECKSUM_LEN {
            return Err(EnvelopeError::Truncated);
        }
        let (ciphertext, trailer) = sealed.split_at(sealed.len() - CHECKSUM_LEN);
        if self.checksum(ciphertext) != trailer {
            return Err(EnvelopeError::BadChecksum);
        }
        let mut plain = ciphertext.to_vec();
        self.xor(&mut plain);
        Ok(plain)
    }
}

/// Expands `secret` to [`KEYSTREAM_LEN`] bytes by hashing successive
/// `(secret, counter)` pairs with FNV-64a.
fn derive_keystream(secret: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(KEYSTREAM_LEN);
    let mut counter: u8 = 0;
    while out.len() < KEYSTREAM_LEN {
        let mut buf = Vec::with_capacity(secret.len() + 1);
        buf.extend_from_slice(secret);
        buf.push(counter);
        out.extend_from_slice(&telemeter_hash::fnv64a_bytes(&buf).to_be_bytes());
        counter += 1;
    }
    out
}

fn buf_to_vec(mut buf: impl Buf) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.remaining());
    while buf.has_remaining() {
        let chunk = buf.chunk();
        let len = chunk.len();
        out.extend_from_slice(chunk);
        buf.advance(len);
    }
    out
}

impl Codec<Member> for SecretCodec {
    type Error = EnvelopeError;

    fn encode(&mut self, message: Message<Member>, mut buf: impl BufMut) -> Result<(), Self::Error> {
        let mut plain = Vec::new();
        self.inner
            .encode(message, &mut plain)
            .map_err(|source| EnvelopeError::Encode { source })?;
        buf.put_slice(&self.seal(&plain));
        Ok(())
    }

    fn decode(&mut self, buf: impl Buf) -> Result<Message<Member>, Self::Error> {
        let sealed = buf_to_vec(buf);
        let plain = self.open(&sealed)?;
        self.inner
            .decode(plain.as_slice())
            .map_err(|source| EnvelopeError::Decode { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_payload_with_the_matching_secret() {
        let sender = SecretCodec::new(b"shared-secret");
        let receiver = SecretCodec::new(b"shared-secret");

        let sealed = sender.seal(b"hello, peer");
        let opened = receiver.open(&sealed).unwrap();
        assert_eq!(opened, b"hello, peer");
    }

    #[test]
    fn rejects_a_payload_sealed_with_a_different_secret() {
        let sender = SecretCodec::new(b"correct-secret");
        let receiver = SecretCodec::new(b"wrong-secret");

        let sealed = sender.seal(b"hello, peer");
        assert!(matches!(receiver.open(&sealed), Err(EnvelopeError::BadChecksum)));
    }

    #[test]
    fn rejects_a_truncated_payload() {
        let sender = SecretCodec::new(b"shared-secret");
        let receiver = SecretCodec::new(b"shared-secret");

        let mut sealed = sender.seal(b"hello, peer");
        sealed.truncate(CHECKSUM_LEN - 1);
        assert!(matches!(receiver.open(&sealed), Err(EnvelopeError::Truncated)));
    }

    #[test]
    fn rejects_a_corrupted_payload() {
        let sender = SecretCodec::new(b"shared-secret");
        let receiver = SecretCodec::new(b"shared-secret");

        let mut sealed = sender.seal(b"hello, peer");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(receiver.open(&sealed), Err(EnvelopeError::BadChecksum)));
    }

    #[test]
    fn derived_keystreams_differ_for_different_secrets() {
        assert_ne!(derive_keystream(b"one"), derive_keystream(b"two"));
        assert_eq!(derive_keystream(b"one").len(), KEYSTREAM_LEN);
    }
}
