// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::fmt;

pub use rand::{CryptoRng, RngCore};

/// Scatter-gather execution of per-element work.
pub mod batch;

/// Domain separation labels.
pub mod label;

/// Session ID
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionId(pub [u8; 32]);

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for SessionId {
    fn from(b: [u8; 32]) -> Self {
        SessionId(b)
    }
}

impl SessionId {
    /// Create a new session id from a byte array.
    pub fn new(b: [u8; 32]) -> Self {
        SessionId(b)
    }

    /// Generate a random session id.
    pub fn random<R: CryptoRng + RngCore>(rng: &mut R) -> SessionId {
        SessionId(random_bytes(rng))
    }
}

// Short form for log lines, the first 8 bytes are enough to tell
// sessions apart.
impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Generate a random byte array
pub fn random_bytes<const N: usize, R: CryptoRng + RngCore>(
    rng: &mut R,
) -> [u8; N] {
    let mut buf = [0u8; N];
    rng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn session_id_display_is_short_hex() {
        let sid = SessionId::new([0xab; 32]);
        assert_eq!(sid.to_string(), "abababababababab");
    }

    #[test]
    fn random_session_ids_differ() {
        let mut rng = ChaCha20Rng::from_seed([7; 32]);
        let a = SessionId::random(&mut rng);
        let b = SessionId::random(&mut rng);
        assert_ne!(a, b);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn session_id_bincode() {
        let sid = SessionId::new([3; 32]);
        let bytes = bincode::serialize(&sid).unwrap();
        let back: SessionId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(sid, back);
    }
}
