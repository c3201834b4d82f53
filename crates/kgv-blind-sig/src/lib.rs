// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! RSA blind signatures used to turn private elements into opaque
//! labels that both parties can compare.
//!
//! The Signer holds a [`KeyPair`]. A Requester blinds the digest of an
//! element with a random factor, the Signer exponentiates the blinded
//! value without learning the element, and the Requester strips the
//! factor to obtain an ordinary RSA signature. The [`SignedLabel`] of an
//! element is the digest of the element together with that signature.

use kgv_mate::batch::BatchError;
use thiserror::Error;

mod blind;
mod keys;
mod roles;

pub use blind::*;
pub use keys::*;
pub use roles::*;

pub use rsa::BigUint;

#[derive(Debug, Error)]
pub enum BlindError {
    #[error("RSA key error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("modulus of {bits} bits does not exceed the digest size")]
    ModulusTooSmall { bits: usize },

    #[error("unsupported key, two primes with CRT inverses are required")]
    UnsupportedKey,

    #[error("value is not reduced modulo N")]
    ValueOutOfRange,

    #[error("response for unknown element {0}")]
    UnknownElement(u64),

    #[error("element {0} is already waiting for a signature")]
    DuplicateElement(u64),

    #[error("{0} blinded elements were never signed")]
    MissingElements(usize),

    #[error("signature for element {0} does not verify")]
    InvalidSignature(u64),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

#[cfg(test)]
pub(crate) mod testkey {
    use std::sync::OnceLock;

    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use crate::KeyPair;

    /// 1024 bit key shared by the tests of this crate; generating one
    /// per test would dominate the run time.
    pub fn key() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();

        KEY.get_or_init(|| {
            let mut rng = ChaCha20Rng::from_seed([1; 32]);
            KeyPair::generate_with_bits(&mut rng, 1024).unwrap()
        })
    }
}
