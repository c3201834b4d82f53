// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

/// RSA k out of n Oblivious Transfer
pub mod rsa_ot;

pub use rsa_ot::*;

#[cfg(test)]
pub(crate) mod testkey {
    use std::sync::OnceLock;

    use kgv_blind_sig::KeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    pub fn key() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();

        KEY.get_or_init(|| {
            let mut rng = ChaCha20Rng::from_seed([2; 32]);
            KeyPair::generate_with_bits(&mut rng, 1024).unwrap()
        })
    }
}
