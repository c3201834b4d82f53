// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::fmt;

use kgv_mate::{CryptoRng, RngCore};
use num_bigint_dig::ModInverse;
use rsa::{
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint, RsaPrivateKey,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::BlindError;

/// Modulus size of session keys.
pub const KEY_BITS: usize = 2048;

/// Size of the element digest; the modulus has to be strictly larger.
pub const DIGEST_BITS: usize = 512;

/// Public half of the Signer's key, the only part sent during
/// key exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicParams {
    pub n: BigUint,
    pub e: BigUint,
}

impl PublicParams {
    /// Reject keys too small to carry an element digest.
    pub fn check(&self) -> Result<(), BlindError> {
        let bits = self.n.bits();
        if bits <= DIGEST_BITS {
            return Err(BlindError::ModulusTooSmall { bits });
        }

        Ok(())
    }

    /// Length of N in bytes.
    pub fn modulus_len(&self) -> usize {
        (self.n.bits() + 7) / 8
    }

    /// x^e mod N
    pub fn apply(&self, x: &BigUint) -> BigUint {
        x.modpow(&self.e, &self.n)
    }
}

/// Every component of a key pair, disclosed at the end of a session so
/// the other party can replay the signing.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub n: BigUint,
    pub e: BigUint,
    pub d: BigUint,
    pub primes: Vec<BigUint>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("n_bits", &self.n.bits())
            .field("e", &self.e)
            .finish_non_exhaustive()
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct Crt {
    p: BigUint,
    q: BigUint,
    dp: BigUint,
    dq: BigUint,
    // q * (q^-1 mod p)
    q_coeff: BigUint,
    // p * (p^-1 mod q)
    p_coeff: BigUint,
}

impl Crt {
    fn from_key(key: &RsaPrivateKey) -> Result<Self, BlindError> {
        let [p, q] = key.primes() else {
            return Err(BlindError::UnsupportedKey);
        };

        let one = BigUint::from(1u8);
        let dp = key.d() % (p - &one);
        let dq = key.d() % (q - &one);

        let q_inv = q
            .clone()
            .mod_inverse(p)
            .and_then(|num| num.to_biguint())
            .ok_or(BlindError::UnsupportedKey)?;
        let p_inv = p
            .clone()
            .mod_inverse(q)
            .and_then(|num| num.to_biguint())
            .ok_or(BlindError::UnsupportedKey)?;

        Ok(Self {
            p: p.clone(),
            q: q.clone(),
            dp,
            dq,
            q_coeff: q * q_inv,
            p_coeff: p * p_inv,
        })
    }

    fn pow(&self, x: &BigUint, n: &BigUint) -> BigUint {
        let m1 = x.modpow(&self.dp, &self.p);
        let m2 = x.modpow(&self.dq, &self.q);

        (m1 * &self.q_coeff + m2 * &self.p_coeff) % n
    }
}

/// RSA key pair of the signing party, held for the lifetime of one
/// session.
pub struct KeyPair {
    key: RsaPrivateKey,
    public: PublicParams,
    crt: Crt,
}

impl KeyPair {
    /// Generate a [`KEY_BITS`] key with public exponent 65537.
    pub fn generate<R: CryptoRng + RngCore>(
        rng: &mut R,
    ) -> Result<Self, BlindError> {
        Self::generate_with_bits(rng, KEY_BITS)
    }

    pub fn generate_with_bits<R: CryptoRng + RngCore>(
        rng: &mut R,
        bits: usize,
    ) -> Result<Self, BlindError> {
        if bits <= DIGEST_BITS {
            return Err(BlindError::ModulusTooSmall { bits });
        }

        let key = RsaPrivateKey::new(rng, bits)?;
        tracing::debug!(bits, "generated RSA key pair");

        Self::from_key(key)
    }

    /// Rebuild a key pair from disclosed material. The components are
    /// validated before use.
    pub fn from_material(material: &KeyMaterial) -> Result<Self, BlindError> {
        let key = RsaPrivateKey::from_components(
            material.n.clone(),
            material.e.clone(),
            material.d.clone(),
            material.primes.clone(),
        )?;
        key.validate()?;

        Self::from_key(key)
    }

    fn from_key(key: RsaPrivateKey) -> Result<Self, BlindError> {
        let public = PublicParams {
            n: key.n().clone(),
            e: key.e().clone(),
        };
        public.check()?;
        let crt = Crt::from_key(&key)?;

        Ok(Self { key, public, crt })
    }

    pub fn public(&self) -> &PublicParams {
        &self.public
    }

    pub fn n(&self) -> &BigUint {
        &self.public.n
    }

    /// x^d mod N, computed with the CRT split.
    pub fn apply_private(&self, x: &BigUint) -> Result<BigUint, BlindError> {
        if x >= self.n() {
            return Err(BlindError::ValueOutOfRange);
        }

        Ok(self.crt.pow(x, self.n()))
    }

    pub fn material(&self) -> KeyMaterial {
        KeyMaterial {
            n: self.key.n().clone(),
            e: self.key.e().clone(),
            d: self.key.d().clone(),
            primes: self.key.primes().to_vec(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("n_bits", &self.public.n.bits())
            .field("e", &self.public.e)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::testkey::key;

    #[test]
    fn public_exponent_is_65537() {
        assert_eq!(key().public().e, BigUint::from(65537u32));
        assert_eq!(key().n().bits(), 1024);
    }

    #[test]
    fn crt_matches_plain_exponentiation() {
        let kp = key();
        let d = kp.material().d.clone();

        for v in [2u64, 3, 0xdead_beef, u64::MAX] {
            let x = BigUint::from(v);
            assert_eq!(kp.apply_private(&x).unwrap(), x.modpow(&d, kp.n()));
        }
    }

    #[test]
    fn private_then_public_is_identity() {
        let kp = key();
        let x = BigUint::from(123_456_789u64);
        let y = kp.apply_private(&x).unwrap();

        assert_eq!(kp.public().apply(&y), x);
    }

    #[test]
    fn unreduced_input_is_rejected() {
        let kp = key();
        assert!(matches!(
            kp.apply_private(kp.n()),
            Err(BlindError::ValueOutOfRange)
        ));
    }

    #[test]
    fn small_modulus_is_rejected() {
        let mut rng = ChaCha20Rng::from_seed([2; 32]);
        assert!(matches!(
            KeyPair::generate_with_bits(&mut rng, 512),
            Err(BlindError::ModulusTooSmall { bits: 512 })
        ));

        let public = PublicParams {
            n: BigUint::from(1u8) << 300,
            e: BigUint::from(65537u32),
        };
        assert!(public.check().is_err());
    }

    #[test]
    fn material_round_trip() {
        let kp = key();
        let material = kp.material();

        let bytes = bincode::serialize(&material).unwrap();
        let material: KeyMaterial = bincode::deserialize(&bytes).unwrap();
        let rebuilt = KeyPair::from_material(&material).unwrap();

        assert_eq!(rebuilt.public(), kp.public());

        let x = BigUint::from(42u8);
        assert_eq!(
            rebuilt.apply_private(&x).unwrap(),
            kp.apply_private(&x).unwrap()
        );
    }

    #[test]
    fn inconsistent_material_is_rejected() {
        let mut material = key().material();
        material.d += BigUint::from(2u8);

        assert!(KeyPair::from_material(&material).is_err());
    }
}
