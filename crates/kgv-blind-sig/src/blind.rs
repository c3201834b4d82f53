// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::fmt;

use kgv_mate::{label::Label, CryptoRng, RngCore};
use num_bigint_dig::{ModInverse, RandBigInt};
use rsa::BigUint;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{BlindError, KeyPair, PublicParams};

/// Domain of the element digest that gets signed.
pub const ELEMENT_DIGEST: Label = Label::new(1, 0x01);

/// Domain of the digest producing a signed label.
pub const SIGNED_LABEL: Label = Label::new(1, 0x02);

/// Opaque token standing for one element across the trust boundary.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SignedLabel(#[serde(with = "serde_arrays")] pub [u8; 64]);

impl SignedLabel {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for SignedLabel {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SignedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignedLabel(")?;
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        f.write_str("..)")
    }
}

/// Random factor hiding an element from the Signer. Only the Requester
/// ever holds it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlindingFactor {
    r: BigUint,
    r_inv: BigUint,
}

impl BlindingFactor {
    pub fn r(&self) -> &BigUint {
        &self.r
    }
}

/// Digest of an element as an integer.
pub fn element_digest(element: &[u8]) -> BigUint {
    let digest = ELEMENT_DIGEST.sha512().chain_update(element).finalize();

    BigUint::from_bytes_be(&digest)
}

/// Blind `element` for signing: mu = H(element) * r^e mod N with a fresh
/// r coprime to N.
pub fn blind<R: CryptoRng + RngCore>(
    element: &[u8],
    public: &PublicParams,
    rng: &mut R,
) -> Result<(BigUint, BlindingFactor), BlindError> {
    public.check()?;

    let m = element_digest(element);
    let one = BigUint::from(1u8);

    loop {
        let r = rng.gen_biguint_below(&public.n);
        if r <= one {
            continue;
        }

        // an inverse exists exactly when gcd(r, N) = 1
        let Some(r_inv) =
            r.clone().mod_inverse(&public.n).and_then(|num| num.to_biguint())
        else {
            continue;
        };

        let mu = (&m * public.apply(&r)) % &public.n;

        return Ok((mu, BlindingFactor { r, r_inv }));
    }
}

/// Signer side: mu^d mod N. The Signer never sees the element.
pub fn sign_blinded(
    mu: &BigUint,
    keypair: &KeyPair,
) -> Result<BigUint, BlindError> {
    keypair.apply_private(mu)
}

/// Strip the blinding factor from a signed blinded value.
pub fn unblind(
    signed: &BigUint,
    n: &BigUint,
    factor: &BlindingFactor,
) -> BigUint {
    (signed * &factor.r_inv) % n
}

/// Label of an element: H(element || signature), the signature padded
/// to the modulus length so that labels do not depend on leading zeros.
pub fn make_label(
    element: &[u8],
    signature: &BigUint,
    public: &PublicParams,
) -> SignedLabel {
    let sig = signature.to_bytes_be();
    let mut padded = vec![0u8; public.modulus_len().saturating_sub(sig.len())];
    padded.extend_from_slice(&sig);

    let digest = SIGNED_LABEL
        .sha512()
        .chain_update(element)
        .chain_update(&padded)
        .finalize();

    let mut label = [0u8; 64];
    label.copy_from_slice(&digest);

    SignedLabel(label)
}

/// Check `signature` against the element digest.
pub fn verify(
    signature: &BigUint,
    public: &PublicParams,
    element: &[u8],
) -> bool {
    signature < &public.n && public.apply(signature) == element_digest(element)
}
