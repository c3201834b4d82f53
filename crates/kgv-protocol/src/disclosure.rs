// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Encryption of the Seller's parts. Each fragment is sealed with
//! ChaCha20-Poly1305 under a key derived from its own random secret;
//! the secrets are what the oblivious transfer moves.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use kgv_blind_sig::BigUint;
use kgv_graph::{
    fragment::{decode_fragment, encode_fragment},
    Fragment,
};
use kgv_mate::{label::Label, random_bytes, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use thiserror::Error;
use zeroize::Zeroizing;

/// Domain of the part key derivation.
pub const PART_KEY: Label = Label::new(1, 0x20);

const SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum DisclosureError {
    #[error("fragment encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("part {0} could not be sealed")]
    Seal(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPart {
    pub index: u32,
    pub ciphertext: Vec<u8>,
}

/// All parts of a session, sharing one nonce. Every part has its own
/// key so the nonce is never reused under a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedParts {
    pub nonce: [u8; 12],
    pub parts: Vec<EncryptedPart>,
}

fn cipher(secret: &BigUint) -> ChaCha20Poly1305 {
    let digest = PART_KEY
        .sha256()
        .chain_update(secret.to_bytes_be())
        .finalize();

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest);

    ChaCha20Poly1305::new(Key::from_slice(&key[..]))
}

/// Seal every fragment under a fresh secret. Returns the secrets in
/// part order together with the ciphertexts.
pub fn encrypt_parts<R: CryptoRng + RngCore>(
    fragments: &[Fragment],
    rng: &mut R,
) -> Result<(Vec<BigUint>, EncryptedParts), DisclosureError> {
    let nonce: [u8; 12] = random_bytes(rng);
    let mut secrets = Vec::with_capacity(fragments.len());
    let mut parts = Vec::with_capacity(fragments.len());

    for (idx, fragment) in fragments.iter().enumerate() {
        let seed = Zeroizing::new(random_bytes::<SECRET_BYTES, _>(rng));
        let secret = BigUint::from_bytes_be(&seed[..]);

        let plaintext = Zeroizing::new(encode_fragment(fragment)?);
        let ciphertext = cipher(&secret)
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| DisclosureError::Seal(idx))?;

        secrets.push(secret);
        parts.push(EncryptedPart {
            index: idx as u32,
            ciphertext,
        });
    }

    tracing::debug!(parts = parts.len(), "parts sealed");

    Ok((secrets, EncryptedParts { nonce, parts }))
}

/// Open one part. `None` if the key is wrong or the plaintext is not a
/// fragment.
pub fn decrypt_part(
    part: &EncryptedPart,
    nonce: &[u8; 12],
    secret: &BigUint,
) -> Option<Fragment> {
    let plaintext = cipher(secret)
        .decrypt(Nonce::from_slice(nonce), part.ciphertext.as_slice())
        .ok()
        .map(Zeroizing::new)?;

    decode_fragment(&plaintext)
}

/// Try every secret on every part and keep what opens.
pub fn open_parts(
    parts: &EncryptedParts,
    secrets: &[BigUint],
) -> Vec<(u32, Fragment)> {
    let mut opened = vec![];

    for part in &parts.parts {
        if let Some(fragment) = secrets
            .iter()
            .find_map(|s| decrypt_part(part, &parts.nonce, s))
        {
            opened.push((part.index, fragment));
        }
    }

    opened
}

#[cfg(test)]
mod tests {
    use kgv_graph::{Dataset, Node, Statement};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn fragments() -> Vec<Fragment> {
        (0..4)
            .map(|i| {
                let st = Statement::new(
                    Node::iri(format!("s{i}")),
                    Node::iri("p"),
                    Node::literal(format!("{i}")),
                );
                Dataset::from_iter([st])
            })
            .collect()
    }

    #[test]
    fn parts_open_with_their_own_secret_only() {
        let mut rng = ChaCha20Rng::from_seed([1; 32]);
        let frags = fragments();
        let (secrets, sealed) = encrypt_parts(&frags, &mut rng).unwrap();

        assert_eq!(secrets.len(), 4);
        assert_eq!(sealed.parts.len(), 4);

        for (j, part) in sealed.parts.iter().enumerate() {
            for (i, s) in secrets.iter().enumerate() {
                let opened = decrypt_part(part, &sealed.nonce, s);
                if i == j {
                    assert_eq!(opened.as_ref(), Some(&frags[j]));
                } else {
                    assert!(opened.is_none());
                }
            }
        }
    }

    #[test]
    fn open_with_a_subset_of_secrets() {
        let mut rng = ChaCha20Rng::from_seed([2; 32]);
        let frags = fragments();
        let (secrets, sealed) = encrypt_parts(&frags, &mut rng).unwrap();

        let opened = open_parts(&sealed, &[secrets[3].clone(), secrets[1].clone()]);
        let idx: Vec<u32> = opened.iter().map(|(i, _)| *i).collect();

        assert_eq!(idx, vec![1, 3]);
        assert_eq!(opened[0].1, frags[1]);
    }

    #[test]
    fn tampered_ciphertext_is_dropped() {
        let mut rng = ChaCha20Rng::from_seed([3; 32]);
        let (secrets, mut sealed) = encrypt_parts(&fragments(), &mut rng).unwrap();

        sealed.parts[0].ciphertext[0] ^= 0x80;
        assert!(decrypt_part(&sealed.parts[0], &sealed.nonce, &secrets[0]).is_none());
    }
}
