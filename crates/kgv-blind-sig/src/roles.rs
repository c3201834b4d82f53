// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::BTreeMap;

use kgv_mate::{batch::run_batch, random_bytes, CryptoRng, RngCore};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rsa::BigUint;
use serde::{Deserialize, Serialize};

use crate::{
    blind, element_digest, make_label, sign_blinded, unblind, verify,
    BlindError, BlindingFactor, KeyPair, PublicParams, SignedLabel,
};

/// Blinded value, or signed blinded value, of one element. The id
/// travels with the value so that batches can be processed in any
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedElement {
    pub id: u64,
    pub value: BigUint,
}

struct Pending {
    element: Vec<u8>,
    factor: BlindingFactor,
}

/// Party that wants its elements signed without showing them.
pub struct Requester {
    public: PublicParams,
    pending: BTreeMap<u64, Pending>,
}

impl Requester {
    pub fn new(public: PublicParams) -> Result<Self, BlindError> {
        public.check()?;

        Ok(Self {
            public,
            pending: BTreeMap::new(),
        })
    }

    pub fn public(&self) -> &PublicParams {
        &self.public
    }

    /// Number of elements waiting for a signature.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Blind every element. The blinding factors stay with the Requester
    /// until [`Requester::unblind_batch`].
    pub fn blind_batch<R: CryptoRng + RngCore>(
        &mut self,
        elements: &[(u64, Vec<u8>)],
        rng: &mut R,
    ) -> Result<Vec<BlindedElement>, BlindError> {
        if let Some((id, _)) =
            elements.iter().find(|(id, _)| self.pending.contains_key(id))
        {
            return Err(BlindError::DuplicateElement(*id));
        }

        // every task gets its own seeded generator
        let seeded: Vec<(u64, (&[u8], [u8; 32]))> = elements
            .iter()
            .map(|(id, element)| (*id, (element.as_slice(), random_bytes(rng))))
            .collect();

        let public = &self.public;
        let mut blinded =
            run_batch("blind", &seeded, |_, (element, seed)| {
                let mut rng = ChaCha20Rng::from_seed(*seed);
                blind(element, public, &mut rng)
            })?;

        let mut out = Vec::with_capacity(elements.len());
        for (id, element) in elements {
            let (value, factor) = blinded
                .remove(id)
                .ok_or(BlindError::UnknownElement(*id))?;

            self.pending.insert(
                *id,
                Pending {
                    element: element.clone(),
                    factor,
                },
            );
            out.push(BlindedElement { id: *id, value });
        }

        Ok(out)
    }

    /// Unblind the Signer's answers into labels. Every pending element
    /// must be answered exactly once and every signature must verify.
    pub fn unblind_batch(
        &mut self,
        signed: &[BlindedElement],
    ) -> Result<BTreeMap<u64, SignedLabel>, BlindError> {
        let mut work = Vec::with_capacity(signed.len());
        for answer in signed {
            let pending = self
                .pending
                .remove(&answer.id)
                .ok_or(BlindError::UnknownElement(answer.id))?;
            work.push((answer.id, (pending, &answer.value)));
        }

        if !self.pending.is_empty() {
            let missing = self.pending.len();
            self.pending.clear();
            return Err(BlindError::MissingElements(missing));
        }

        let public = &self.public;
        run_batch("unblind", &work, |id, (pending, value)| {
            let signature = unblind(value, &public.n, &pending.factor);
            if !verify(&signature, public, &pending.element) {
                return Err(BlindError::InvalidSignature(id));
            }

            Ok(make_label(&pending.element, &signature, public))
        })
    }
}

/// Party holding the key pair.
pub struct Signer<'a> {
    keypair: &'a KeyPair,
}

impl<'a> Signer<'a> {
    pub fn new(keypair: &'a KeyPair) -> Self {
        Self { keypair }
    }

    /// Sign blinded values on behalf of a Requester.
    pub fn sign_batch(
        &self,
        blinded: &[BlindedElement],
    ) -> Result<Vec<BlindedElement>, BlindError> {
        let items: Vec<(u64, &BigUint)> =
            blinded.iter().map(|b| (b.id, &b.value)).collect();

        let signed = run_batch("sign", &items, |_, mu| {
            sign_blinded(mu, self.keypair)
        })?;

        Ok(signed
            .into_iter()
            .map(|(id, value)| BlindedElement { id, value })
            .collect())
    }

    /// Labels of the Signer's own elements. No blinding is needed since
    /// the Signer holds the key; the result equals what a Requester
    /// obtains for the same element.
    pub fn label_batch(
        &self,
        elements: &[(u64, Vec<u8>)],
    ) -> Result<BTreeMap<u64, SignedLabel>, BlindError> {
        let public = self.keypair.public();

        run_batch("label", elements, |_, element| {
            let signature =
                self.keypair.apply_private(&element_digest(element))?;

            Ok(make_label(element, &signature, public))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkey::key;

    fn elements(range: std::ops::Range<u64>) -> Vec<(u64, Vec<u8>)> {
        range
            .map(|i| (i, format!("element-{i}").into_bytes()))
            .collect()
    }

    #[test]
    fn blinded_labels_match_direct_labels() {
        let kp = key();
        let mut rng = ChaCha20Rng::from_seed([11; 32]);
        let items = elements(0..40);

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        let signer = Signer::new(kp);

        let blinded = requester.blind_batch(&items, &mut rng).unwrap();
        assert_eq!(requester.pending(), 40);

        let signed = signer.sign_batch(&blinded).unwrap();
        let labels = requester.unblind_batch(&signed).unwrap();
        assert_eq!(requester.pending(), 0);

        let direct = signer.label_batch(&items).unwrap();
        assert_eq!(labels, direct);
    }

    #[test]
    fn blinded_batch_keeps_input_order() {
        let kp = key();
        let mut rng = ChaCha20Rng::from_seed([12; 32]);
        let items: Vec<_> = elements(0..10).into_iter().rev().collect();

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        let blinded = requester.blind_batch(&items, &mut rng).unwrap();

        let ids: Vec<u64> = blinded.iter().map(|b| b.id).collect();
        assert_eq!(ids, (0..10).rev().collect::<Vec<_>>());
    }

    #[test]
    fn answers_in_any_order_are_accepted() {
        let kp = key();
        let mut rng = ChaCha20Rng::from_seed([13; 32]);
        let items = elements(0..8);

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        let blinded = requester.blind_batch(&items, &mut rng).unwrap();
        let mut signed = Signer::new(kp).sign_batch(&blinded).unwrap();
        signed.reverse();

        let labels = requester.unblind_batch(&signed).unwrap();
        assert_eq!(labels.len(), 8);
    }

    #[test]
    fn unknown_and_missing_answers_are_errors() {
        let kp = key();
        let mut rng = ChaCha20Rng::from_seed([14; 32]);
        let items = elements(0..4);
        let signer = Signer::new(kp);

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        let blinded = requester.blind_batch(&items, &mut rng).unwrap();
        let mut signed = signer.sign_batch(&blinded).unwrap();
        signed[0].id = 99;
        assert!(matches!(
            requester.unblind_batch(&signed),
            Err(BlindError::UnknownElement(99))
        ));

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        let blinded = requester.blind_batch(&items, &mut rng).unwrap();
        let signed = signer.sign_batch(&blinded).unwrap();
        assert!(matches!(
            requester.unblind_batch(&signed[1..]),
            Err(BlindError::MissingElements(1))
        ));
    }

    #[test]
    fn forged_signature_is_detected() {
        let kp = key();
        let mut rng = ChaCha20Rng::from_seed([15; 32]);
        let items = elements(0..3);

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        let blinded = requester.blind_batch(&items, &mut rng).unwrap();
        let mut signed = Signer::new(kp).sign_batch(&blinded).unwrap();
        signed[2].value = &signed[2].value + BigUint::from(1u8);

        assert!(matches!(
            requester.unblind_batch(&signed),
            Err(BlindError::InvalidSignature(2))
        ));
    }

    #[test]
    fn duplicate_pending_element_is_rejected() {
        let kp = key();
        let mut rng = ChaCha20Rng::from_seed([16; 32]);

        let mut requester = Requester::new(kp.public().clone()).unwrap();
        requester.blind_batch(&elements(0..2), &mut rng).unwrap();

        assert!(matches!(
            requester.blind_batch(&elements(1..3), &mut rng),
            Err(BlindError::DuplicateElement(1))
        ));
    }
}
