// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::BTreeSet;

use kgv_blind_sig::{BigUint, PublicParams};
use num_bigint_dig::RandBigInt;
use rand::{seq::index, CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{OtChoiceMsg, OtError, OtResponseMsg, OtSetupMsg};

/// Receiver of the k out of n transfer.
pub struct OtReceiver<T> {
    public: PublicParams,
    state: T,
}

/// Initial state: how many secrets, or which ones.
pub enum Wanted {
    Random(usize),
    Indices(Vec<usize>),
}

/// State after sending the choices. Cleared on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Chosen {
    choices: Vec<usize>,
    blinds: Vec<BigUint>,
}

impl OtReceiver<Wanted> {
    /// Receiver asking for `k` secrets at random positions.
    pub fn new(public: PublicParams, k: usize) -> Result<Self, OtError> {
        if k == 0 {
            return Err(OtError::NoChoices);
        }

        Ok(Self {
            public,
            state: Wanted::Random(k),
        })
    }

    /// Receiver asking for the secrets at `indices`.
    pub fn with_choices(
        public: PublicParams,
        indices: Vec<usize>,
    ) -> Result<Self, OtError> {
        if indices.is_empty() {
            return Err(OtError::NoChoices);
        }

        let mut seen = BTreeSet::new();
        if let Some(dup) = indices.iter().find(|i| !seen.insert(**i)) {
            return Err(OtError::DuplicateChoice(*dup));
        }

        Ok(Self {
            public,
            state: Wanted::Indices(indices),
        })
    }

    /// Obscure the choices against the Sender's random values.
    pub fn process<R: CryptoRng + RngCore>(
        self,
        setup: &OtSetupMsg,
        rng: &mut R,
    ) -> Result<(OtReceiver<Chosen>, OtChoiceMsg), OtError> {
        let n = setup.len();
        if n == 0 {
            return Err(OtError::NoSecrets);
        }

        let modulus = &self.public.n;
        if setup.x.iter().any(|x| x >= modulus) {
            return Err(OtError::MalformedResponse);
        }

        let choices = match &self.state {
            Wanted::Random(k) => {
                let k = if *k > n {
                    tracing::warn!(
                        requested = k,
                        available = n,
                        "more secrets requested than offered, taking all"
                    );
                    n
                } else {
                    *k
                };
                index::sample(rng, n, k).into_vec()
            }

            Wanted::Indices(indices) => {
                if let Some(bad) = indices.iter().find(|i| **i >= n) {
                    return Err(OtError::ChoiceOutOfRange(*bad));
                }
                indices.clone()
            }
        };

        let blinds: Vec<BigUint> = choices
            .iter()
            .map(|_| rng.gen_biguint_below(modulus))
            .collect();

        let v = choices
            .iter()
            .zip(&blinds)
            .map(|(b, k)| (&setup.x[*b] + self.public.apply(k)) % modulus)
            .collect();

        let next = OtReceiver {
            public: self.public,
            state: Chosen { choices, blinds },
        };

        Ok((next, OtChoiceMsg { v }))
    }
}

impl OtReceiver<Chosen> {
    /// Indices this Receiver asked for, in request order.
    pub fn choices(&self) -> &[usize] {
        &self.state.choices
    }

    /// Unmask the chosen secrets.
    pub fn process(
        self,
        response: &OtResponseMsg,
    ) -> Result<Vec<(usize, BigUint)>, OtError> {
        let chosen = &self.state;
        if response.rows.len() != chosen.choices.len() {
            return Err(OtError::MalformedResponse);
        }

        let n = &self.public.n;

        chosen
            .choices
            .iter()
            .zip(&chosen.blinds)
            .zip(&response.rows)
            .map(|((b, k), row)| {
                let masked = row.get(*b).ok_or(OtError::MalformedResponse)?;
                let secret = (masked + n - k) % n;

                Ok((*b, secret))
            })
            .collect()
    }
}
