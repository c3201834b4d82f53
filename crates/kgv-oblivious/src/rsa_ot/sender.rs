// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use kgv_blind_sig::{BigUint, KeyPair};
use kgv_mate::batch::run_batch;
use num_bigint_dig::RandBigInt;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{OtChoiceMsg, OtError, OtResponseMsg, OtSetupMsg};

/// Sender side, holding the secrets and the RSA key.
pub struct OtSender<'a> {
    keypair: &'a KeyPair,
    secrets: Vec<BigUint>,
    x: Vec<BigUint>,
    agreed_k: usize,
}

impl<'a> OtSender<'a> {
    /// Draw the random values x_j and build the setup message.
    ///
    /// `agreed_k` is the most secrets the Receiver may ask for.
    pub fn new<R: CryptoRng + RngCore>(
        keypair: &'a KeyPair,
        secrets: Vec<BigUint>,
        agreed_k: usize,
        rng: &mut R,
    ) -> Result<(Self, OtSetupMsg), OtError> {
        if secrets.is_empty() {
            return Err(OtError::NoSecrets);
        }

        let n = keypair.n();
        if let Some(idx) = secrets.iter().position(|s| s >= n) {
            return Err(OtError::SecretOutOfRange(idx));
        }

        let x: Vec<BigUint> =
            secrets.iter().map(|_| rng.gen_biguint_below(n)).collect();

        tracing::debug!(secrets = secrets.len(), agreed_k, "OT setup");

        let setup = OtSetupMsg { x: x.clone() };
        let sender = Self {
            keypair,
            secrets,
            x,
            agreed_k,
        };

        Ok((sender, setup))
    }

    /// Number of secrets on offer.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn agreed_k(&self) -> usize {
        self.agreed_k
    }

    /// Answer the Receiver's choices.
    ///
    /// Asking for more than the agreed number of secrets is a policy
    /// violation and no response is computed. Asking for more than n
    /// (but within the agreement) keeps the first n choices.
    pub fn process(&self, choice: &OtChoiceMsg) -> Result<OtResponseMsg, OtError> {
        let requested = choice.v.len();
        if requested > self.agreed_k {
            tracing::error!(
                requested,
                agreed = self.agreed_k,
                "receiver asked for more secrets than agreed"
            );
            return Err(OtError::PolicyViolation {
                requested,
                agreed: self.agreed_k,
            });
        }

        let mut v = choice.v.as_slice();
        if v.len() > self.len() {
            tracing::warn!(
                requested,
                available = self.len(),
                "more choices than secrets, extra choices ignored"
            );
            v = &v[..self.len()];
        }

        let n = self.keypair.n();
        if v.iter().any(|v_i| v_i >= n) {
            return Err(OtError::MalformedChoice);
        }

        let items: Vec<(u64, &BigUint)> =
            v.iter().enumerate().map(|(i, v_i)| (i as u64, v_i)).collect();

        let rows = run_batch("ot-response", &items, |_, v_i| {
            self.x
                .iter()
                .zip(&self.secrets)
                .map(|(x_j, m_j)| {
                    // (v_i - x_j) mod N
                    let diff = (*v_i + n - x_j) % n;
                    let k = self.keypair.apply_private(&diff)?;

                    Ok((m_j + k) % n)
                })
                .collect::<Result<Vec<_>, OtError>>()
        })?
        .into_values()
        .collect::<Vec<_>>();

        tracing::debug!(rows = rows.len(), cols = self.len(), "OT response");

        Ok(OtResponseMsg { rows })
    }
}

impl Drop for OtSender<'_> {
    fn drop(&mut self) {
        self.secrets.zeroize();
        self.x.zeroize();
    }
}
