// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use kgv_blind_sig::{BigUint, KeyPair, Signer};
use kgv_graph::{
    analyzer::{statistics, EntropyKind},
    partition::partition,
    Dataset,
};
use kgv_mate::{CryptoRng, RngCore, SessionId};
use kgv_messages::{Channel, ChannelExt};
use kgv_oblivious::{OtError, OtSender};

use crate::{
    config::KgvConfig,
    disclosure::encrypt_parts,
    messages::{BlindPurpose, Disclosure, Message, Phase},
    session::{
        check_phase, direct_counts, direct_filter, log_phase, recv, unexpected, Traffic,
    },
    ProtocolError,
};

const ROLE: &str = "seller";

/// What the Seller takes away from a session.
#[derive(Debug)]
pub struct SellerReport {
    pub session: SessionId,
    pub traffic: Traffic,
    /// Number of encrypted parts offered, zero if no transfer ran.
    pub parts: usize,
    pub kinds: Vec<EntropyKind>,
    /// The Buyer's dataset, if the final exchange ran.
    pub buyer_dataset: Option<Dataset>,
}

/// The data owner's side of a session. Owns the session key.
pub struct SellerSession<C, R> {
    channel: C,
    config: KgvConfig,
    dataset: Dataset,
    rng: R,
    session: SessionId,
    keypair: Option<KeyPair>,
    kinds: Vec<EntropyKind>,
    part_keys: Vec<BigUint>,
    buyer_dataset: Option<Dataset>,
}

impl<C, R> SellerSession<C, R>
where
    C: Channel,
    R: CryptoRng + RngCore,
{
    pub fn new(channel: C, config: KgvConfig, dataset: Dataset, mut rng: R) -> Self {
        let session = SessionId::random(&mut rng);

        Self {
            channel,
            config,
            dataset,
            rng,
            session,
            keypair: None,
            kinds: vec![],
            part_keys: vec![],
            buyer_dataset: None,
        }
    }

    /// Run every phase in order.
    pub fn run(mut self) -> Result<SellerReport, ProtocolError> {
        let span = tracing::info_span!("session", id = %self.session);
        let _guard = span.enter();

        tracing::info!(
            role = ROLE,
            statements = self.dataset.len(),
            "session started"
        );

        let flags = self.config.phases.clone();

        let run = self.open(Phase::KeyExchange, flags.needs_key())?;
        if run {
            self.key_exchange()?;
        }
        self.close(Phase::KeyExchange, run)?;

        let run = self.open(Phase::EntropySignatures, flags.entropy)?;
        if run {
            self.entropy_signatures()?;
        }
        self.close(Phase::EntropySignatures, run)?;

        let run = self.open(Phase::Psi, flags.psi)?;
        if run {
            self.psi()?;
        }
        self.close(Phase::Psi, run)?;

        let run = self.open(Phase::Entropy, flags.entropy)?;
        if run {
            self.entropy()?;
        }
        self.close(Phase::Entropy, run)?;

        let run = self.open(Phase::Statistics, flags.statistics)?;
        if run {
            self.statistics()?;
        }
        self.close(Phase::Statistics, run)?;

        let run = self.open(Phase::ObliviousTransfer, flags.oblivious_transfer)?;
        if run {
            self.oblivious_transfer()?;
        }
        self.close(Phase::ObliviousTransfer, run)?;

        let run = self.open(Phase::FinalExchange, flags.final_exchange)?;
        if run {
            self.final_exchange()?;
        }
        self.close(Phase::FinalExchange, run)?;

        Ok(SellerReport {
            session: self.session,
            traffic: Traffic::of(&self.channel),
            parts: self.part_keys.len(),
            kinds: self.kinds,
            buyer_dataset: self.buyer_dataset,
        })
    }

    /// Announce `phase`, learn whether the Buyer wants it too.
    fn open(&mut self, phase: Phase, want: bool) -> Result<bool, ProtocolError> {
        self.channel.send_msg(&Message::PhaseOpen {
            session: self.session,
            phase,
            run: want,
        })?;

        match recv(&mut self.channel)? {
            Message::PhaseAccept { phase: got, run } => {
                check_phase(phase, got)?;
                let run = run && want;
                tracing::debug!(role = ROLE, %phase, run, "phase opened");
                Ok(run)
            }
            msg => Err(unexpected("PhaseAccept", &msg)),
        }
    }

    /// Wait for the Buyer to finish `phase` and acknowledge it.
    fn close(&mut self, phase: Phase, run: bool) -> Result<(), ProtocolError> {
        match recv(&mut self.channel)? {
            Message::PhaseDone { phase: got } => check_phase(phase, got)?,
            msg => return Err(unexpected("PhaseDone", &msg)),
        }
        self.channel.send_msg(&Message::Ack { phase })?;
        log_phase(ROLE, phase, run, &self.channel);

        Ok(())
    }

    fn keypair(&self) -> Result<&KeyPair, ProtocolError> {
        self.keypair.as_ref().ok_or(ProtocolError::MissingKey)
    }

    fn key_exchange(&mut self) -> Result<(), ProtocolError> {
        let keypair =
            KeyPair::generate_with_bits(&mut self.rng, self.config.session.key_bits)?;
        self.channel
            .send_msg(&Message::PublicKey(keypair.public().clone()))?;
        self.keypair = Some(keypair);

        Ok(())
    }

    /// Sign the blinded values of one Buyer request.
    fn sign_request(&mut self, expected: BlindPurpose) -> Result<(), ProtocolError> {
        let items = match recv(&mut self.channel)? {
            Message::BlindRequest { purpose, items } if purpose == expected => items,
            msg => return Err(unexpected("BlindRequest", &msg)),
        };

        let signed = Signer::new(self.keypair()?).sign_batch(&items)?;
        tracing::debug!(role = ROLE, ?expected, count = signed.len(), "signed");

        self.channel.send_msg(&Message::BlindResponse {
            purpose: expected,
            items: signed,
        })?;

        Ok(())
    }

    fn entropy_signatures(&mut self) -> Result<(), ProtocolError> {
        let wanted = match recv(&mut self.channel)? {
            Message::EntropyPlan { kinds } => kinds,
            msg => return Err(unexpected("EntropyPlan", &msg)),
        };

        let mut agreed: Vec<EntropyKind> = vec![];
        for kind in &self.config.entropy.kinds {
            if wanted.contains(kind) && !agreed.contains(kind) {
                agreed.push(*kind);
            }
        }

        self.channel.send_msg(&Message::EntropyPlan {
            kinds: agreed.clone(),
        })?;

        for kind in &agreed {
            self.sign_request(BlindPurpose::Entropy(*kind))?;
        }

        self.kinds = agreed;

        Ok(())
    }

    fn psi(&mut self) -> Result<(), ProtocolError> {
        self.sign_request(BlindPurpose::Statements)?;

        let filter = direct_filter(self.keypair()?, &self.dataset, self.config.psi.fpp)?;
        tracing::debug!(
            role = ROLE,
            bits = filter.bits().len(),
            hashes = filter.hash_count(),
            "sending filter"
        );
        self.channel.send_msg(&Message::Filter(filter))?;

        Ok(())
    }

    fn entropy(&mut self) -> Result<(), ProtocolError> {
        for kind in self.kinds.clone() {
            let counts = direct_counts(self.keypair()?, &self.dataset, kind)?;
            tracing::debug!(
                role = ROLE,
                %kind,
                labels = counts.len(),
                "sending counts"
            );
            self.channel.send_msg(&Message::Counts { kind, counts })?;
        }

        Ok(())
    }

    fn statistics(&mut self) -> Result<(), ProtocolError> {
        let stats = statistics(&self.dataset);
        self.channel.send_msg(&Message::Statistics(stats))?;

        Ok(())
    }

    fn oblivious_transfer(&mut self) -> Result<(), ProtocolError> {
        let fragments = partition(&self.dataset, &self.config.transfer.strategy);
        let (secrets, sealed) = encrypt_parts(&fragments, &mut self.rng)?;

        let keypair = self.keypair.as_ref().ok_or(ProtocolError::MissingKey)?;
        let (sender, setup) = OtSender::new(
            keypair,
            secrets.clone(),
            self.config.transfer.k,
            &mut self.rng,
        )?;
        self.channel.send_msg(&Message::OtSetup(setup))?;

        let choice = match recv(&mut self.channel)? {
            Message::OtChoice(choice) => choice,
            msg => return Err(unexpected("OtChoice", &msg)),
        };

        let response = match sender.process(&choice) {
            Ok(response) => response,
            Err(err @ OtError::PolicyViolation { .. }) => {
                tracing::error!(role = ROLE, %err, "aborting session");
                // the session fails either way
                let _ = self.channel.send_msg(&Message::Abort {
                    reason: err.to_string(),
                });
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        self.channel.send_msg(&Message::OtResponse(response))?;
        self.channel.send_msg(&Message::EncryptedParts(sealed))?;

        tracing::info!(
            role = ROLE,
            parts = secrets.len(),
            agreed_k = self.config.transfer.k,
            "parts transferred"
        );
        self.part_keys = secrets;

        Ok(())
    }

    fn final_exchange(&mut self) -> Result<(), ProtocolError> {
        let disclosure = Disclosure {
            dataset: self.dataset.clone(),
            key: self.keypair.as_ref().map(KeyPair::material),
            part_keys: self.part_keys.clone(),
            strategy: self.config.transfer.strategy.clone(),
        };
        self.channel
            .send_msg(&Message::Disclosure(Box::new(disclosure)))?;

        match recv(&mut self.channel)? {
            Message::BuyerDisclosure(dataset) => {
                tracing::info!(
                    role = ROLE,
                    statements = dataset.len(),
                    "buyer dataset received"
                );
                self.buyer_dataset = Some(dataset);
            }
            msg => return Err(unexpected("BuyerDisclosure", &msg)),
        }

        Ok(())
    }
}
