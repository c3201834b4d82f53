// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::BTreeMap;

use kgv_blind_sig::{PublicParams, Requester, SignedLabel};
use kgv_graph::{
    analyzer::{entropy, multiset, statistics, EntropyKind, Key, StatsRecord},
    Dataset, Fragment, Statement,
};
use kgv_mate::{CryptoRng, RngCore, SessionId};
use kgv_messages::{Channel, ChannelExt};
use kgv_oblivious::OtReceiver;
use kgv_sets::{combine_counts, find_intersection, BloomFilter};

use crate::{
    config::KgvConfig,
    disclosure::{open_parts, EncryptedParts},
    messages::{BlindPurpose, Message, Phase},
    session::{
        check_phase, key_elements, labels_by_key, log_phase, recv, statement_elements,
        unexpected, EntropyRecord, Traffic,
    },
    verifier::{verify, Evidence, Verdict},
    ProtocolError,
};

const ROLE: &str = "buyer";

/// What the Buyer learns from a session.
#[derive(Debug, Default)]
pub struct BuyerReport {
    /// Id announced by the Seller.
    pub session: Option<SessionId>,
    /// Own statements the Seller's filter reported as shared.
    pub intersection: Option<Dataset>,
    pub entropies: Vec<EntropyRecord>,
    pub seller_stats: Option<StatsRecord>,
    pub buyer_stats: Option<StatsRecord>,
    /// Parts obtained through oblivious transfer.
    pub fragments: Vec<Fragment>,
    /// Outcome of replaying the session against the disclosed data.
    pub verdict: Option<Verdict>,
    pub traffic: Traffic,
}

/// The data acquirer's side of a session.
pub struct BuyerSession<C, R> {
    channel: C,
    config: KgvConfig,
    dataset: Dataset,
    rng: R,
    public: Option<PublicParams>,
    kinds: Vec<EntropyKind>,
    entropy_labels: BTreeMap<EntropyKind, BTreeMap<Key, SignedLabel>>,
    filter: Option<BloomFilter>,
    parts: Option<EncryptedParts>,
    report: BuyerReport,
}

impl<C, R> BuyerSession<C, R>
where
    C: Channel,
    R: CryptoRng + RngCore,
{
    pub fn new(channel: C, config: KgvConfig, dataset: Dataset, rng: R) -> Self {
        Self {
            channel,
            config,
            dataset,
            rng,
            public: None,
            kinds: vec![],
            entropy_labels: BTreeMap::new(),
            filter: None,
            parts: None,
            report: BuyerReport::default(),
        }
    }

    /// Run every phase in order, following the Seller.
    pub fn run(mut self) -> Result<BuyerReport, ProtocolError> {
        tracing::info!(
            role = ROLE,
            statements = self.dataset.len(),
            "session started"
        );

        let flags = self.config.phases.clone();

        let run = self.accept(Phase::KeyExchange, flags.needs_key())?;
        if run {
            self.key_exchange()?;
        }
        self.finish(Phase::KeyExchange, run)?;

        let run = self.accept(Phase::EntropySignatures, flags.entropy)?;
        if run {
            self.entropy_signatures()?;
        }
        self.finish(Phase::EntropySignatures, run)?;

        let run = self.accept(Phase::Psi, flags.psi)?;
        if run {
            self.psi()?;
        }
        self.finish(Phase::Psi, run)?;

        let run = self.accept(Phase::Entropy, flags.entropy)?;
        if run {
            self.entropy()?;
        }
        self.finish(Phase::Entropy, run)?;

        let run = self.accept(Phase::Statistics, flags.statistics)?;
        if run {
            self.statistics()?;
        }
        self.finish(Phase::Statistics, run)?;

        let run = self.accept(Phase::ObliviousTransfer, flags.oblivious_transfer)?;
        if run {
            self.oblivious_transfer()?;
        }
        self.finish(Phase::ObliviousTransfer, run)?;

        let run = self.accept(Phase::FinalExchange, flags.final_exchange)?;
        if run {
            self.final_exchange()?;
        }
        self.finish(Phase::FinalExchange, run)?;

        self.report.traffic = Traffic::of(&self.channel);

        Ok(self.report)
    }

    /// Wait for the Seller to open `phase` and answer with our flag.
    fn accept(&mut self, phase: Phase, want: bool) -> Result<bool, ProtocolError> {
        let theirs = match recv(&mut self.channel)? {
            Message::PhaseOpen {
                session,
                phase: got,
                run,
            } => {
                self.check_session(session)?;
                check_phase(phase, got)?;
                run
            }
            msg => return Err(unexpected("PhaseOpen", &msg)),
        };

        self.channel
            .send_msg(&Message::PhaseAccept { phase, run: want })?;

        let run = theirs && want;
        tracing::debug!(role = ROLE, %phase, run, "phase opened");

        Ok(run)
    }

    fn check_session(&mut self, session: SessionId) -> Result<(), ProtocolError> {
        match self.report.session {
            None => {
                tracing::info!(role = ROLE, id = %session, "joined session");
                self.report.session = Some(session);
            }
            Some(expected) if expected != session => {
                return Err(ProtocolError::SessionMismatch {
                    expected,
                    got: session,
                })
            }
            Some(_) => {}
        }

        Ok(())
    }

    fn finish(&mut self, phase: Phase, run: bool) -> Result<(), ProtocolError> {
        self.channel.send_msg(&Message::PhaseDone { phase })?;

        match recv(&mut self.channel)? {
            Message::Ack { phase: got } => check_phase(phase, got)?,
            msg => return Err(unexpected("Ack", &msg)),
        }
        log_phase(ROLE, phase, run, &self.channel);

        Ok(())
    }

    fn public(&self) -> Result<&PublicParams, ProtocolError> {
        self.public.as_ref().ok_or(ProtocolError::MissingKey)
    }

    fn key_exchange(&mut self) -> Result<(), ProtocolError> {
        match recv(&mut self.channel)? {
            Message::PublicKey(public) => {
                public.check()?;
                tracing::debug!(role = ROLE, bits = public.n.bits(), "public key received");
                self.public = Some(public);
            }
            msg => return Err(unexpected("PublicKey", &msg)),
        }

        Ok(())
    }

    /// Get `elements` signed blindly and return their labels by id.
    fn blind_sign(
        &mut self,
        purpose: BlindPurpose,
        elements: &[(u64, Vec<u8>)],
    ) -> Result<BTreeMap<u64, SignedLabel>, ProtocolError> {
        let mut requester = Requester::new(self.public()?.clone())?;
        let blinded = requester.blind_batch(elements, &mut self.rng)?;

        self.channel.send_msg(&Message::BlindRequest {
            purpose,
            items: blinded,
        })?;

        let signed = match recv(&mut self.channel)? {
            Message::BlindResponse { purpose: got, items } if got == purpose => items,
            msg => return Err(unexpected("BlindResponse", &msg)),
        };

        Ok(requester.unblind_batch(&signed)?)
    }

    fn entropy_signatures(&mut self) -> Result<(), ProtocolError> {
        let wanted = self.config.entropy.kinds.clone();
        self.channel
            .send_msg(&Message::EntropyPlan { kinds: wanted.clone() })?;

        let agreed = match recv(&mut self.channel)? {
            Message::EntropyPlan { kinds } => kinds,
            msg => return Err(unexpected("EntropyPlan", &msg)),
        };

        for kind in &agreed {
            let multiset = multiset(&self.dataset, *kind);
            let (keys, elements) = key_elements(*kind, &multiset);

            let labels = self.blind_sign(BlindPurpose::Entropy(*kind), &elements)?;
            self.entropy_labels
                .insert(*kind, labels_by_key(&keys, labels));
        }

        // a kind we never asked for cannot be combined below
        self.kinds = agreed.into_iter().filter(|k| wanted.contains(k)).collect();

        Ok(())
    }

    fn psi(&mut self) -> Result<(), ProtocolError> {
        let statements: Vec<Statement> = self.dataset.iter().cloned().collect();
        let elements = statement_elements(&self.dataset);
        let labels = self.blind_sign(BlindPurpose::Statements, &elements)?;

        let filter = match recv(&mut self.channel)? {
            Message::Filter(filter) => filter,
            msg => return Err(unexpected("Filter", &msg)),
        };

        let allowed = self.config.psi.fpp;
        if filter.fpp().is_nan() || filter.fpp() > allowed {
            let err = ProtocolError::LooseFilter {
                fpp: filter.fpp(),
                allowed,
            };
            tracing::error!(role = ROLE, %err, "aborting session");
            // the session fails either way
            let _ = self.channel.send_msg(&Message::Abort {
                reason: err.to_string(),
            });
            return Err(err);
        }

        let hits = find_intersection(&labels, &filter)?;
        let intersection: Dataset = hits
            .into_iter()
            .filter_map(|id| statements.get(id as usize).cloned())
            .collect();

        tracing::info!(
            role = ROLE,
            shared = intersection.len(),
            own = statements.len(),
            fpp = filter.fpp(),
            "intersection found"
        );

        self.filter = Some(filter);
        self.report.intersection = Some(intersection);

        Ok(())
    }

    fn entropy(&mut self) -> Result<(), ProtocolError> {
        let none = Dataset::new();
        let shared = self.report.intersection.as_ref().unwrap_or(&none);

        for kind in &self.kinds {
            let (got, counts) = match recv(&mut self.channel)? {
                Message::Counts { kind, counts } => (kind, counts),
                msg => return Err(unexpected("Counts", &msg)),
            };
            if got != *kind {
                return Err(unexpected("Counts of the agreed kind", &Message::Counts {
                    kind: got,
                    counts,
                }));
            }

            let labels = self
                .entropy_labels
                .get(kind)
                .ok_or(ProtocolError::MissingKey)?;
            let local = multiset(&self.dataset, *kind);
            let inter = multiset(shared, *kind);

            let combined = entropy(combine_counts(&local, &inter, &counts, labels)?);
            let buyer = entropy(local.values().copied());
            let seller = entropy(counts.counts());

            tracing::info!(
                role = ROLE,
                %kind,
                combined,
                buyer,
                seller,
                gain = combined - buyer,
                "entropy"
            );

            self.report.entropies.push(EntropyRecord {
                kind: *kind,
                combined,
                buyer,
                seller,
                gain: combined - buyer,
                seller_counts: counts,
            });
        }

        Ok(())
    }

    fn statistics(&mut self) -> Result<(), ProtocolError> {
        match recv(&mut self.channel)? {
            Message::Statistics(stats) => self.report.seller_stats = Some(stats),
            msg => return Err(unexpected("Statistics", &msg)),
        }
        self.report.buyer_stats = Some(statistics(&self.dataset));

        Ok(())
    }

    fn oblivious_transfer(&mut self) -> Result<(), ProtocolError> {
        let setup = match recv(&mut self.channel)? {
            Message::OtSetup(setup) => setup,
            msg => return Err(unexpected("OtSetup", &msg)),
        };

        let receiver = OtReceiver::new(self.public()?.clone(), self.config.transfer.k)?;
        let (receiver, choice) = receiver.process(&setup, &mut self.rng)?;
        self.channel.send_msg(&Message::OtChoice(choice))?;

        let response = match recv(&mut self.channel)? {
            Message::OtResponse(response) => response,
            msg => return Err(unexpected("OtResponse", &msg)),
        };
        let secrets: Vec<_> = receiver
            .process(&response)?
            .into_iter()
            .map(|(_, secret)| secret)
            .collect();

        let parts = match recv(&mut self.channel)? {
            Message::EncryptedParts(parts) => parts,
            msg => return Err(unexpected("EncryptedParts", &msg)),
        };

        let opened = open_parts(&parts, &secrets);
        tracing::info!(
            role = ROLE,
            offered = parts.parts.len(),
            obtained = opened.len(),
            "parts obtained"
        );

        self.report.fragments = opened.into_iter().map(|(_, f)| f).collect();
        self.parts = Some(parts);

        Ok(())
    }

    fn final_exchange(&mut self) -> Result<(), ProtocolError> {
        let disclosure = match recv(&mut self.channel)? {
            Message::Disclosure(disclosure) => disclosure,
            msg => return Err(unexpected("Disclosure", &msg)),
        };
        self.channel
            .send_msg(&Message::BuyerDisclosure(self.dataset.clone()))?;

        let evidence = Evidence {
            buyer: &self.dataset,
            fpp: self.config.psi.fpp,
            disclosure: &disclosure,
            public: self.public.as_ref(),
            intersection: self.report.intersection.as_ref(),
            filter: self.filter.as_ref(),
            seller_stats: self.report.seller_stats.as_ref(),
            entropies: &self.report.entropies,
            parts: self.parts.as_ref(),
            fragments: &self.report.fragments,
        };
        let verdict = verify(&evidence);

        tracing::info!(
            role = ROLE,
            fair = verdict.fair,
            checks = verdict.checks.len(),
            "verification done"
        );
        self.report.verdict = Some(verdict);

        Ok(())
    }
}
