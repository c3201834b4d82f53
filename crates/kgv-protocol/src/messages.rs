// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::fmt;

use kgv_blind_sig::{BigUint, BlindedElement, KeyMaterial, PublicParams};
use kgv_graph::{
    analyzer::{EntropyKind, StatsRecord},
    partition::Strategy,
    Dataset,
};
use kgv_mate::SessionId;
use kgv_oblivious::{OtChoiceMsg, OtResponseMsg, OtSetupMsg};
use kgv_sets::{BloomFilter, CountingStructure};
use serde::{Deserialize, Serialize};

use crate::disclosure::EncryptedParts;

/// Steps of a session, in the order they run.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Phase {
    KeyExchange,
    EntropySignatures,
    Psi,
    Entropy,
    Statistics,
    ObliviousTransfer,
    FinalExchange,
}

impl Phase {
    pub const ORDER: [Phase; 7] = [
        Phase::KeyExchange,
        Phase::EntropySignatures,
        Phase::Psi,
        Phase::Entropy,
        Phase::Statistics,
        Phase::ObliviousTransfer,
        Phase::FinalExchange,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::KeyExchange => "key-exchange",
            Phase::EntropySignatures => "entropy-signatures",
            Phase::Psi => "psi",
            Phase::Entropy => "entropy",
            Phase::Statistics => "statistics",
            Phase::ObliviousTransfer => "oblivious-transfer",
            Phase::FinalExchange => "final-exchange",
        };

        f.write_str(name)
    }
}

/// What a batch of blinded elements stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlindPurpose {
    Statements,
    Entropy(EntropyKind),
}

/// Everything the Seller reveals once the session is over.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Disclosure {
    pub dataset: Dataset,
    /// Absent when key exchange did not run.
    pub key: Option<KeyMaterial>,
    /// OT secret of each encrypted part, in part order.
    pub part_keys: Vec<BigUint>,
    pub strategy: Strategy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// Carries the Seller's session id so that both ends can tell
    /// sessions apart in their logs.
    PhaseOpen {
        session: SessionId,
        phase: Phase,
        run: bool,
    },
    PhaseAccept { phase: Phase, run: bool },
    PhaseDone { phase: Phase },
    Ack { phase: Phase },

    PublicKey(PublicParams),

    /// Buyer: kinds it wants. Seller: kinds both want.
    EntropyPlan { kinds: Vec<EntropyKind> },

    BlindRequest {
        purpose: BlindPurpose,
        items: Vec<BlindedElement>,
    },
    BlindResponse {
        purpose: BlindPurpose,
        items: Vec<BlindedElement>,
    },

    Filter(BloomFilter),
    Counts {
        kind: EntropyKind,
        counts: CountingStructure,
    },
    Statistics(StatsRecord),

    OtSetup(OtSetupMsg),
    OtChoice(OtChoiceMsg),
    OtResponse(OtResponseMsg),
    EncryptedParts(EncryptedParts),

    Disclosure(Box<Disclosure>),
    BuyerDisclosure(Dataset),

    Abort { reason: String },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::PhaseOpen { .. } => "PhaseOpen",
            Message::PhaseAccept { .. } => "PhaseAccept",
            Message::PhaseDone { .. } => "PhaseDone",
            Message::Ack { .. } => "Ack",
            Message::PublicKey(_) => "PublicKey",
            Message::EntropyPlan { .. } => "EntropyPlan",
            Message::BlindRequest { .. } => "BlindRequest",
            Message::BlindResponse { .. } => "BlindResponse",
            Message::Filter(_) => "Filter",
            Message::Counts { .. } => "Counts",
            Message::Statistics(_) => "Statistics",
            Message::OtSetup(_) => "OtSetup",
            Message::OtChoice(_) => "OtChoice",
            Message::OtResponse(_) => "OtResponse",
            Message::EncryptedParts(_) => "EncryptedParts",
            Message::Disclosure(_) => "Disclosure",
            Message::BuyerDisclosure(_) => "BuyerDisclosure",
            Message::Abort { .. } => "Abort",
        }
    }
}
