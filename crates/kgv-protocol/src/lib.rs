// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Two party data valuation.
//!
//! A Seller and a Buyer each hold a set of graph statements. Running a
//! session over a [`Channel`](kgv_messages::Channel) tells the Buyer how
//! large the overlap is, how entropy and statistics would change after
//! a merge, and hands over k of n encrypted parts of the Seller's data
//! chosen by oblivious transfer. Both datasets are disclosed at the end
//! and the Buyer replays every step to check that the Seller was honest.

use kgv_blind_sig::BlindError;
use kgv_mate::SessionId;
use kgv_messages::ChannelError;
use kgv_oblivious::OtError;
use kgv_sets::SetError;
use thiserror::Error;

mod buyer;
pub mod config;
pub mod disclosure;
pub mod messages;
mod seller;
mod session;
pub mod verifier;


pub use buyer::*;
pub use config::{ConfigError, KgvConfig};
pub use disclosure::DisclosureError;
pub use messages::{Message, Phase};
pub use seller::*;
pub use session::{EntropyRecord, Traffic};
pub use verifier::{Check, Verdict};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Blind(#[from] BlindError),

    #[error(transparent)]
    Sets(#[from] SetError),

    #[error(transparent)]
    Oblivious(#[from] OtError),

    #[error(transparent)]
    Disclosure(#[from] DisclosureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The peer sent a message that does not fit the current step.
    #[error("expected {expected}, received {got}")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },

    #[error("peer is in phase {got}, expected {expected}")]
    PhaseMismatch { expected: Phase, got: Phase },

    #[error("peer switched from session {expected} to {got}")]
    SessionMismatch {
        expected: SessionId,
        got: SessionId,
    },

    /// The Seller's filter admits more false positives than agreed.
    #[error("filter built at false positive rate {fpp}, at most {allowed} allowed")]
    LooseFilter { fpp: f64, allowed: f64 },

    #[error("peer aborted the session: {0}")]
    PeerAborted(String),

    /// A phase needs the session key but key exchange did not run.
    #[error("no session key")]
    MissingKey,
}
