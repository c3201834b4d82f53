// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::BTreeMap;

use kgv_blind_sig::{KeyPair, SignedLabel, Signer};
use kgv_graph::{
    analyzer::{multiset, EntropyKind, Key, Multiset},
    Dataset,
};
use kgv_messages::{Channel, ChannelExt};
use kgv_sets::{build_bloom_filter, build_counting_structure, BloomFilter, CountingStructure};
use serde::{Deserialize, Serialize};

use crate::{Message, Phase, ProtocolError};

/// Bytes moved over the channel by one party.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traffic {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Traffic {
    pub(crate) fn of<C: Channel>(channel: &C) -> Self {
        Self {
            bytes_sent: channel.bytes_sent(),
            bytes_received: channel.bytes_received(),
        }
    }
}

/// Entropy of one kind as seen by the Buyer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntropyRecord {
    pub kind: EntropyKind,
    /// Entropy of the merged data.
    pub combined: f64,
    pub buyer: f64,
    pub seller: f64,
    /// `combined - buyer`
    pub gain: f64,
    /// Counts as received from the Seller.
    pub seller_counts: CountingStructure,
}

/// Receive the next message. An `Abort` from the peer ends the session.
pub(crate) fn recv<C: Channel>(channel: &mut C) -> Result<Message, ProtocolError> {
    match channel.recv_msg::<Message>()? {
        Message::Abort { reason } => {
            tracing::error!(%reason, "peer aborted");
            Err(ProtocolError::PeerAborted(reason))
        }
        msg => Ok(msg),
    }
}

pub(crate) fn unexpected(expected: &'static str, got: &Message) -> ProtocolError {
    ProtocolError::Unexpected {
        expected,
        got: got.name(),
    }
}

pub(crate) fn check_phase(expected: Phase, got: Phase) -> Result<(), ProtocolError> {
    if expected != got {
        return Err(ProtocolError::PhaseMismatch { expected, got });
    }

    Ok(())
}

pub(crate) fn log_phase<C: Channel>(role: &'static str, phase: Phase, run: bool, channel: &C) {
    tracing::info!(
        role,
        %phase,
        run,
        bytes_sent = channel.bytes_sent(),
        bytes_received = channel.bytes_received(),
        "phase complete"
    );
}

/// Statements with their position as element id.
pub(crate) fn statement_elements(dataset: &Dataset) -> Vec<(u64, Vec<u8>)> {
    dataset
        .iter()
        .enumerate()
        .map(|(id, st)| (id as u64, st.to_bytes()))
        .collect()
}

/// Multiset keys in order, with their signing elements keyed by
/// position.
pub(crate) fn key_elements(
    kind: EntropyKind,
    multiset: &Multiset,
) -> (Vec<&Key>, Vec<(u64, Vec<u8>)>) {
    let keys: Vec<&Key> = multiset.keys().collect();
    let elements = keys
        .iter()
        .enumerate()
        .map(|(id, key)| (id as u64, key.element(kind)))
        .collect();

    (keys, elements)
}

/// Attach labels, produced for position ids, back to their keys.
pub(crate) fn labels_by_key(
    keys: &[&Key],
    labels: BTreeMap<u64, SignedLabel>,
) -> BTreeMap<Key, SignedLabel> {
    labels
        .into_iter()
        .filter_map(|(id, label)| {
            keys.get(id as usize).map(|key| ((*key).clone(), label))
        })
        .collect()
}

/// Counting structure of `kind` over `dataset`, labelled by the key
/// holder directly.
pub(crate) fn direct_counts(
    keypair: &KeyPair,
    dataset: &Dataset,
    kind: EntropyKind,
) -> Result<CountingStructure, ProtocolError> {
    let multiset = multiset(dataset, kind);
    let (keys, elements) = key_elements(kind, &multiset);
    let labels = Signer::new(keypair).label_batch(&elements)?;

    Ok(build_counting_structure(
        &multiset,
        &labels_by_key(&keys, labels),
    )?)
}

/// Bloom filter of the statements of `dataset`, labelled by the key
/// holder directly.
pub(crate) fn direct_filter(
    keypair: &KeyPair,
    dataset: &Dataset,
    fpp: f64,
) -> Result<BloomFilter, ProtocolError> {
    let labels = Signer::new(keypair).label_batch(&statement_elements(dataset))?;

    Ok(build_bloom_filter(labels.values(), fpp)?)
}
