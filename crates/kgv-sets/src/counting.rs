// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::{BTreeMap, BTreeSet};

use kgv_blind_sig::SignedLabel;
use serde::{Deserialize, Serialize};

use crate::SetError;

/// Exact map from signed label to count.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingStructure(BTreeMap<SignedLabel, u64>);

impl CountingStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, label: &SignedLabel) -> Option<u64> {
        self.0.get(label).copied()
    }

    /// Replace the count of `label`, returning the previous one.
    pub fn insert(&mut self, label: SignedLabel, count: u64) -> Option<u64> {
        self.0.insert(label, count)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SignedLabel, u64)> {
        self.0.iter().map(|(l, c)| (l, *c))
    }

    /// All counts, in label order.
    pub fn counts(&self) -> Vec<u64> {
        self.0.values().copied().collect()
    }
}

impl FromIterator<(SignedLabel, u64)> for CountingStructure {
    fn from_iter<I: IntoIterator<Item = (SignedLabel, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Count of every multiset key, keyed by the key's signed label.
///
/// Every key must have a label. Keys sharing a label have their counts
/// summed.
pub fn build_counting_structure<K: Ord>(
    multiset: &BTreeMap<K, u64>,
    labels: &BTreeMap<K, SignedLabel>,
) -> Result<CountingStructure, SetError> {
    let mut out = CountingStructure::new();

    for (key, count) in multiset {
        let label = labels.get(key).ok_or(SetError::MissingLabel)?;
        *out.0.entry(*label).or_insert(0) += count;
    }

    Ok(out)
}

/// Union counts of the local multiset and the peer's counting structure.
///
/// A local key whose label the peer also counts gets
/// `local + peer - intersection`, where `intersection` is the key's count
/// in the shared part of both datasets. Other local keys keep their
/// count. Peer labels not seen locally are appended with the peer's
/// count. The result is in an unspecified but deterministic order.
pub fn combine_counts<K: Ord>(
    local: &BTreeMap<K, u64>,
    intersection: &BTreeMap<K, u64>,
    peer: &CountingStructure,
    labels: &BTreeMap<K, SignedLabel>,
) -> Result<Vec<u64>, SetError> {
    let mut combined = Vec::with_capacity(local.len() + peer.len());
    let mut seen = BTreeSet::new();

    for (key, count) in local {
        let label = labels.get(key).ok_or(SetError::MissingLabel)?;

        let total = match peer.get(label) {
            Some(theirs) => {
                let shared = intersection.get(key).copied().unwrap_or(0);
                (count + theirs).saturating_sub(shared)
            }
            None => *count,
        };

        seen.insert(*label);
        combined.push(total);
    }

    combined.extend(
        peer.iter()
            .filter(|(label, _)| !seen.contains(*label))
            .map(|(_, count)| count),
    );

    Ok(combined)
}
