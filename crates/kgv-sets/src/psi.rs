// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::{BTreeMap, BTreeSet};

use kgv_blind_sig::SignedLabel;
use kgv_mate::batch::run_batch;

use crate::{BloomFilter, SetError};

/// Filter holding every label, sized for their count.
pub fn build_bloom_filter<'a, I>(
    labels: I,
    fpp: f64,
) -> Result<BloomFilter, SetError>
where
    I: IntoIterator<Item = &'a SignedLabel>,
    I::IntoIter: ExactSizeIterator,
{
    let labels = labels.into_iter();
    let mut filter = BloomFilter::with_rate(labels.len(), fpp)?;
    for label in labels {
        filter.insert(label.as_bytes());
    }

    tracing::debug!(
        items = filter.len(),
        bits = filter.bits().len(),
        hashes = filter.hash_count(),
        "bloom filter built"
    );

    Ok(filter)
}

/// Ids of the local labels the peer's filter reports as members.
///
/// Every true member is returned. Non-members slip through with the
/// filter's false positive probability.
pub fn find_intersection(
    local: &BTreeMap<u64, SignedLabel>,
    peer: &BloomFilter,
) -> Result<BTreeSet<u64>, SetError> {
    let items: Vec<(u64, &SignedLabel)> =
        local.iter().map(|(id, label)| (*id, label)).collect();

    let hits = run_batch("membership", &items, |_, label| {
        Ok::<_, SetError>(peer.contains(label.as_bytes()))
    })?;

    Ok(hits
        .into_iter()
        .filter_map(|(id, hit)| hit.then_some(id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(i: u64) -> SignedLabel {
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&i.to_be_bytes());
        bytes[63] = 0x5a;
        SignedLabel(bytes)
    }

    #[test]
    fn shared_labels_are_found() {
        // peer holds 0..300, we hold 200..500
        let peer: Vec<SignedLabel> = (0..300).map(label).collect();
        let filter = build_bloom_filter(&peer, 0.001).unwrap();

        let local: BTreeMap<u64, SignedLabel> =
            (200..500).map(|i| (i, label(i))).collect();
        let found = find_intersection(&local, &filter).unwrap();

        for i in 200..300 {
            assert!(found.contains(&i));
        }
        // 0.001 * 200 non-members, allow generous slack
        assert!(found.len() < 100 + 5);
    }

    #[test]
    fn empty_sides() {
        let filter = build_bloom_filter(&[], 0.01).unwrap();
        let local: BTreeMap<u64, SignedLabel> =
            (0..10).map(|i| (i, label(i))).collect();

        assert!(find_intersection(&local, &filter).unwrap().is_empty());
        assert!(find_intersection(&BTreeMap::new(), &filter)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bad_rate_is_reported() {
        assert!(matches!(
            build_bloom_filter(&[label(1)], 2.0),
            Err(SetError::InvalidRate(_))
        ));
    }
}
