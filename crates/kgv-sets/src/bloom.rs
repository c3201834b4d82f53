// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::f64::consts::LN_2;

use bit_vec::BitVec;
use kgv_mate::label::Label;
use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::SetError;

/// Domain of the Bloom filter index hash.
pub const BLOOM_INDEX: Label = Label::new(1, 0x10);

const MIN_BITS: usize = 8;

/// Bloom filter over byte strings.
///
/// Positions are derived by double hashing: two 64 bit words of a
/// SHA-256 digest give `h1 + i * h2 mod m` for the i-th hash function.
/// The bit vector is exposed through [`BloomFilter::bits`] so that a
/// filter received from a peer can be compared with one rebuilt
/// locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: BitVec,
    hashes: u32,
    fpp: f64,
    items: u64,
}

impl BloomFilter {
    /// Filter sized for `expected_items` insertions at false positive
    /// probability `fpp`, which must lie in (0, 1].
    pub fn with_rate(expected_items: usize, fpp: f64) -> Result<Self, SetError> {
        if !(fpp > 0.0 && fpp <= 1.0) {
            return Err(SetError::InvalidRate(fpp));
        }

        let n = expected_items.max(1) as f64;
        let m = (-n * fpp.ln() / (LN_2 * LN_2)).ceil() as usize;
        let m = m.max(MIN_BITS);
        let k = ((m as f64 / n) * LN_2).round().max(1.0) as u32;

        Ok(Self {
            bits: BitVec::from_elem(m, false),
            hashes: k,
            fpp,
            items: 0,
        })
    }

    pub fn insert(&mut self, item: &[u8]) {
        for idx in self.positions(item) {
            self.bits.set(idx, true);
        }
        self.items += 1;
    }

    /// No false negatives: true for every inserted item.
    pub fn contains(&self, item: &[u8]) -> bool {
        self.positions(item)
            .all(|idx| self.bits.get(idx).unwrap_or(false))
    }

    /// The raw bit vector.
    pub fn bits(&self) -> &BitVec {
        &self.bits
    }

    pub fn hash_count(&self) -> u32 {
        self.hashes
    }

    /// Configured false positive probability.
    pub fn fpp(&self) -> f64 {
        self.fpp
    }

    /// Number of insertions so far.
    pub fn len(&self) -> u64 {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    fn positions(&self, item: &[u8]) -> impl Iterator<Item = usize> {
        let digest = BLOOM_INDEX.sha256().chain_update(item).finalize();

        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        let h1 = u64::from_le_bytes(word);
        word.copy_from_slice(&digest[8..16]);
        // odd step so that it never collapses to a single position
        let h2 = u64::from_le_bytes(word) | 1;

        let m = self.bits.len() as u64;

        (0..self.hashes as u64)
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn no_false_negatives() {
        let mut rng = ChaCha20Rng::from_seed([1; 32]);
        let items: Vec<[u8; 16]> = (0..2_000).map(|_| rng.gen()).collect();

        let mut filter = BloomFilter::with_rate(items.len(), 0.01).unwrap();
        items.iter().for_each(|i| filter.insert(i));

        assert!(items.iter().all(|i| filter.contains(i)));
        assert_eq!(filter.len(), 2_000);
    }

    #[test]
    fn false_positive_rate_is_near_target() {
        let mut rng = ChaCha20Rng::from_seed([2; 32]);
        let fpp = 0.05;

        let mut filter = BloomFilter::with_rate(5_000, fpp).unwrap();
        for _ in 0..5_000 {
            filter.insert(&rng.gen::<[u8; 16]>());
        }

        let trials = 20_000;
        let hits = (0..trials)
            .filter(|_| filter.contains(&rng.gen::<[u8; 17]>()))
            .count();
        let observed = hits as f64 / trials as f64;

        assert!(observed < fpp * 1.5, "observed rate {observed}");
        assert!(observed > fpp * 0.5, "observed rate {observed}");
    }

    #[test]
    fn sizing_follows_rate() {
        let loose = BloomFilter::with_rate(1_000, 0.1).unwrap();
        let tight = BloomFilter::with_rate(1_000, 0.001).unwrap();

        assert!(tight.bits().len() > loose.bits().len());
        assert!(tight.hash_count() > loose.hash_count());
        assert!(loose.hash_count() >= 1);
    }

    #[test]
    fn rate_must_be_a_probability() {
        for fpp in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                BloomFilter::with_rate(10, fpp),
                Err(SetError::InvalidRate(_))
            ));
        }

        let all = BloomFilter::with_rate(10, 1.0).unwrap();
        assert_eq!(all.bits().len(), MIN_BITS);
    }

    #[test]
    fn identical_inputs_give_identical_bits() {
        let mut a = BloomFilter::with_rate(3, 0.01).unwrap();
        let mut b = BloomFilter::with_rate(3, 0.01).unwrap();
        for item in [&b"x"[..], b"y", b"z"] {
            a.insert(item);
        }
        for item in [&b"z"[..], b"x", b"y"] {
            b.insert(item);
        }
        assert_eq!(a.bits(), b.bits());
    }

    #[test]
    fn filter_survives_serialization() {
        let mut filter = BloomFilter::with_rate(10, 0.01).unwrap();
        filter.insert(b"a");

        let bytes = bincode::serialize(&filter).unwrap();
        let back: BloomFilter = bincode::deserialize(&bytes).unwrap();

        assert_eq!(back, filter);
        assert!(back.contains(b"a"));
    }
}
