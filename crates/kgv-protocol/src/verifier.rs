// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Replay of a finished session in the clear.
//!
//! Once both datasets and the Seller's key are disclosed the Buyer can
//! recompute everything the Seller claimed: the filter, the counting
//! structures, the statistics and the encrypted parts. A mismatch never
//! aborts anything, it shows up as a failed [`Check`].

use kgv_blind_sig::{KeyPair, PublicParams};
use kgv_graph::{
    analyzer::{entropy, multiset, statistics, StatsRecord},
    partition::partition,
    Dataset, Fragment,
};
use kgv_sets::BloomFilter;
use serde::{Deserialize, Serialize};

use crate::{
    disclosure::{decrypt_part, EncryptedParts},
    messages::Disclosure,
    session::{direct_counts, direct_filter, EntropyRecord},
};

const ENTROPY_EPSILON: f64 = 1e-9;

/// Outcome of one recomputation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub claim: String,
    pub passed: bool,
    pub diagnostic: String,
}

impl Check {
    fn pass(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            passed: true,
            diagnostic: String::new(),
        }
    }

    fn fail(claim: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            passed: false,
            diagnostic: diagnostic.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// True iff every attempted check passed.
    pub fair: bool,
    pub checks: Vec<Check>,
}

impl Verdict {
    pub fn failed(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// What the Buyer saw during a session. Claims of phases that did not
/// run are `None` or empty and are not checked.
pub struct Evidence<'a> {
    pub buyer: &'a Dataset,
    /// False positive rate the Buyer agreed to. A filter built at a
    /// higher rate than this fails the filter check.
    pub fpp: f64,
    pub disclosure: &'a Disclosure,
    pub public: Option<&'a PublicParams>,
    pub intersection: Option<&'a Dataset>,
    pub filter: Option<&'a BloomFilter>,
    pub seller_stats: Option<&'a StatsRecord>,
    pub entropies: &'a [EntropyRecord],
    pub parts: Option<&'a EncryptedParts>,
    pub fragments: &'a [Fragment],
}

/// Largest number of claimed members that are not true members still
/// explained by Bloom filter false positives.
pub fn extras_tolerance(fpp: f64, queries: usize) -> usize {
    let mean = fpp * queries as f64;

    (mean + 3.0 * mean.sqrt()).floor() as usize + 1
}

/// Recompute every claim of the Seller.
pub fn verify(evidence: &Evidence<'_>) -> Verdict {
    let mut checks = vec![];
    let seller = &evidence.disclosure.dataset;

    let keypair = check_key(evidence, &mut checks);

    if let (Some(claimed), Some(filter)) = (evidence.intersection, evidence.filter) {
        checks.push(check_intersection(
            evidence.buyer,
            seller,
            claimed,
            evidence.fpp,
        ));
        checks.push(check_filter(keypair.as_ref(), seller, filter, evidence.fpp));
    }

    if let Some(stats) = evidence.seller_stats {
        checks.push(check_statistics(seller, stats));
    }

    for record in evidence.entropies {
        checks.push(check_entropy(
            keypair.as_ref(),
            evidence.buyer,
            seller,
            record,
        ));
    }

    if let Some(parts) = evidence.parts {
        checks.push(check_transfer(
            evidence.disclosure,
            parts,
            evidence.fragments,
        ));
    }

    let fair = checks.iter().all(|c| c.passed);
    for check in checks.iter().filter(|c| !c.passed) {
        tracing::warn!(claim = %check.claim, diagnostic = %check.diagnostic, "check failed");
    }

    Verdict { fair, checks }
}

fn check_key(evidence: &Evidence<'_>, checks: &mut Vec<Check>) -> Option<KeyPair> {
    const CLAIM: &str = "disclosed key matches the session key";

    let public = evidence.public?;

    let Some(material) = &evidence.disclosure.key else {
        checks.push(Check::fail(CLAIM, "no key disclosed"));
        return None;
    };

    match KeyPair::from_material(material) {
        Ok(kp) if kp.public() == public => {
            checks.push(Check::pass(CLAIM));
            Some(kp)
        }
        Ok(_) => {
            checks.push(Check::fail(CLAIM, "public parameters differ"));
            None
        }
        Err(err) => {
            checks.push(Check::fail(CLAIM, format!("invalid key: {err}")));
            None
        }
    }
}

fn check_intersection(
    buyer: &Dataset,
    seller: &Dataset,
    claimed: &Dataset,
    fpp: f64,
) -> Check {
    const CLAIM: &str = "intersection";

    let truth = buyer.intersection(seller);

    let missing = truth.iter().filter(|st| !claimed.contains(st)).count();
    if missing > 0 {
        return Check::fail(
            CLAIM,
            format!("{missing} shared statements were not reported"),
        );
    }

    let extras = claimed.iter().filter(|st| !truth.contains(st)).count();
    let tolerance = extras_tolerance(fpp, buyer.len());
    if extras > tolerance {
        return Check::fail(
            CLAIM,
            format!("{extras} false members exceed the tolerance of {tolerance}"),
        );
    }

    Check::pass(CLAIM)
}

fn check_filter(
    keypair: Option<&KeyPair>,
    seller: &Dataset,
    filter: &BloomFilter,
    fpp: f64,
) -> Check {
    const CLAIM: &str = "bloom filter";

    if filter.fpp().is_nan() || filter.fpp() > fpp {
        return Check::fail(
            CLAIM,
            format!("built at fpp {} above the agreed {fpp}", filter.fpp()),
        );
    }

    let Some(keypair) = keypair else {
        return Check::fail(CLAIM, "cannot rebuild without the session key");
    };

    let rebuilt = match direct_filter(keypair, seller, filter.fpp()) {
        Ok(f) => f,
        Err(err) => return Check::fail(CLAIM, format!("cannot rebuild: {err}")),
    };

    if rebuilt.hash_count() != filter.hash_count() {
        return Check::fail(
            CLAIM,
            format!(
                "{} hash functions, expected {}",
                filter.hash_count(),
                rebuilt.hash_count()
            ),
        );
    }

    if rebuilt.bits() != filter.bits() {
        return Check::fail(CLAIM, "bits differ from the disclosed dataset");
    }

    Check::pass(CLAIM)
}

fn check_statistics(seller: &Dataset, claimed: &StatsRecord) -> Check {
    const CLAIM: &str = "statistics";

    match statistics(seller).first_difference(claimed) {
        None => Check::pass(CLAIM),
        Some(field) => Check::fail(CLAIM, format!("{field} differs")),
    }
}

fn check_entropy(
    keypair: Option<&KeyPair>,
    buyer: &Dataset,
    seller: &Dataset,
    record: &EntropyRecord,
) -> Check {
    let claim = format!("{} entropy", record.kind.name());
    let kind = record.kind.name();

    let seller_only = entropy(multiset(seller, record.kind).into_values());
    if (seller_only - record.seller).abs() > ENTROPY_EPSILON {
        return Check::fail(
            claim,
            format!("{kind}: seller entropy {} but {seller_only} recomputed", record.seller),
        );
    }

    if let Some(kp) = keypair {
        let rebuilt = match direct_counts(kp, seller, record.kind) {
            Ok(c) => c,
            Err(err) => return Check::fail(claim, format!("{kind}: cannot rebuild: {err}")),
        };

        if rebuilt != record.seller_counts {
            return Check::fail(
                claim,
                format!("{kind}: counting structure differs from the disclosed dataset"),
            );
        }
    }

    let union = buyer.union(seller);
    let truth = entropy(multiset(&union, record.kind).into_values());
    if (truth - record.combined).abs() <= ENTROPY_EPSILON {
        return Check::pass(claim);
    }

    // a false positive in the intersection moves the combined value
    // without any cheating, which only the verified counts can tell
    if keypair.is_some() {
        tracing::debug!(%kind, combined = record.combined, truth, "combined entropy off by false positives");
        return Check::pass(claim);
    }

    Check::fail(
        claim,
        format!("{kind}: combined {} but {truth} recomputed", record.combined),
    )
}

fn check_transfer(
    disclosure: &Disclosure,
    parts: &EncryptedParts,
    obtained: &[Fragment],
) -> Check {
    const CLAIM: &str = "oblivious transfer";

    let expected = partition(&disclosure.dataset, &disclosure.strategy);
    let keys = &disclosure.part_keys;

    if parts.parts.len() != keys.len() || keys.len() != expected.len() {
        return Check::fail(
            CLAIM,
            format!(
                "{} parts, {} keys, {} fragments after partitioning",
                parts.parts.len(),
                keys.len(),
                expected.len()
            ),
        );
    }

    let mut decoded = Vec::with_capacity(parts.parts.len());
    for (j, (part, key)) in parts.parts.iter().zip(keys).enumerate() {
        match decrypt_part(part, &parts.nonce, key) {
            Some(fragment) => decoded.push(fragment),
            None => {
                return Check::fail(CLAIM, format!("part {j} does not open under its key"))
            }
        }
    }

    let union = decoded
        .iter()
        .fold(Dataset::new(), |acc, f| acc.union(f));
    if union != disclosure.dataset {
        return Check::fail(CLAIM, "parts do not add up to the disclosed dataset");
    }

    if let Some(j) = decoded.iter().zip(&expected).position(|(a, b)| a != b) {
        return Check::fail(CLAIM, format!("part {j} differs from the partition"));
    }

    if let Some(i) = obtained.iter().position(|f| !decoded.contains(f)) {
        return Check::fail(CLAIM, format!("obtained fragment {i} is not a disclosed part"));
    }

    Check::pass(CLAIM)
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use kgv_blind_sig::SignedLabel;
    use kgv_graph::{analyzer::EntropyKind, Node, Statement};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::disclosure::encrypt_parts;

    fn st(s: usize, o: usize) -> Statement {
        Statement::new(
            Node::iri(format!("http://ex.org/s{s}")),
            Node::iri("http://ex.org/p"),
            Node::iri(format!("http://ex.org/o{o}")),
        )
    }

    fn dataset(range: std::ops::Range<usize>) -> Dataset {
        range.map(|i| st(i, i % 7)).collect()
    }

    fn key() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();

        KEY.get_or_init(|| {
            let mut rng = ChaCha20Rng::from_seed([4; 32]);
            KeyPair::generate_with_bits(&mut rng, 1024).unwrap()
        })
    }

    fn disclosure(seller: Dataset, key: &KeyPair) -> Disclosure {
        Disclosure {
            dataset: seller,
            key: Some(key.material()),
            part_keys: vec![],
            strategy: kgv_graph::partition::Strategy::Range { parts: 1 },
        }
    }

    fn evidence<'a>(
        buyer: &'a Dataset,
        disclosure: &'a Disclosure,
        public: &'a PublicParams,
    ) -> Evidence<'a> {
        Evidence {
            buyer,
            fpp: 0.01,
            disclosure,
            public: Some(public),
            intersection: None,
            filter: None,
            seller_stats: None,
            entropies: &[],
            parts: None,
            fragments: &[],
        }
    }

    /// What an honest Seller lets the Buyer record for `kind`.
    fn honest_record(buyer: &Dataset, seller: &Dataset, kind: EntropyKind) -> EntropyRecord {
        let combined = entropy(multiset(&buyer.union(seller), kind).into_values());
        let own = entropy(multiset(buyer, kind).into_values());
        let seller_counts = direct_counts(key(), seller, kind).unwrap();

        EntropyRecord {
            kind,
            combined,
            buyer: own,
            seller: entropy(seller_counts.counts()),
            gain: combined - own,
            seller_counts,
        }
    }

    #[test]
    fn tolerance_grows_with_queries() {
        assert_eq!(extras_tolerance(0.0, 100), 1);
        // 1 + 3 * 1 = 4
        assert_eq!(extras_tolerance(0.01, 100), 5);
        assert!(extras_tolerance(0.01, 10_000) > extras_tolerance(0.01, 100));
    }

    #[test]
    fn missing_members_fail() {
        let buyer = dataset(0..10);
        let seller = dataset(5..20);

        let honest = buyer.intersection(&seller);
        assert!(check_intersection(&buyer, &seller, &honest, 0.01).passed);

        let short: Dataset = honest.iter().skip(1).cloned().collect();
        let check = check_intersection(&buyer, &seller, &short, 0.01);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("not reported"));
    }

    #[test]
    fn few_extras_are_tolerated() {
        let buyer = dataset(0..10);
        let seller = dataset(5..20);

        let mut claimed = buyer.intersection(&seller);
        claimed.insert(st(0, 0));
        assert!(check_intersection(&buyer, &seller, &claimed, 0.01).passed);

        let all = buyer.clone();
        assert!(!check_intersection(&buyer, &seller, &all, 0.01).passed);
    }

    #[test]
    fn statistics_name_the_field() {
        let seller = dataset(0..12);
        let mut claimed = statistics(&seller);
        assert!(check_statistics(&seller, &claimed).passed);

        claimed.subjects += 1;
        let check = check_statistics(&seller, &claimed);
        assert!(!check.passed);
        assert!(check.diagnostic.starts_with("subjects"));
    }

    fn transfer_fixture() -> (Disclosure, EncryptedParts, Vec<Fragment>) {
        let seller = dataset(0..12);
        let strategy = kgv_graph::partition::Strategy::Range { parts: 4 };
        let fragments = partition(&seller, &strategy);

        let mut rng = ChaCha20Rng::from_seed([9; 32]);
        let (part_keys, parts) = encrypt_parts(&fragments, &mut rng).unwrap();

        let disclosure = Disclosure {
            dataset: seller,
            key: None,
            part_keys,
            strategy,
        };

        (disclosure, parts, fragments)
    }

    #[test]
    fn honest_transfer_passes() {
        let (disclosure, parts, fragments) = transfer_fixture();
        let check = check_transfer(&disclosure, &parts, &fragments[1..3]);

        assert!(check.passed, "{}", check.diagnostic);
    }

    #[test]
    fn swapped_key_is_caught() {
        let (mut disclosure, parts, fragments) = transfer_fixture();
        disclosure.part_keys.swap(0, 1);

        let check = check_transfer(&disclosure, &parts, &fragments[..1]);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("part 0"));
    }

    #[test]
    fn foreign_fragment_is_caught() {
        let (disclosure, parts, _) = transfer_fixture();
        let foreign = Dataset::from_iter([st(99, 1)]);

        let check = check_transfer(&disclosure, &parts, &[foreign]);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("obtained fragment 0"));
    }

    #[test]
    fn part_count_must_match_partition() {
        let (mut disclosure, parts, _) = transfer_fixture();
        disclosure.strategy = kgv_graph::partition::Strategy::Range { parts: 3 };

        assert!(!check_transfer(&disclosure, &parts, &[]).passed);
    }

    #[test]
    fn disclosed_key_must_match() {
        let buyer = dataset(0..4);
        let honest = disclosure(dataset(2..8), key());

        let mut checks = vec![];
        let kp = check_key(&evidence(&buyer, &honest, key().public()), &mut checks);
        assert!(kp.is_some());
        assert!(checks[0].passed);

        let mut rng = ChaCha20Rng::from_seed([5; 32]);
        let other = KeyPair::generate_with_bits(&mut rng, 512).unwrap();
        let swapped = disclosure(dataset(2..8), &other);

        let mut checks = vec![];
        let kp = check_key(&evidence(&buyer, &swapped, key().public()), &mut checks);
        assert!(kp.is_none());
        assert_eq!(checks[0].diagnostic, "public parameters differ");

        let mut withheld = disclosure(dataset(2..8), key());
        withheld.key = None;

        let mut checks = vec![];
        assert!(check_key(&evidence(&buyer, &withheld, key().public()), &mut checks).is_none());
        assert_eq!(checks[0].diagnostic, "no key disclosed");
    }

    #[test]
    fn rebuilt_filter_must_match() {
        let seller = dataset(0..30);
        let honest = direct_filter(key(), &seller, 0.001).unwrap();
        assert!(check_filter(Some(key()), &seller, &honest, 0.01).passed);

        let mut padded = honest.clone();
        for i in 0..20u32 {
            padded.insert(&i.to_le_bytes());
        }
        let check = check_filter(Some(key()), &seller, &padded, 0.01);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("bits differ"));

        assert!(!check_filter(None, &seller, &honest, 0.01).passed);
    }

    #[test]
    fn filter_looser_than_agreed_fails() {
        let seller = dataset(0..30);
        let loose = direct_filter(key(), &seller, 1.0).unwrap();

        let check = check_filter(Some(key()), &seller, &loose, 0.01);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("above the agreed"));
    }

    #[test]
    fn honest_entropy_passes() {
        let buyer = dataset(6..20);
        let seller = dataset(0..12);
        let record = honest_record(&buyer, &seller, EntropyKind::Desc);

        let check = check_entropy(Some(key()), &buyer, &seller, &record);
        assert!(check.passed, "{}", check.diagnostic);
    }

    #[test]
    fn tampered_count_is_caught_when_combined_matches() {
        let buyer = dataset(6..20);
        let seller = dataset(0..12);
        let mut record = honest_record(&buyer, &seller, EntropyKind::Desc);

        // one extra occurrence, while a false positive keeps the
        // combined value where the truth is
        let (label, count) = record
            .seller_counts
            .iter()
            .next()
            .map(|(l, c)| (*l, c))
            .unwrap();
        record.seller_counts.insert(label, count + 1);
        record.seller = entropy(record.seller_counts.counts());

        let check = check_entropy(Some(key()), &buyer, &seller, &record);
        assert!(!check.passed);
        assert!(check.diagnostic.starts_with("DESC: seller entropy"));

        // without the key the Seller-only entropy still gives it away
        assert!(!check_entropy(None, &buyer, &seller, &record).passed);
    }

    #[test]
    fn counts_are_compared_even_with_honest_entropies() {
        let buyer = dataset(6..20);
        let seller = dataset(0..12);
        let mut record = honest_record(&buyer, &seller, EntropyKind::Desc);

        // relabelling keeps every count and so every entropy
        let (label, count) = record
            .seller_counts
            .iter()
            .next()
            .map(|(l, c)| (*l, c))
            .unwrap();
        let mut relabelled = kgv_sets::CountingStructure::new();
        for (l, c) in record.seller_counts.iter().filter(|(l, _)| **l != label) {
            relabelled.insert(*l, c);
        }
        relabelled.insert(SignedLabel([7; 64]), count);
        record.seller_counts = relabelled;

        let check = check_entropy(Some(key()), &buyer, &seller, &record);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("counting structure differs"));
    }

    #[test]
    fn combined_off_by_false_positives_needs_the_key() {
        let buyer = dataset(6..20);
        let seller = dataset(0..12);
        let mut record = honest_record(&buyer, &seller, EntropyKind::Desc);
        record.combined -= 0.05;

        let check = check_entropy(Some(key()), &buyer, &seller, &record);
        assert!(check.passed, "{}", check.diagnostic);

        let check = check_entropy(None, &buyer, &seller, &record);
        assert!(!check.passed);
        assert!(check.diagnostic.contains("recomputed"));
    }
}
