// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{Dataset, GraphError, Node};

/// What a multiset counts.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntropyKind {
    /// (predicate, object) pairs
    Desc,
    /// (predicate, object) pairs of type statements
    Classif,
    /// (predicate, object) pairs of non-type statements
    Descm,
    /// predicates of non-type statements
    Descmp,
    /// resource objects
    Econn,
    /// subjects, predicates and resource objects
    Resource,
    Subject,
    Predicate,
    /// literal objects
    Literal,
}

impl EntropyKind {
    pub const ALL: [EntropyKind; 9] = [
        EntropyKind::Desc,
        EntropyKind::Classif,
        EntropyKind::Descm,
        EntropyKind::Descmp,
        EntropyKind::Econn,
        EntropyKind::Resource,
        EntropyKind::Subject,
        EntropyKind::Predicate,
        EntropyKind::Literal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntropyKind::Desc => "DESC",
            EntropyKind::Classif => "CLASSIF",
            EntropyKind::Descm => "DESCM",
            EntropyKind::Descmp => "DESCMP",
            EntropyKind::Econn => "ECONN",
            EntropyKind::Resource => "RESOURCE",
            EntropyKind::Subject => "SUBJECT",
            EntropyKind::Predicate => "PREDICATE",
            EntropyKind::Literal => "LITERAL",
        }
    }
}

impl fmt::Display for EntropyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntropyKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntropyKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| GraphError::UnknownKind(s.into()))
    }
}

/// Element of a multiset.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Key {
    Node(Node),
    Pair(Node, Node),
}

impl Key {
    /// Bytes that get signed for this key. The kind is part of the
    /// element so labels of different kinds never coincide.
    pub fn element(&self, kind: EntropyKind) -> Vec<u8> {
        let text = match self {
            Key::Node(n) => format!("{kind}\n{n}"),
            Key::Pair(a, b) => format!("{kind}\n{a} {b}"),
        };

        text.into_bytes()
    }
}

pub type Multiset = BTreeMap<Key, u64>;

/// Multiset of `kind` over `dataset`.
pub fn multiset(dataset: &Dataset, kind: EntropyKind) -> Multiset {
    let mut out = Multiset::new();
    let mut add = |key: Key| *out.entry(key).or_insert(0) += 1;

    for st in dataset {
        let (s, p, o) = (&st.subject, &st.predicate, &st.object);

        match kind {
            EntropyKind::Desc => add(Key::Pair(p.clone(), o.clone())),

            EntropyKind::Classif if p.is_type() => {
                add(Key::Pair(p.clone(), o.clone()))
            }
            EntropyKind::Classif => {}

            EntropyKind::Descm if !p.is_type() => {
                add(Key::Pair(p.clone(), o.clone()))
            }
            EntropyKind::Descm => {}

            EntropyKind::Descmp if !p.is_type() => add(Key::Node(p.clone())),
            EntropyKind::Descmp => {}

            EntropyKind::Econn if o.is_resource() => add(Key::Node(o.clone())),
            EntropyKind::Econn => {}

            EntropyKind::Resource => {
                add(Key::Node(s.clone()));
                add(Key::Node(p.clone()));
                if o.is_resource() {
                    add(Key::Node(o.clone()));
                }
            }

            EntropyKind::Subject => add(Key::Node(s.clone())),
            EntropyKind::Predicate => add(Key::Node(p.clone())),

            EntropyKind::Literal if o.is_literal() => add(Key::Node(o.clone())),
            EntropyKind::Literal => {}
        }
    }

    out
}

/// Shannon entropy in bits of the distribution given by `counts`.
///
/// Counts are summed in ascending order so that equal multisets give
/// bit-identical results whatever order they arrive in.
pub fn entropy<I: IntoIterator<Item = u64>>(counts: I) -> f64 {
    let mut counts: Vec<u64> = counts.into_iter().filter(|c| *c > 0).collect();
    counts.sort_unstable();

    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let h = counts.iter().fold(0.0, |h, c| {
        let p = *c as f64 / total;
        h - p * p.log2()
    });

    // a single outcome gives -0.0
    h.max(0.0)
}

/// Summary of a list of per-node counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub avg: f64,
    pub min: u64,
    pub max: u64,
    pub q25: u64,
    pub q50: u64,
    pub q75: u64,
}

impl Distribution {
    /// `avg` is supplied by the caller since its denominator is not
    /// always the number of samples.
    fn new(mut samples: Vec<u64>, avg: f64) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();

        let last = samples.len() - 1;
        let q = |f: f64| samples[((samples.len() as f64 * f) as usize).min(last)];

        Self {
            avg,
            min: samples[0],
            max: samples[samples.len() - 1],
            q25: q(0.25),
            q50: q(0.5),
            q75: q(0.75),
        }
    }

    fn differs(&self, other: &Self) -> Option<&'static str> {
        if self.avg != other.avg {
            Some("avg")
        } else if self.min != other.min {
            Some("min")
        } else if self.max != other.max {
            Some("max")
        } else if self.q25 != other.q25 {
            Some("q25")
        } else if self.q50 != other.q50 {
            Some("q50")
        } else if self.q75 != other.q75 {
            Some("q75")
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub size: u64,
    pub resources: u64,
    pub subjects: u64,
    pub predicates: u64,
    pub objects: u64,
    pub object_resources: u64,
    pub literals: u64,
    pub total_object_resources: u64,
    pub total_literals: u64,
    pub outgoing_links: Distribution,
    pub incoming_links: Distribution,
    pub literals_per_subject: Distribution,
    pub object_resources_per_subject: Distribution,
}

impl StatsRecord {
    /// Name of the first field where `self` and `other` disagree.
    pub fn first_difference(&self, other: &StatsRecord) -> Option<String> {
        let counts = [
            ("size", self.size, other.size),
            ("resources", self.resources, other.resources),
            ("subjects", self.subjects, other.subjects),
            ("predicates", self.predicates, other.predicates),
            ("objects", self.objects, other.objects),
            ("object_resources", self.object_resources, other.object_resources),
            ("literals", self.literals, other.literals),
            (
                "total_object_resources",
                self.total_object_resources,
                other.total_object_resources,
            ),
            ("total_literals", self.total_literals, other.total_literals),
        ];
        if let Some((name, _, _)) = counts.iter().find(|(_, a, b)| a != b) {
            return Some(name.to_string());
        }

        let dists = [
            ("outgoing_links", &self.outgoing_links, &other.outgoing_links),
            ("incoming_links", &self.incoming_links, &other.incoming_links),
            (
                "literals_per_subject",
                &self.literals_per_subject,
                &other.literals_per_subject,
            ),
            (
                "object_resources_per_subject",
                &self.object_resources_per_subject,
                &other.object_resources_per_subject,
            ),
        ];

        dists.iter().find_map(|(name, a, b)| {
            a.differs(b).map(|field| format!("{name}.{field}"))
        })
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Descriptive statistics of `dataset`.
pub fn statistics(dataset: &Dataset) -> StatsRecord {
    #[derive(Default)]
    struct PerSubject {
        statements: u64,
        resources: u64,
        literals: u64,
    }

    let mut subjects: BTreeMap<&Node, PerSubject> = BTreeMap::new();
    let mut incoming: BTreeMap<&Node, u64> = BTreeMap::new();
    let mut predicates = BTreeSet::new();
    let mut objects = BTreeSet::new();
    let mut literals = BTreeSet::new();
    let mut total_object_resources = 0;
    let mut total_literals = 0;

    for st in dataset {
        let entry = subjects.entry(&st.subject).or_default();
        entry.statements += 1;

        predicates.insert(&st.predicate);
        objects.insert(&st.object);

        if st.object.is_literal() {
            entry.literals += 1;
            total_literals += 1;
            literals.insert(&st.object);
        } else {
            entry.resources += 1;
            total_object_resources += 1;
            *incoming.entry(&st.object).or_insert(0) += 1;
        }
    }

    let n_subjects = subjects.len() as u64;
    let n_object_resources = incoming.len() as u64;
    let size = dataset.len() as u64;

    let per_subject = |f: fn(&PerSubject) -> u64| -> Vec<u64> {
        subjects.values().map(f).collect()
    };

    StatsRecord {
        size,
        resources: dataset.resources().len() as u64,
        subjects: n_subjects,
        predicates: predicates.len() as u64,
        objects: objects.len() as u64,
        object_resources: n_object_resources,
        literals: literals.len() as u64,
        total_object_resources,
        total_literals,
        outgoing_links: Distribution::new(
            per_subject(|s| s.statements),
            ratio(size, n_subjects),
        ),
        incoming_links: Distribution::new(
            incoming.values().copied().collect(),
            ratio(total_object_resources, n_object_resources),
        ),
        literals_per_subject: Distribution::new(
            per_subject(|s| s.literals),
            ratio(total_literals, n_subjects),
        ),
        object_resources_per_subject: Distribution::new(
            per_subject(|s| s.resources),
            ratio(total_object_resources, n_subjects),
        ),
    }
}
