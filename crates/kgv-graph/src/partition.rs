// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Dataset, Fragment, Node};

/// How a dataset is cut into fragments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Contiguous runs of the ordered dataset, as even as possible.
    Range { parts: usize },
    /// One fragment per subject.
    Subject,
    /// One fragment per resource holding every statement that mentions
    /// it. Fragments overlap.
    Resource,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Range { parts: 5 }
    }
}

/// Cut `dataset` into fragments whose union is the dataset. The result
/// only depends on the dataset and the strategy.
pub fn partition(dataset: &Dataset, strategy: &Strategy) -> Vec<Fragment> {
    let fragments = match strategy {
        Strategy::Range { parts } => by_range(dataset, *parts),

        Strategy::Subject => {
            let mut groups: BTreeMap<&Node, Fragment> = BTreeMap::new();
            for st in dataset {
                groups.entry(&st.subject).or_default().insert(st.clone());
            }
            groups.into_values().collect()
        }

        Strategy::Resource => dataset
            .resources()
            .into_iter()
            .map(|res| {
                dataset
                    .iter()
                    .filter(|st| st.mentions(res))
                    .cloned()
                    .collect()
            })
            .collect(),
    };

    tracing::debug!(
        ?strategy,
        statements = dataset.len(),
        fragments = fragments.len(),
        "dataset partitioned"
    );

    fragments
}

fn by_range(dataset: &Dataset, parts: usize) -> Vec<Fragment> {
    let parts = parts.min(dataset.len());
    if parts == 0 {
        return vec![];
    }

    let base = dataset.len() / parts;
    let extra = dataset.len() % parts;

    let mut iter = dataset.iter();
    (0..parts)
        .map(|idx| {
            let size = base + usize::from(idx < extra);
            iter.by_ref().take(size).cloned().collect()
        })
        .collect()
}
