// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Every batch gets its own worker pool sized to twice the hardware
//! parallelism. Items carry an id; results are gathered into a map
//! keyed by that id, so completion order never leaks into the output.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use rayon::{prelude::*, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;

/// Number of completed items between two progress log lines.
pub const PROGRESS_STEP: usize = 10_000;

#[derive(Debug, Error)]
pub enum BatchError {
    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] ThreadPoolBuildError),

    /// Two items of one batch share an id.
    #[error("duplicate element id {0} in batch")]
    DuplicateId(u64),
}

/// Worker count used for every batch.
pub fn pool_size() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

/// Run `f` over every `(id, item)` on a fresh pool and collect the
/// results by id.
///
/// The call blocks until every item has been processed. The first
/// error returned by `f` fails the whole batch.
pub fn run_batch<T, R, E, F>(
    name: &str,
    items: &[(u64, T)],
    f: F,
) -> Result<BTreeMap<u64, R>, E>
where
    T: Sync,
    R: Send,
    E: From<BatchError> + Send,
    F: Fn(u64, &T) -> Result<R, E> + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(pool_size())
        .thread_name(|idx| format!("kgv-batch-{idx}"))
        .build()
        .map_err(BatchError::from)?;

    let total = items.len();
    let done = AtomicUsize::new(0);

    tracing::debug!(
        batch = name,
        total,
        threads = pool.current_num_threads(),
        "batch started"
    );

    let results = pool.install(|| {
        items
            .par_iter()
            .map(|(id, item)| {
                let out = f(*id, item)?;

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % PROGRESS_STEP == 0 {
                    tracing::info!(batch = name, done = n, total, "progress");
                }

                Ok((*id, out))
            })
            .collect::<Result<Vec<_>, E>>()
    })?;

    drop(pool);

    let mut gathered = BTreeMap::new();
    for (id, out) in results {
        if gathered.insert(id, out).is_some() {
            return Err(BatchError::DuplicateId(id).into());
        }
    }

    tracing::debug!(batch = name, total, "batch finished");

    Ok(gathered)
}
