// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Set encodings over signed labels: a Bloom filter for private set
//! intersection and an exact label to count map for entropy.

use kgv_mate::batch::BatchError;
use thiserror::Error;

mod bloom;
mod counting;
mod psi;

pub use bloom::*;
pub use counting::*;
pub use psi::*;

#[derive(Debug, Error)]
pub enum SetError {
    /// False positive probability outside (0, 1].
    #[error("false positive probability {0} is not in (0, 1]")]
    InvalidRate(f64),

    /// A multiset key has no signed label.
    #[error("multiset key without a signed label")]
    MissingLabel,

    #[error(transparent)]
    Batch(#[from] BatchError),
}
