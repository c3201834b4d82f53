// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Graph statements and the plain computations both parties run on
//! them: statistics, entropy multisets, partitioning and the fragment
//! encoding used for disclosed parts.

use std::io;

use thiserror::Error;

/// Statistics, entropy multisets and Shannon entropy
pub mod analyzer;

/// Fragment codec with a decode marker
pub mod fragment;

mod model;
mod ntriples;

/// Splitting a dataset into fragments
pub mod partition;

pub use model::*;
pub use ntriples::*;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unknown entropy kind {0:?}")]
    UnknownKind(String),
}
