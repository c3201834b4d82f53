// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use num_bigint_dig::BigUint;
use serde::{Deserialize, Serialize};

/// Message 1, Sender to Receiver: one random value per secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtSetupMsg {
    pub x: Vec<BigUint>,
}

impl OtSetupMsg {
    /// Number of secrets on offer.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Message 2, Receiver to Sender: one obscured choice per wanted secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtChoiceMsg {
    pub v: Vec<BigUint>,
}

/// Message 3, Sender to Receiver: a row of n masked secrets per choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtResponseMsg {
    pub rows: Vec<Vec<BigUint>>,
}
