// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! The Sender holds n secrets below the modulus of its RSA key. The
//! Receiver obtains k of them of its own choosing; the Sender does not
//! learn which, and the Receiver learns nothing about the others.
//!
//! ```text
//! Sender                                Receiver
//!   x_1..x_n random       OtSetupMsg  ->
//!                        <- OtChoiceMsg   v_i = x_{b_i} + k_i^e
//!   m_j + (v_i - x_j)^d  OtResponseMsg ->
//!                                         m_{b_i} = m'_{i,b_i} - k_i
//! ```

mod messages;
mod receiver;
mod sender;

pub use messages::*;
pub use receiver::*;
pub use sender::*;

use kgv_blind_sig::BlindError;
use kgv_mate::batch::BatchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OtError {
    /// The Sender has nothing to transfer.
    #[error("no secrets to transfer")]
    NoSecrets,

    /// The Receiver asked for zero secrets.
    #[error("zero secrets requested")]
    NoChoices,

    /// A secret is not reduced modulo N.
    #[error("secret {0} is not below the modulus")]
    SecretOutOfRange(usize),

    /// More choices than agreed. Fatal for the session.
    #[error("receiver requested {requested} secrets, {agreed} were agreed")]
    PolicyViolation { requested: usize, agreed: usize },

    #[error("choice index {0} out of range")]
    ChoiceOutOfRange(usize),

    #[error("choice index {0} given twice")]
    DuplicateChoice(usize),

    #[error("choice value is not below the modulus")]
    MalformedChoice,

    #[error("response matrix does not match the choices")]
    MalformedResponse,

    #[error(transparent)]
    Key(#[from] BlindError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}
