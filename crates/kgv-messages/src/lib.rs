// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Transport plumbing for the two party valuation protocol.
//!
//! A [`Channel`] moves opaque frames between the Buyer and the Seller and
//! keeps cumulative byte counters. [`envelope`] defines the versioned
//! frame layout used for typed messages on top of it.

pub use bytes::{Bytes, BytesMut};

pub mod channel;
pub mod envelope;

pub use channel::{Channel, ChannelError, ChannelExt};
pub use envelope::{decode, encode, PROTOCOL_VERSION};
