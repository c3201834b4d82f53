// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::io;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{envelope, Bytes};

pub mod adversary;
pub mod pair;
pub mod stats;
pub mod stream;

pub use adversary::{EvilChannel, EvilPlay};
pub use pair::SimplePair;
pub use stats::{ChannelStats, Stats};
pub use stream::StreamChannel;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer hung up.
    #[error("channel closed by peer")]
    Closed,

    #[error("channel i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("frame is shorter than the envelope header")]
    TruncatedFrame,

    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u16, actual: u16 },

    #[error("message codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Blocking, ordered, bidirectional frame transport.
///
/// `recv` blocks until the next frame from the peer is available.
/// Implementations count the payload bytes they move in each direction.
pub trait Channel: Send {
    /// Send one frame to the peer.
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError>;

    /// Receive the next frame from the peer.
    fn recv(&mut self) -> Result<Bytes, ChannelError>;

    /// Total payload bytes sent so far.
    fn bytes_sent(&self) -> u64;

    /// Total payload bytes received so far.
    fn bytes_received(&self) -> u64;
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError> {
        (**self).send(message)
    }

    fn recv(&mut self) -> Result<Bytes, ChannelError> {
        (**self).recv()
    }

    fn bytes_sent(&self) -> u64 {
        (**self).bytes_sent()
    }

    fn bytes_received(&self) -> u64 {
        (**self).bytes_received()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError> {
        (**self).send(message)
    }

    fn recv(&mut self) -> Result<Bytes, ChannelError> {
        (**self).recv()
    }

    fn bytes_sent(&self) -> u64 {
        (**self).bytes_sent()
    }

    fn bytes_received(&self) -> u64 {
        (**self).bytes_received()
    }
}

/// Typed messages over any [`Channel`], framed by [`envelope`].
pub trait ChannelExt: Channel {
    fn send_msg<T: Serialize>(&mut self, msg: &T) -> Result<(), ChannelError> {
        let frame = envelope::encode(msg)?;
        self.send(frame)
    }

    fn recv_msg<T: DeserializeOwned>(&mut self) -> Result<T, ChannelError> {
        let frame = self.recv()?;
        envelope::decode(&frame)
    }
}

impl<C: Channel + ?Sized> ChannelExt for C {}
