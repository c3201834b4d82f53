// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{Channel, ChannelError};
use crate::Bytes;

/// In-process two party channel.
///
/// Both ends are meant to be driven from ordinary threads: `recv` parks
/// the calling thread until the peer sends. It must not be used from
/// inside an async runtime.
pub struct SimplePair {
    out: UnboundedSender<Bytes>,
    inq: UnboundedReceiver<Bytes>,
    sent: u64,
    received: u64,
}

impl SimplePair {
    /// Create a connected pair of channels
    pub fn connect() -> (SimplePair, SimplePair) {
        let (out_tx, out_rx) = unbounded_channel();
        let (in_tx, in_rx) = unbounded_channel();

        let client = SimplePair {
            out: out_tx,
            inq: in_rx,
            sent: 0,
            received: 0,
        };

        let server = SimplePair {
            out: in_tx,
            inq: out_rx,
            sent: 0,
            received: 0,
        };

        (client, server)
    }
}

impl Channel for SimplePair {
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError> {
        let len = message.len() as u64;
        self.out.send(message).map_err(|_| ChannelError::Closed)?;
        self.sent += len;

        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes, ChannelError> {
        let msg = self.inq.blocking_recv().ok_or(ChannelError::Closed)?;
        self.received += msg.len() as u64;

        Ok(msg)
    }

    fn bytes_sent(&self) -> u64 {
        self.sent
    }

    fn bytes_received(&self) -> u64 {
        self.received
    }
}
