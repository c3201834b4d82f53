// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! A channel that misbehaves on purpose, for exercising the cheating
//! detection of the protocol.

use std::collections::HashSet;

use super::{Channel, ChannelError};
use crate::Bytes;

type Rewrite = Box<dyn FnMut(&Bytes) -> Option<Bytes> + Send>;

/// Screenplay of an [`EvilChannel`]: which outgoing frames to drop and
/// which to rewrite.
pub struct EvilPlay {
    drop_frames: HashSet<usize>,
    rewrites: Vec<Rewrite>,
    seen: usize,
}

impl EvilPlay {
    pub fn new() -> Self {
        Self {
            drop_frames: HashSet::new(),
            rewrites: vec![],
            seen: 0,
        }
    }

    /// Silently drop the outgoing frame with the given zero based index.
    pub fn drop_frame(mut self, index: usize) -> Self {
        self.drop_frames.insert(index);

        self
    }

    /// One-shot rewrite. The first outgoing frame for which `f` returns
    /// `Some` is replaced by the returned frame and `f` is discarded.
    pub fn rewrite<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Bytes) -> Option<Bytes> + Send + 'static,
    {
        self.rewrites.push(Box::new(f));

        self
    }

    fn apply(&mut self, frame: Bytes) -> Option<Bytes> {
        let index = self.seen;
        self.seen += 1;

        if self.drop_frames.contains(&index) {
            return None;
        }

        for i in 0..self.rewrites.len() {
            if let Some(replaced) = (self.rewrites[i])(&frame) {
                drop(self.rewrites.swap_remove(i));
                return Some(replaced);
            }
        }

        Some(frame)
    }
}

impl Default for EvilPlay {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a channel and applies an [`EvilPlay`] to every outgoing frame.
/// Incoming frames are passed through untouched.
pub struct EvilChannel<C> {
    channel: C,
    play: EvilPlay,
}

impl<C: Channel> EvilChannel<C> {
    pub fn new(channel: C, play: EvilPlay) -> Self {
        Self { channel, play }
    }
}

impl<C: Channel> Channel for EvilChannel<C> {
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError> {
        match self.play.apply(message) {
            Some(frame) => self.channel.send(frame),
            None => Ok(()),
        }
    }

    fn recv(&mut self) -> Result<Bytes, ChannelError> {
        self.channel.recv()
    }

    fn bytes_sent(&self) -> u64 {
        self.channel.bytes_sent()
    }

    fn bytes_received(&self) -> u64 {
        self.channel.bytes_received()
    }
}
