// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use super::{Channel, ChannelError};
use crate::Bytes;

#[derive(Default, Clone, Debug)]
pub struct Stats {
    pub send_count: usize,
    pub send_size: usize,
    pub recv_count: usize,
    pub recv_size: usize,
    pub wait_time: Duration,
}

impl Stats {
    pub fn alloc() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Snapshot of shared stats.
    pub fn inner(stats: &Mutex<Self>) -> Self {
        match stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Channel wrapper recording message counts and time spent blocked in
/// `recv` into a shared [`Stats`].
pub struct ChannelStats<C: Channel> {
    channel: C,
    stats: Arc<Mutex<Stats>>,
}

impl<C: Channel> ChannelStats<C> {
    pub fn new(channel: C, stats: Arc<Mutex<Stats>>) -> Self {
        Self { channel, stats }
    }

    pub fn into_inner(self) -> C {
        self.channel
    }
}

impl<C: Channel> Channel for ChannelStats<C> {
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError> {
        let len = message.len();
        self.channel.send(message)?;

        if let Ok(mut stats) = self.stats.lock() {
            stats.send_count += 1;
            stats.send_size += len;
        }

        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes, ChannelError> {
        let start = Instant::now();
        let msg = self.channel.recv();
        let wait_time = start.elapsed();

        if let Ok(mut stats) = self.stats.lock() {
            if let Ok(msg) = &msg {
                stats.recv_size += msg.len();
                stats.recv_count += 1;
            }
            stats.wait_time += wait_time;
        }

        msg
    }

    fn bytes_sent(&self) -> u64 {
        self.channel.bytes_sent()
    }

    fn bytes_received(&self) -> u64 {
        self.channel.bytes_received()
    }
}

impl<C: Channel> Deref for ChannelStats<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}

impl<C: Channel> DerefMut for ChannelStats<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.channel
    }
}
