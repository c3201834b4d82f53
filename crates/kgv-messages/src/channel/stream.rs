// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

use std::io::{self, Read, Write};

use super::{Channel, ChannelError};
use crate::{Bytes, BytesMut};

/// Largest frame accepted from the peer.
pub const MAX_FRAME_SIZE: usize = 256 << 20;

/// Channel over any byte stream, typically a `TcpStream`.
///
/// Each frame is a big-endian `u32` length followed by the payload.
pub struct StreamChannel<S> {
    stream: S,
    sent: u64,
    received: u64,
}

impl<S: Read + Write + Send> StreamChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sent: 0,
            received: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write + Send> Channel for StreamChannel<S> {
    fn send(&mut self, message: Bytes) -> Result<(), ChannelError> {
        if message.len() > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge(message.len()));
        }

        self.stream.write_all(&(message.len() as u32).to_be_bytes())?;
        self.stream.write_all(&message)?;
        self.stream.flush()?;
        self.sent += message.len() as u64;

        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes, ChannelError> {
        let mut len = [0u8; 4];
        match self.stream.read_exact(&mut len) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ChannelError::Closed)
            }
            Err(err) => return Err(err.into()),
        }

        let len = u32::from_be_bytes(len) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge(len));
        }

        let mut frame = BytesMut::zeroed(len);
        self.stream.read_exact(&mut frame)?;
        self.received += len as u64;

        Ok(frame.freeze())
    }

    fn bytes_sent(&self) -> u64 {
        self.sent
    }

    fn bytes_received(&self) -> u64 {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{TcpListener, TcpStream},
        thread,
    };

    use super::*;

    #[test]
    fn frames_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut chan = StreamChannel::new(stream);
            let m = chan.recv().unwrap();
            chan.send(Bytes::from(m.iter().rev().copied().collect::<Vec<_>>()))
                .unwrap();
            chan.bytes_received()
        });

        let mut chan = StreamChannel::new(TcpStream::connect(addr).unwrap());
        chan.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        assert_eq!(&chan.recv().unwrap()[..], &[3, 2, 1]);

        assert_eq!(server.join().unwrap(), 3);
        assert_eq!(chan.bytes_sent(), 3);
    }

    #[test]
    fn closed_stream_reports_closed() {
        let empty: &[u8] = &[];
        let mut chan = StreamChannel::new(io::Cursor::new(empty.to_vec()));

        assert!(matches!(chan.recv(), Err(ChannelError::Closed)));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let frame = (u32::MAX).to_be_bytes().to_vec();
        let mut chan = StreamChannel::new(io::Cursor::new(frame));

        assert!(matches!(chan.recv(), Err(ChannelError::FrameTooLarge(_))));
    }
}
