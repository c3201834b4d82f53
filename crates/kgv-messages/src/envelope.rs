// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Frame layout: a big-endian `u16` protocol version followed by the
//! bincode encoding of the message body. The version is checked before
//! the body is touched.

use bytes::BufMut;
use serde::{de::DeserializeOwned, Serialize};

use crate::{channel::ChannelError, Bytes, BytesMut};

/// Version written into every frame.
pub const PROTOCOL_VERSION: u16 = 1;

const HEADER_SIZE: usize = 2;

/// Encode `body` into a versioned frame.
pub fn encode<T: Serialize>(body: &T) -> Result<Bytes, ChannelError> {
    let mut frame = BytesMut::with_capacity(HEADER_SIZE);

    frame.put_u16(PROTOCOL_VERSION);
    bincode::serialize_into((&mut frame).writer(), body)?;

    Ok(frame.freeze())
}

/// Decode a versioned frame.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, ChannelError> {
    if frame.len() < HEADER_SIZE {
        return Err(ChannelError::TruncatedFrame);
    }

    let actual = u16::from_be_bytes([frame[0], frame[1]]);
    if actual != PROTOCOL_VERSION {
        return Err(ChannelError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual,
        });
    }

    Ok(bincode::deserialize(&frame[HEADER_SIZE..])?)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Body {
        Ping(u32),
        Text(String),
    }

    #[test]
    fn frame_starts_with_version() {
        let frame = encode(&Body::Ping(5)).unwrap();
        assert_eq!(&frame[..2], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(decode::<Body>(&frame).unwrap(), Body::Ping(5));
    }

    #[test]
    fn body_follows_header_unchanged() {
        let body = Body::Text("statements".into());
        let frame = encode(&body).unwrap();

        assert_eq!(&frame[HEADER_SIZE..], &bincode::serialize(&body).unwrap()[..]);
    }

    #[test]
    fn foreign_version_is_rejected() {
        let mut frame = encode(&Body::Text("x".into())).unwrap().to_vec();
        frame[1] ^= 0xff;

        assert!(matches!(
            decode::<Body>(&frame),
            Err(ChannelError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn short_frame_is_rejected() {
        assert!(matches!(
            decode::<Body>(&[0]),
            Err(ChannelError::TruncatedFrame)
        ));
    }

    #[test]
    fn garbage_body_is_codec_error() {
        let mut frame = PROTOCOL_VERSION.to_be_bytes().to_vec();
        frame.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff]);

        assert!(matches!(
            decode::<Body>(&frame),
            Err(ChannelError::Codec(_))
        ));
    }
}
