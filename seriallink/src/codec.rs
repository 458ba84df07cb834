//! Line framing for byte streams.
//!
//! [`LineCodec`] splits an incoming byte stream into frames that end with a
//! terminator byte, `\n` unless configured otherwise. Frames are opaque
//! bytes: no UTF-8 decoding happens here, unlike
//! `tokio_util::codec::LinesCodec`. The decoder hands back each frame
//! with its terminator still attached; [`strip_terminator`] removes it.
//!
//! Outgoing data is written verbatim. Callers that want a terminator on the
//! wire include it in the data they send.

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Byte that ends a frame.
pub const TERMINATOR: u8 = b'\n';

#[derive(Debug, Clone)]
pub struct LineCodec {
    terminator: u8,
    max_len: usize,
    // Bytes of the buffer already searched for a terminator.
    scanned: usize,
}

impl LineCodec {
    /// Codec that rejects frames longer than `max_len` bytes, terminator
    /// included.
    pub fn new(max_len: usize) -> Self {
        Self {
            terminator: TERMINATOR,
            max_len,
            scanned: 0,
        }
    }

    /// Change the terminator. Buffered bytes are searched again from the
    /// start.
    pub fn set_terminator(&mut self, terminator: u8) {
        if terminator != self.terminator {
            self.terminator = terminator;
            self.scanned = 0;
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let limit = src.len().min(self.max_len);
        match src[self.scanned..limit].iter().position(|&b| b == self.terminator) {
            Some(offset) => {
                let end = self.scanned + offset + 1;
                self.scanned = 0;
                Ok(Some(src.split_to(end).freeze()))
            }
            None if src.len() >= self.max_len => {
                // Drop the oversized data so the next read starts clean.
                src.clear();
                self.scanned = 0;
                Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame exceeds {} bytes without a terminator", self.max_len),
                ))
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream closed with {} bytes of unterminated frame", src.len()),
            )),
        }
    }
}

impl Encoder<&[u8]> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, data: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(data.len());
        dst.put_slice(data);
        Ok(())
    }
}

/// Remove a trailing `\n` (and a `\r` right before it) from `frame`.
pub fn strip_terminator(mut frame: Bytes) -> Bytes {
    if frame.last() == Some(&TERMINATOR) {
        frame.truncate(frame.len() - 1);
        if frame.last() == Some(&b'\r') {
            frame.truncate(frame.len() - 1);
        }
    }
    frame
}
