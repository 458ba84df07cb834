//! Physical transport for serial links.
//!
//! The link manager reaches the device only through the two traits defined
//! here: a [`Transport`] opens a port, and the [`Port`] it returns reads
//! terminated frames, writes bytes and closes. [`SerialTransport`] is the
//! implementation backed by an OS serial device; tests provide their own.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::Duration;

use crate::config::LinkConfig;

pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

pub use serial::{SerialTransport, StreamPort};

/// Result of a read that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One frame. From [`Port::read_until`] it still ends with the
    /// terminator; from the link manager it has been stripped.
    Frame(Bytes),
    /// Nothing complete arrived within the timeout.
    Timeout,
}

impl ReadOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadOutcome::Timeout)
    }

    /// The frame bytes, or None on timeout.
    pub fn into_frame(self) -> Option<Bytes> {
        match self {
            ReadOutcome::Frame(frame) => Some(frame),
            ReadOutcome::Timeout => None,
        }
    }
}

/// Something that can open a port for a [`LinkConfig`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, config: &LinkConfig) -> io::Result<Box<dyn Port>>;
}

/// An open port, exclusively owned by one link.
///
/// Dropping a port releases the underlying handle.
#[async_trait]
pub trait Port: Send {
    /// Wait up to `timeout` for bytes ending in `terminator`.
    ///
    /// Bytes received before a timeout are kept for the next call.
    async fn read_until(&mut self, terminator: u8, timeout: Duration) -> io::Result<ReadOutcome>;

    /// Write all of `data` and flush it.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush and shut the port down. The handle itself is released when the
    /// port is dropped.
    async fn close(&mut self) -> io::Result<()>;
}
