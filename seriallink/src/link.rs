//! Serial link session management.
//!
//! A [`LinkManager`] owns one port and walks it through its lifecycle:
//!
//! ```text
//!  Disconnected --open ok-------> Connected
//!  Disconnected --open failure--> Failed
//!  Connected ----close----------> Disconnected
//!  Connected ----I/O failure----> Failed
//!  Failed -------reconnect------> Connected | Failed
//!  Failed -------close----------> Disconnected
//! ```
//!
//! The manager never retries on its own. After a failure every read and
//! write reports [`Error::NotConnected`] until the caller reconnects, so
//! retry policy stays with the caller.
//!
//! All operations take `&mut self`. A link shared between tasks must be
//! wrapped in a mutex by whoever shares it.

use bytes::Bytes;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use strum::Display;
use tokio::time;

use crate::codec::{strip_terminator, TERMINATOR};
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use crate::transport::{Port, ReadOutcome, SerialTransport, Transport};

/// Observable state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connected,
    Failed,
}

// Each state carries exactly the port it may hold.
enum Connection {
    Disconnected,
    Connected(Box<dyn Port>),
    /// The port is kept, if there was one, until close or reconnect.
    Failed(Option<Box<dyn Port>>),
}

impl Connection {
    fn state(&self) -> LinkState {
        match self {
            Connection::Disconnected => LinkState::Disconnected,
            Connection::Connected(_) => LinkState::Connected,
            Connection::Failed(_) => LinkState::Failed,
        }
    }
}

/// Manages the lifecycle of one serial link.
pub struct LinkManager<T = SerialTransport> {
    config: LinkConfig,
    transport: T,
    conn: Connection,
}

impl LinkManager<SerialTransport> {
    /// Manager for an OS serial device. Nothing is opened yet.
    pub fn new(config: LinkConfig) -> Result<Self> {
        Self::with_transport(config, SerialTransport)
    }
}

impl<T: Transport> LinkManager<T> {
    /// Manager that opens ports through `transport`.
    pub fn with_transport(config: LinkConfig, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            conn: Connection::Disconnected,
        })
    }

    /// Open the port and wait for the device to settle.
    ///
    /// Any handle still held from an earlier connection is released first.
    /// On failure the link is left Failed.
    pub async fn open(&mut self) -> Result<()> {
        if !matches!(self.conn, Connection::Disconnected) {
            debug!(port = %self.config.port, state = %self.state(), "Releasing port before open.");
            self.close().await;
        }

        let port = match self.transport.open(&self.config).await {
            Ok(port) => port,
            Err(e) => {
                error!(port = %self.config.port, error = %e, "Failed to open serial port.");
                self.conn = Connection::Failed(None);
                return Err(Error::open(e));
            }
        };

        // If this future is dropped during the settle delay, the port is
        // dropped with it and the link stays Disconnected.
        time::sleep(self.config.settle_delay).await;
        self.conn = Connection::Connected(port);

        info!(
            port = %self.config.port,
            baud_rate = self.config.baud_rate,
            "Connected."
        );
        Ok(())
    }

    /// Close the port. Closing a link that holds no port does nothing.
    pub async fn close(&mut self) {
        match mem::replace(&mut self.conn, Connection::Disconnected) {
            Connection::Connected(mut port) | Connection::Failed(Some(mut port)) => {
                // A flush that fails or times out still ends with the port
                // dropped, which releases the handle.
                if let Err(e) = port.close().await {
                    warn!(port = %self.config.port, error = %e, "Error while closing serial port.");
                }
                info!(port = %self.config.port, "Serial connection closed.");
            }
            Connection::Failed(None) | Connection::Disconnected => {}
        }
    }

    /// Close, wait the backoff delay, then open again.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!(
            port = %self.config.port,
            state = %self.state(),
            backoff = ?self.config.backoff_delay,
            "Reconnecting."
        );
        self.close().await;
        time::sleep(self.config.backoff_delay).await;
        self.open().await
    }

    /// Read one frame, without its terminator.
    ///
    /// Waits up to `max_wait`, or the configured timeout when `None`. Running
    /// out of time is [`ReadOutcome::Timeout`], not an error, and leaves the
    /// link connected.
    pub async fn read_frame(&mut self, max_wait: impl Into<Option<Duration>>) -> Result<ReadOutcome> {
        let wait = max_wait.into().unwrap_or(self.config.timeout);
        let Connection::Connected(port) = &mut self.conn else {
            warn!(port = %self.config.port, state = %self.state(), "Read attempted on closed connection.");
            return Err(Error::NotConnected);
        };

        match port.read_until(TERMINATOR, wait).await {
            Ok(ReadOutcome::Frame(frame)) => {
                let frame = strip_terminator(frame);
                debug!(port = %self.config.port, ?frame, "Received.");
                Ok(ReadOutcome::Frame(frame))
            }
            Ok(ReadOutcome::Timeout) => {
                trace!(port = %self.config.port, ?wait, "No frame within timeout.");
                Ok(ReadOutcome::Timeout)
            }
            Err(e) => {
                error!(port = %self.config.port, error = %e, "Read error.");
                self.fail();
                Err(Error::read(e))
            }
        }
    }

    /// Write `data` to the port as is.
    ///
    /// Takes raw bytes or text; text goes out UTF-8 encoded, so a `&str` and
    /// its `as_bytes()` put the same bytes on the wire. No terminator is
    /// appended.
    pub async fn write_frame(&mut self, data: impl AsRef<[u8]>) -> Result<()> {
        let data = data.as_ref();
        let Connection::Connected(port) = &mut self.conn else {
            warn!(port = %self.config.port, state = %self.state(), "Write attempted on closed connection.");
            return Err(Error::NotConnected);
        };

        match port.write(data).await {
            Ok(()) => {
                debug!(port = %self.config.port, data = ?Bytes::copy_from_slice(data), "Sent.");
                Ok(())
            }
            Err(e) => {
                error!(port = %self.config.port, error = %e, "Write error.");
                self.fail();
                Err(Error::write(e))
            }
        }
    }

    /// Open the link for the lifetime of the returned guard.
    ///
    /// The link is closed when the guard is dropped, whichever way the
    /// enclosing scope is left.
    pub async fn acquire(&mut self) -> Result<LinkGuard<'_, T>> {
        self.open().await?;
        Ok(LinkGuard { link: self })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    // Connected -> Failed, keeping the port for close/reconnect to release.
    fn fail(&mut self) {
        self.conn = match mem::replace(&mut self.conn, Connection::Disconnected) {
            Connection::Connected(port) => Connection::Failed(Some(port)),
            other => other,
        };
    }
}

impl<T> LinkManager<T> {
    pub fn state(&self) -> LinkState {
        self.conn.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    // Drop the port without the async close. The OS handle goes with it.
    fn release_now(&mut self) {
        match mem::replace(&mut self.conn, Connection::Disconnected) {
            Connection::Connected(_) | Connection::Failed(Some(_)) => {
                debug!(port = %self.config.port, "Serial port released.");
            }
            Connection::Failed(None) | Connection::Disconnected => {}
        }
    }
}

impl<T> Drop for LinkManager<T> {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// An open link that closes itself when dropped.
///
/// Dereferences to the [`LinkManager`], so every link operation is available
/// through the guard.
pub struct LinkGuard<'a, T> {
    link: &'a mut LinkManager<T>,
}

impl<T: Transport> LinkGuard<'_, T> {
    /// Close the link now, flushing the port, and end the scope.
    pub async fn close(self) {
        self.link.close().await;
    }
}

impl<T> Deref for LinkGuard<'_, T> {
    type Target = LinkManager<T>;

    fn deref(&self) -> &Self::Target {
        self.link
    }
}

impl<T> DerefMut for LinkGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.link
    }
}

impl<T> Drop for LinkGuard<'_, T> {
    fn drop(&mut self) {
        self.link.release_now();
    }
}
