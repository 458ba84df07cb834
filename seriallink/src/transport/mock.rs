//! In-memory transport for tests.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Port, ReadOutcome, Transport};
use crate::config::LinkConfig;

enum Incoming {
    Data(Bytes),
    Error(io::ErrorKind),
}

#[derive(Default)]
struct State {
    open_error: Option<io::ErrorKind>,
    write_error: Option<io::ErrorKind>,
    incoming: VecDeque<Incoming>,
    written: Vec<u8>,
    opens: usize,
    closes: usize,
    live_ports: usize,
    last_config: Option<LinkConfig>,
}

/// Scripted transport. Clones share state, so a test keeps one clone to
/// drive and inspect the port the link manager holds.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Make every following open fail with `kind`.
    pub fn fail_opens(&self, kind: io::ErrorKind) {
        self.state().open_error = Some(kind);
    }

    /// Make every following write fail with `kind`.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.state().write_error = Some(kind);
    }

    /// Clear scripted open and write failures.
    pub fn heal(&self) {
        let mut state = self.state();
        state.open_error = None;
        state.write_error = None;
    }

    /// Queue bytes for the device to "send".
    pub fn push_data(&self, data: impl Into<Bytes>) {
        self.state().incoming.push_back(Incoming::Data(data.into()));
    }

    /// Queue a read failure.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.state().incoming.push_back(Incoming::Error(kind));
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    /// Ports handed out and not yet dropped.
    pub fn live_ports(&self) -> usize {
        self.state().live_ports
    }

    pub fn last_config(&self) -> Option<LinkConfig> {
        self.state().last_config.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, config: &LinkConfig) -> io::Result<Box<dyn Port>> {
        let mut state = self.state();
        state.last_config = Some(config.clone());
        if let Some(kind) = state.open_error {
            return Err(io::Error::new(kind, "mock open failure"));
        }
        state.opens += 1;
        state.live_ports += 1;
        Ok(Box::new(MockPort {
            state: Arc::clone(&self.state),
            buffer: BytesMut::new(),
        }))
    }
}

struct MockPort {
    state: Arc<Mutex<State>>,
    buffer: BytesMut,
}

impl MockPort {
    fn take_frame(&mut self, terminator: u8) -> Option<Bytes> {
        let end = self.buffer.iter().position(|&b| b == terminator)? + 1;
        Some(self.buffer.split_to(end).freeze())
    }
}

#[async_trait]
impl Port for MockPort {
    async fn read_until(&mut self, terminator: u8, timeout: Duration) -> io::Result<ReadOutcome> {
        loop {
            if let Some(frame) = self.take_frame(terminator) {
                return Ok(ReadOutcome::Frame(frame));
            }
            let next = self.state.lock().unwrap().incoming.pop_front();
            match next {
                Some(Incoming::Data(data)) => self.buffer.extend_from_slice(&data),
                Some(Incoming::Error(kind)) => {
                    return Err(io::Error::new(kind, "mock read failure"))
                }
                None => {
                    tokio::time::sleep(timeout).await;
                    return Ok(ReadOutcome::Timeout);
                }
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.write_error {
            return Err(io::Error::new(kind, "mock write failure"));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live_ports -= 1;
        }
    }
}
