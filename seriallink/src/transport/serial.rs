//! Serial device transport.
//!
//! [`SerialTransport`] opens the configured device with `tokio-serial`.
//! The resulting stream, like any other async byte stream, is framed by a
//! [`StreamPort`].

use async_trait::async_trait;
use futures::SinkExt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time;
use tokio_serial::SerialPortBuilderExt;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use super::{Port, ReadOutcome, Transport};
use crate::codec::LineCodec;
use crate::config::LinkConfig;
use crate::tracing::prelude::*;

/// Opens OS serial devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTransport;

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self, config: &LinkConfig) -> io::Result<Box<dyn Port>> {
        let settings = config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        trace!(port = %config.port, ?settings, "Opening serial device.");
        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(config.timeout)
            .open_native_async()?;

        Ok(Box::new(StreamPort::new(
            stream,
            config.max_frame_len,
            config.effective_write_timeout(),
        )))
    }
}

/// A [`Port`] over any async byte stream.
///
/// Writes and the flush on close give up after `write_timeout`, so a device
/// that stops draining (flow control held off, stalled adapter) cannot
/// block the link forever.
pub struct StreamPort<S> {
    framed: Framed<S, LineCodec>,
    write_timeout: Duration,
}

impl<S> StreamPort<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, max_frame_len: usize, write_timeout: Duration) -> Self {
        Self {
            framed: Framed::new(stream, LineCodec::new(max_frame_len)),
            write_timeout,
        }
    }
}

#[async_trait]
impl<S> Port for StreamPort<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_until(&mut self, terminator: u8, timeout: Duration) -> io::Result<ReadOutcome> {
        self.framed.codec_mut().set_terminator(terminator);

        // Framed keeps partial input in its buffer, so giving up on the
        // future at the deadline loses nothing.
        match time::timeout(timeout, self.framed.next()).await {
            Err(_) => Ok(ReadOutcome::Timeout),
            Ok(Some(Ok(frame))) => Ok(ReadOutcome::Frame(frame)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial stream closed",
            )),
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        // send() flushes
        time::timeout(self.write_timeout, self.framed.send(data))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "serial write timeout"))?
    }

    async fn close(&mut self) -> io::Result<()> {
        time::timeout(self.write_timeout, SinkExt::<&[u8]>::close(&mut self.framed))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "serial flush on close timeout"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn reads_frames_from_stream() {
        let (mut device, host) = tokio::io::duplex(64);
        let mut port = StreamPort::new(host, 64, WAIT);

        device.write_all(b"OK\r\nT=21").await.unwrap();

        assert_eq!(
            port.read_until(b'\n', WAIT).await.unwrap(),
            ReadOutcome::Frame("OK\r\n".into())
        );
        assert_eq!(port.read_until(b'\n', WAIT).await.unwrap(), ReadOutcome::Timeout);

        device.write_all(b".5\n").await.unwrap();
        assert_eq!(
            port.read_until(b'\n', WAIT).await.unwrap(),
            ReadOutcome::Frame("T=21.5\n".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_waits_the_full_window() {
        let (_device, host) = tokio::io::duplex(64);
        let mut port = StreamPort::new(host, 64, WAIT);

        let start = time::Instant::now();
        let outcome = port.read_until(b'\n', WAIT).await.unwrap();

        assert!(outcome.is_timeout());
        assert!(start.elapsed() >= WAIT);
    }

    #[tokio::test]
    async fn closed_stream_is_an_error() {
        let (device, host) = tokio::io::duplex(64);
        let mut port = StreamPort::new(host, 64, WAIT);
        drop(device);

        let err = port.read_until(b'\n', WAIT).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn oversized_frame_is_an_error() {
        let (mut device, host) = tokio::io::duplex(64);
        let mut port = StreamPort::new(host, 8, WAIT);

        device.write_all(b"0123456789\n").await.unwrap();

        let err = port.read_until(b'\n', WAIT).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn writes_reach_the_device() {
        let (mut device, host) = tokio::io::duplex(64);
        let mut port = StreamPort::new(host, 64, WAIT);

        port.write(b"AT\r\n").await.unwrap();
        port.close().await.unwrap();

        let mut received = Vec::new();
        device.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"AT\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn write_to_stalled_device_times_out() {
        // The device end stays open but is never read, so the 8-byte pipe
        // fills and the flush cannot finish.
        let (_device, host) = tokio::io::duplex(8);
        let mut port = StreamPort::new(host, 64, WAIT);

        let start = time::Instant::now();
        let err = port.write(&[b'x'; 64]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(start.elapsed() >= WAIT);

        // The unsent bytes are still buffered; closing must not wait on them
        // forever either.
        let err = port.close().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn open_with_bad_option_fails_before_touching_device() {
        let config = LinkConfig::new("/dev/does-not-exist").with_option("parity", "mark");
        let err = SerialTransport.open(&config).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn open_missing_device_fails() {
        let config = LinkConfig::new("/dev/seriallink-test-missing");
        assert!(SerialTransport.open(&config).await.is_err());
    }
}
