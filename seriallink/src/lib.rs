//! Session manager for line-oriented serial links.
//!
//! [`LinkManager`] opens a serial port, reads and writes newline-terminated
//! frames, and reopens the port when the caller asks it to. It never retries
//! on its own and never panics on I/O failure: every outcome comes back as a
//! [`Result`](error::Result).
//!
//! ```no_run
//! use seriallink::{LinkConfig, LinkManager, ReadOutcome};
//!
//! # async fn run() -> seriallink::error::Result<()> {
//! let config = LinkConfig::new("/dev/ttyUSB0").with_baud_rate(115200);
//! let mut link = LinkManager::new(config)?;
//!
//! let mut session = link.acquire().await?;
//! session.write_frame("READ\r\n").await?;
//! if let ReadOutcome::Frame(line) = session.read_frame(None).await? {
//!     println!("{}", String::from_utf8_lossy(&line));
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod tracing;
pub mod transport;

pub use config::LinkConfig;
pub use error::{Error, Result};
pub use link::{LinkGuard, LinkManager, LinkState};
pub use transport::{Port, ReadOutcome, SerialTransport, Transport};
