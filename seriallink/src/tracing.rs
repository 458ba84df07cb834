//! Logging for seriallink and the programs that embed it.
//!
//! The link manager only emits events; installing a subscriber is up to the
//! embedding program, which can call [`init_journald_or_stdout`] once at
//! startup. Modules in this crate use `crate::tracing::prelude::*` for the
//! `trace!()` through `error!()` macros.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Install a global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald; otherwise
/// they go to stdout. Returns false if a subscriber was already installed,
/// in which case nothing changes.
pub fn init_journald_or_stdout() -> bool {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry().with(layer).try_init().is_ok(),
            Err(e) => {
                let installed = use_stdout();
                error!(error = %e, "Failed to initialize journald logging, using stdout.");
                installed
            }
        }
    } else {
        use_stdout()
    }
}

// Log to stdout, filtered by RUST_LOG with INFO as the default level.
fn use_stdout() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .try_init()
        .is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

// Timestamps in local time, to the nearest second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{formatted}")
    }
}
