//! Application context shared by the command handlers
//!
//! Holds the verbosity chosen on the command line and the [`Replica`] every
//! command runs through. Building the context installs the tracing subscriber
//! and routes Ctrl-C into the replica's stop signal.

use libreplica::Replica;
use libreplica::transfer::StopSignal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// How much the binary logs, from `-v` repetitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    Quiet,
    Verbose,
    Debug,
    Trace,
}

impl VerbosityLevel {
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Self::Quiet,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Default filter directive when `RUST_LOG` is unset
    pub fn filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Application context with resolved settings and runtime state
pub struct AppContext {
    pub verbosity: VerbosityLevel,
    pub replica: Replica,
    /// Cancelled on Ctrl-C
    pub token: CancellationToken,
}

impl AppContext {
    /// Installs logging and the Ctrl-C handler, then builds the replica.
    pub fn build(verbosity: VerbosityLevel) -> Self {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(verbosity.filter())),
            )
            .with_writer(std::io::stderr)
            .init();

        let token = CancellationToken::new();
        let on_interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping the job");
                on_interrupt.cancel();
            }
        });

        Self::with_token(verbosity, token)
    }

    /// Builds the context around an existing token, without global setup.
    pub fn with_token(verbosity: VerbosityLevel, token: CancellationToken) -> Self {
        let replica = Replica::builder()
            .with_stop_signal(StopSignal::from_token(token.clone()))
            .build();

        Self {
            verbosity,
            replica,
            token,
        }
    }
}
