//! The replication transfer engine.
//!
//! A [`Transfer`] moves one job's worth of artifacts from a source registry to
//! a destination registry, or deletes artifacts or tags on the destination.
//! Instances are built per job by a factory looked up in a
//! [`TransferRegistry`], which hands each one the job's [`Logger`] and
//! [`StopSignal`].
//!
//! # Examples
//!
//! ```no_run
//! use libreplica::adapter::AdapterRegistry;
//! use libreplica::model::{Artifact, RegistryEndpoint, Resource, RESOURCE_TYPE_IMAGE};
//! use libreplica::transfer::{Options, StopSignal, TracingLogger, TransferRegistry, options};
//! use std::sync::Arc;
//!
//! # async fn run() -> libreplica::Result<()> {
//! let transfers = TransferRegistry::builtin(AdapterRegistry::builtin());
//! let src = Resource::new(RegistryEndpoint::new("docker-registry", "https://src.example.com"), "library/app")
//!     .with_artifact(Artifact::with_tags(["1.0"]));
//! let dst = Resource::new(RegistryEndpoint::new("docker-registry", "https://dst.example.com"), "mirror/app")
//!     .with_artifact(Artifact::with_tags(["1.0"]));
//!
//! let mut transfer = transfers.create(
//!     RESOURCE_TYPE_IMAGE,
//!     Arc::new(TracingLogger::new("job-1")),
//!     StopSignal::never(),
//! )?;
//! let opts = Options::new([options::with_copy_by_chunk(true)]);
//! transfer.transfer(&src, &dst, &opts).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ReplicaError, Result};
use crate::model::Resource;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod blob;
pub mod factory;
pub mod image;
pub mod options;

#[cfg(test)]
pub(crate) mod recording;


pub use blob::{BlobCopier, ChunkCursor};
pub use factory::{TransferFactory, TransferRegistry};
pub use image::ImageTransfer;
pub use options::Options;

/// Moves the content described by `src` to `dst`, or deletes what `dst`
/// describes when it is flagged as deleted.
#[async_trait]
pub trait Transfer: Send {
    async fn transfer(&mut self, src: &Resource, dst: &Resource, opts: &Options) -> Result<()>;
}

/// Job-scoped log sink. Messages arrive fully formatted.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards job logs to `tracing`, tagged with the job identifier.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    job: String,
}

impl TracingLogger {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(job = %self.job, "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(job = %self.job, "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(job = %self.job, "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(job = %self.job, "{message}");
    }
}

/// How often a pending network call re-polls the stop callback.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation for one job.
///
/// Wraps the host's stop callback. The first `true` it returns latches into a
/// [`CancellationToken`], which interrupts rate-limit delays and retry
/// backoff without waiting for the next poll.
#[derive(Clone)]
pub struct StopSignal {
    poll: Arc<dyn Fn() -> bool + Send + Sync>,
    token: CancellationToken,
}

impl StopSignal {
    /// Builds a signal from a callback that answers whether the job should stop.
    /// It is called often and must be cheap.
    pub fn new<F>(poll: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            poll: Arc::new(poll),
            token: CancellationToken::new(),
        }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::new(|| false)
    }

    /// A signal driven by an existing token, such as one cancelled on Ctrl-C.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            poll: Arc::new(|| false),
            token,
        }
    }

    /// A signal scoped to one job. It polls the same callback and fires when
    /// this signal's token is cancelled, but latching it leaves this signal
    /// and every other job untouched.
    pub fn for_job(&self) -> Self {
        Self {
            poll: self.poll.clone(),
            token: self.token.child_token(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if (self.poll)() {
            self.token.cancel();
            return true;
        }
        false
    }

    /// Fails with [`ReplicaError::Stopped`] once the job should stop.
    pub fn check(&self) -> Result<()> {
        if self.is_stopped() {
            Err(ReplicaError::Stopped)
        } else {
            Ok(())
        }
    }

    /// A token cancelled when the signal fires.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once the job should stop.
    pub async fn stopped(&self) {
        loop {
            if self.is_stopped() {
                return;
            }
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(STOP_POLL_INTERVAL) => {}
            }
        }
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
