//! High-level API for the replica library.
//!
//! [`Replica`] wires the adapter, transfer and processor registries together
//! so that a caller only has to describe a job and run it.
//!
//! # Examples
//!
//! ```no_run
//! use libreplica::model::{Artifact, RegistryEndpoint, Resource};
//! use libreplica::transfer::{Options, options};
//! use libreplica::Replica;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let replica = Replica::new();
//!
//!     let src = Resource::new(RegistryEndpoint::new("docker-registry", "https://src.example.com"), "library/redis")
//!         .with_artifact(Artifact::with_tags(["7.2"]));
//!     let dst = Resource::new(RegistryEndpoint::new("docker-registry", "https://dst.example.com"), "mirror/redis")
//!         .with_artifact(Artifact::with_tags(["7.2"]));
//!
//!     let opts = Options::new([options::with_speed(2048)]);
//!     replica.run("mirror-redis", &src, &dst, &opts).await?;
//!     Ok(())
//! }
//! ```

use crate::adapter::AdapterRegistry;
use crate::error::{ReplicaError, Result};
use crate::model::{Artifact, RegistryEndpoint, Resource};
use crate::oci::Manifest;
use crate::processor::{Addition, Processor, ProcessorRegistry, artifact_reference};
use crate::transfer::{Logger, Options, StopSignal, TracingLogger, TransferRegistry};
use std::sync::Arc;

#[cfg(test)]
#[path = "replica_tests.rs"]
mod tests;

/// Runs replication jobs against the registered registries.
///
/// # Examples
///
/// ## Stopping a running job
///
/// ```no_run
/// use libreplica::transfer::StopSignal;
/// use libreplica::Replica;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let replica = Replica::builder()
///     .with_stop_signal(StopSignal::from_token(token.clone()))
///     .build();
///
/// // Elsewhere: ends the job at the next checkpoint, without an error.
/// token.cancel();
/// ```
pub struct Replica {
    adapters: AdapterRegistry,
    transfers: TransferRegistry,
    /// Each job runs on a signal derived from this one.
    stop: StopSignal,
}

impl Replica {
    /// Built-in adapters and transfers, never stopped.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ReplicaBuilder {
        ReplicaBuilder::new()
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Runs one job, logging through `tracing` under the name `job`.
    ///
    /// The transfer is picked by the destination's resource type. A job that
    /// is stopped returns `Ok(())`. Stopping one job does not stop later ones.
    pub async fn run(&self, job: &str, src: &Resource, dst: &Resource, opts: &Options) -> Result<()> {
        self.run_with_logger(Arc::new(TracingLogger::new(job)), src, dst, opts)
            .await
    }

    pub async fn run_with_logger(
        &self,
        logger: Arc<dyn Logger>,
        src: &Resource,
        dst: &Resource,
        opts: &Options,
    ) -> Result<()> {
        let mut transfer = self
            .transfers
            .create(&dst.resource_type, logger, self.stop.for_job())?;
        transfer.transfer(src, dst, opts).await
    }

    /// Resolves the addition `name` of an artifact with the processor
    /// registered for its config media type.
    pub async fn addition(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        artifact: &Artifact,
        name: &str,
    ) -> Result<Addition> {
        let (_, processor) = self.processor_for(endpoint, repository, artifact).await?;
        processor?.resolve_addition(repository, artifact, name).await
    }

    /// Fills `artifact.extra_attrs` from its config. Artifacts no processor
    /// handles are left as they are.
    pub async fn resolve_metadata(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        artifact: &mut Artifact,
    ) -> Result<()> {
        let (manifest, processor) = self.processor_for(endpoint, repository, artifact).await?;
        match processor {
            Ok(processor) => {
                processor
                    .resolve_metadata(repository, &manifest, artifact)
                    .await
            }
            Err(_) => Ok(()),
        }
    }

    /// Pulls the artifact's manifest and picks the processor for its config
    /// media type. The inner error is `BadRequest` when there is none.
    async fn processor_for(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        artifact: &Artifact,
    ) -> Result<(Manifest, Result<Arc<dyn Processor>>)> {
        let client = self.adapters.create(endpoint)?;
        let (manifest, _) = client
            .pull_manifest(repository, artifact_reference(artifact)?)
            .await?;

        let processor = match manifest.config() {
            Some(config) => ProcessorRegistry::builtin(client)
                .get(&config.media_type)
                .ok_or_else(|| {
                    ReplicaError::bad_request(format!(
                        "no processor for the artifact with config media type {}",
                        config.media_type
                    ))
                }),
            None => Err(ReplicaError::bad_request("the artifact has no config")),
        };
        Ok((manifest, processor))
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Replica`].
///
/// Registries left unset fall back to the built-in ones; the transfer
/// registry is built over the adapter registry given here.
pub struct ReplicaBuilder {
    adapters: Option<AdapterRegistry>,
    transfers: Option<TransferRegistry>,
    stop: Option<StopSignal>,
}

impl ReplicaBuilder {
    pub fn new() -> Self {
        Self {
            adapters: None,
            transfers: None,
            stop: None,
        }
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn with_transfers(mut self, transfers: TransferRegistry) -> Self {
        self.transfers = Some(transfers);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> Replica {
        let adapters = self.adapters.unwrap_or_else(AdapterRegistry::builtin);
        let transfers = self
            .transfers
            .unwrap_or_else(|| TransferRegistry::builtin(adapters.clone()));

        Replica {
            adapters,
            transfers,
            stop: self.stop.unwrap_or_else(StopSignal::never),
        }
    }
}

impl Default for ReplicaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
