//! Replica - OCI Artifact Replication Library
//!
//! Replica copies container images and other OCI artifacts from one registry
//! to another, and deletes them from a destination, as discrete jobs that can
//! be stopped at any point.
//!
//! # Quick Start
//!
//! ```no_run
//! use libreplica::model::{Artifact, RegistryEndpoint, Resource};
//! use libreplica::transfer::Options;
//! use libreplica::Replica;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let src = Resource::new(RegistryEndpoint::new("docker-registry", "https://src.example.com"), "library/alpine")
//!         .with_artifact(Artifact::with_tags(["3.19"]));
//!     let dst = Resource::new(RegistryEndpoint::new("docker-registry", "https://dst.example.com"), "mirror/alpine")
//!         .with_artifact(Artifact::with_tags(["3.19"]));
//!
//!     Replica::new().run("copy-alpine", &src, &dst, &Options::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Manifest-last copies**: content goes first, so a destination never
//!   serves a manifest whose blobs it lacks
//! - **Resumable chunked uploads**: large blobs move in chunks and retries
//!   pick up from the last byte the destination accepted
//! - **Bandwidth limiting**: per-job speed cap in KB/s
//! - **Cooperative stop**: a stopped job ends cleanly at the next checkpoint
//! - **Chart additions**: values, readme and dependencies of Helm charts
//!
//! # Main Types
//!
//! - [`Replica`] - Main entry point for running jobs
//! - [`Resource`] - One side of a job
//! - [`Transfer`] - A per-job copy/delete engine
//! - [`ArtifactRegistry`] - The registry client seam
//! - [`ReplicaError`] - Error type of every operation
//!
//! # Architecture
//!
//! - **High-level API** ([`Replica`]) - Recommended for most users
//! - **Engine** ([`transfer`]) - Orchestrator, blob copiers, factory registry
//! - **Registries** ([`adapter`]) - Adapter trait and the OCI Distribution client
//! - **Supporting modules** - Available for advanced use cases (hidden from docs)

#![warn(clippy::all)]

/// Returns the libreplica crate version.
///
/// # Examples
///
/// ```
/// let version = libreplica::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// High-level public API (main entry point)
mod replica;
pub use replica::{Replica, ReplicaBuilder};

// Re-export commonly used types for convenience
pub use adapter::{AdapterRegistry, ArtifactRegistry};
pub use auth::Credentials;
pub use config::Tunables;
pub use digest::Digest;
pub use error::{ReplicaError, Result};
pub use model::{Artifact, RegistryEndpoint, Resource};
pub use oci::Manifest;
pub use processor::Addition;
pub use reference::Reference;
pub use transfer::{Logger, Options, StopSignal, Transfer, TransferRegistry};

pub mod adapter;
pub mod model;
pub mod transfer;

// Supporting modules (hidden from docs but still public)
#[doc(hidden)]
pub mod auth;
#[doc(hidden)]
pub mod chart;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod digest;
#[doc(hidden)]
pub mod error;
#[doc(hidden)]
pub mod oci;
#[doc(hidden)]
pub mod processor;
#[doc(hidden)]
pub mod ratelimit;
#[doc(hidden)]
pub mod reference;
