//! Registry adapters.
//!
//! An adapter exposes one remote registry through the [`ArtifactRegistry`]
//! capability set the transfer engine needs. Adapters are built per job from a
//! [`RegistryEndpoint`] by an [`AdapterRegistry`], which maps the endpoint's
//! type tag to a constructor.
//!
//! Every adapter implements every operation. A capability the remote lacks is
//! reported by returning [`ReplicaError::Unsupported`] from that call.

use crate::error::{ReplicaError, Result};
use crate::model::{REGISTRY_TYPE_DOCKER_REGISTRY, RegistryEndpoint};
use crate::oci::{Descriptor, Manifest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub mod native;

#[cfg(test)]
pub(crate) mod memory;


pub use native::NativeAdapter;

/// A readable blob stream. Dropping it closes the underlying source.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// An inclusive byte range of a blob of known total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub blob_size: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// True when this chunk carries the blob's final byte.
    pub fn is_last(&self) -> bool {
        self.end + 1 == self.blob_size
    }
}

/// A chunk the destination accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAccepted {
    /// Upload session to continue from.
    pub location: String,
    /// Last byte the destination has persisted.
    pub accepted_end: i64,
}

/// A chunk push that failed. `accepted_end` is the last byte the destination
/// still holds, `-1` when nothing was persisted.
#[derive(Debug)]
pub struct ChunkRejected {
    pub accepted_end: i64,
    /// Upload session holding the accepted bytes. Empty when there is none.
    pub location: String,
    pub error: ReplicaError,
}

impl fmt::Display for ChunkRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (accepted up to byte {})", self.error, self.accepted_end)
    }
}

/// Operations the transfer engine performs against a registry.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Fetches and parses a manifest, returning it with its digest.
    async fn pull_manifest(&self, repository: &str, reference: &str)
    -> Result<(Manifest, String)>;

    /// Probes for a manifest. The descriptor carries the digest the remote
    /// reports for it.
    async fn manifest_exist(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(bool, Option<Descriptor>)>;

    /// Uploads manifest bytes under `reference`, returning the stored digest.
    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: &[u8],
    ) -> Result<String>;

    /// Removes a manifest by tag or digest. Absence is `NotFound`.
    async fn delete_manifest(&self, repository: &str, reference: &str) -> Result<()>;

    /// Removes a tag but not the manifest it points at. Absence is `NotFound`.
    async fn delete_tag(&self, repository: &str, tag: &str) -> Result<()>;

    async fn blob_exist(&self, repository: &str, digest: &str) -> Result<bool>;

    /// Asks whether the blob is reachable under another repository it could be
    /// mounted from, and which one.
    async fn can_be_mount(&self, digest: &str) -> Result<Option<String>>;

    async fn mount_blob(&self, src_repository: &str, digest: &str, dst_repository: &str)
    -> Result<()>;

    /// Opens a whole blob, returning its reported size (0 when unknown).
    async fn pull_blob(&self, repository: &str, digest: &str) -> Result<(u64, BlobReader)>;

    /// Opens the inclusive byte range `span.start..=span.end` of a blob.
    async fn pull_blob_chunk(
        &self,
        repository: &str,
        digest: &str,
        span: ChunkSpan,
    ) -> Result<(u64, BlobReader)>;

    /// Uploads a whole blob in one request.
    async fn push_blob(
        &self,
        repository: &str,
        digest: &str,
        size: u64,
        blob: BlobReader,
    ) -> Result<()>;

    /// Uploads one chunk. `location` is empty for the first chunk and the
    /// location returned by the previous chunk otherwise. The chunk that ends
    /// the blob also commits it.
    async fn push_blob_chunk(
        &self,
        repository: &str,
        digest: &str,
        span: ChunkSpan,
        chunk: BlobReader,
        location: &str,
    ) -> std::result::Result<ChunkAccepted, ChunkRejected>;
}

type AdapterCtor =
    Arc<dyn Fn(&RegistryEndpoint) -> Result<Arc<dyn ArtifactRegistry>> + Send + Sync>;

/// Maps registry type tags to adapter constructors.
///
/// Built once at startup from an explicit list and read-only afterwards.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    ctors: HashMap<String, AdapterCtor>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapters shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let native: AdapterCtor = Arc::new(|endpoint: &RegistryEndpoint| {
            Ok(Arc::new(NativeAdapter::new(endpoint)?) as Arc<dyn ArtifactRegistry>)
        });
        registry
            .ctors
            .insert(REGISTRY_TYPE_DOCKER_REGISTRY.to_string(), native);
        registry
    }

    /// Registers a constructor for a registry type.
    pub fn register<F>(&mut self, kind: &str, ctor: F) -> Result<()>
    where
        F: Fn(&RegistryEndpoint) -> Result<Arc<dyn ArtifactRegistry>> + Send + Sync + 'static,
    {
        if kind.is_empty() {
            return Err(ReplicaError::registration("empty registry type"));
        }
        if self.ctors.contains_key(kind) {
            return Err(ReplicaError::registration(format!(
                "adapter for registry type {kind} already registered"
            )));
        }
        self.ctors.insert(kind.to_string(), Arc::new(ctor));
        Ok(())
    }

    /// Builds an adapter for the endpoint.
    pub fn create(&self, endpoint: &RegistryEndpoint) -> Result<Arc<dyn ArtifactRegistry>> {
        let ctor = self.ctors.get(&endpoint.kind).ok_or_else(|| {
            ReplicaError::adapter(format!(
                "no adapter registered for registry type {}",
                endpoint.kind
            ))
        })?;
        ctor(endpoint)
    }

    /// Registered type tags, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
