//! In-memory registry used by unit tests.
//!
//! Records every call in an operation log and lets a test script failures:
//! rejected chunks, failing monolithic pushes, refused manifests.

use super::{ArtifactRegistry, BlobReader, ChunkAccepted, ChunkRejected, ChunkSpan};
use crate::digest::Digest;
use crate::error::{ReplicaError, Result};
use crate::oci::{Descriptor, Manifest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncReadExt;

type Hook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct State {
    /// (repository, tag or digest) -> (media type, payload)
    manifests: HashMap<(String, String), (String, Vec<u8>)>,
    /// (repository, digest) -> bytes
    blobs: HashMap<(String, String), Vec<u8>>,
    uploads: HashMap<String, Vec<u8>>,
    next_session: usize,
    ops: Vec<String>,
    mount_sources: HashMap<String, String>,
    /// chunk start -> accepted end to report, consumed on use
    chunk_failures: HashMap<u64, i64>,
    blob_push_failures: u32,
    refused_manifests: HashSet<(String, String)>,
    delete_tag_unsupported: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryRegistry {
    state: Arc<Mutex<State>>,
    hook: Option<Hook>,
}

impl MemoryRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, op: String) {
        self.state().ops.push(op.clone());
        if let Some(hook) = &self.hook {
            hook(&op);
        }
    }

    /// Runs `hook` with each operation as it is recorded.
    pub(crate) fn with_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Stores a manifest under `reference` and under its digest.
    pub(crate) fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: &[u8],
    ) -> String {
        let digest = Digest::sha256_of(payload).to_string();
        let mut state = self.state();
        let entry = (media_type.to_string(), payload.to_vec());
        state
            .manifests
            .insert((repository.to_string(), digest.clone()), entry.clone());
        state
            .manifests
            .insert((repository.to_string(), reference.to_string()), entry);
        digest
    }

    /// Stores a blob and returns its digest.
    pub(crate) fn put_blob(&self, repository: &str, bytes: &[u8]) -> String {
        let digest = Digest::sha256_of(bytes).to_string();
        self.state()
            .blobs
            .insert((repository.to_string(), digest.clone()), bytes.to_vec());
        digest
    }

    pub(crate) fn manifest(&self, repository: &str, reference: &str) -> Option<(String, Vec<u8>)> {
        self.state()
            .manifests
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
    }

    pub(crate) fn blob(&self, repository: &str, digest: &str) -> Option<Vec<u8>> {
        self.state()
            .blobs
            .get(&(repository.to_string(), digest.to_string()))
            .cloned()
    }

    pub(crate) fn ops(&self) -> Vec<String> {
        self.state().ops.clone()
    }

    /// Operations whose name is `name`.
    pub(crate) fn ops_named(&self, name: &str) -> Vec<String> {
        let prefix = format!("{name} ");
        self.ops()
            .into_iter()
            .filter(|op| op.starts_with(&prefix))
            .collect()
    }

    /// Makes the next chunk starting at `start` fail after persisting up to
    /// `accepted_end`.
    pub(crate) fn fail_chunk_at(&self, start: u64, accepted_end: i64) {
        self.state().chunk_failures.insert(start, accepted_end);
    }

    /// Makes the next `count` monolithic blob pushes fail.
    pub(crate) fn fail_blob_pushes(&self, count: u32) {
        self.state().blob_push_failures = count;
    }

    pub(crate) fn refuse_manifest(&self, repository: &str, reference: &str) {
        self.state()
            .refused_manifests
            .insert((repository.to_string(), reference.to_string()));
    }

    /// Advertises that `digest` can be mounted from `repository`.
    pub(crate) fn mountable_from(&self, digest: &str, repository: &str) {
        self.state()
            .mount_sources
            .insert(digest.to_string(), repository.to_string());
    }

    pub(crate) fn without_delete_tag(self) -> Self {
        self.state().delete_tag_unsupported = true;
        self
    }

    fn missing_manifest(repository: &str, reference: &str) -> ReplicaError {
        ReplicaError::not_found("manifest", format!("{repository}:{reference}"))
    }

    fn missing_blob(repository: &str, digest: &str) -> ReplicaError {
        ReplicaError::not_found("blob", format!("{repository}@{digest}"))
    }
}

async fn drain(mut reader: BlobReader) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;
    Ok(bytes)
}

#[async_trait]
impl ArtifactRegistry for MemoryRegistry {
    async fn pull_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(Manifest, String)> {
        self.record(format!("pull_manifest {repository}:{reference}"));
        let (media_type, payload) = self
            .manifest(repository, reference)
            .ok_or_else(|| Self::missing_manifest(repository, reference))?;
        let digest = Digest::sha256_of(&payload).to_string();
        Ok((Manifest::from_bytes(Some(&media_type), payload)?, digest))
    }

    async fn manifest_exist(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(bool, Option<Descriptor>)> {
        self.record(format!("manifest_exist {repository}:{reference}"));
        Ok(match self.manifest(repository, reference) {
            Some((media_type, payload)) => {
                let digest = Digest::sha256_of(&payload).to_string();
                let desc = Descriptor::new(media_type, digest, payload.len() as u64);
                (true, Some(desc))
            }
            None => (false, None),
        })
    }

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: &[u8],
    ) -> Result<String> {
        self.record(format!("push_manifest {repository}:{reference}"));
        let refused = self
            .state()
            .refused_manifests
            .contains(&(repository.to_string(), reference.to_string()));
        if refused {
            return Err(ReplicaError::server("manifest refused", 500));
        }
        Ok(self.put_manifest(repository, reference, media_type, payload))
    }

    async fn delete_manifest(&self, repository: &str, reference: &str) -> Result<()> {
        self.record(format!("delete_manifest {repository}:{reference}"));
        let (_, payload) = self
            .manifest(repository, reference)
            .ok_or_else(|| Self::missing_manifest(repository, reference))?;
        // Drops every tag pointing at the same bytes
        self.state()
            .manifests
            .retain(|(repo, _), (_, p)| repo != repository || *p != payload);
        Ok(())
    }

    async fn delete_tag(&self, repository: &str, tag: &str) -> Result<()> {
        self.record(format!("delete_tag {repository}:{tag}"));
        let mut state = self.state();
        if state.delete_tag_unsupported {
            return Err(ReplicaError::unsupported("memory", "DeleteTag"));
        }
        state
            .manifests
            .remove(&(repository.to_string(), tag.to_string()))
            .map(|_| ())
            .ok_or_else(|| Self::missing_manifest(repository, tag))
    }

    async fn blob_exist(&self, repository: &str, digest: &str) -> Result<bool> {
        self.record(format!("blob_exist {repository}@{digest}"));
        Ok(self.blob(repository, digest).is_some())
    }

    async fn can_be_mount(&self, digest: &str) -> Result<Option<String>> {
        self.record(format!("can_be_mount {digest}"));
        Ok(self.state().mount_sources.get(digest).cloned())
    }

    async fn mount_blob(
        &self,
        src_repository: &str,
        digest: &str,
        dst_repository: &str,
    ) -> Result<()> {
        self.record(format!("mount_blob {src_repository}->{dst_repository}@{digest}"));
        let bytes = self
            .blob(src_repository, digest)
            .ok_or_else(|| Self::missing_blob(src_repository, digest))?;
        self.state()
            .blobs
            .insert((dst_repository.to_string(), digest.to_string()), bytes);
        Ok(())
    }

    async fn pull_blob(&self, repository: &str, digest: &str) -> Result<(u64, BlobReader)> {
        self.record(format!("pull_blob {repository}@{digest}"));
        let bytes = self
            .blob(repository, digest)
            .ok_or_else(|| Self::missing_blob(repository, digest))?;
        Ok((bytes.len() as u64, Box::new(std::io::Cursor::new(bytes))))
    }

    async fn pull_blob_chunk(
        &self,
        repository: &str,
        digest: &str,
        span: ChunkSpan,
    ) -> Result<(u64, BlobReader)> {
        self.record(format!(
            "pull_blob_chunk {repository}@{digest} {}-{}",
            span.start, span.end
        ));
        let chunk = {
            let state = self.state();
            let bytes = state
                .blobs
                .get(&(repository.to_string(), digest.to_string()))
                .ok_or_else(|| Self::missing_blob(repository, digest))?;
            let end = (span.end as usize + 1).min(bytes.len());
            bytes
                .get(span.start as usize..end)
                .ok_or_else(|| ReplicaError::bad_request("range out of bounds"))?
                .to_vec()
        };
        Ok((chunk.len() as u64, Box::new(std::io::Cursor::new(chunk))))
    }

    async fn push_blob(
        &self,
        repository: &str,
        digest: &str,
        size: u64,
        blob: BlobReader,
    ) -> Result<()> {
        self.record(format!("push_blob {repository}@{digest}"));
        let bytes = drain(blob).await?;
        let mut state = self.state();
        if state.blob_push_failures > 0 {
            state.blob_push_failures -= 1;
            return Err(ReplicaError::network("connection reset"));
        }
        if bytes.len() as u64 != size || Digest::sha256_of(&bytes).to_string() != digest {
            return Err(ReplicaError::validation("blob content does not match"));
        }
        state
            .blobs
            .insert((repository.to_string(), digest.to_string()), bytes);
        Ok(())
    }

    async fn push_blob_chunk(
        &self,
        repository: &str,
        digest: &str,
        span: ChunkSpan,
        chunk: BlobReader,
        location: &str,
    ) -> std::result::Result<ChunkAccepted, ChunkRejected> {
        self.record(format!(
            "push_blob_chunk {repository}@{digest} {}-{} {location}",
            span.start, span.end
        ));
        let before = span.start as i64 - 1;
        let bytes = drain(chunk).await.map_err(|error| ChunkRejected {
            accepted_end: before,
            location: location.to_string(),
            error,
        })?;

        let mut state = self.state();
        let location = if location.is_empty() {
            state.next_session += 1;
            let session = format!("session-{}", state.next_session);
            state.uploads.insert(session.clone(), Vec::new());
            session
        } else {
            location.to_string()
        };

        let failure = state.chunk_failures.remove(&span.start);
        let Some(upload) = state.uploads.get_mut(&location) else {
            return Err(ChunkRejected {
                accepted_end: -1,
                location: String::new(),
                error: ReplicaError::not_found("upload", location),
            });
        };
        if upload.len() as u64 != span.start {
            return Err(ChunkRejected {
                accepted_end: upload.len() as i64 - 1,
                location,
                error: ReplicaError::bad_request("chunk out of order"),
            });
        }

        if let Some(accepted_end) = failure {
            let keep = (accepted_end - before).clamp(0, bytes.len() as i64) as usize;
            upload.extend_from_slice(&bytes[..keep]);
            return Err(ChunkRejected {
                accepted_end,
                location,
                error: ReplicaError::network("connection reset"),
            });
        }

        upload.extend_from_slice(&bytes);
        if span.is_last() {
            let Some(blob) = state.uploads.remove(&location) else {
                return Err(ChunkRejected {
                    accepted_end: -1,
                    location: String::new(),
                    error: ReplicaError::not_found("upload", location),
                });
            };
            if Digest::sha256_of(&blob).to_string() != digest {
                return Err(ChunkRejected {
                    accepted_end: -1,
                    location: String::new(),
                    error: ReplicaError::validation("blob content does not match"),
                });
            }
            state
                .blobs
                .insert((repository.to_string(), digest.to_string()), blob);
        }

        Ok(ChunkAccepted {
            location,
            accepted_end: span.end as i64,
        })
    }
}
