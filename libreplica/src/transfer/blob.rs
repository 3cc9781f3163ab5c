//! Blob copying between two registries.
//!
//! Blobs go across in one request or, when the job asks for it and the blob is
//! larger than the configured chunk size, in fixed-size chunks whose progress
//! is kept in a [`ChunkCursor`] so that a retry resumes where the destination
//! left off.

use crate::adapter::{ArtifactRegistry, BlobReader, ChunkSpan};
use crate::config::Tunables;
use crate::error::{ReplicaError, Result};
use crate::oci::Descriptor;
use crate::ratelimit::RateLimitedReader;
use crate::transfer::{Logger, Options, StopSignal};
use humansize::{BINARY, format_size};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "blob_tests.rs"]
mod tests;

/// Delay before the first retry. Doubles on every further attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Progress of a chunked upload. `start` and `end` are inclusive and the
/// destination holds bytes `0..=end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCursor {
    pub start: i64,
    pub end: i64,
    /// Upload session to continue, empty before the first chunk.
    pub location: String,
}

impl Default for ChunkCursor {
    fn default() -> Self {
        Self {
            start: -1,
            end: -1,
            location: String::new(),
        }
    }
}

impl ChunkCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Copies blobs from `src` to `dst` for one job.
#[derive(Clone)]
pub struct BlobCopier {
    src: Arc<dyn ArtifactRegistry>,
    dst: Arc<dyn ArtifactRegistry>,
    tunables: Tunables,
    logger: Arc<dyn Logger>,
    stop: StopSignal,
}

impl BlobCopier {
    pub fn new(
        src: Arc<dyn ArtifactRegistry>,
        dst: Arc<dyn ArtifactRegistry>,
        tunables: Tunables,
        logger: Arc<dyn Logger>,
        stop: StopSignal,
    ) -> Self {
        Self {
            src,
            dst,
            tunables,
            logger,
            stop,
        }
    }

    /// Copies the blob `desc` points at, retrying with backoff.
    pub async fn copy_with_retry(
        &self,
        src_repo: &str,
        dst_repo: &str,
        desc: &Descriptor,
        opts: &Options,
    ) -> Result<()> {
        let mut cursor = ChunkCursor::new();
        self.copy_with_cursor(src_repo, dst_repo, desc, opts, &mut cursor)
            .await
    }

    /// Like [`copy_with_retry`](Self::copy_with_retry), resuming a chunked
    /// upload from `cursor` and leaving it at the last accepted byte.
    pub async fn copy_with_cursor(
        &self,
        src_repo: &str,
        dst_repo: &str,
        desc: &Descriptor,
        opts: &Options,
        cursor: &mut ChunkCursor,
    ) -> Result<()> {
        let digest = desc.digest.as_str();
        let attempts = if opts.copy_by_chunk {
            self.tunables.chunk_retry_count
        } else {
            self.tunables.blob_retry_count
        };
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 1..=attempts {
            self.stop.check()?;
            self.logger.info(&format!(
                "copying the blob {digest}(the {attempt}th running)..."
            ));

            let copy = async {
                if opts.copy_by_chunk {
                    self.copy_blob_by_chunk(src_repo, dst_repo, digest, desc.size, opts.speed, cursor)
                        .await
                } else {
                    self.copy_blob(src_repo, dst_repo, digest, desc.size, opts.speed)
                        .await
                }
            };
            let result = tokio::select! {
                result = copy => result,
                _ = self.stop.stopped() => Err(ReplicaError::Stopped),
            };

            let err = match result {
                Ok(()) => {
                    self.logger.info(&format!("copy the blob {digest} completed"));
                    return Ok(());
                }
                Err(e) => e,
            };
            if err.is_stopped() || attempt == attempts {
                return Err(err);
            }

            self.logger.warning(&format!(
                "attempt {attempt} to copy the blob {digest} failed: {err}"
            ));
            self.logger
                .info(&format!("will retry {}s later", backoff.as_secs()));
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.stop.stopped() => return Err(ReplicaError::Stopped),
            }
            backoff *= 2;
        }

        // Tunables are clamped to at least one attempt
        Err(ReplicaError::config("no attempt was made to copy the blob"))
    }

    /// Skips blobs the destination already has or can mount.
    async fn reuse_existing(&self, dst_repo: &str, digest: &str) -> Result<bool> {
        let exist = self.dst.blob_exist(dst_repo, digest).await.inspect_err(|e| {
            self.logger.error(&format!(
                "failed to check the existence of blob {digest} on the destination registry: {e}"
            ))
        })?;
        if exist {
            self.logger.info(&format!(
                "the blob {digest} already exists on the destination registry, skip"
            ));
            return Ok(true);
        }

        let mount_from = self.dst.can_be_mount(digest).await.inspect_err(|e| {
            self.logger.error(&format!(
                "failed to check whether the blob {digest} can be mounted on the destination registry: {e}"
            ))
        })?;
        let Some(repository) = mount_from else {
            return Ok(false);
        };

        self.dst
            .mount_blob(&repository, digest, dst_repo)
            .await
            .inspect_err(|e| {
                self.logger.error(&format!(
                    "failed to mount the blob {digest} on the destination registry: {e}"
                ))
            })?;
        self.logger.info(&format!(
            "the blob {digest} mounted from the repository {repository} on the destination registry directly"
        ));
        Ok(true)
    }

    fn limit(&self, reader: BlobReader, speed: u32) -> BlobReader {
        if speed == 0 {
            return reader;
        }
        Box::new(RateLimitedReader::new(reader, speed).with_cancellation(self.stop.token()))
    }

    /// Copies a blob in a single request. `size` comes from the manifest and
    /// stands in when the source reports none.
    pub async fn copy_blob(
        &self,
        src_repo: &str,
        dst_repo: &str,
        digest: &str,
        size: u64,
        speed: u32,
    ) -> Result<()> {
        if self.reuse_existing(dst_repo, digest).await? {
            return Ok(());
        }

        let (pulled_size, data) = self.src.pull_blob(src_repo, digest).await.inspect_err(|e| {
            self.logger
                .error(&format!("failed to pulling the blob {digest}: {e}"))
        })?;
        let data = self.limit(data, speed);

        let size = if pulled_size == 0 {
            self.logger.debug(&format!(
                "the blob size from remote registry is 0, use size {size} from manifests instead"
            ));
            size
        } else {
            pulled_size
        };
        self.logger.debug(&format!(
            "the blob size is {size} bytes ({})",
            format_size(size, BINARY)
        ));

        // The reader is consumed and dropped by the push on every path
        self.dst
            .push_blob(dst_repo, digest, size, data)
            .await
            .inspect_err(|e| {
                self.logger.error(&format!(
                    "failed to pushing the blob {digest}, size {size}: {e}"
                ))
            })
    }

    /// Copies a blob chunk by chunk, starting after `cursor.end`. Blobs no
    /// larger than one chunk go across in a single request.
    pub async fn copy_blob_by_chunk(
        &self,
        src_repo: &str,
        dst_repo: &str,
        digest: &str,
        size: u64,
        speed: u32,
        cursor: &mut ChunkCursor,
    ) -> Result<()> {
        if self.reuse_existing(dst_repo, digest).await? {
            return Ok(());
        }

        let chunk_size = self.tunables.chunk_size;
        if size <= chunk_size {
            return self.copy_blob(src_repo, dst_repo, digest, size, speed).await;
        }

        let end_range = size as i64 - 1;
        loop {
            self.stop.check()?;
            cursor.start = cursor.end + 1;
            let end = (cursor.start + chunk_size as i64 - 1).min(end_range);
            let span = ChunkSpan {
                blob_size: size,
                start: cursor.start as u64,
                end: end as u64,
            };
            self.logger.info(&format!(
                "copying the blob chunk: {}-{}/{size}",
                span.start, span.end
            ));

            let (_, data) = self
                .src
                .pull_blob_chunk(src_repo, digest, span)
                .await
                .inspect_err(|e| {
                    self.logger
                        .error(&format!("failed to pulling the blob chunk {digest}: {e}"))
                })?;
            let data = self.limit(data, speed);

            match self
                .dst
                .push_blob_chunk(dst_repo, digest, span, data, &cursor.location)
                .await
            {
                Ok(accepted) => {
                    cursor.end = end;
                    cursor.location = accepted.location;
                }
                Err(rejected) => {
                    self.logger.error(&format!(
                        "failed to pushing the blob {digest}, size {}: {}",
                        span.len(),
                        rejected.error
                    ));
                    cursor.end = rejected.accepted_end;
                    if rejected.accepted_end < 0 {
                        // Nothing survived, the next attempt opens a new session
                        cursor.location.clear();
                    } else {
                        cursor.location = rejected.location;
                    }
                    return Err(rejected.error);
                }
            }

            self.logger.info(&format!(
                "copy the blob chunk: {}-{}/{size} completed",
                span.start, span.end
            ));
            if cursor.end == end_range {
                return Ok(());
            }
        }
    }
}
