//! Transfer of images and other OCI artifacts.
//!
//! Copies every reference of the source resource to the paired reference of
//! the destination. For each artifact the referenced content goes first and
//! the manifest last, so the destination never publishes a manifest whose
//! content it does not hold. Nested manifests of an index are copied the same
//! way, by digest.

use crate::adapter::{AdapterRegistry, ArtifactRegistry};
use crate::config::Tunables;
use crate::error::{ReplicaError, Result};
use crate::model::{Repository, Resource};
use crate::oci::{ContentCategory, Descriptor, Manifest};
use crate::transfer::{BlobCopier, Logger, Options, StopSignal, Transfer};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;

/// Transfer for the `image` and `artifact` resource types.
pub struct ImageTransfer {
    adapters: AdapterRegistry,
    tunables: Tunables,
    logger: Arc<dyn Logger>,
    stop: StopSignal,
}

impl ImageTransfer {
    /// Uses the process-wide [`Tunables`].
    pub fn new(adapters: AdapterRegistry, logger: Arc<dyn Logger>, stop: StopSignal) -> Self {
        Self {
            adapters,
            tunables: Tunables::global(),
            logger,
            stop,
        }
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    fn create_client(&self, resource: &Resource, side: &str) -> Result<Arc<dyn ArtifactRegistry>> {
        let registry = &resource.registry;
        let client = self.adapters.create(registry).inspect_err(|e| {
            self.logger
                .error(&format!("failed to create client for {side} registry: {e}"))
        })?;
        self.logger.info(&format!(
            "client for {side} registry [type: {}, URL: {}, insecure: {}] created",
            registry.kind, registry.url, registry.insecure
        ));
        Ok(client)
    }

    fn initialize(&self, src: &Resource, dst: &Resource) -> Result<Job> {
        let src_client = self.create_client(src, "source")?;
        let dst_client = self.create_client(dst, "destination")?;
        let blobs = BlobCopier::new(
            src_client.clone(),
            dst_client.clone(),
            self.tunables,
            self.logger.clone(),
            self.stop.clone(),
        );

        Ok(Job {
            src: src_client,
            dst: dst_client,
            blobs,
            logger: self.logger.clone(),
            stop: self.stop.clone(),
        })
    }
}

#[async_trait]
impl Transfer for ImageTransfer {
    async fn transfer(&mut self, src: &Resource, dst: &Resource, opts: &Options) -> Result<()> {
        let job = self.initialize(src, dst)?;

        if dst.deleted {
            if dst.is_delete_tag {
                return job.delete_tags(dst).await;
            }
            return job.delete(&Repository::from(dst)).await;
        }

        job.copy(
            &Repository::from(src),
            &Repository::from(dst),
            dst.override_existing,
            opts,
        )
        .await
    }
}

/// The clients and policy of one running job.
struct Job {
    src: Arc<dyn ArtifactRegistry>,
    dst: Arc<dyn ArtifactRegistry>,
    blobs: BlobCopier,
    logger: Arc<dyn Logger>,
    stop: StopSignal,
}

impl Job {
    fn should_stop(&self) -> bool {
        let stopped = self.stop.is_stopped();
        if stopped {
            self.logger.info("the job is stopped");
        }
        stopped
    }

    async fn copy(
        &self,
        src: &Repository,
        dst: &Repository,
        override_existing: bool,
        opts: &Options,
    ) -> Result<()> {
        let src_refs = src.references.join(",");
        let dst_refs = dst.references.join(",");
        if src.references.len() != dst.references.len() {
            let err = ReplicaError::validation(format!(
                "the source references [{src_refs}] and destination references [{dst_refs}] cannot be paired"
            ));
            self.logger.error(&err.to_string());
            return Err(err);
        }

        self.logger.info(&format!(
            "copying {}:[{src_refs}](source registry) to {}:[{dst_refs}](destination registry)...",
            src.name, dst.name
        ));
        if opts.speed > 0 {
            self.logger
                .info(&format!("limit network speed at {} kb/s", opts.speed));
        }

        let mut failed = 0;
        for (src_ref, dst_ref) in src.references.iter().zip(&dst.references) {
            match self
                .copy_artifact(&src.name, src_ref, &dst.name, dst_ref, override_existing, opts)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_stopped() => return Ok(()),
                Err(e) => {
                    self.logger.error(&e.to_string());
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            let err = ReplicaError::TransferFailed { failed };
            self.logger.error(&err.to_string());
            return Err(err);
        }

        self.logger.info(&format!(
            "copy {}:[{src_refs}](source registry) to {}:[{dst_refs}](destination registry) completed",
            src.name, dst.name
        ));
        Ok(())
    }

    fn copy_artifact<'a>(
        &'a self,
        src_repo: &'a str,
        src_ref: &'a str,
        dst_repo: &'a str,
        dst_ref: &'a str,
        override_existing: bool,
        opts: &'a Options,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.logger.info(&format!(
                "copying {src_repo}:{src_ref}(source registry) to {dst_repo}:{dst_ref}(destination registry)..."
            ));

            let (manifest, digest) = self.pull_manifest(src_repo, src_ref).await?;

            if let Some(dst_digest) = self.exist(dst_repo, dst_ref).await? {
                if dst_digest == digest {
                    self.logger.info(&format!(
                        "the artifact {dst_repo}:{dst_ref} already exists on the destination registry, skip"
                    ));
                    return Ok(());
                }
                if !override_existing {
                    self.logger.warning(&format!(
                        "the same name artifact {dst_repo}:{dst_ref} exists on the destination registry, but the \"override\" is set to false, skip"
                    ));
                    return Ok(());
                }
                self.logger.warning(&format!(
                    "the same name artifact {dst_repo}:{dst_ref} exists on the destination registry and the \"override\" is set to true, continue..."
                ));
            }

            for content in manifest.references() {
                self.copy_content(&content, src_repo, dst_repo, opts).await?;
            }

            self.push_manifest(&manifest, dst_repo, dst_ref).await?;

            self.logger.info(&format!(
                "copy {src_repo}:{src_ref}(source registry) to {dst_repo}:{dst_ref}(destination registry) completed"
            ));
            Ok(())
        })
    }

    async fn copy_content(
        &self,
        content: &Descriptor,
        src_repo: &str,
        dst_repo: &str,
        opts: &Options,
    ) -> Result<()> {
        let digest = content.digest.as_str();
        match content.category() {
            // Content addressed, so overriding is always safe
            ContentCategory::Manifest => {
                self.copy_artifact(src_repo, digest, dst_repo, digest, true, opts)
                    .await
            }
            ContentCategory::ForeignLayer => {
                self.logger
                    .info(&format!("the layer {digest} is a foreign layer, skip"));
                Ok(())
            }
            ContentCategory::Blob | ContentCategory::Unknown => {
                self.blobs
                    .copy_with_retry(src_repo, dst_repo, content, opts)
                    .await
            }
        }
    }

    async fn pull_manifest(&self, repository: &str, reference: &str) -> Result<(Manifest, String)> {
        if self.should_stop() {
            return Err(ReplicaError::Stopped);
        }
        self.logger.info(&format!(
            "pulling the manifest of artifact {repository}:{reference} ..."
        ));
        let pulled = self
            .src
            .pull_manifest(repository, reference)
            .await
            .inspect_err(|e| {
                self.logger.error(&format!(
                    "failed to pull the manifest of artifact {repository}:{reference}: {e}"
                ))
            })?;
        self.logger.info(&format!(
            "the manifest of artifact {repository}:{reference} pulled"
        ));
        Ok(pulled)
    }

    /// The digest of the destination manifest, if there is one.
    async fn exist(&self, repository: &str, reference: &str) -> Result<Option<String>> {
        let (exist, desc) = self
            .dst
            .manifest_exist(repository, reference)
            .await
            .inspect_err(|e| {
                self.logger.error(&format!(
                    "failed to check the existence of the manifest of artifact {repository}:{reference} on the destination registry: {e}"
                ))
            })?;
        if !exist {
            return Ok(None);
        }
        Ok(Some(desc.map(|d| d.digest).unwrap_or_default()))
    }

    async fn push_manifest(&self, manifest: &Manifest, repository: &str, reference: &str) -> Result<()> {
        if self.should_stop() {
            return Err(ReplicaError::Stopped);
        }
        self.logger.info(&format!(
            "pushing the manifest of artifact {repository}:{reference} ..."
        ));
        self.dst
            .push_manifest(repository, reference, manifest.media_type(), manifest.payload())
            .await
            .inspect_err(|e| {
                self.logger.error(&format!(
                    "failed to push manifest of artifact {repository}:{reference}: {e}"
                ))
            })?;
        self.logger.info(&format!(
            "the manifest of artifact {repository}:{reference} pushed"
        ));
        Ok(())
    }

    async fn delete(&self, repository: &Repository) -> Result<()> {
        let name = repository.name.as_str();
        for reference in &repository.references {
            if self.should_stop() {
                return Ok(());
            }

            if self.exist(name, reference).await?.is_none() {
                self.logger.info(&format!(
                    "the artifact {name}:{reference} doesn't exist on the destination registry, skip"
                ));
                continue;
            }

            match self.dst.delete_manifest(name, reference).await {
                Ok(()) => self.logger.info(&format!(
                    "the manifest of artifact {name}:{reference} is deleted"
                )),
                Err(e) if e.is_not_found() => self.logger.info(&format!(
                    "the artifact {name}:{reference} doesn't exist on the destination registry, skip"
                )),
                Err(e) => {
                    self.logger.error(&format!(
                        "failed to delete the manifest of artifact {name}:{reference} on the destination registry: {e}"
                    ));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn delete_tags(&self, resource: &Resource) -> Result<()> {
        let name = resource.repository.as_str();
        for tag in resource.artifacts.iter().flat_map(|a| &a.tags) {
            if self.should_stop() {
                return Ok(());
            }

            match self.dst.delete_tag(name, tag).await {
                Ok(()) => self.logger.info(&format!("the tag {name}:{tag} is deleted")),
                Err(e) if e.is_not_found() => self.logger.info(&format!(
                    "the tag {name}:{tag} doesn't exist on the destination registry, skip"
                )),
                Err(e) => {
                    self.logger.error(&format!(
                        "failed to delete the tag {name}:{tag} on the destination registry: {e}"
                    ));
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
