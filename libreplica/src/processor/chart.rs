//! Processor for Helm charts stored as OCI artifacts.

use super::{Addition, Processor, artifact_reference, read_all};
use crate::adapter::ArtifactRegistry;
use crate::chart::{self, ChartMetadata, Dependency};
use crate::error::{ReplicaError, Result};
use crate::model::Artifact;
use crate::oci::{Manifest, media_types};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

#[cfg(test)]
#[path = "chart_tests.rs"]
mod tests;

pub const CHART_CONFIG_MEDIA_TYPE: &str = media_types::HELM_CHART_CONFIG;

pub const ADDITION_VALUES: &str = "VALUES.YAML";
pub const ADDITION_README: &str = "README.MD";
pub const ADDITION_DEPENDENCIES: &str = "DEPENDENCIES";

const ARTIFACT_TYPE: &str = "CHART";

pub struct ChartProcessor {
    client: Arc<dyn ArtifactRegistry>,
}

impl ChartProcessor {
    pub fn new(client: Arc<dyn ArtifactRegistry>) -> Self {
        Self { client }
    }

    async fn pull_blob(&self, repository: &str, digest: &str) -> Result<Vec<u8>> {
        let (_, reader) = self.client.pull_blob(repository, digest).await?;
        read_all(reader).await
    }

    /// v1 charts carry their dependencies in the config metadata; the archive's
    /// `requirements.yaml` stands in when the metadata lists none.
    async fn dependencies(
        &self,
        repository: &str,
        manifest: &Manifest,
        parsed: &chart::Chart,
    ) -> Result<Vec<Dependency>> {
        if !parsed.is_v1() {
            return Ok(parsed.dependencies());
        }
        let Some(config) = manifest.config() else {
            return Ok(parsed.dependencies());
        };
        let metadata: ChartMetadata =
            serde_json::from_slice(&self.pull_blob(repository, &config.digest).await?)
                .map_err(|e| ReplicaError::validation_with_source("invalid chart metadata", e))?;
        if metadata.dependencies.is_empty() {
            return Ok(parsed.dependencies());
        }
        Ok(metadata.dependencies)
    }
}

#[async_trait]
impl Processor for ChartProcessor {
    async fn resolve_metadata(
        &self,
        repository: &str,
        manifest: &Manifest,
        artifact: &mut Artifact,
    ) -> Result<()> {
        let config = manifest
            .config()
            .ok_or_else(|| ReplicaError::validation("the chart manifest has no config"))?;
        let attrs: Map<String, Value> =
            serde_json::from_slice(&self.pull_blob(repository, &config.digest).await?)
                .map_err(|e| ReplicaError::validation_with_source("invalid chart metadata", e))?;
        artifact.extra_attrs.extend(attrs);
        Ok(())
    }

    async fn resolve_addition(
        &self,
        repository: &str,
        artifact: &Artifact,
        name: &str,
    ) -> Result<Addition> {
        if !self.addition_types().iter().any(|t| *t == name) {
            return Err(ReplicaError::bad_request(format!(
                "addition {name} isn't supported for {ARTIFACT_TYPE}"
            )));
        }

        let (manifest, _) = self
            .client
            .pull_manifest(repository, artifact_reference(artifact)?)
            .await?;
        let config_digest = manifest.config().map(|c| c.digest).unwrap_or_default();
        let layer = manifest
            .references()
            .into_iter()
            .find(|d| d.digest != config_digest)
            .ok_or_else(|| ReplicaError::validation("the chart manifest has no content layer"))?;
        let parsed = chart::load(&self.pull_blob(repository, &layer.digest).await?)?;

        let (content, content_type) = match name {
            ADDITION_VALUES => (
                parsed.file(chart::VALUES_FILE).unwrap_or_default().to_vec(),
                "text/plain; charset=utf-8",
            ),
            ADDITION_README => (
                parsed.file(chart::README_FILE).unwrap_or_default().to_vec(),
                "text/markdown; charset=utf-8",
            ),
            _ => {
                let deps = self.dependencies(repository, &manifest, &parsed).await?;
                let content = serde_json::to_vec(&deps).map_err(|e| {
                    ReplicaError::validation_with_source("failed to encode dependencies", e)
                })?;
                (content, "application/json; charset=utf-8")
            }
        };

        Ok(Addition {
            content,
            content_type: content_type.to_string(),
        })
    }

    fn addition_types(&self) -> Vec<&'static str> {
        vec![ADDITION_VALUES, ADDITION_README, ADDITION_DEPENDENCIES]
    }
}
