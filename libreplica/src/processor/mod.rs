//! Artifact processors, keyed by config media type.
//!
//! A processor knows how to read one kind of artifact: it fills in the
//! artifact's extra attributes from its config and serves named "additions"
//! (derived documents such as a chart's values file).

use crate::adapter::{ArtifactRegistry, BlobReader};
use crate::error::{ReplicaError, Result};
use crate::model::Artifact;
use crate::oci::Manifest;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

pub mod chart;

pub use chart::ChartProcessor;


/// A derived document and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addition {
    pub content: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait Processor: Send + Sync {
    /// Copies what the artifact's config says into `artifact.extra_attrs`.
    async fn resolve_metadata(
        &self,
        repository: &str,
        manifest: &Manifest,
        artifact: &mut Artifact,
    ) -> Result<()>;

    /// Builds the addition called `name`. Names outside
    /// [`addition_types`](Self::addition_types) fail with `BadRequest`.
    async fn resolve_addition(
        &self,
        repository: &str,
        artifact: &Artifact,
        name: &str,
    ) -> Result<Addition>;

    fn addition_types(&self) -> Vec<&'static str>;
}

/// Processors by config media type.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chart processor, reading through `client`.
    pub fn builtin(client: Arc<dyn ArtifactRegistry>) -> Self {
        let mut registry = Self::new();
        registry
            .processors
            .insert(chart::CHART_CONFIG_MEDIA_TYPE.to_string(), Arc::new(ChartProcessor::new(client)));
        registry
    }

    pub fn register(&mut self, media_type: &str, processor: Arc<dyn Processor>) -> Result<()> {
        if media_type.is_empty() {
            return Err(ReplicaError::registration("empty media type"));
        }
        if self.processors.contains_key(media_type) {
            return Err(ReplicaError::registration(format!(
                "processor for media type {media_type} already registered"
            )));
        }
        self.processors.insert(media_type.to_string(), processor);
        Ok(())
    }

    pub fn get(&self, media_type: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(media_type).cloned()
    }

    /// Registered media types, sorted.
    pub fn media_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("media_types", &self.media_types())
            .finish()
    }
}

pub(crate) async fn read_all(mut reader: BlobReader) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;
    Ok(bytes)
}

pub(crate) fn artifact_reference(artifact: &Artifact) -> Result<&str> {
    artifact
        .reference()
        .ok_or_else(|| ReplicaError::validation("the artifact has neither a digest nor a tag"))
}
