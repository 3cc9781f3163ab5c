//! Job input model.
//!
//! A transfer job receives a source and a destination [`Resource`]. Each side
//! names a registry endpoint, a repository and the artifacts to act on. The
//! orchestrator flattens each side into a [`Repository`] (a name plus an ordered
//! list of manifest references) and pairs the two lists by index.

use crate::auth::Credentials;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};


/// Resource type handled by the image transfer.
pub const RESOURCE_TYPE_IMAGE: &str = "image";
/// Generic OCI artifacts share the image transfer.
pub const RESOURCE_TYPE_ARTIFACT: &str = "artifact";

/// Registry type served by the native OCI Distribution adapter.
pub const REGISTRY_TYPE_DOCKER_REGISTRY: &str = "docker-registry";

/// Where a resource lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    /// Adapter type tag, e.g. `docker-registry`.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub credentials: Credentials,
}

impl RegistryEndpoint {
    /// Creates an endpoint for an anonymous, TLS-verified registry.
    pub fn new(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            insecure: false,
            credentials: Credentials::Anonymous,
        }
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// One item of a resource: a digest, its tags, and attributes filled in by
/// artifact processors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_attrs: Map<String, Value>,
}

impl Artifact {
    pub fn with_digest(digest: impl Into<String>) -> Self {
        Self {
            digest: Some(digest.into()),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The digest when there is one, else the first tag.
    pub fn reference(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.tags.first().map(String::as_str))
    }
}

/// A logical unit of work on one side of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Selects the transfer factory, e.g. `image`.
    #[serde(rename = "type")]
    pub resource_type: String,
    pub registry: RegistryEndpoint,
    pub repository: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Fallback references used when no artifact yields one.
    #[serde(default)]
    pub vtags: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_delete_tag: bool,
    /// Replace a differing manifest already present under the same reference.
    #[serde(default, rename = "override")]
    pub override_existing: bool,
}

impl Resource {
    pub fn new(registry: RegistryEndpoint, repository: impl Into<String>) -> Self {
        Self {
            resource_type: RESOURCE_TYPE_IMAGE.to_string(),
            registry,
            repository: repository.into(),
            artifacts: Vec::new(),
            vtags: Vec::new(),
            deleted: false,
            is_delete_tag: false,
            override_existing: false,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_vtags<I, S>(mut self, vtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vtags = vtags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_override(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    /// Marks the resource for deletion; `tag_only` removes tags instead of
    /// manifests.
    pub fn deleting(mut self, tag_only: bool) -> Self {
        self.deleted = true;
        self.is_delete_tag = tag_only;
        self
    }
}

/// A flattened repository: the name plus the manifest references to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub references: Vec<String>,
}

impl From<&Resource> for Repository {
    /// Each artifact contributes its tags, or its digest when it has no tags.
    /// When no artifact contributes anything the resource's vtags are used.
    fn from(resource: &Resource) -> Self {
        let mut references = Vec::new();
        for artifact in &resource.artifacts {
            if !artifact.tags.is_empty() {
                references.extend(artifact.tags.iter().cloned());
                continue;
            }
            if let Some(digest) = artifact.digest.as_deref().filter(|d| !d.is_empty()) {
                references.push(digest.to_string());
            }
        }
        if references.is_empty() {
            references = resource.vtags.clone();
        }

        Self {
            name: resource.repository.clone(),
            references,
        }
    }
}
