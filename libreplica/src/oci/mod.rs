//! OCI and Docker manifest model.
//!
//! A [`Manifest`] keeps the exact bytes and media type it was pulled with, so it
//! can be pushed to another registry unchanged, plus a parsed [`ManifestKind`]
//! used to enumerate the content it references. Every referenced descriptor
//! falls into one [`ContentCategory`], which decides how the transfer engine
//! handles it.

pub use oci_spec::image::{ImageIndex, ImageManifest};

use crate::digest::Digest;
use crate::error::{ReplicaError, Result};
use serde::Deserialize;
use std::collections::HashMap;


pub mod media_types {
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    pub const OCI_LAYER_PREFIX: &str = "application/vnd.oci.image.layer.v1.tar";

    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_SCHEMA1_SIGNED: &str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const DOCKER_SCHEMA1: &str = "application/vnd.docker.distribution.manifest.v1+json";
    pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
    pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub const DOCKER_FOREIGN_LAYER: &str =
        "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
    pub const DOCKER_SCHEMA1_LAYER: &str =
        "application/vnd.docker.container.image.rootfs.diff+x-gtar";

    pub const OCTET_STREAM: &str = "application/octet-stream";

    pub const HELM_CHART_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    pub const HELM_CHART_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";

    /// Every manifest media type a registry may answer with.
    pub const MANIFEST_ACCEPT: [&str; 6] = [
        OCI_INDEX,
        OCI_MANIFEST,
        DOCKER_MANIFEST_LIST,
        DOCKER_MANIFEST,
        DOCKER_SCHEMA1_SIGNED,
        DOCKER_SCHEMA1,
    ];
}

use media_types::*;

/// How the transfer engine treats a referenced descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    /// A nested manifest or index: copied recursively by digest.
    Manifest,
    /// Bytes delivered out-of-band: never copied.
    ForeignLayer,
    /// A layer or config blob.
    Blob,
    /// A media type nobody registered. Copied as a blob.
    Unknown,
}

/// Classifies a descriptor media type.
///
/// # Examples
///
/// ```
/// use libreplica::oci::{ContentCategory, classify, media_types};
///
/// assert_eq!(classify(media_types::OCI_INDEX), ContentCategory::Manifest);
/// assert_eq!(classify("application/vnd.example.thing"), ContentCategory::Unknown);
/// ```
pub fn classify(media_type: &str) -> ContentCategory {
    match media_type {
        OCI_INDEX | DOCKER_MANIFEST_LIST | OCI_MANIFEST | DOCKER_MANIFEST
        | DOCKER_SCHEMA1_SIGNED | DOCKER_SCHEMA1 => ContentCategory::Manifest,
        DOCKER_FOREIGN_LAYER => ContentCategory::ForeignLayer,
        OCTET_STREAM | DOCKER_SCHEMA1_LAYER | DOCKER_LAYER | DOCKER_CONFIG | OCI_CONFIG
        | HELM_CHART_CONFIG | HELM_CHART_CONTENT => ContentCategory::Blob,
        m if m.starts_with(OCI_LAYER_PREFIX) => ContentCategory::Blob,
        _ => ContentCategory::Unknown,
    }
}

/// A media-type-tagged pointer to content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    pub annotations: HashMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            annotations: HashMap::new(),
        }
    }

    pub fn category(&self) -> ContentCategory {
        classify(&self.media_type)
    }
}

impl From<&oci_spec::image::Descriptor> for Descriptor {
    fn from(desc: &oci_spec::image::Descriptor) -> Self {
        Self {
            media_type: desc.media_type().to_string(),
            digest: desc.digest().to_string(),
            size: desc.size() as u64,
            annotations: desc.annotations().clone().unwrap_or_default(),
        }
    }
}

/// Docker image manifest, schema version 1. Only the layer list matters here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema1Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    pub fs_layers: Vec<FsLayer>,
    #[serde(default)]
    pub signatures: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: String,
}

/// The parsed shape of a manifest.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ManifestKind {
    /// A single image or artifact: config plus layers
    Image(ImageManifest),
    /// A multi-platform index or manifest list
    Index(ImageIndex),
    /// A legacy Docker schema1 manifest
    Schema1(Schema1Manifest),
}

/// A pulled manifest: original bytes, media type and parsed form.
#[derive(Debug, Clone)]
pub struct Manifest {
    media_type: String,
    payload: Vec<u8>,
    kind: ManifestKind,
}

impl Manifest {
    /// Parses manifest bytes, detecting their kind.
    ///
    /// `media_type` is the `Content-Type` the registry answered with, if any.
    /// Detection tries the declared type, then the payload's own `mediaType`
    /// field, then the document structure.
    pub fn from_bytes(media_type: Option<&str>, payload: Vec<u8>) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(&payload).map_err(|e| {
            ReplicaError::validation_with_source("Failed to parse manifest JSON", e)
        })?;

        let declared = media_type
            .map(strip_parameters)
            .filter(|m| classify(m) == ContentCategory::Manifest);
        let embedded = value
            .get("mediaType")
            .and_then(|v| v.as_str())
            .filter(|m| classify(m) == ContentCategory::Manifest);

        let kind = match declared.or(embedded) {
            Some(OCI_INDEX | DOCKER_MANIFEST_LIST) => Self::parse_index(&payload)?,
            Some(DOCKER_SCHEMA1 | DOCKER_SCHEMA1_SIGNED) => Self::parse_schema1(&payload)?,
            Some(_) => Self::parse_image(&payload)?,
            None => {
                // No usable mediaType, infer from structure
                if value.get("schemaVersion").and_then(|v| v.as_u64()) == Some(1) {
                    Self::parse_schema1(&payload)?
                } else if value.get("manifests").is_some() {
                    Self::parse_index(&payload)?
                } else if value.get("layers").is_some() || value.get("config").is_some() {
                    Self::parse_image(&payload)?
                } else {
                    return Err(ReplicaError::validation(
                        "Unable to determine the kind of the manifest",
                    ));
                }
            }
        };

        let media_type = match declared.or(embedded) {
            Some(m) => m.to_string(),
            None => match &kind {
                ManifestKind::Image(_) => OCI_MANIFEST.to_string(),
                ManifestKind::Index(_) => OCI_INDEX.to_string(),
                ManifestKind::Schema1(m) if m.signatures.is_some() => {
                    DOCKER_SCHEMA1_SIGNED.to_string()
                }
                ManifestKind::Schema1(_) => DOCKER_SCHEMA1.to_string(),
            },
        };

        Ok(Self {
            media_type,
            payload,
            kind,
        })
    }

    fn parse_image(payload: &[u8]) -> Result<ManifestKind> {
        serde_json::from_slice(payload)
            .map(ManifestKind::Image)
            .map_err(|e| ReplicaError::validation_with_source("Failed to parse image manifest", e))
    }

    fn parse_index(payload: &[u8]) -> Result<ManifestKind> {
        serde_json::from_slice(payload)
            .map(ManifestKind::Index)
            .map_err(|e| ReplicaError::validation_with_source("Failed to parse image index", e))
    }

    fn parse_schema1(payload: &[u8]) -> Result<ManifestKind> {
        serde_json::from_slice(payload)
            .map(ManifestKind::Schema1)
            .map_err(|e| {
                ReplicaError::validation_with_source("Failed to parse schema1 manifest", e)
            })
    }

    /// The media type to push the payload with.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The exact bytes the manifest was pulled as.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> &ManifestKind {
        &self.kind
    }

    /// The sha256 digest of the payload.
    pub fn digest(&self) -> Digest {
        Digest::sha256_of(&self.payload)
    }

    /// The config descriptor, for image manifests.
    pub fn config(&self) -> Option<Descriptor> {
        match &self.kind {
            ManifestKind::Image(m) => Some(Descriptor::from(m.config())),
            _ => None,
        }
    }

    /// Everything this manifest points at: config then layers for an image,
    /// child manifests for an index, unique layers for schema1.
    pub fn references(&self) -> Vec<Descriptor> {
        match &self.kind {
            ManifestKind::Image(m) => std::iter::once(m.config())
                .chain(m.layers().iter())
                .map(Descriptor::from)
                .collect(),
            ManifestKind::Index(i) => i.manifests().iter().map(Descriptor::from).collect(),
            ManifestKind::Schema1(m) => {
                let mut seen = std::collections::HashSet::new();
                m.fs_layers
                    .iter()
                    .filter(|l| seen.insert(l.blob_sum.as_str()))
                    .map(|l| Descriptor::new(DOCKER_SCHEMA1_LAYER, l.blob_sum.clone(), 0))
                    .collect()
            }
        }
    }
}

/// Drops `; charset=...` style parameters from a Content-Type value.
pub fn strip_parameters(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}
