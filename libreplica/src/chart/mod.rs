//! Helm chart archives.
//!
//! A chart content layer is a gzipped tar whose top-level directory is named
//! after the chart. Only the files one level below it are of interest here:
//! `Chart.yaml`, `values.yaml`, `README.md` and, for `apiVersion: v1` charts,
//! `requirements.yaml`. Sub-charts under `<chart>/charts/` are ignored.

use crate::error::{ReplicaError, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path};
use tar::{Archive, EntryType};


pub const CHART_FILE: &str = "Chart.yaml";
pub const VALUES_FILE: &str = "values.yaml";
pub const README_FILE: &str = "README.md";
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";

/// Chart schema that keeps its dependencies outside `Chart.yaml`.
pub const API_VERSION_V1: &str = "v1";

/// A dependency record as it appears in `Chart.yaml` and `requirements.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub repository: String,
}

/// The chart metadata. Also the JSON shape of a chart config blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Default, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// A parsed chart archive.
#[derive(Debug, Clone, Default)]
pub struct Chart {
    pub metadata: ChartMetadata,
    /// Raw file contents keyed by upper-cased file name, e.g. `VALUES.YAML`.
    pub files: HashMap<String, Vec<u8>>,
    /// Dependencies listed in `requirements.yaml`, if the archive has one.
    pub requirements: Option<Vec<Dependency>>,
}

impl Chart {
    /// The raw contents of `name`, matched case-insensitively.
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(&name.to_uppercase()).map(Vec::as_slice)
    }

    pub fn is_v1(&self) -> bool {
        self.metadata.api_version == API_VERSION_V1
    }

    /// The archive's own dependency list: `requirements.yaml` for v1 charts,
    /// `Chart.yaml` otherwise.
    pub fn dependencies(&self) -> Vec<Dependency> {
        if self.is_v1() {
            return self.requirements.clone().unwrap_or_default();
        }
        self.metadata.dependencies.clone()
    }
}

/// Returns the file name of `path` when it sits exactly one directory below
/// the archive root.
fn top_level_file(path: &Path) -> Option<String> {
    let parts: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    match parts.as_slice() {
        [_, name] => name.to_str().map(str::to_string),
        _ => None,
    }
}

fn is_tracked(name: &str) -> bool {
    [CHART_FILE, VALUES_FILE, README_FILE, REQUIREMENTS_FILE]
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}

/// Parses a gzipped chart archive. The whole archive is scanned; a later
/// duplicate of a file replaces an earlier one.
pub fn load(archive: &[u8]) -> Result<Chart> {
    let mut archive = Archive::new(GzDecoder::new(archive));
    let mut files = HashMap::new();

    for entry in archive
        .entries()
        .map_err(|e| ReplicaError::validation_with_source("invalid chart archive", e))?
    {
        let mut entry =
            entry.map_err(|e| ReplicaError::validation_with_source("invalid chart archive", e))?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| ReplicaError::validation_with_source("invalid chart archive entry", e))?;
        let Some(name) = top_level_file(&path).filter(|n| is_tracked(n)) else {
            continue;
        };

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| ReplicaError::validation_with_source(format!("failed to read {name}"), e))?;
        files.insert(name.to_uppercase(), contents);
    }

    let chart_yaml = files
        .remove(&CHART_FILE.to_uppercase())
        .ok_or_else(|| ReplicaError::validation("Chart.yaml not found in the chart archive"))?;
    let metadata: ChartMetadata = serde_yaml::from_slice(&chart_yaml)
        .map_err(|e| ReplicaError::validation_with_source("invalid Chart.yaml", e))?;

    let requirements = match files.remove(&REQUIREMENTS_FILE.to_uppercase()) {
        Some(bytes) => {
            let parsed: Requirements = serde_yaml::from_slice(&bytes)
                .map_err(|e| ReplicaError::validation_with_source("invalid requirements.yaml", e))?;
            Some(parsed.dependencies)
        }
        None => None,
    };

    Ok(Chart {
        metadata,
        files,
        requirements,
    })
}
