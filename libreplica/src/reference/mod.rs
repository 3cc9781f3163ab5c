//! OCI Image Reference parsing.
//!
//! This module provides a wrapper around the `oci_spec::distribution::Reference`
//! type so callers can turn `host/repo:tag` strings into the registry URL,
//! repository name and manifest reference a transfer job needs.

use crate::error::{ReplicaError, Result};
use oci_spec::distribution::Reference as OciReference;
use std::fmt;
use std::str::FromStr;


/// Represents an OCI image reference, wrapping `oci_spec::distribution::Reference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference(OciReference);

impl FromStr for Reference {
    type Err = ReplicaError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_reference = OciReference::from_str(s).map_err(|e| {
            ReplicaError::validation_with_source(format!("Invalid image reference: {s}"), e)
        })?;
        Ok(Reference(oci_reference))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Reference {
    /// Returns the registry part of the reference.
    pub fn registry(&self) -> &str {
        self.0.registry()
    }

    /// Returns the repository part of the reference.
    pub fn repository(&self) -> &str {
        self.0.repository()
    }

    /// Returns the tag part of the reference, if present.
    pub fn tag(&self) -> Option<&str> {
        self.0.tag()
    }

    /// Returns the digest part of the reference, if present.
    pub fn digest(&self) -> Option<&str> {
        self.0.digest()
    }

    /// Returns the manifest reference to address: the digest when pinned,
    /// otherwise the tag, otherwise `latest`.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::Reference;
    /// use std::str::FromStr;
    ///
    /// let reference = Reference::from_str("localhost:5000/library/alpine:3.19").unwrap();
    /// assert_eq!(reference.manifest_reference(), "3.19");
    /// ```
    pub fn manifest_reference(&self) -> &str {
        self.digest().or(self.tag()).unwrap_or("latest")
    }

    /// Returns the registry base URL using the given scheme.
    pub fn registry_url(&self, plain_http: bool) -> String {
        let scheme = if plain_http { "http" } else { "https" };
        format!("{}://{}", scheme, self.registry())
    }
}
