//! OCI Content Digest validation and manipulation.
//!
//! This module provides a wrapper around the `oci_spec::image::Digest` type
//! to integrate with replica's error handling. The transfer engine uses it to
//! tell digests from tags and to compute manifest digests when a registry
//! omits the `Docker-Content-Digest` header.

use crate::error::{ReplicaError, Result};
use oci_spec::image::Digest as OciDigest;
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::str::FromStr;


/// Represents a content digest, wrapping the `oci_spec::image::Digest` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest(OciDigest);

impl Digest {
    /// Computes the sha256 digest of `bytes`.
    ///
    /// # Examples
    ///
    /// ```
    /// use libreplica::Digest;
    ///
    /// let digest = Digest::sha256_of(b"");
    /// assert_eq!(
    ///     digest.to_string(),
    ///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    /// );
    /// ```
    pub fn sha256_of(bytes: &[u8]) -> Self {
        let hex = format!("{:x}", Sha256::digest(bytes));
        // A lowercase 64-char hex string is always a valid sha256 digest.
        Self(OciDigest::from_str(&format!("sha256:{hex}")).unwrap_or_else(|_| unreachable!()))
    }

    /// Returns the algorithm part (e.g. `sha256`).
    pub fn algorithm(&self) -> String {
        self.0.algorithm().to_string()
    }

    /// Returns the encoded hash part.
    pub fn hex(&self) -> &str {
        self.0.digest()
    }
}

/// Returns true if `reference` parses as a digest rather than a tag.
pub fn is_digest(reference: &str) -> bool {
    reference.contains(':') && Digest::from_str(reference).is_ok()
}

impl FromStr for Digest {
    type Err = ReplicaError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_digest = OciDigest::from_str(s).map_err(|e| {
            ReplicaError::validation_with_source(format!("Invalid digest format: {s}"), e)
        })?;
        Ok(Digest(oci_digest))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
