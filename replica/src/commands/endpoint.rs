//! Command-line references to job resources.
//!
//! A reference such as `registry.example.com/library/alpine:3.19` names the
//! registry, the repository and one artifact. Connection options for the
//! registry come from per-side flags and environment variables.

use libreplica::model::{Artifact, REGISTRY_TYPE_DOCKER_REGISTRY, RegistryEndpoint, Resource};
use libreplica::{Credentials, Reference, Result};
use std::str::FromStr;

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;

/// Connection options for one side of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideOptions {
    pub plain_http: bool,
    pub insecure: bool,
    pub credentials: Credentials,
}

impl SideOptions {
    pub fn new(
        plain_http: bool,
        insecure: bool,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            plain_http,
            insecure,
            credentials: Credentials::from_parts(username, password),
        }
    }
}

/// The registry endpoint a reference points at.
pub fn endpoint(reference: &Reference, side: &SideOptions) -> RegistryEndpoint {
    RegistryEndpoint::new(
        REGISTRY_TYPE_DOCKER_REGISTRY,
        reference.registry_url(side.plain_http),
    )
    .with_insecure(side.insecure)
    .with_credentials(side.credentials.clone())
}

/// The artifact a reference pins: its digest when it has one, else its tag.
pub fn artifact(reference: &Reference) -> Artifact {
    match reference.digest() {
        Some(digest) => Artifact::with_digest(digest),
        None => Artifact::with_tags([reference.manifest_reference()]),
    }
}

/// Parses `reference` into a single-artifact resource.
pub fn resource(reference: &str, side: &SideOptions) -> Result<Resource> {
    let reference = Reference::from_str(reference)?;
    Ok(Resource::new(endpoint(&reference, side), reference.repository())
        .with_artifact(artifact(&reference)))
}
