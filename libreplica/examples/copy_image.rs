//! Copies one image between two registries.
//!
//! Run with: cargo run --example copy_image -- <SRC_URL> <SRC_REPO:TAG> <DST_URL> <DST_REPO:TAG>
//!
//! For example, against two local registries:
//!
//!   cargo run --example copy_image -- http://localhost:5000 library/alpine:3.19 \
//!       http://localhost:5001 mirror/alpine:3.19

use libreplica::model::{Artifact, REGISTRY_TYPE_DOCKER_REGISTRY, RegistryEndpoint, Resource};
use libreplica::transfer::Options;
use libreplica::transfer::options::with_copy_by_chunk;
use libreplica::Replica;

fn resource(url: &str, reference: &str) -> Result<Resource, Box<dyn std::error::Error>> {
    let (repository, tag) = reference
        .rsplit_once(':')
        .ok_or("expected <repository>:<tag>")?;
    Ok(
        Resource::new(RegistryEndpoint::new(REGISTRY_TYPE_DOCKER_REGISTRY, url), repository)
            .with_artifact(Artifact::with_tags([tag])),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [src_url, src_ref, dst_url, dst_ref] = args.as_slice() else {
        eprintln!("usage: copy_image <SRC_URL> <SRC_REPO:TAG> <DST_URL> <DST_REPO:TAG>");
        std::process::exit(2);
    };

    let src = resource(src_url, src_ref)?;
    let dst = resource(dst_url, dst_ref)?;

    println!("Copying {src_url}/{src_ref} to {dst_url}/{dst_ref}...");
    let opts = Options::new([with_copy_by_chunk(true)]);
    match Replica::new().run("copy-image", &src, &dst, &opts).await {
        Ok(()) => println!("✓ Copy completed"),
        Err(e) => {
            eprintln!("✗ Copy failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
