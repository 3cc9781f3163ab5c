use libreplica::model::{RESOURCE_TYPE_ARTIFACT, RESOURCE_TYPE_IMAGE};
use libreplica::transfer::options::{with_copy_by_chunk, with_speed};
use libreplica::{
    AdapterRegistry, Artifact, Credentials, Options, RegistryEndpoint, Replica, ReplicaError,
    Resource, StopSignal, TransferRegistry, Tunables,
};

#[test]
fn test_replica_builder_new() {
    let _replica = Replica::builder().build();
    // Registries are private, so this only checks the builder chain resolves.
}

#[test]
fn test_replica_builder_with_registries() {
    let adapters = AdapterRegistry::builtin();
    let transfers = TransferRegistry::builtin(adapters.clone());

    let replica = Replica::builder()
        .with_adapters(adapters)
        .with_transfers(transfers)
        .with_stop_signal(StopSignal::never())
        .build();

    assert_eq!(replica.adapters().kinds(), vec!["docker-registry"]);
}

#[test]
fn test_builtin_transfers_cover_images_and_artifacts() {
    let transfers = TransferRegistry::builtin(AdapterRegistry::builtin());

    assert_eq!(
        transfers.names(),
        vec![RESOURCE_TYPE_ARTIFACT, RESOURCE_TYPE_IMAGE]
    );
}

#[test]
fn test_options_from_mutators() {
    let opts = Options::new([with_speed(512), with_copy_by_chunk(true)]);

    assert_eq!(opts.speed, 512);
    assert!(opts.copy_by_chunk);
}

#[test]
fn test_resource_builders() {
    let endpoint = RegistryEndpoint::new("docker-registry", "https://registry.example.com")
        .with_insecure(true)
        .with_credentials(Credentials::basic("user", "pass"));
    let resource = Resource::new(endpoint, "library/alpine")
        .with_artifact(Artifact::with_tags(["3.19"]))
        .with_override(true);

    assert!(resource.registry.insecure);
    assert!(resource.override_existing);
    assert_eq!(resource.resource_type, RESOURCE_TYPE_IMAGE);
}

#[test]
fn test_default_tunables() {
    let tunables = Tunables::default();

    assert_eq!(tunables.blob_retry_count, 5);
    assert_eq!(tunables.chunk_retry_count, 5);
    assert_eq!(tunables.chunk_size, 10 * 1024 * 1024);
}

#[tokio::test]
async fn test_unknown_registry_type_fails_the_job() {
    let src = Resource::new(RegistryEndpoint::new("harbor", "https://src.example.com"), "a")
        .with_artifact(Artifact::with_tags(["1"]));
    let dst = Resource::new(RegistryEndpoint::new("harbor", "https://dst.example.com"), "b")
        .with_artifact(Artifact::with_tags(["1"]));

    let result = Replica::new()
        .run("public-api", &src, &dst, &Options::default())
        .await;

    assert!(matches!(result, Err(ReplicaError::Adapter { .. })));
}

#[test]
fn test_version() {
    assert!(!libreplica::version().is_empty());
}
