use super::*;

fn plain() -> SideOptions {
    SideOptions::new(true, false, None, None)
}

#[test]
fn test_resource_from_tagged_reference() {
    let resource = resource("localhost:5000/library/alpine:3.19", &plain()).unwrap();

    assert_eq!(resource.registry.kind, "docker-registry");
    assert_eq!(resource.registry.url, "http://localhost:5000");
    assert_eq!(resource.repository, "library/alpine");
    assert_eq!(resource.artifacts, vec![Artifact::with_tags(["3.19"])]);
}

#[test]
fn test_resource_from_digest_reference() {
    let digest = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    let reference = format!("registry.example.com/team/app@{digest}");

    let resource = resource(&reference, &SideOptions::new(false, false, None, None)).unwrap();

    assert_eq!(resource.registry.url, "https://registry.example.com");
    assert_eq!(resource.artifacts, vec![Artifact::with_digest(digest)]);
}

#[test]
fn test_untagged_reference_uses_latest() {
    let resource = resource("localhost:5000/app", &plain()).unwrap();

    assert_eq!(resource.artifacts[0].tags, vec!["latest"]);
}

#[test]
fn test_side_options_carry_into_endpoint() {
    let side = SideOptions::new(
        false,
        true,
        Some("robot".to_string()),
        Some("secret".to_string()),
    );

    let resource = resource("registry.example.com/app:1.0", &side).unwrap();

    assert!(resource.registry.insecure);
    assert_eq!(resource.registry.credentials, Credentials::basic("robot", "secret"));
}

#[test]
fn test_username_without_password_is_anonymous() {
    let side = SideOptions::new(false, false, Some("robot".to_string()), None);

    assert_eq!(side.credentials, Credentials::Anonymous);
}

#[test]
fn test_invalid_reference_fails() {
    assert!(resource("Not A Reference!", &plain()).is_err());
}
