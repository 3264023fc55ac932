//! Package repository lifecycle against the in-memory store

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use packctl_core::{PollSettings, RepositoryRequest};
use packctl_kube::crd::{PackageRepositorySpec, RECONCILE_FAILED, RECONCILE_SUCCEEDED};
use packctl_kube::{
    MockStore, NonCriticalReason, ObjectKey, PackageClient, PackageError, PackageRepository,
};
use serde_json::{Value, json};

const IMAGE: &str = "registry.example.com/packages/standard";

fn fast() -> PollSettings {
    PollSettings::new(Duration::from_millis(5), Duration::from_millis(200))
}

fn controller(condition: &'static str) -> impl Fn(&mut Value) + Send + Sync + 'static {
    move |obj: &mut Value| {
        if obj["kind"] == "PackageRepository" {
            let generation = obj["metadata"]["generation"].clone();
            obj["status"] = json!({
                "observedGeneration": generation,
                "conditions": [{"type": condition, "status": "True"}],
                "usefulErrorMessage": "vendir: Error: Syncing directory",
                "friendlyDescription": "Reconcile failed: Error"
            });
        }
    }
}

fn cluster(condition: &'static str) -> (MockStore, PackageClient<MockStore>) {
    let store = MockStore::new().with_reconciler(controller(condition));
    store
        .insert(&Namespace {
            metadata: ObjectMeta {
                name: Some("ns1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
    (store.clone(), PackageClient::new(store))
}

fn existing_repository(store: &MockStore, name: &str, image: &str) {
    let mut repository = PackageRepository::new(name, PackageRepositorySpec::default());
    repository.metadata.namespace = Some("ns1".to_string());
    repository.set_source(image, None);
    store.insert(&repository).unwrap();
}

fn repo_key(name: &str) -> ObjectKey {
    ObjectKey::namespaced("ns1", name)
}

#[tokio::test]
async fn add_untagged_repository_follows_newest_tag() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    let mut messages = Vec::new();

    let signal = client
        .add_repository_sync(
            RepositoryRequest::new("repo1", "ns1")
                .with_url(IMAGE)
                .with_wait(fast()),
            |m| messages.push(m.to_string()),
        )
        .await
        .unwrap();
    assert!(signal.is_none());

    let repository: PackageRepository = store.object(&repo_key("repo1")).unwrap();
    assert_eq!(repository.image(), Some(IMAGE));
    let constraint = repository
        .spec
        .fetch
        .and_then(|f| f.imgpkg_bundle)
        .and_then(|b| b.tag_selection)
        .and_then(|t| t.semver)
        .map(|s| s.constraints);
    assert_eq!(constraint.as_deref(), Some(">0.0.0"));

    assert!(messages.contains(&"Creating package repository resource".to_string()));
    assert_eq!(
        messages.last().map(String::as_str),
        Some("'PackageRepository' resource successfully reconciled")
    );
}

#[tokio::test]
async fn add_tagged_repository_pins_the_tag() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    let image = format!("{}:1.2.0", IMAGE);

    client
        .add_repository_sync(RepositoryRequest::new("repo1", "ns1").with_url(&image), |_| {})
        .await
        .unwrap();

    let repository: PackageRepository = store.object(&repo_key("repo1")).unwrap();
    let tag_selection = repository
        .spec
        .fetch
        .and_then(|f| f.imgpkg_bundle)
        .and_then(|b| b.tag_selection);
    assert!(tag_selection.is_none());
}

#[tokio::test]
async fn add_rejects_duplicate_url() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    existing_repository(&store, "repo-existing", IMAGE);

    let err = client
        .add_repository_sync(RepositoryRequest::new("repo-new", "ns1").with_url(IMAGE), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, PackageError::RepositoryUrlExists { .. }), "{err:?}");
    assert_eq!(store.operation_counts().creates, 0);
    assert!(!store.contains::<PackageRepository>(&repo_key("repo-new")));
}

#[tokio::test]
async fn add_existing_repository_updates_it() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    existing_repository(&store, "repo1", "registry.example.com/old");

    let signal = client
        .add_repository_sync(RepositoryRequest::new("repo1", "ns1").with_url(IMAGE), |_| {})
        .await
        .unwrap();

    assert_eq!(signal, Some(NonCriticalReason::RepositoryAlreadyExists));
    let repository: PackageRepository = store.object(&repo_key("repo1")).unwrap();
    assert_eq!(repository.image(), Some(IMAGE));
    assert_eq!(store.operation_counts().creates, 0);
    assert_eq!(store.operation_counts().updates, 1);
}

#[tokio::test]
async fn add_requires_url() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);

    let err = client
        .add_repository_sync(RepositoryRequest::new("repo1", "ns1"), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, PackageError::InvalidRequest(_)));
    assert_eq!(store.operation_counts().writes(), 0);
}

#[tokio::test]
async fn add_into_missing_namespace() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);

    let err = client
        .add_repository_sync(RepositoryRequest::new("repo1", "ns2").with_url(IMAGE), |_| {})
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    let mut request = RepositoryRequest::new("repo1", "ns2").with_url(IMAGE);
    request.create_namespace = true;
    client.add_repository_sync(request, |_| {}).await.unwrap();

    assert!(store.contains::<Namespace>(&ObjectKey::cluster("ns2")));
    assert!(store.contains::<PackageRepository>(&ObjectKey::namespaced("ns2", "repo1")));
}

#[tokio::test]
async fn add_reports_reconcile_failure() {
    let (_store, client) = cluster(RECONCILE_FAILED);

    let err = client
        .add_repository_sync(
            RepositoryRequest::new("repo1", "ns1")
                .with_url(IMAGE)
                .with_wait(fast()),
            |_| {},
        )
        .await
        .unwrap_err();

    match err {
        PackageError::ReconcileFailed { message, .. } => {
            assert!(message.contains("vendir: Error: Syncing directory"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn update_missing_repository() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);

    let signal = client
        .update_repository_sync(RepositoryRequest::new("repo1", "ns1").with_url(IMAGE), |_| {})
        .await
        .unwrap();
    assert_eq!(signal, Some(NonCriticalReason::RepositoryDoesNotExist));
    assert_eq!(store.operation_counts().writes(), 0);

    let mut request = RepositoryRequest::new("repo1", "ns1").with_url(IMAGE);
    request.create_repository = true;
    let signal = client.update_repository_sync(request, |_| {}).await.unwrap();

    assert!(signal.is_none());
    assert!(store.contains::<PackageRepository>(&repo_key("repo1")));
}

#[tokio::test]
async fn update_with_same_source_writes_nothing() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    client
        .add_repository_sync(RepositoryRequest::new("repo1", "ns1").with_url(IMAGE), |_| {})
        .await
        .unwrap();
    store.reset_counts();

    client
        .update_repository_sync(RepositoryRequest::new("repo1", "ns1").with_url(IMAGE), |_| {})
        .await
        .unwrap();

    assert_eq!(store.operation_counts().updates, 0);
}

#[tokio::test]
async fn update_keeps_fields_set_by_others() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    existing_repository(&store, "repo1", &format!("{}:1.0.0", IMAGE));
    assert!(store.patch::<PackageRepository>(&repo_key("repo1"), |obj| {
        obj["spec"]["syncPeriod"] = json!("10m");
        obj["spec"]["fetch"]["imgpkgBundle"]["secretRef"] = json!({"name": "regcred"});
    }));

    client
        .update_repository_sync(
            RepositoryRequest::new("repo1", "ns1")
                .with_url(&format!("{}:2.0.0", IMAGE))
                .with_wait(fast()),
            |_| {},
        )
        .await
        .unwrap();

    let repository: PackageRepository = store.object(&repo_key("repo1")).unwrap();
    assert_eq!(repository.image(), Some(format!("{}:2.0.0", IMAGE).as_str()));
    let spec = serde_json::to_value(&repository.spec).unwrap();
    assert_eq!(spec["syncPeriod"], "10m");
    assert_eq!(spec["fetch"]["imgpkgBundle"]["secretRef"]["name"], "regcred");
}

#[tokio::test]
async fn delete_repository() {
    let (store, client) = cluster(RECONCILE_SUCCEEDED);
    existing_repository(&store, "repo1", IMAGE);

    let existed = client
        .delete_repository_sync(RepositoryRequest::new("repo1", "ns1").with_wait(fast()), |_| {})
        .await
        .unwrap();
    assert!(existed);
    assert!(!store.contains::<PackageRepository>(&repo_key("repo1")));

    let existed = client
        .delete_repository_sync(RepositoryRequest::new("repo1", "ns1"), |_| {})
        .await
        .unwrap();
    assert!(!existed);
}
