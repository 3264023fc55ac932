//! Registry credential secrets
//!
//! Credentials are stored as `kubernetes.io/dockerconfigjson` secrets. A secret
//! can be exported to every namespace with a `SecretExport` of the same name,
//! so package installs anywhere can pull from the registry.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use packctl_core::RegistrySecretRequest;

use crate::client::PackageClient;
use crate::crd::{SecretExport, SecretExportSpec};
use crate::dependents::create_or_update;
use crate::error::{PackageError, Result};
use crate::store::{ObjectKey, ResourceStore};

pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Render the `.dockerconfigjson` payload for one registry
pub fn docker_config_json(server: &str, username: &str, password: &str) -> Result<Vec<u8>> {
    let auth = STANDARD.encode(format!("{}:{}", username, password));
    let config = serde_json::json!({
        "auths": {
            server: {
                "username": username,
                "password": password,
                "auth": auth,
            }
        }
    });
    Ok(serde_json::to_vec(&config)?)
}

fn validate(request: &RegistrySecretRequest) -> Result<()> {
    let missing = [
        ("name", &request.name),
        ("namespace", &request.namespace),
        ("server", &request.server),
        ("username", &request.username),
    ]
    .into_iter()
    .find(|(_, v)| v.trim().is_empty());

    match missing {
        Some((field, _)) => Err(PackageError::InvalidRequest(format!(
            "registry secret {} is required",
            field
        ))),
        None => Ok(()),
    }
}

pub fn registry_secret(request: &RegistrySecretRequest) -> Result<Secret> {
    let payload = docker_config_json(&request.server, &request.username, &request.password)?;
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(request.name.clone()),
            namespace: Some(request.namespace.clone()),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_JSON_KEY.to_string(),
            ByteString(payload),
        )])),
        ..Default::default()
    })
}

pub fn secret_export(name: &str, namespace: &str) -> SecretExport {
    let mut export = SecretExport::new(
        name,
        SecretExportSpec {
            to_namespaces: vec!["*".to_string()],
        },
    );
    export.metadata.namespace = Some(namespace.to_string());
    export
}

impl<S: ResourceStore + 'static> PackageClient<S> {
    /// Create a registry secret, replacing one with the same name
    pub async fn add_registry_secret(&self, request: &RegistrySecretRequest) -> Result<()> {
        validate(request)?;
        tracing::info!(name = %request.name, namespace = %request.namespace, "adding registry secret");

        create_or_update(self.store(), &registry_secret(request)?).await?;
        if request.export_to_all_namespaces == Some(true) {
            create_or_update(self.store(), &secret_export(&request.name, &request.namespace)).await?;
        }
        Ok(())
    }

    /// Update the credentials of an existing registry secret
    pub async fn update_registry_secret(&self, request: &RegistrySecretRequest) -> Result<()> {
        validate(request)?;
        let key = ObjectKey::namespaced(&request.namespace, &request.name);
        tracing::info!(key = %key, "updating registry secret");

        let current: Secret = self.store().get(&key).await?;
        let mut updated = current.clone();
        updated.data = registry_secret(request)?.data;
        updated.type_ = Some(DOCKER_CONFIG_JSON_TYPE.to_string());
        self.store().update(&updated).await?;

        match request.export_to_all_namespaces {
            Some(true) => {
                create_or_update(self.store(), &secret_export(&request.name, &request.namespace))
                    .await?;
            }
            Some(false) => {
                self.delete_export(&key).await?;
            }
            None => {}
        }
        Ok(())
    }

    /// Delete a registry secret and its export; returns whether the secret existed
    pub async fn delete_registry_secret(&self, name: &str, namespace: &str) -> Result<bool> {
        let key = ObjectKey::namespaced(namespace, name);
        tracing::info!(key = %key, "deleting registry secret");

        let existed = match self.store().delete::<Secret>(&key).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };
        self.delete_export(&key).await?;
        Ok(existed)
    }

    async fn delete_export(&self, key: &ObjectKey) -> Result<()> {
        match self.store().delete::<SecretExport>(key).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockStore;

    fn request() -> RegistrySecretRequest {
        RegistrySecretRequest {
            name: "regcred".to_string(),
            namespace: "ns1".to_string(),
            server: "registry.example.com".to_string(),
            username: "admin".to_string(),
            password: "s3cret".to_string(),
            export_to_all_namespaces: Some(true),
        }
    }

    #[test]
    fn test_docker_config_json() {
        let payload = docker_config_json("registry.example.com", "admin", "s3cret").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let entry = &value["auths"]["registry.example.com"];
        assert_eq!(entry["username"], "admin");
        assert_eq!(entry["password"], "s3cret");
        assert_eq!(entry["auth"], STANDARD.encode("admin:s3cret"));
    }

    #[tokio::test]
    async fn test_add_with_export() {
        let client = PackageClient::new(MockStore::new());
        client.add_registry_secret(&request()).await.unwrap();

        let key = ObjectKey::namespaced("ns1", "regcred");
        let secret: Secret = client.store().object(&key).unwrap();
        assert_eq!(secret.type_.as_deref(), Some(DOCKER_CONFIG_JSON_TYPE));
        assert!(secret.data.unwrap().contains_key(DOCKER_CONFIG_JSON_KEY));

        let export: SecretExport = client.store().object(&key).unwrap();
        assert_eq!(export.spec.to_namespaces, vec!["*"]);

        // adding again replaces rather than failing
        client.add_registry_secret(&request()).await.unwrap();
        assert_eq!(client.store().object_count(), 2);
    }

    #[tokio::test]
    async fn test_update_requires_existing_secret() {
        let client = PackageClient::new(MockStore::new());
        let err = client.update_registry_secret(&request()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_can_remove_export() {
        let client = PackageClient::new(MockStore::new());
        client.add_registry_secret(&request()).await.unwrap();

        let mut update = request();
        update.password = "rotated".to_string();
        update.export_to_all_namespaces = Some(false);
        client.update_registry_secret(&update).await.unwrap();

        let key = ObjectKey::namespaced("ns1", "regcred");
        assert!(!client.store().contains::<SecretExport>(&key));
        let secret: Secret = client.store().object(&key).unwrap();
        let payload = &secret.data.unwrap()[DOCKER_CONFIG_JSON_KEY];
        assert!(String::from_utf8_lossy(&payload.0).contains("rotated"));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let client = PackageClient::new(MockStore::new());
        client.add_registry_secret(&request()).await.unwrap();

        assert!(client.delete_registry_secret("regcred", "ns1").await.unwrap());
        assert_eq!(client.store().object_count(), 0);
        assert!(!client.delete_registry_secret("regcred", "ns1").await.unwrap());
    }

    #[test]
    fn test_validate() {
        let mut missing_server = request();
        missing_server.server = String::new();
        let err = validate(&missing_server).unwrap_err();
        assert_eq!(err.to_string(), "invalid request: registry secret server is required");
    }
}
