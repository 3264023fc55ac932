//! Requests for package, repository and registry secret operations

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// How often and how long to poll the controller for a reconciliation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSettings {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Request to install, update or uninstall a package
///
/// The orchestrator fills in the generated dependent names while it runs, so a
/// request is owned by exactly one invocation.
#[derive(Debug, Clone, Default)]
pub struct PackageInstallRequest {
    /// Name of the PackageInstall resource
    pub name: String,

    /// Namespace of the PackageInstall resource
    pub namespace: String,

    /// Package to install (may be empty on update, then taken from the install)
    pub package_name: String,

    /// Version or version constraint (may be empty on update)
    pub version: String,

    /// Configuration values file turned into a secret
    pub values_file: Option<PathBuf>,

    /// Service account; generated when not supplied
    pub service_account_name: Option<String>,

    /// Generated cluster role name
    pub cluster_role_name: Option<String>,

    /// Generated cluster role binding name
    pub cluster_role_binding_name: Option<String>,

    /// Generated values secret name
    pub secret_name: Option<String>,

    /// Create the namespace if it doesn't exist
    pub create_namespace: bool,

    /// On update, install the package if it isn't installed yet
    pub install: bool,

    /// Wait for the controller to reconcile
    pub wait: bool,

    /// Poll settings used when waiting
    pub poll: PollSettings,

    /// Labels added to the PackageInstall
    pub labels: BTreeMap<String, String>,
}

impl PackageInstallRequest {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_package(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.package_name = package.into();
        self.version = version.into();
        self
    }

    pub fn with_values_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.values_file = Some(path.into());
        self
    }

    pub fn with_service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account_name = Some(name.into());
        self
    }

    /// Wait for reconciliation with the given poll settings
    pub fn with_wait(mut self, poll: PollSettings) -> Self {
        self.wait = true;
        self.poll = poll;
        self
    }

    pub fn with_create_namespace(mut self) -> Self {
        self.create_namespace = true;
        self
    }

    pub fn with_install(mut self) -> Self {
        self.install = true;
        self
    }

    /// Read the values file, if one was given
    pub fn read_values_file(&self) -> Result<Option<ValuesFile>> {
        self.values_file.as_deref().map(ValuesFile::read).transpose()
    }
}

/// Contents of a user-supplied values file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesFile {
    /// Base name, used as the secret data key
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl ValuesFile {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path).map_err(|source| CoreError::ValuesFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "values.yaml".to_string());
        Ok(Self {
            file_name,
            contents,
        })
    }
}

/// Request to add, update or delete a package repository
#[derive(Debug, Clone, Default)]
pub struct RepositoryRequest {
    pub name: String,
    pub namespace: String,

    /// OCI image reference of the repository bundle
    pub url: String,

    /// On update, add the repository if it doesn't exist
    pub create_repository: bool,

    pub create_namespace: bool,
    pub wait: bool,
    pub poll: PollSettings,
}

impl RepositoryRequest {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_wait(mut self, poll: PollSettings) -> Self {
        self.wait = true;
        self.poll = poll;
        self
    }
}

/// Whether an image reference pins a tag or digest
///
/// A `:` only counts as a tag separator after the last `/`, so registry ports
/// (`localhost:5000/repo`) are not mistaken for tags.
pub fn image_has_tag(image: &str) -> bool {
    if image.contains('@') {
        return true;
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    last_segment.contains(':')
}

/// Request to manage a registry credentials secret
#[derive(Clone, Default)]
pub struct RegistrySecretRequest {
    pub name: String,
    pub namespace: String,
    pub server: String,
    pub username: String,
    pub password: String,

    /// Export the secret to every namespace; `None` leaves an existing export alone
    pub export_to_all_namespaces: Option<bool>,
}

impl fmt::Debug for RegistrySecretRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySecretRequest")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("export_to_all_namespaces", &self.export_to_all_namespaces)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_values_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "replicas: 3").unwrap();

        let request = PackageInstallRequest::new("pkg1", "ns1").with_values_file(file.path());
        let values = request.read_values_file().unwrap().unwrap();

        assert!(values.file_name.ends_with(".yaml"));
        assert_eq!(values.contents, b"replicas: 3\n");
    }

    #[test]
    fn test_read_missing_values_file() {
        let request = PackageInstallRequest::new("pkg1", "ns1")
            .with_values_file("/nonexistent/values.yaml");
        let err = request.read_values_file().unwrap_err();
        assert!(err.to_string().contains("failed to read from data values file"));
    }

    #[test]
    fn test_no_values_file() {
        let request = PackageInstallRequest::new("pkg1", "ns1");
        assert!(request.read_values_file().unwrap().is_none());
    }

    #[test]
    fn test_image_has_tag() {
        assert!(image_has_tag("registry.example.com/repo:v1.1.0"));
        assert!(image_has_tag("registry.example.com/repo@sha256:abcd"));
        assert!(!image_has_tag("registry.example.com/repo"));
        assert!(!image_has_tag("localhost:5000/repo"));
        assert!(image_has_tag("localhost:5000/repo:1.0"));
    }

    #[test]
    fn test_registry_request_debug_redacts_password() {
        let request = RegistrySecretRequest {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", request).contains("hunter2"));
    }

    #[test]
    fn test_with_wait() {
        let poll = PollSettings::new(Duration::from_millis(10), Duration::from_secs(1));
        let request = PackageInstallRequest::new("pkg1", "ns1").with_wait(poll);
        assert!(request.wait);
        assert_eq!(request.poll, poll);
    }
}
