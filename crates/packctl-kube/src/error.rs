//! Error types for packctl-kube

use std::fmt;
use std::time::Duration;

use packctl_core::CoreError;
use thiserror::Error;

/// Result type for packctl-kube operations
pub type Result<T> = std::result::Result<T, PackageError>;

/// Expected outcomes that are reported as errors but downgraded to warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonCriticalReason {
    /// Install was asked for a package install that already exists
    AlreadyInstalled,
    /// Update or uninstall targeted a package install that doesn't exist
    NotInstalled,
    /// Add was asked for a repository that already exists
    RepositoryAlreadyExists,
    /// Update or delete targeted a repository that doesn't exist
    RepositoryDoesNotExist,
}

impl NonCriticalReason {
    /// Stable, machine-checkable reason string
    pub fn as_str(&self) -> &'static str {
        match self {
            NonCriticalReason::AlreadyInstalled => "package install already exists",
            NonCriticalReason::NotInstalled => "package is not installed",
            NonCriticalReason::RepositoryAlreadyExists => "package repository already exists",
            NonCriticalReason::RepositoryDoesNotExist => "package repository does not exist",
        }
    }
}

impl fmt::Display for NonCriticalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while managing packages and repositories
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackageError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The requested object doesn't exist
    #[error("{kind} '{name}' not found{}", in_namespace(.namespace))]
    NotFound {
        kind: String,
        name: String,
        namespace: Option<String>,
    },

    /// An object with the same name already exists
    #[error("{kind} '{name}' already exists{}", in_namespace(.namespace))]
    AlreadyExists {
        kind: String,
        name: String,
        namespace: Option<String>,
    },

    /// Writing a dependent resource failed
    #[error("failed to create or update {kind} '{name}': {source}")]
    Dependent {
        kind: String,
        name: String,
        #[source]
        source: Box<PackageError>,
    },

    /// No package matches the requested name and version
    #[error("failed to find a package with name '{package}' and version '{version}' in namespace '{namespace}'")]
    PackageNotFound {
        package: String,
        version: String,
        namespace: String,
    },

    /// Caller-supplied service account belongs to another install
    #[error("provided service account '{name}' is already used by another package in namespace '{namespace}'")]
    ServiceAccountConflict { name: String, namespace: String },

    /// Update asked for a different package than the one installed
    #[error("installed package '{install}' is already associated with package '{package}'")]
    PackageMismatch { install: String, package: String },

    /// A repository with the same name exists
    #[error("package repository name '{name}' already exists in namespace '{namespace}'")]
    RepositoryNameExists { name: String, namespace: String },

    /// A repository with the same fetch URL exists
    #[error("package repository URL '{url}' already exists in namespace '{namespace}'")]
    RepositoryUrlExists { url: String, namespace: String },

    /// The controller reported a failure condition
    #[error("resource {action} failed: {message}")]
    ReconcileFailed {
        action: &'static str,
        message: String,
        hint: Option<String>,
    },

    /// The controller didn't settle before the poll timeout
    #[error("timed out waiting for {kind} '{name}' after {timeout:?}")]
    Timeout {
        kind: String,
        name: String,
        timeout: Duration,
    },

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Storage backend error
    #[error("storage error: {0}")]
    Store(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request or configuration error from packctl-core
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The background task ended without reporting an outcome
    #[error("internal error: {0}")]
    Internal(String),

    /// Expected state, reported as a warning rather than a failure
    #[error("{0}")]
    NonCritical(NonCriticalReason),
}

fn in_namespace(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!(" in namespace '{}'", ns),
        None => String::new(),
    }
}

impl From<serde_json::Error> for PackageError {
    fn from(e: serde_json::Error) -> Self {
        PackageError::Serialization(e.to_string())
    }
}

impl PackageError {
    /// Check if this is a "not found" error, typed or raw 404
    pub fn is_not_found(&self) -> bool {
        match self {
            PackageError::NotFound { .. } => true,
            PackageError::Api(kube::Error::Api(resp)) => resp.code == 404,
            PackageError::Dependent { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        match self {
            PackageError::AlreadyExists { .. } => true,
            PackageError::Api(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "AlreadyExists"
            }
            _ => false,
        }
    }

    /// Check if this is a non-critical signal
    pub fn is_non_critical(&self) -> bool {
        matches!(self, PackageError::NonCritical(_))
    }

    /// Reason of a non-critical signal
    pub fn non_critical_reason(&self) -> Option<NonCriticalReason> {
        match self {
            PackageError::NonCritical(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Remediation hint shown next to the error
    pub fn hint(&self) -> Option<String> {
        match self {
            PackageError::ReconcileFailed { hint, .. } => hint.clone(),
            PackageError::ServiceAccountConflict { .. } => Some(
                "omit --service-account-name to let packctl create a dedicated service account"
                    .to_string(),
            ),
            PackageError::PackageMismatch { .. } => Some(
                "uninstall the existing package first, or install under a different name"
                    .to_string(),
            ),
            PackageError::PackageNotFound { namespace, .. } => Some(format!(
                "check that a repository providing this package is reconciled in namespace '{}'",
                namespace
            )),
            PackageError::Timeout { .. } => {
                Some("increase --poll-timeout, or check the controller logs".to_string())
            }
            PackageError::Dependent { source, .. } => source.hint(),
            _ => None,
        }
    }

    /// Map a raw kube error for an object to a typed error
    pub(crate) fn from_kube(err: kube::Error, kind: &str, name: &str, namespace: Option<&str>) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => PackageError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.map(String::from),
            },
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                PackageError::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    namespace: namespace.map(String::from),
                }
            }
            _ => PackageError::Api(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_kube_errors() {
        let err = PackageError::from_kube(api_error(404, "NotFound"), "Secret", "s1", Some("ns1"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Secret 's1' not found in namespace 'ns1'");

        let err = PackageError::from_kube(api_error(409, "AlreadyExists"), "ClusterRole", "r1", None);
        assert!(err.is_already_exists());
        assert_eq!(err.to_string(), "ClusterRole 'r1' already exists");

        let err = PackageError::from_kube(api_error(409, "Conflict"), "Secret", "s1", Some("ns1"));
        assert!(!err.is_already_exists());
        assert!(matches!(err, PackageError::Api(_)));
    }

    #[test]
    fn test_non_critical() {
        let err = PackageError::NonCritical(NonCriticalReason::NotInstalled);
        assert!(err.is_non_critical());
        assert_eq!(err.to_string(), "package is not installed");
        assert_eq!(err.non_critical_reason(), Some(NonCriticalReason::NotInstalled));
        assert!(!PackageError::Cancelled.is_non_critical());
    }

    #[test]
    fn test_reconcile_failed_hint() {
        let err = PackageError::ReconcileFailed {
            action: "reconciliation",
            message: "fetch failed. Reconcile failed".to_string(),
            hint: Some("use `packctl package update` to correct the settings".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "resource reconciliation failed: fetch failed. Reconcile failed"
        );
        assert!(err.hint().unwrap().contains("packctl package update"));
    }

    #[test]
    fn test_dependent_wraps_source() {
        let err = PackageError::Dependent {
            kind: "ServiceAccount".to_string(),
            name: "pkg1-ns1-sa".to_string(),
            source: Box::new(PackageError::Store("disk full".to_string())),
        };
        assert!(err.to_string().contains("ServiceAccount 'pkg1-ns1-sa'"));
        assert!(err.to_string().contains("disk full"));
    }
}
