//! Deterministic names and ownership markers for dependent resources
//!
//! Every resource packctl creates on behalf of a package install is named after
//! the install and its namespace, so the same install always maps to the same
//! set of names. The names embed both parts, which keeps installs with the same
//! name in different namespaces from colliding on cluster-scoped resources.

use std::fmt;

/// Annotation placed on every dependent resource packctl creates.
///
/// The value is the owner marker returned by [`owner_marker`].
pub const OWNER_ANNOTATION: &str = "packctl.io/package";

/// Default tag-selection constraint for repository images without a tag
pub const DEFAULT_TAG_CONSTRAINT: &str = ">0.0.0";

/// Kinds of resources created to support a package install
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependentKind {
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Secret,
}

impl DependentKind {
    /// All kinds, in the order they are torn down
    pub const TEARDOWN_ORDER: [DependentKind; 4] = [
        DependentKind::ClusterRoleBinding,
        DependentKind::ClusterRole,
        DependentKind::ServiceAccount,
        DependentKind::Secret,
    ];

    /// Kubernetes kind name
    pub fn kind(&self) -> &'static str {
        match self {
            DependentKind::ServiceAccount => "ServiceAccount",
            DependentKind::ClusterRole => "ClusterRole",
            DependentKind::ClusterRoleBinding => "ClusterRoleBinding",
            DependentKind::Secret => "Secret",
        }
    }

    /// Parse a Kubernetes kind name
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "ServiceAccount" => Some(DependentKind::ServiceAccount),
            "ClusterRole" => Some(DependentKind::ClusterRole),
            "ClusterRoleBinding" => Some(DependentKind::ClusterRoleBinding),
            "Secret" => Some(DependentKind::Secret),
            _ => None,
        }
    }

    /// Human-readable description used in progress messages
    pub fn description(&self) -> &'static str {
        match self {
            DependentKind::ServiceAccount => "service account",
            DependentKind::ClusterRole => "cluster admin role",
            DependentKind::ClusterRoleBinding => "cluster role binding",
            DependentKind::Secret => "secret",
        }
    }

    /// Whether the resource lives in the install's namespace
    pub fn is_namespaced(&self) -> bool {
        matches!(self, DependentKind::ServiceAccount | DependentKind::Secret)
    }

    /// Generated name for an install
    pub fn name_for(&self, install: &str, namespace: &str) -> String {
        match self {
            DependentKind::ServiceAccount => service_account_name(install, namespace),
            DependentKind::ClusterRole => cluster_role_name(install, namespace),
            DependentKind::ClusterRoleBinding => cluster_role_binding_name(install, namespace),
            DependentKind::Secret => values_secret_name(install, namespace),
        }
    }

    /// Annotation key recording this dependent on the owning install
    pub fn index_annotation(&self) -> String {
        format!("{}-{}", OWNER_ANNOTATION, self.kind())
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

pub fn service_account_name(install: &str, namespace: &str) -> String {
    format!("{}-{}-sa", install, namespace)
}

pub fn cluster_role_name(install: &str, namespace: &str) -> String {
    format!("{}-{}-cluster-role", install, namespace)
}

pub fn cluster_role_binding_name(install: &str, namespace: &str) -> String {
    format!("{}-{}-cluster-rolebinding", install, namespace)
}

pub fn values_secret_name(install: &str, namespace: &str) -> String {
    format!("{}-{}-values", install, namespace)
}

/// Value of [`OWNER_ANNOTATION`] for resources owned by an install
pub fn owner_marker(install: &str, namespace: &str) -> String {
    format!("{}-{}", install, namespace)
}
