//! Package metadata lookup

use packctl_core::VersionConstraint;

use crate::crd::Package;
use crate::error::{PackageError, Result};
use crate::store::ResourceStore;

/// Find the highest version of `package` in `namespace` that satisfies `version`
///
/// `version` is an exact version or a semver range.
pub async fn resolve_package<S: ResourceStore>(
    store: &S,
    namespace: &str,
    package: &str,
    version: &str,
) -> Result<Package> {
    if package.is_empty() {
        return Err(PackageError::InvalidRequest("package name is required".to_string()));
    }
    if version.trim().is_empty() {
        return Err(PackageError::InvalidRequest(format!(
            "a version is required for package '{}'",
            package
        )));
    }
    let constraint = VersionConstraint::parse(version)?;

    let candidates: Vec<Package> = store
        .list::<Package>(Some(namespace))
        .await?
        .into_iter()
        .filter(|p| p.spec.ref_name == package)
        .collect();
    tracing::debug!(package, namespace, candidates = candidates.len(), "resolving package");

    let best = constraint
        .best_match(candidates.iter().map(|p| p.spec.version.as_str()))
        .map(String::from);

    best.and_then(|v| candidates.into_iter().find(|p| p.spec.version == v))
        .ok_or_else(|| PackageError::PackageNotFound {
            package: package.to_string(),
            version: version.to_string(),
            namespace: namespace.to_string(),
        })
}
