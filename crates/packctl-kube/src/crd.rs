//! Custom resources packctl reads and writes
//!
//! Only the fields packctl touches are modelled; the rest of each spec is kept
//! as raw JSON in `extra` so an update writes it back unchanged. The controller
//! owns the schema, so schema generation is disabled.

use std::collections::BTreeMap;

use kube::{CustomResource, Resource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Spec fields packctl does not model, keyed by their wire name
pub type ExtraFields = BTreeMap<String, Value>;

/// Condition reported once the controller has applied the resource
pub const RECONCILE_SUCCEEDED: &str = "ReconcileSucceeded";
/// Condition reported when reconciliation failed
pub const RECONCILE_FAILED: &str = "ReconcileFailed";
/// Condition reported when the controller could not delete the resource
pub const DELETE_FAILED: &str = "DeleteFailed";

/// Condition status value meaning "true"
pub const CONDITION_TRUE: &str = "True";

/// Status shape shared by PackageInstall and PackageRepository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub observed_generation: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub friendly_description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub useful_error_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }
}

impl GenericStatus {
    /// Whether the given condition type is present and true
    pub fn has_true(&self, type_: &str) -> bool {
        self.conditions.iter().any(|c| c.type_ == type_ && c.is_true())
    }

    /// Controller diagnostics, joined for display
    pub fn diagnostic(&self) -> String {
        format!("{}. {}", self.useful_error_message, self.friendly_description)
    }
}

/// Resources whose progress is reported through a [`GenericStatus`]
pub trait Reconcilable: Resource {
    fn reconcile_status(&self) -> Option<&GenericStatus>;

    /// Generation of the spec the caller last wrote
    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or_default()
    }
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "packaging.carvel.dev",
    version = "v1alpha1",
    kind = "PackageInstall",
    plural = "packageinstalls",
    namespaced,
    status = "GenericStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_ref: Option<PackageRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<PackageInstallValues>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRef {
    pub ref_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_selection: Option<VersionSelectionSemver>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSelectionSemver {
    #[serde(default)]
    pub constraints: String,

    /// Present (even empty) to let pre-release versions satisfy the constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prereleases: Option<Prereleases>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl VersionSelectionSemver {
    pub fn new(constraints: &str) -> Self {
        Self {
            constraints: constraints.to_string(),
            ..Default::default()
        }
    }

    /// Selection that also accepts pre-release versions
    pub fn with_prereleases(constraints: &str) -> Self {
        Self {
            prereleases: Some(Prereleases::default()),
            ..Self::new(constraints)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prereleases {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl PackageInstall {
    /// Package name the install points at
    pub fn package_name(&self) -> Option<&str> {
        self.spec.package_ref.as_ref().map(|r| r.ref_name.as_str())
    }

    /// Version constraint currently requested
    pub fn version_constraint(&self) -> Option<&str> {
        self.spec
            .package_ref
            .as_ref()
            .and_then(|r| r.version_selection.as_ref())
            .map(|v| v.constraints.as_str())
    }

    /// Change the constraint, keeping the rest of the version selection
    pub fn set_version_constraint(&mut self, constraint: &str) {
        let package_ref = self.spec.package_ref.get_or_insert_with(PackageRef::default);
        package_ref
            .version_selection
            .get_or_insert_with(|| VersionSelectionSemver::with_prereleases(constraint))
            .constraints = constraint.to_string();
    }

    /// Whether a values secret with this name is referenced
    pub fn references_secret(&self, name: &str) -> bool {
        self.spec
            .values
            .iter()
            .filter_map(|v| v.secret_ref.as_ref())
            .any(|s| s.name == name)
    }

    pub fn add_secret_ref(&mut self, name: &str) {
        if !self.references_secret(name) {
            self.spec.values.push(PackageInstallValues {
                secret_ref: Some(SecretRef {
                    name: name.to_string(),
                    key: None,
                }),
            });
        }
    }
}

impl Reconcilable for PackageInstall {
    fn reconcile_status(&self) -> Option<&GenericStatus> {
        self.status.as_ref()
    }
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "packaging.carvel.dev",
    version = "v1alpha1",
    kind = "PackageRepository",
    plural = "packagerepositories",
    namespaced,
    status = "GenericStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositorySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch: Option<PackageRepositoryFetch>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepositoryFetch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imgpkg_bundle: Option<ImgpkgBundle>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImgpkgBundle {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_selection: Option<TagSelection>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<VersionSelectionSemver>,

    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl PackageRepository {
    /// Image the repository bundle is fetched from
    pub fn image(&self) -> Option<&str> {
        self.spec
            .fetch
            .as_ref()
            .and_then(|f| f.imgpkg_bundle.as_ref())
            .map(|b| b.image.as_str())
    }

    /// Point the repository at an image, selecting tags by `tag_constraint` when given
    pub fn set_source(&mut self, image: &str, tag_constraint: Option<&str>) {
        let bundle = self
            .spec
            .fetch
            .get_or_insert_with(PackageRepositoryFetch::default)
            .imgpkg_bundle
            .get_or_insert_with(ImgpkgBundle::default);
        bundle.image = image.to_string();
        bundle.tag_selection = tag_constraint.map(|c| TagSelection {
            semver: Some(VersionSelectionSemver::new(c)),
            ..Default::default()
        });
    }
}

impl Reconcilable for PackageRepository {
    fn reconcile_status(&self) -> Option<&GenericStatus> {
        self.status.as_ref()
    }
}

/// Package metadata published by a repository
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "data.packaging.carvel.dev",
    version = "v1alpha1",
    kind = "Package",
    plural = "packages",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    pub ref_name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

/// Exports a secret to other namespaces
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "secretgen.carvel.dev",
    version = "v1alpha1",
    kind = "SecretExport",
    plural = "secretexports",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct SecretExportSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_namespaces: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_install_serialization() {
        let mut install = PackageInstall::new("pkg1", PackageInstallSpec::default());
        install.spec.service_account_name = Some("pkg1-ns1-sa".to_string());
        install.spec.package_ref = Some(PackageRef {
            ref_name: "fluent-bit.example.com".to_string(),
            ..Default::default()
        });
        install.set_version_constraint("1.0.0");
        install.add_secret_ref("pkg1-ns1-values");
        install.add_secret_ref("pkg1-ns1-values");

        let value = serde_json::to_value(&install).unwrap();
        assert_eq!(value["apiVersion"], "packaging.carvel.dev/v1alpha1");
        assert_eq!(value["kind"], "PackageInstall");
        assert_eq!(value["spec"]["serviceAccountName"], "pkg1-ns1-sa");
        assert_eq!(
            value["spec"]["packageRef"]["versionSelection"]["constraints"],
            "1.0.0"
        );
        assert_eq!(value["spec"]["values"].as_array().unwrap().len(), 1);
        assert_eq!(
            value["spec"]["values"][0]["secretRef"]["name"],
            "pkg1-ns1-values"
        );
    }

    #[test]
    fn test_status_parsing() {
        let json = serde_json::json!({
            "apiVersion": "packaging.carvel.dev/v1alpha1",
            "kind": "PackageInstall",
            "metadata": {"name": "pkg1", "namespace": "ns1", "generation": 2},
            "spec": {},
            "status": {
                "conditions": [{"type": "ReconcileFailed", "status": "True"}],
                "observedGeneration": 2,
                "friendlyDescription": "Reconcile failed: Error",
                "usefulErrorMessage": "kapp: Error: timed out"
            }
        });
        let install: PackageInstall = serde_json::from_value(json).unwrap();
        let status = install.reconcile_status().unwrap();

        assert_eq!(install.generation(), 2);
        assert!(status.has_true(RECONCILE_FAILED));
        assert!(!status.has_true(RECONCILE_SUCCEEDED));
        assert_eq!(
            status.diagnostic(),
            "kapp: Error: timed out. Reconcile failed: Error"
        );
    }

    #[test]
    fn test_repository_source() {
        let mut repo = PackageRepository::new("repo1", PackageRepositorySpec::default());
        repo.set_source("registry.example.com/packages", Some(">0.0.0"));

        let value = serde_json::to_value(&repo).unwrap();
        assert_eq!(
            value["spec"]["fetch"]["imgpkgBundle"]["tagSelection"]["semver"]["constraints"],
            ">0.0.0"
        );
        assert_eq!(repo.image(), Some("registry.example.com/packages"));

        repo.set_source("registry.example.com/packages:v2", None);
        let value = serde_json::to_value(&repo).unwrap();
        assert!(value["spec"]["fetch"]["imgpkgBundle"]["tagSelection"].is_null());
    }

    #[test]
    fn test_unmodelled_fields_survive_edits() {
        let json = serde_json::json!({
            "apiVersion": "packaging.carvel.dev/v1alpha1",
            "kind": "PackageInstall",
            "metadata": {"name": "pkg1", "namespace": "ns1"},
            "spec": {
                "syncPeriod": "30m",
                "paused": false,
                "packageRef": {
                    "refName": "fluent-bit.example.com",
                    "versionSelection": {"constraints": "1.0.0", "prereleases": {"identifiers": ["rc"]}}
                }
            }
        });
        let mut install: PackageInstall = serde_json::from_value(json).unwrap();
        install.set_version_constraint("2.0.0");

        let value = serde_json::to_value(&install).unwrap();
        assert_eq!(value["spec"]["syncPeriod"], "30m");
        assert_eq!(value["spec"]["paused"], false);
        let selection = &value["spec"]["packageRef"]["versionSelection"];
        assert_eq!(selection["constraints"], "2.0.0");
        assert_eq!(selection["prereleases"]["identifiers"][0], "rc");
    }

    #[test]
    fn test_new_constraint_accepts_prereleases() {
        let mut install = PackageInstall::new("pkg1", PackageInstallSpec::default());
        install.set_version_constraint("1.0.0");

        let value = serde_json::to_value(&install).unwrap();
        assert_eq!(
            value["spec"]["packageRef"]["versionSelection"]["prereleases"],
            serde_json::json!({})
        );
    }

    #[test]
    fn test_repository_source_keeps_fetch_settings() {
        let json = serde_json::json!({
            "apiVersion": "packaging.carvel.dev/v1alpha1",
            "kind": "PackageRepository",
            "metadata": {"name": "repo1", "namespace": "ns1"},
            "spec": {
                "syncPeriod": "10m",
                "fetch": {"imgpkgBundle": {"image": "registry.example.com/packages:1.0.0", "secretRef": {"name": "regcred"}}}
            }
        });
        let mut repo: PackageRepository = serde_json::from_value(json).unwrap();
        repo.set_source("registry.example.com/packages:2.0.0", None);

        let value = serde_json::to_value(&repo).unwrap();
        assert_eq!(value["spec"]["syncPeriod"], "10m");
        let bundle = &value["spec"]["fetch"]["imgpkgBundle"];
        assert_eq!(bundle["image"], "registry.example.com/packages:2.0.0");
        assert_eq!(bundle["secretRef"]["name"], "regcred");
    }
}
