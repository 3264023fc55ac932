//! Reconciliation polling
//!
//! The controller updates a resource's status asynchronously. [`observe`] turns
//! one snapshot of a resource into a [`PollState`]; [`Poller`] fetches snapshots
//! until the state is terminal or the timeout passes.
//!
//! A status is only trusted once `status.observedGeneration` has caught up with
//! `metadata.generation`. Until then it describes a spec the caller already
//! replaced, and the tick is skipped.

use std::fmt;

use packctl_core::PollSettings;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::crd::{DELETE_FAILED, GenericStatus, RECONCILE_FAILED, RECONCILE_SUCCEEDED, Reconcilable};
use crate::error::{PackageError, Result};
use crate::progress::ProgressSender;
use crate::store::{ObjectKey, ResourceStore, StoreObject};

/// Where a polled resource stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// No status for the current generation yet
    Pending,
    /// Status is current but neither condition is true
    Waiting,
    Succeeded,
    /// The failure condition is true; carries the controller's diagnostic
    Failed(String),
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Succeeded | PollState::Failed(_) | PollState::TimedOut
        )
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollState::Pending => write!(f, "pending"),
            PollState::Waiting => write!(f, "waiting"),
            PollState::Succeeded => write!(f, "succeeded"),
            PollState::Failed(msg) => write!(f, "failed: {}", msg),
            PollState::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Conditions that end polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionWatch {
    /// Wait for `ReconcileSucceeded`, fail on `ReconcileFailed`
    Reconcile,
    /// Wait for the resource to disappear, fail on `DeleteFailed`
    Deletion,
}

impl ConditionWatch {
    fn success(&self) -> Option<&'static str> {
        match self {
            ConditionWatch::Reconcile => Some(RECONCILE_SUCCEEDED),
            ConditionWatch::Deletion => None,
        }
    }

    fn failure(&self) -> &'static str {
        match self {
            ConditionWatch::Reconcile => RECONCILE_FAILED,
            ConditionWatch::Deletion => DELETE_FAILED,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            ConditionWatch::Reconcile => "reconciliation",
            ConditionWatch::Deletion => "deletion",
        }
    }

    /// Word used when reporting the conditions seen while waiting
    fn status_label(&self) -> &'static str {
        match self {
            ConditionWatch::Reconcile => "install",
            ConditionWatch::Deletion => "deletion",
        }
    }
}

/// Status of a resource, if it describes the current generation
pub fn current_status<R: Reconcilable>(resource: &R) -> Option<&GenericStatus> {
    resource
        .reconcile_status()
        .filter(|status| status.observed_generation == resource.generation())
}

/// Classify one snapshot of a resource; `None` means it doesn't exist
pub fn observe<R: Reconcilable>(resource: Option<&R>, watch: ConditionWatch) -> PollState {
    let Some(resource) = resource else {
        return match watch {
            ConditionWatch::Deletion => PollState::Succeeded,
            ConditionWatch::Reconcile => PollState::Pending,
        };
    };
    let Some(status) = current_status(resource) else {
        return PollState::Pending;
    };

    for condition in &status.conditions {
        if !condition.is_true() {
            continue;
        }
        if Some(condition.type_.as_str()) == watch.success() {
            return PollState::Succeeded;
        }
        if condition.type_ == watch.failure() {
            return PollState::Failed(status.diagnostic());
        }
    }
    PollState::Waiting
}

/// Apply the deadline to a state
pub fn settle(state: PollState, deadline_passed: bool) -> PollState {
    if deadline_passed && !state.is_terminal() {
        PollState::TimedOut
    } else {
        state
    }
}

/// Polls a resource through a store until it settles
pub struct Poller<'a, S> {
    store: &'a S,
    progress: &'a ProgressSender,
    token: &'a CancellationToken,
    settings: PollSettings,
}

impl<'a, S: ResourceStore> Poller<'a, S> {
    pub fn new(
        store: &'a S,
        progress: &'a ProgressSender,
        token: &'a CancellationToken,
        settings: PollSettings,
    ) -> Self {
        Self {
            store,
            progress,
            token,
            settings,
        }
    }

    /// Wait until the controller reports the resource reconciled
    pub async fn wait_for_reconcile<R>(&self, key: &ObjectKey) -> Result<()>
    where
        R: Reconcilable + StoreObject,
    {
        self.progress
            .report(format!(
                "Waiting for '{}' reconciliation for '{}'",
                R::kind(&()),
                key.name
            ))
            .await;
        self.poll::<R>(key, ConditionWatch::Reconcile).await?;
        self.progress
            .report(format!("'{}' resource successfully reconciled", R::kind(&())))
            .await;
        Ok(())
    }

    /// Wait until the resource is gone
    pub async fn wait_for_deletion<R>(&self, key: &ObjectKey) -> Result<()>
    where
        R: Reconcilable + StoreObject,
    {
        self.progress
            .report(format!(
                "Waiting for '{}' '{}' to be deleted",
                R::kind(&()),
                key.name
            ))
            .await;
        self.poll::<R>(key, ConditionWatch::Deletion).await?;
        self.progress
            .report(format!("'{}' resource successfully deleted", R::kind(&())))
            .await;
        Ok(())
    }

    async fn poll<R>(&self, key: &ObjectKey, watch: ConditionWatch) -> Result<()>
    where
        R: Reconcilable + StoreObject,
    {
        let kind = R::kind(&());
        let deadline = Instant::now() + self.settings.timeout;

        loop {
            let resource = self.store.get_opt::<R>(key).await?;

            if let Some(status) = resource.as_ref().and_then(current_status) {
                for condition in &status.conditions {
                    self.progress
                        .report(format!(
                            "'{}' resource {} status: {}",
                            kind,
                            watch.status_label(),
                            condition.type_
                        ))
                        .await;
                }
            }

            let state = settle(
                observe(resource.as_ref(), watch),
                Instant::now() >= deadline,
            );
            tracing::debug!(kind = %kind, key = %key, state = %state, "poll tick");

            match state {
                PollState::Succeeded => return Ok(()),
                PollState::Failed(message) => {
                    return Err(PackageError::ReconcileFailed {
                        action: watch.action(),
                        message,
                        hint: None,
                    });
                }
                PollState::TimedOut => {
                    return Err(PackageError::Timeout {
                        kind: kind.into_owned(),
                        name: key.name.clone(),
                        timeout: self.settings.timeout,
                    });
                }
                PollState::Pending | PollState::Waiting => {}
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(PackageError::Cancelled),
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Condition, PackageInstall, PackageInstallSpec};
    use crate::progress;
    use crate::store::MockStore;
    use std::time::Duration;

    fn install(generation: i64, observed: i64, conditions: &[(&str, &str)]) -> PackageInstall {
        let mut install = PackageInstall::new("pkg1", PackageInstallSpec::default());
        install.metadata.namespace = Some("ns1".to_string());
        install.metadata.generation = Some(generation);
        install.status = Some(GenericStatus {
            conditions: conditions
                .iter()
                .map(|(t, s)| Condition::new(*t, *s))
                .collect(),
            observed_generation: observed,
            friendly_description: "Reconcile failed: Error (see .status.usefulErrorMessage for details)".to_string(),
            useful_error_message: "Error: Syncing directory '0'".to_string(),
        });
        install
    }

    fn fast() -> PollSettings {
        PollSettings::new(Duration::from_millis(5), Duration::from_millis(100))
    }

    #[test]
    fn test_observe_stale_status_is_pending() {
        let stale = install(2, 1, &[(RECONCILE_SUCCEEDED, "True")]);
        assert_eq!(observe(Some(&stale), ConditionWatch::Reconcile), PollState::Pending);
    }

    #[test]
    fn test_observe_success_and_failure() {
        let ok = install(1, 1, &[(RECONCILE_SUCCEEDED, "True")]);
        assert_eq!(observe(Some(&ok), ConditionWatch::Reconcile), PollState::Succeeded);

        let failed = install(3, 3, &[(RECONCILE_FAILED, "True")]);
        match observe(Some(&failed), ConditionWatch::Reconcile) {
            PollState::Failed(msg) => {
                assert!(msg.starts_with("Error: Syncing directory '0'. Reconcile failed"))
            }
            other => panic!("unexpected state {other:?}"),
        }

        let reconciling = install(1, 1, &[("Reconciling", "True"), (RECONCILE_FAILED, "False")]);
        assert_eq!(
            observe(Some(&reconciling), ConditionWatch::Reconcile),
            PollState::Waiting
        );
    }

    #[test]
    fn test_observe_conditions_in_order() {
        let both = install(1, 1, &[(RECONCILE_FAILED, "True"), (RECONCILE_SUCCEEDED, "True")]);
        assert!(matches!(
            observe(Some(&both), ConditionWatch::Reconcile),
            PollState::Failed(_)
        ));
    }

    #[test]
    fn test_observe_deletion() {
        assert_eq!(
            observe::<PackageInstall>(None, ConditionWatch::Deletion),
            PollState::Succeeded
        );
        assert_eq!(
            observe::<PackageInstall>(None, ConditionWatch::Reconcile),
            PollState::Pending
        );

        let deleting = install(1, 1, &[(RECONCILE_SUCCEEDED, "True")]);
        assert_eq!(
            observe(Some(&deleting), ConditionWatch::Deletion),
            PollState::Waiting
        );

        let stuck = install(1, 1, &[(DELETE_FAILED, "True")]);
        assert!(matches!(
            observe(Some(&stuck), ConditionWatch::Deletion),
            PollState::Failed(_)
        ));
    }

    #[test]
    fn test_settle() {
        assert_eq!(settle(PollState::Waiting, true), PollState::TimedOut);
        assert_eq!(settle(PollState::Pending, true), PollState::TimedOut);
        assert_eq!(settle(PollState::Succeeded, true), PollState::Succeeded);
        assert_eq!(settle(PollState::Waiting, false), PollState::Waiting);
    }

    #[tokio::test]
    async fn test_generation_never_observed_times_out() {
        let store = MockStore::new();
        store
            .insert(&install(2, 1, &[(RECONCILE_SUCCEEDED, "True")]))
            .unwrap();
        let (sender, _session) = progress::channel();
        let token = CancellationToken::new();

        let poller = Poller::new(&store, &sender, &token, fast());
        let err = poller
            .wait_for_reconcile::<PackageInstall>(&ObjectKey::namespaced("ns1", "pkg1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::Timeout { .. }));
        assert!(store.operation_counts().gets > 1);
    }

    #[tokio::test]
    async fn test_reconcile_failure_is_reported() {
        let store = MockStore::new();
        store.insert(&install(1, 1, &[(RECONCILE_FAILED, "True")])).unwrap();
        let (sender, mut session) = progress::channel();
        let token = CancellationToken::new();

        let poller = Poller::new(&store, &sender, &token, fast());
        let err = poller
            .wait_for_reconcile::<PackageInstall>(&ObjectKey::namespaced("ns1", "pkg1"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("resource reconciliation failed: Error: Syncing"));

        assert_eq!(
            session.next_message().await.as_deref(),
            Some("Waiting for 'PackageInstall' reconciliation for 'pkg1'")
        );
        assert_eq!(
            session.next_message().await.as_deref(),
            Some("'PackageInstall' resource install status: ReconcileFailed")
        );
    }

    #[tokio::test]
    async fn test_deletion_of_missing_resource_succeeds() {
        let store = MockStore::new();
        let (sender, _session) = progress::channel();
        let token = CancellationToken::new();

        let poller = Poller::new(&store, &sender, &token, fast());
        poller
            .wait_for_deletion::<PackageInstall>(&ObjectKey::namespaced("ns1", "pkg1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deletion_failure_is_reported() {
        let store = MockStore::new();
        store.insert(&install(1, 1, &[(DELETE_FAILED, "True")])).unwrap();
        let (sender, mut session) = progress::channel();
        let token = CancellationToken::new();

        let poller = Poller::new(&store, &sender, &token, fast());
        let err = poller
            .wait_for_deletion::<PackageInstall>(&ObjectKey::namespaced("ns1", "pkg1"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("resource deletion failed"));

        assert_eq!(
            session.next_message().await.as_deref(),
            Some("Waiting for 'PackageInstall' 'pkg1' to be deleted")
        );
        assert_eq!(
            session.next_message().await.as_deref(),
            Some("'PackageInstall' resource deletion status: DeleteFailed")
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let store = MockStore::new();
        store.insert(&install(1, 1, &[])).unwrap();
        let (sender, _session) = progress::channel();
        let token = CancellationToken::new();
        let settings = PollSettings::new(Duration::from_millis(5), Duration::from_secs(60));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let poller = Poller::new(&store, &sender, &token, settings);
        let err = poller
            .wait_for_reconcile::<PackageInstall>(&ObjectKey::namespaced("ns1", "pkg1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::Cancelled));
    }
}
