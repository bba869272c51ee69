//! Concurrent reconciliation of cached project hook state with GitLab.
//!
//! All remote reads of a pass finish before any local write, so a pass
//! never leaves a half-applied batch visible to readers. Every GitLab call
//! is bounded by the per-call timeout and the caller's cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use mergealert_core::error::AppError;
use mergealert_core::result::AppResult;
use mergealert_database::store::ProjectStore;
use mergealert_entity::project::{Project, WebhookState, WebhookStateUpdate};

use crate::client::{GitLabApi, GitLabEndpoint, ProjectHook};
use crate::error::GitLabError;
use crate::project_url::ParsedProjectUrl;

/// Outcome class of one project in a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// GitLab agrees with the cached state.
    Unchanged,
    /// GitLab disagrees; `observed` should replace the cached state.
    Changed,
    /// The GitLab call failed or was cancelled; the cached state is
    /// reported as-is.
    Failed,
    /// The project URL is unusable; the cached state is reported as-is.
    Skipped,
}

/// Per-project result of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    /// Local project id.
    pub project_id: i64,
    /// Project name.
    pub project_name: String,
    /// Cached state before the pass.
    pub previous: WebhookState,
    /// Best known state after the pass.
    pub observed: WebhookState,
    /// Outcome class.
    pub status: ReconcileStatus,
    /// Error text for failed or skipped projects, or a failed write.
    pub error: Option<String>,
}

impl ReconcileResult {
    /// Whether the cached state needs rewriting.
    pub fn changed(&self) -> bool {
        self.status == ReconcileStatus::Changed
    }

    /// Whether GitLab was reached and the result is trustworthy.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// The write this result calls for, if any.
    pub fn update(&self, synced_at: DateTime<Utc>) -> Option<WebhookStateUpdate> {
        self.changed().then(|| WebhookStateUpdate {
            project_id: self.project_id,
            state: self.observed,
            synced_at,
        })
    }

    fn unchanged(project: &Project, status: ReconcileStatus, error: String) -> Self {
        Self {
            project_id: project.id,
            project_name: project.name.clone(),
            previous: project.webhook_state(),
            observed: project.webhook_state(),
            status,
            error: Some(error),
        }
    }
}

/// Hooks removed by [`WebhookReconciler::remove_hooks`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct HookRemoval {
    /// Ids deleted on GitLab.
    pub deleted: Vec<i64>,
    /// Ids that could not be deleted, with the reason.
    pub failed: Vec<(i64, String)>,
    /// Why the project's hooks could not be listed, in which case nothing
    /// was deleted.
    pub list_error: Option<String>,
}

impl HookRemoval {
    /// Whether every matching hook is gone.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.list_error.is_none()
    }
}

/// Run one GitLab call under `call_timeout`, giving up early once `cancel`
/// fires.
async fn bounded<T>(
    cancel: &CancellationToken,
    call_timeout: Duration,
    call: impl Future<Output = Result<T, GitLabError>>,
) -> Result<T, GitLabError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GitLabError::Cancelled),
        outcome = tokio::time::timeout(call_timeout, call) => {
            outcome.unwrap_or(Err(GitLabError::Timeout))
        }
    }
}

/// Checks many projects against GitLab with bounded concurrency.
#[derive(Debug, Clone)]
pub struct WebhookReconciler {
    api: Arc<dyn GitLabApi>,
    projects: Arc<dyn ProjectStore>,
    callback_url: String,
    call_timeout: Duration,
}

impl WebhookReconciler {
    /// Create a reconciler looking for hooks that point at `callback_url`.
    pub fn new(
        api: Arc<dyn GitLabApi>,
        projects: Arc<dyn ProjectStore>,
        callback_url: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            api,
            projects,
            callback_url: callback_url.into(),
            call_timeout,
        }
    }

    /// The hook URL this reconciler looks for.
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// The GitLab API in use.
    pub fn api(&self) -> &Arc<dyn GitLabApi> {
        &self.api
    }

    /// Check every project with at most `concurrency` GitLab calls in
    /// flight. Returns one result per input project, in input order.
    ///
    /// Once `cancel` fires, queued and in-flight checks end as
    /// [`ReconcileStatus::Failed`]. Nothing is written; see
    /// [`Self::persist_batch`] and [`Self::persist_each`].
    pub async fn reconcile_projects(
        &self,
        cancel: &CancellationToken,
        token: &str,
        projects: &[Project],
        concurrency: usize,
    ) -> Vec<ReconcileResult> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut skipped: HashMap<i64, String> = HashMap::new();
        let mut handles = Vec::with_capacity(projects.len());

        for project in projects {
            let parsed = match ParsedProjectUrl::parse(&project.url) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(project_id = project.id, error = %e, "Skipping hook check for project");
                    skipped.insert(project.id, e.to_string());
                    continue;
                }
            };

            let semaphore = Arc::clone(&semaphore);
            let api = Arc::clone(&self.api);
            let endpoint = GitLabEndpoint::new(parsed.base_url, token);
            let callback_url = self.callback_url.clone();
            let call_timeout = self.call_timeout;
            let gitlab_project_id = project.gitlab_project_id;
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(GitLabError::Cancelled),
                    permit = semaphore.acquire_owned() => permit.map_err(|_| GitLabError::Cancelled)?,
                };

                bounded(
                    &cancel,
                    call_timeout,
                    api.find_hook_by_url(&endpoint, gitlab_project_id, &callback_url),
                )
                .await
            });
            handles.push((project.id, handle));
        }

        // Drain every task before building results.
        let joined = join_all(
            handles
                .into_iter()
                .map(|(project_id, handle)| async move { (project_id, handle.await) }),
        )
        .await;

        let mut observed: HashMap<i64, Result<Option<ProjectHook>, String>> = HashMap::new();
        for (project_id, outcome) in joined {
            let outcome = match outcome {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_err) => Err(format!("hook check task failed: {join_err}")),
            };
            observed.insert(project_id, outcome);
        }

        projects
            .iter()
            .map(|project| {
                if let Some(reason) = skipped.remove(&project.id) {
                    return ReconcileResult::unchanged(project, ReconcileStatus::Skipped, reason);
                }

                match observed.remove(&project.id) {
                    Some(Ok(hook)) => {
                        let previous = project.webhook_state();
                        let current = hook.map_or_else(WebhookState::absent, |h| WebhookState::present(h.id));
                        ReconcileResult {
                            project_id: project.id,
                            project_name: project.name.clone(),
                            previous,
                            observed: current,
                            status: if current == previous {
                                ReconcileStatus::Unchanged
                            } else {
                                ReconcileStatus::Changed
                            },
                            error: None,
                        }
                    }
                    Some(Err(reason)) => {
                        tracing::warn!(project_id = project.id, error = %reason, "Hook check failed");
                        ReconcileResult::unchanged(project, ReconcileStatus::Failed, reason)
                    }
                    None => ReconcileResult::unchanged(
                        project,
                        ReconcileStatus::Failed,
                        "hook check did not run".to_string(),
                    ),
                }
            })
            .collect()
    }

    /// Write every changed state in one batch. Returns the number written.
    pub async fn persist_batch(&self, results: &[ReconcileResult]) -> AppResult<usize> {
        let now = Utc::now();
        let updates: Vec<WebhookStateUpdate> = results.iter().filter_map(|r| r.update(now)).collect();
        if updates.is_empty() {
            return Ok(0);
        }

        self.projects.update_webhook_states(&updates).await?;
        tracing::info!(updated = updates.len(), "Persisted reconciled hook states");
        Ok(updates.len())
    }

    /// Write changed states one row at a time. A failed write is noted on
    /// that project's result and does not stop the others.
    pub async fn persist_each(&self, results: &mut [ReconcileResult]) -> usize {
        let now = Utc::now();
        let mut written = 0;

        for result in results.iter_mut() {
            let Some(update) = result.update(now) else {
                continue;
            };
            match self.projects.update_webhook_state(&update).await {
                Ok(()) => {
                    tracing::info!(
                        project_id = result.project_id,
                        from = result.previous.synced,
                        to = result.observed.synced,
                        "Updated project hook state"
                    );
                    written += 1;
                }
                Err(e) => {
                    tracing::error!(project_id = result.project_id, error = %e, "Failed to save hook state");
                    result.error = Some(format!("failed to save hook state: {}", e.message));
                }
            }
        }

        written
    }

    /// Ensure the callback hook exists on the project, creating it when
    /// missing, and store the result.
    pub async fn sync_hook(
        &self,
        cancel: &CancellationToken,
        token: &str,
        project: &Project,
    ) -> AppResult<(WebhookState, bool)> {
        let endpoint = self.endpoint_for(token, project)?;
        let project_id = project.gitlab_project_id;

        let existing = bounded(
            cancel,
            self.call_timeout,
            self.api.find_hook_by_url(&endpoint, project_id, &self.callback_url),
        )
        .await?;
        let (hook, created) = match existing {
            Some(hook) => (hook, false),
            None => (
                bounded(
                    cancel,
                    self.call_timeout,
                    self.api.create_hook(&endpoint, project_id, &self.callback_url),
                )
                .await?,
                true,
            ),
        };

        let state = WebhookState::present(hook.id);
        self.projects
            .update_webhook_state(&WebhookStateUpdate {
                project_id: project.id,
                state,
                synced_at: Utc::now(),
            })
            .await?;
        Ok((state, created))
    }

    /// Delete every hook on the project that points at the callback URL
    /// and mark the project unsynced, even when some deletions fail.
    pub async fn remove_hooks(
        &self,
        cancel: &CancellationToken,
        token: &str,
        project: &Project,
    ) -> AppResult<HookRemoval> {
        let endpoint = self.endpoint_for(token, project)?;
        let project_id = project.gitlab_project_id;
        let mut removal = HookRemoval::default();

        let listed = bounded(
            cancel,
            self.call_timeout,
            self.api.find_all_hooks_by_url(&endpoint, project_id, &self.callback_url),
        )
        .await;
        match listed {
            Ok(hooks) => {
                for hook in hooks {
                    let deleted = bounded(
                        cancel,
                        self.call_timeout,
                        self.api.delete_hook(&endpoint, project_id, hook.id),
                    )
                    .await;
                    match deleted {
                        Ok(()) => removal.deleted.push(hook.id),
                        Err(e) => removal.failed.push((hook.id, e.to_string())),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(project_id = project.id, error = %e, "Failed to list hooks for removal");
                removal.list_error = Some(e.to_string());
            }
        }

        self.projects
            .update_webhook_state(&WebhookStateUpdate {
                project_id: project.id,
                state: WebhookState::absent(),
                synced_at: Utc::now(),
            })
            .await?;
        Ok(removal)
    }

    /// Whether the token can reach the project's GitLab instance.
    pub async fn can_manage(&self, cancel: &CancellationToken, token: &str, project: &Project) -> bool {
        let Ok(endpoint) = self.endpoint_for(token, project) else {
            return false;
        };
        match bounded(cancel, self.call_timeout, self.api.test_connection(&endpoint)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(project_id = project.id, error = %e, "Cannot manage hooks");
                false
            }
        }
    }

    fn endpoint_for(&self, token: &str, project: &Project) -> AppResult<GitLabEndpoint> {
        let parsed = ParsedProjectUrl::parse(&project.url).map_err(AppError::from)?;
        Ok(GitLabEndpoint::new(parsed.base_url, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mergealert_database::MemoryStore;

    use crate::client::testing::spawn;
    use crate::client::{GitLabClient, GitLabProject};

    const CALLBACK: &str = "https://alerts.example.com/api/v1/webhook/gitlab";

    fn reconciler(store: &MemoryStore, api: Arc<dyn GitLabApi>) -> WebhookReconciler {
        WebhookReconciler::new(api, Arc::new(store.clone()), CALLBACK, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_partial_failures_keep_every_result() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let mut projects = Vec::new();
        for gitlab_id in 1..=5 {
            projects.push(store.add_project(
                gitlab_id,
                &format!("app-{gitlab_id}"),
                &format!("{}/group/app-{gitlab_id}", gitlab.base_url),
            ));
        }
        gitlab.state.add_hook(1, 11, CALLBACK);
        gitlab.state.fail_project(2);
        gitlab.state.fail_project(4);
        store.set_webhook_state(projects[3].id, WebhookState::present(44));
        projects[3] = store.project(projects[3].id).unwrap();

        let reconciler = reconciler(&store, Arc::new(GitLabClient::default()));
        let results = reconciler
            .reconcile_projects(&CancellationToken::new(), "glpat-x", &projects, 50)
            .await;

        let ids: Vec<i64> = results.iter().map(|r| r.project_id).collect();
        assert_eq!(ids, projects.iter().map(|p| p.id).collect::<Vec<_>>());

        let statuses: Vec<ReconcileStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ReconcileStatus::Changed,
                ReconcileStatus::Failed,
                ReconcileStatus::Unchanged,
                ReconcileStatus::Failed,
                ReconcileStatus::Unchanged,
            ]
        );
        assert_eq!(results[0].observed, WebhookState::present(11));
        assert_eq!(results[3].observed, WebhookState::present(44));
        assert!(results[1].error.as_deref().unwrap().contains("500"));

        // Observation alone writes nothing.
        assert_eq!(store.webhook_state_writes(), 0);
        assert_eq!(reconciler.persist_batch(&results).await.unwrap(), 1);
        assert_eq!(store.project(projects[0].id).unwrap().gitlab_webhook_id, Some(11));
        assert!(store.project(projects[0].id).unwrap().last_sync_at.is_some());
        assert_eq!(store.project(projects[3].id).unwrap().gitlab_webhook_id, Some(44));
    }

    #[tokio::test]
    async fn test_invalid_url_is_skipped() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let good = store.add_project(1, "good", &format!("{}/group/good", gitlab.base_url));
        let bad = store.add_project(2, "bad", "not a url");
        store.set_webhook_state(bad.id, WebhookState::present(9));
        let bad = store.project(bad.id).unwrap();

        let results = reconciler(&store, Arc::new(GitLabClient::default()))
            .reconcile_projects(&CancellationToken::new(), "glpat-x", &[good, bad], 10)
            .await;

        assert_eq!(results[0].status, ReconcileStatus::Unchanged);
        assert_eq!(results[1].status, ReconcileStatus::Skipped);
        assert_eq!(results[1].observed, WebhookState::present(9));
        assert!(!results[1].succeeded());
    }

    #[tokio::test]
    async fn test_id_change_alone_counts_as_changed() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let project = store.add_project(1, "app", &format!("{}/group/app", gitlab.base_url));
        store.set_webhook_state(project.id, WebhookState::present(5));
        gitlab.state.add_hook(1, 6, CALLBACK);
        let project = store.project(project.id).unwrap();

        let reconciler = reconciler(&store, Arc::new(GitLabClient::default()));
        let mut results = reconciler
            .reconcile_projects(&CancellationToken::new(), "glpat-x", &[project.clone()], 10)
            .await;
        assert!(results[0].changed());

        assert_eq!(reconciler.persist_each(&mut results).await, 1);
        assert_eq!(store.project(project.id).unwrap().gitlab_webhook_id, Some(6));
        assert_eq!(store.webhook_state_writes(), 1);
    }

    /// Counts peak concurrency and sleeps inside every hook listing.
    #[derive(Debug, Default)]
    struct SlowGitLab {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl GitLabApi for SlowGitLab {
        async fn get_project(&self, _: &GitLabEndpoint, _: &str) -> Result<GitLabProject, GitLabError> {
            Err(GitLabError::NotFound)
        }

        async fn list_hooks(&self, _: &GitLabEndpoint, project_id: i64) -> Result<Vec<ProjectHook>, GitLabError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = if project_id == 99 { 120 } else { 1 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn create_hook(&self, _: &GitLabEndpoint, _: i64, _: &str) -> Result<ProjectHook, GitLabError> {
            Err(GitLabError::Status(500))
        }

        async fn delete_hook(&self, _: &GitLabEndpoint, _: i64, _: i64) -> Result<(), GitLabError> {
            Ok(())
        }

        async fn test_connection(&self, _: &GitLabEndpoint) -> Result<(), GitLabError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded_and_timeouts_fail_softly() {
        let store = MemoryStore::new();
        let mut projects = Vec::new();
        for gitlab_id in 1..=12 {
            projects.push(store.add_project(gitlab_id, "app", "https://gitlab.example.com/group/app"));
        }
        projects.push(store.add_project(99, "slow", "https://gitlab.example.com/group/slow"));

        let api = Arc::new(SlowGitLab::default());
        let results = reconciler(&store, api.clone())
            .reconcile_projects(&CancellationToken::new(), "glpat-x", &projects, 3)
            .await;

        assert_eq!(results.len(), 13);
        assert!(api.peak.load(Ordering::SeqCst) <= 3);
        assert!(results[..12].iter().all(|r| r.status == ReconcileStatus::Unchanged));
        assert_eq!(results[12].status, ReconcileStatus::Failed);
        assert!(results[12].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_sync_creates_then_reuses_hook() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let project = store.add_project(3, "app", &format!("{}/group/app", gitlab.base_url));
        let reconciler = reconciler(&store, Arc::new(GitLabClient::default()));

        let cancel = CancellationToken::new();
        let (state, created) = reconciler.sync_hook(&cancel, "glpat-x", &project).await.unwrap();
        assert!(created);
        assert!(state.synced);

        let (again, created) = reconciler.sync_hook(&cancel, "glpat-x", &project).await.unwrap();
        assert!(!created);
        assert_eq!(again, state);
        assert_eq!(gitlab.state.hooks_for(3).len(), 1);
        assert_eq!(store.project(project.id).unwrap().webhook_state(), state);
    }

    #[tokio::test]
    async fn test_remove_deletes_all_matching_hooks() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let project = store.add_project(3, "app", &format!("{}/group/app", gitlab.base_url));
        store.set_webhook_state(project.id, WebhookState::present(21));
        gitlab.state.add_hook(3, 21, CALLBACK);
        gitlab.state.add_hook(3, 22, CALLBACK);
        gitlab.state.add_hook(3, 23, "https://elsewhere.example.com/hook");

        let removal = reconciler(&store, Arc::new(GitLabClient::default()))
            .remove_hooks(&CancellationToken::new(), "glpat-x", &project)
            .await
            .unwrap();

        assert_eq!(removal.deleted, vec![21, 22]);
        assert!(removal.is_complete());
        assert_eq!(gitlab.state.hooks_for(3).len(), 1);
        assert_eq!(store.project(project.id).unwrap().webhook_state(), WebhookState::absent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_pass_still_reports_every_project() {
        let store = MemoryStore::new();
        let projects: Vec<Project> = (1..=6)
            .map(|gitlab_id| store.add_project(gitlab_id, "app", "https://gitlab.example.com/group/app"))
            .collect();

        let reconciler = reconciler(&store, Arc::new(SlowGitLab::default()));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        // Two checks finish at 1s; the next two are in flight and the last
        // two still queued when the token fires at 1.5s.
        let (results, ()) = tokio::join!(
            reconciler.reconcile_projects(&cancel, "glpat-x", &projects, 2),
            async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                trigger.cancel();
            }
        );

        assert_eq!(results.len(), 6);
        let ids: Vec<i64> = results.iter().map(|r| r.project_id).collect();
        assert_eq!(ids, projects.iter().map(|p| p.id).collect::<Vec<_>>());

        let finished = results
            .iter()
            .filter(|r| r.status == ReconcileStatus::Unchanged)
            .count();
        let cancelled: Vec<&ReconcileResult> = results
            .iter()
            .filter(|r| r.status == ReconcileStatus::Failed)
            .collect();
        assert_eq!(finished, 2);
        assert_eq!(cancelled.len(), 4);
        assert!(cancelled
            .iter()
            .all(|r| r.error.as_deref() == Some("GitLab request cancelled")));
    }

    #[tokio::test]
    async fn test_sync_after_cancel_touches_nothing() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let project = store.add_project(3, "app", &format!("{}/group/app", gitlab.base_url));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reconciler(&store, Arc::new(GitLabClient::default()))
            .sync_hook(&cancel, "glpat-x", &project)
            .await
            .unwrap_err();

        assert!(err.message.contains("cancelled"));
        assert!(gitlab.state.hooks_for(3).is_empty());
        assert_eq!(store.webhook_state_writes(), 0);
    }

    #[tokio::test]
    async fn test_remove_reports_listing_failure_separately() {
        let gitlab = spawn().await;
        let store = MemoryStore::new();
        let project = store.add_project(3, "app", &format!("{}/group/app", gitlab.base_url));
        store.set_webhook_state(project.id, WebhookState::present(21));
        gitlab.state.fail_project(3);

        let removal = reconciler(&store, Arc::new(GitLabClient::default()))
            .remove_hooks(&CancellationToken::new(), "glpat-x", &project)
            .await
            .unwrap();

        assert!(removal.deleted.is_empty());
        assert!(removal.failed.is_empty());
        assert!(removal.list_error.as_deref().unwrap().contains("500"));
        assert!(!removal.is_complete());
        assert_eq!(store.project(project.id).unwrap().webhook_state(), WebhookState::absent());
    }
}
