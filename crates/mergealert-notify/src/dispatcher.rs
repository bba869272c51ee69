//! Merge-request dispatch engine.
//!
//! One inbound event goes through filter, project lookup, recipient
//! resolution, formatting, sequential fan-out, and exactly one persisted
//! [`NotificationRecord`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mergealert_core::result::AppResult;
use mergealert_database::store::{DestinationStore, NotificationStore, ProjectStore, UserDirectory};
use mergealert_entity::destination::Destination;
use mergealert_entity::event::{EventUser, MergeRequestEvent};
use mergealert_entity::notification::{NewNotification, NotificationRecord};

use crate::payload::MergeRequestPayload;
use crate::router::SenderRouter;

/// Result of processing one event.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The event did not qualify (not an opened merge request).
    Ignored,
    /// Fan-out ran and this record was stored.
    Recorded(NotificationRecord),
}

/// Turns merge-request events into chat messages.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    projects: Arc<dyn ProjectStore>,
    destinations: Arc<dyn DestinationStore>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationStore>,
    router: SenderRouter,
}

impl DispatchEngine {
    /// Create a dispatch engine.
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        destinations: Arc<dyn DestinationStore>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationStore>,
        router: SenderRouter,
    ) -> Self {
        Self {
            projects,
            destinations,
            users,
            notifications,
            router,
        }
    }

    /// The router used for fan-out.
    pub fn router(&self) -> &SenderRouter {
        &self.router
    }

    /// Process one event without external cancellation.
    pub async fn process_merge_request_event(
        &self,
        event: &MergeRequestEvent,
    ) -> AppResult<DispatchOutcome> {
        self.process_with_cancel(event, &CancellationToken::new())
            .await
    }

    /// Process one event.
    ///
    /// Returns an error only when the project is unknown or storage fails.
    /// Delivery failures are recorded on the returned record instead.
    pub async fn process_with_cancel(
        &self,
        event: &MergeRequestEvent,
        cancel: &CancellationToken,
    ) -> AppResult<DispatchOutcome> {
        if !event.is_opened() {
            tracing::debug!(
                gitlab_project_id = event.project.id,
                state = %event.object_attributes.state,
                "Ignoring merge request event"
            );
            return Ok(DispatchOutcome::Ignored);
        }

        let project = self.projects.find_by_gitlab_id(event.project.id).await?;
        let destinations = self.destinations.list_for_project(project.id).await?;

        let mentioned_accounts: Vec<String> = event
            .assignees
            .iter()
            .map(|assignee| assignee.display_account().to_string())
            .collect();
        let mentioned_mobiles = self.resolve_mobiles(&event.assignees).await;

        let attrs = &event.object_attributes;
        let payload = MergeRequestPayload {
            project_name: project.name.clone(),
            source_branch: attrs.source_branch.clone(),
            target_branch: attrs.target_branch.clone(),
            author_name: event.user.name.clone(),
            title: attrs.title.clone(),
            url: attrs.url.clone(),
            mentioned_mobiles,
            mentioned_accounts,
        };

        tracing::info!(
            project_id = project.id,
            merge_request = attrs.iid,
            destinations = destinations.len(),
            mentions = payload.mentioned_mobiles.len(),
            "Dispatching merge request alert"
        );

        let outcome = self.fan_out(cancel, &destinations, &payload).await;
        if let Err(message) = &outcome {
            tracing::warn!(project_id = project.id, merge_request = attrs.iid, error = %message, "Merge request alert failed");
        }

        let notification = NewNotification {
            project_id: project.id,
            merge_request_id: attrs.iid,
            title: attrs.title.clone(),
            source_branch: attrs.source_branch.clone(),
            target_branch: attrs.target_branch.clone(),
            author_email: event.user.display_account().to_string(),
            assignee_emails: payload.mentioned_accounts,
            status: attrs.state.clone(),
            notification_sent: outcome.is_ok(),
            error_message: outcome.err(),
        };

        let record = self.notifications.create(&notification).await?;
        Ok(DispatchOutcome::Recorded(record))
    }

    /// Send to each active destination once, in link order, stopping at the
    /// first failure. Returns the number of sends on success.
    async fn fan_out(
        &self,
        cancel: &CancellationToken,
        destinations: &[Destination],
        payload: &MergeRequestPayload,
    ) -> Result<usize, String> {
        let mut attempted = HashSet::new();

        for destination in destinations {
            if !destination.is_active || !attempted.insert(destination.id) {
                continue;
            }

            let sender = self.router.sender_for(destination);
            tracing::debug!(destination_id = destination.id, channel = %sender.channel(), "Sending");

            if let Err(e) = sender.send(cancel, destination, payload).await {
                return Err(format!(
                    "failed to send via webhook {} ({}): {e}",
                    destination.name, destination.id
                ));
            }
        }

        Ok(attempted.len())
    }

    /// Phone numbers of the mentioned assignees, deduplicated in lookup
    /// order. Lookup failures are logged and yield no mentions.
    async fn resolve_mobiles(&self, assignees: &[EventUser]) -> Vec<String> {
        if assignees.is_empty() {
            return Vec::new();
        }

        let mut emails = Vec::new();
        let mut usernames = Vec::new();
        for assignee in assignees {
            if let Some(email) = assignee.usable_email() {
                emails.push(email.to_string());
            } else if !assignee.username.trim().is_empty() {
                usernames.push(assignee.username.trim().to_string());
            }
        }

        let users = match self.users.find_by_emails_or_usernames(&emails, &usernames).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up assignee phone numbers");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        users
            .iter()
            .filter_map(|user| user.mention_phone())
            .filter(|phone| seen.insert(phone.to_string()))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mergealert_database::MemoryStore;
    use mergealert_entity::destination::Channel;
    use mergealert_entity::event::{EventProject, MergeRequestAttributes, REDACTED_EMAIL};

    use crate::sender::{ChannelSender, SendError};

    #[derive(Debug, Default)]
    struct RecordingSender {
        calls: Mutex<Vec<(i64, MergeRequestPayload)>>,
        failing: Mutex<HashSet<i64>>,
    }

    impl RecordingSender {
        fn calls(&self) -> Vec<i64> {
            self.calls.lock().unwrap().iter().map(|(id, _)| *id).collect()
        }

        fn last_payload(&self) -> MergeRequestPayload {
            self.calls.lock().unwrap().last().unwrap().1.clone()
        }

        fn fail_on(&self, id: i64) {
            self.failing.lock().unwrap().insert(id);
        }
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        fn channel(&self) -> Channel {
            Channel::WeCom
        }

        async fn send(
            &self,
            _cancel: &CancellationToken,
            destination: &Destination,
            payload: &MergeRequestPayload,
        ) -> Result<(), SendError> {
            self.calls
                .lock()
                .unwrap()
                .push((destination.id, payload.clone()));
            if self.failing.lock().unwrap().contains(&destination.id) {
                return Err(SendError::Status {
                    channel: Channel::WeCom,
                    status: 500,
                });
            }
            Ok(())
        }
    }

    fn engine(store: &MemoryStore, sender: &Arc<RecordingSender>) -> DispatchEngine {
        let dyn_sender: Arc<dyn ChannelSender> = sender.clone();
        let store = Arc::new(store.clone());
        DispatchEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            SenderRouter::new(dyn_sender.clone(), dyn_sender.clone(), dyn_sender),
        )
    }

    fn user(name: &str, username: &str, email: &str) -> EventUser {
        EventUser {
            name: name.to_string(),
            username: username.to_string(),
            email: email.to_string(),
        }
    }

    fn event(gitlab_project_id: i64, state: &str, assignees: Vec<EventUser>) -> MergeRequestEvent {
        MergeRequestEvent {
            object_kind: "merge_request".to_string(),
            user: user("Bob", "bob", "bob@example.com"),
            project: EventProject {
                id: gitlab_project_id,
                name: "app".to_string(),
            },
            object_attributes: MergeRequestAttributes {
                iid: 7,
                title: "Add login".to_string(),
                state: state.to_string(),
                source_branch: "feature/login".to_string(),
                target_branch: "main".to_string(),
                url: "https://gitlab.example.com/g/app/-/merge_requests/7".to_string(),
            },
            assignees,
        }
    }

    fn recorded(outcome: DispatchOutcome) -> NotificationRecord {
        match outcome {
            DispatchOutcome::Recorded(record) => record,
            DispatchOutcome::Ignored => panic!("event was ignored"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_links_send_once() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        let project = store.add_project(42, "app", "https://gitlab.example.com/g/app");
        let dest = store.add_destination("team", "https://qyapi.weixin.qq.com/x", "wecom", None);
        store.link(project.id, dest.id);
        store.link(project.id, dest.id);

        let record = recorded(
            engine(&store, &sender)
                .process_merge_request_event(&event(42, "opened", vec![]))
                .await
                .unwrap(),
        );

        assert_eq!(sender.calls(), vec![dest.id]);
        assert!(record.notification_sent);
        assert_eq!(record.error_message, None);
        assert_eq!(store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_non_opened_events_are_ignored() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        let project = store.add_project(42, "app", "https://gitlab.example.com/g/app");
        let dest = store.add_destination("team", "https://qyapi.weixin.qq.com/x", "wecom", None);
        store.link(project.id, dest.id);
        let engine = engine(&store, &sender);

        for state in ["merged", "closed", "locked", ""] {
            let outcome = engine
                .process_merge_request_event(&event(42, state, vec![]))
                .await
                .unwrap();
            assert!(matches!(outcome, DispatchOutcome::Ignored));
        }

        assert!(sender.calls().is_empty());
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());

        let err = engine(&store, &sender)
            .process_merge_request_event(&event(404, "opened", vec![]))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(err.message.contains("project not found"));
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_redacted_assignee_resolves_by_username() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        let project = store.add_project(42, "app", "https://gitlab.example.com/g/app");
        let dest = store.add_destination("team", "https://oapi.dingtalk.com/robot/send", "dingtalk", None);
        store.link(project.id, dest.id);
        store.add_user("alice@example.com", Some("alice"), Some("+15550001111"));
        store.add_user("nobody@example.com", Some("nobody"), Some("+15559999999"));

        let assignees = vec![
            user("Alice", "alice", REDACTED_EMAIL),
            user("Alice", "alice", "alice@example.com"),
        ];
        let record = recorded(
            engine(&store, &sender)
                .process_merge_request_event(&event(42, "opened", assignees))
                .await
                .unwrap(),
        );

        let payload = sender.last_payload();
        assert_eq!(payload.mentioned_mobiles, vec!["+15550001111".to_string()]);
        assert_eq!(
            payload.mentioned_accounts,
            vec!["Alice".to_string(), "alice@example.com".to_string()]
        );
        assert_eq!(payload.author_name, "Bob");
        assert_eq!(record.assignee_emails, payload.mentioned_accounts);
    }

    #[tokio::test]
    async fn test_first_failure_stops_fan_out() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        let project = store.add_project(42, "app", "https://gitlab.example.com/g/app");
        let first = store.add_destination("ops", "https://qyapi.weixin.qq.com/a", "wecom", None);
        let second = store.add_destination("dev", "https://qyapi.weixin.qq.com/b", "wecom", None);
        store.link(project.id, first.id);
        store.link(project.id, second.id);
        sender.fail_on(first.id);

        let record = recorded(
            engine(&store, &sender)
                .process_merge_request_event(&event(42, "opened", vec![]))
                .await
                .unwrap(),
        );

        assert_eq!(sender.calls(), vec![first.id]);
        assert!(!record.notification_sent);
        let message = record.error_message.unwrap();
        assert!(message.starts_with(&format!("failed to send via webhook ops ({})", first.id)));
        assert!(message.contains("500"));
    }

    #[tokio::test]
    async fn test_no_destinations_still_records_success() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        store.add_project(42, "app", "https://gitlab.example.com/g/app");

        let record = recorded(
            engine(&store, &sender)
                .process_merge_request_event(&event(42, "opened", vec![]))
                .await
                .unwrap(),
        );

        assert!(record.notification_sent);
        assert_eq!(record.status, "opened");
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_destinations_are_skipped() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        let project = store.add_project(42, "app", "https://gitlab.example.com/g/app");
        let off = store.add_destination("off", "https://qyapi.weixin.qq.com/a", "wecom", None);
        let on = store.add_destination("on", "https://qyapi.weixin.qq.com/b", "wecom", None);
        store.set_destination_active(off.id, false);
        store.link(project.id, off.id);
        store.link(project.id, on.id);

        engine(&store, &sender)
            .process_merge_request_event(&event(42, "opened", vec![]))
            .await
            .unwrap();

        assert_eq!(sender.calls(), vec![on.id]);
    }

    #[tokio::test]
    async fn test_redacted_author_recorded_by_name() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        store.add_project(42, "app", "https://gitlab.example.com/g/app");
        let mut ev = event(42, "opened", vec![]);
        ev.user = user("Bob Builder", "bob", REDACTED_EMAIL);

        let record = recorded(
            engine(&store, &sender)
                .process_merge_request_event(&ev)
                .await
                .unwrap(),
        );

        assert_eq!(record.author_email, "Bob Builder");
        assert_eq!(record.merge_request_id, 7);
        assert_eq!(record.title, "Add login");
    }
}
