//! Moderation service.
//!
//! Every read and write on the moderation surface goes through
//! [`ModerationService`], which applies the visibility rule, the status state
//! machine, the comment content gate and the per-actor comment cooldown.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use civicfeed_core::{
    Actor, Comment, CommentStatus, EventRecord, EventStatus, OrganizerSubmission, Report,
    ReportReason, can_moderate_comments, can_view, collapse_whitespace, find_denied_term,
    sanitize_description, strip_markup,
};
use civicfeed_protocol::ReportReceipt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ModerationConfig, secret_matches};
use crate::error::{ServerError, ServerResult};
use crate::store::EventStore;

/// Message shown when a comment trips the denylist.
pub const POLICY_VIOLATION_MESSAGE: &str =
    "Your comment contains language that is not allowed. Please revise it and try again.";

const MAX_AUTHOR_CHARS: usize = 80;
const MAX_TITLE_CHARS: usize = 200;

/// Moderation operations over a shared [`EventStore`].
pub struct ModerationService {
    store: Arc<dyn EventStore>,
    config: ModerationConfig,
    /// Last accepted comment per `(actor, event)`.
    cooldowns: Mutex<HashMap<(String, Uuid), Instant>>,
}

impl ModerationService {
    pub fn new(store: Arc<dyn EventStore>, config: ModerationConfig) -> Self {
        Self {
            store,
            config,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Resolves a bearer token to an administrator, if it matches.
    pub fn is_admin_token(&self, token: &str) -> bool {
        self.config
            .admin_token
            .as_deref()
            .is_some_and(|expected| secret_matches(expected, token))
    }

    /// Returns true if `secret` proves a request came through the auth gateway.
    pub fn is_gateway_secret(&self, secret: &str) -> bool {
        self.config
            .gateway_secret
            .as_deref()
            .is_some_and(|expected| secret_matches(expected, secret))
    }

    // === Events ===

    /// Creates an organizer event owned by the acting user.
    pub async fn create_organizer_event(
        &self,
        actor: &Actor,
        mut submission: OrganizerSubmission,
    ) -> ServerResult<EventRecord> {
        let Actor::User { id, username } = actor else {
            return Err(ServerError::Unauthorized);
        };

        let title = collapse_whitespace(&strip_markup(&submission.title));
        if title.is_empty() {
            return Err(ServerError::invalid_input("title is required"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ServerError::invalid_input(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        submission.title = title;
        submission.description = submission.description.as_deref().and_then(sanitize_description);

        let event = EventRecord::from_submission(submission, *id, username.clone(), Utc::now());
        let event = self.store.insert_event(event).await?;
        self.persist().await?;

        info!(event_id = %event.id, user_id = %id, "Organizer event created");
        Ok(event)
    }

    /// Returns an event if `actor` may see it.
    ///
    /// Events the actor may not see are reported as missing.
    pub async fn get_event(&self, actor: &Actor, id: Uuid) -> ServerResult<EventRecord> {
        self.store
            .get_event(id)
            .await?
            .filter(|event| can_view(event, actor))
            .ok_or_else(|| ServerError::not_found(format!("event {}", id)))
    }

    /// Lists every event `actor` may see.
    pub async fn list_events(&self, actor: &Actor) -> ServerResult<Vec<EventRecord>> {
        Ok(self
            .store
            .list_events()
            .await?
            .into_iter()
            .filter(|event| can_view(event, actor))
            .collect())
    }

    /// Records a report against a visible event.
    ///
    /// The event's status only changes when a review threshold is configured
    /// and this report reaches it.
    pub async fn submit_report(
        &self,
        actor: &Actor,
        event_id: Uuid,
        reason: ReportReason,
        details: Option<String>,
    ) -> ServerResult<ReportReceipt> {
        self.get_event(actor, event_id).await?;

        let details = details.as_deref().and_then(sanitize_description);
        let report = Report::new(event_id, reason, details, Utc::now());
        let report_id = report.id;
        let mut event = self.store.insert_report(report).await?;
        info!(%event_id, %reason, report_count = event.report_count, "Report received");

        if let Some(threshold) = self.config.review_threshold
            && event.status == EventStatus::Active
            && event.report_count >= threshold
        {
            match self
                .store
                .transition_event(event_id, EventStatus::Active, EventStatus::UnderReview)
                .await
            {
                Ok(updated) => {
                    info!(%event_id, threshold, "Report threshold reached, event under review");
                    event = updated;
                }
                // Someone else moved it first; their decision stands.
                Err(e) => debug!(%event_id, error = %e, "Threshold transition skipped"),
            }
        }
        self.persist().await?;

        Ok(ReportReceipt {
            report_id,
            event_id,
            report_count: event.report_count,
            status: event.status,
        })
    }

    /// Lists reports on an event. Administrators only.
    pub async fn list_reports(&self, actor: &Actor, event_id: Uuid) -> ServerResult<Vec<Report>> {
        if !actor.is_admin() {
            return Err(ServerError::forbidden("only administrators may view reports"));
        }
        self.get_event(actor, event_id).await?;
        Ok(self.store.list_reports(event_id).await?)
    }

    /// Moves an event to `to`. Administrators only.
    pub async fn set_event_status(
        &self,
        actor: &Actor,
        event_id: Uuid,
        to: EventStatus,
    ) -> ServerResult<EventRecord> {
        if !actor.is_admin() {
            return Err(ServerError::forbidden("only administrators may change event status"));
        }

        let event = self.get_event(actor, event_id).await?;
        if !event.status.can_moderate_to(to) {
            return Err(ServerError::InvalidTransition {
                from: event.status,
                to,
            });
        }

        let updated = self.store.transition_event(event_id, event.status, to).await?;
        self.persist().await?;
        info!(%event_id, from = %event.status, to = %to, "Event status changed");
        Ok(updated)
    }

    // === Comments ===

    /// Comments on a visible event.
    ///
    /// Hidden comments are included only for actors who may moderate them.
    pub async fn list_comments(&self, actor: &Actor, event_id: Uuid) -> ServerResult<Vec<Comment>> {
        let event = self.get_event(actor, event_id).await?;
        let moderator = can_moderate_comments(&event, actor);

        Ok(self
            .store
            .list_comments(event_id)
            .await?
            .into_iter()
            .filter(|c| moderator || c.status == CommentStatus::Visible)
            .collect())
    }

    /// Posts a comment on a visible event.
    pub async fn post_comment(
        &self,
        actor: &Actor,
        event_id: Uuid,
        author_name: &str,
        body: &str,
    ) -> ServerResult<Comment> {
        let author_name = collapse_whitespace(&strip_markup(author_name));
        let body = strip_markup(body).trim().to_string();

        if author_name.is_empty() {
            return Err(ServerError::invalid_input("author name is required"));
        }
        if author_name.chars().count() > MAX_AUTHOR_CHARS {
            return Err(ServerError::invalid_input(format!(
                "author name must be at most {} characters",
                MAX_AUTHOR_CHARS
            )));
        }
        if body.is_empty() {
            return Err(ServerError::invalid_input("comment body is required"));
        }
        if body.chars().count() > self.config.max_comment_chars {
            return Err(ServerError::invalid_input(format!(
                "comment must be at most {} characters",
                self.config.max_comment_chars
            )));
        }

        let denied = [author_name.as_str(), body.as_str()]
            .into_iter()
            .find_map(|text| find_denied_term(text, &self.config.denylist));
        if let Some(term) = denied {
            warn!(%event_id, term, "Comment rejected by content policy");
            return Err(ServerError::policy_violation(POLICY_VIOLATION_MESSAGE));
        }

        self.get_event(actor, event_id).await?;

        let key = actor.throttle_key().map(|k| (k, event_id));
        if let Some(key) = &key {
            self.reserve_cooldown(key).await?;
        }

        let comment = Comment::new(event_id, author_name, body, Utc::now());
        match self.store.insert_comment(comment).await {
            Ok(comment) => {
                self.persist().await?;
                debug!(%event_id, comment_id = %comment.id, "Comment posted");
                Ok(comment)
            }
            Err(e) => {
                // A failed write does not count against the actor.
                if let Some(key) = &key {
                    self.cooldowns.lock().await.remove(key);
                }
                Err(e.into())
            }
        }
    }

    /// Claims the cooldown slot for `key`, or reports how long to wait.
    async fn reserve_cooldown(&self, key: &(String, Uuid)) -> ServerResult<()> {
        let cooldown = self.config.comment_cooldown;
        let mut cooldowns = self.cooldowns.lock().await;
        let now = Instant::now();

        if let Some(last) = cooldowns.get(key) {
            let elapsed = now.duration_since(*last);
            if elapsed < cooldown {
                return Err(ServerError::RateLimited {
                    retry_after: cooldown - elapsed,
                });
            }
        }

        cooldowns.retain(|_, last| now.duration_since(*last) < cooldown);
        cooldowns.insert(key.clone(), now);
        Ok(())
    }

    /// Hides or shows a comment. Organizer of the event or administrators.
    pub async fn set_comment_status(
        &self,
        actor: &Actor,
        comment_id: Uuid,
        status: CommentStatus,
    ) -> ServerResult<Comment> {
        self.authorize_comment_moderation(actor, comment_id).await?;
        let comment = self.store.set_comment_status(comment_id, status).await?;
        self.persist().await?;
        info!(%comment_id, status = status.as_str(), "Comment status changed");
        Ok(comment)
    }

    /// Deletes a comment permanently. Organizer of the event or administrators.
    pub async fn delete_comment(&self, actor: &Actor, comment_id: Uuid) -> ServerResult<Comment> {
        self.authorize_comment_moderation(actor, comment_id).await?;
        let comment = self.store.delete_comment(comment_id).await?;
        self.persist().await?;
        info!(%comment_id, "Comment deleted");
        Ok(comment)
    }

    async fn authorize_comment_moderation(&self, actor: &Actor, comment_id: Uuid) -> ServerResult<()> {
        let not_found = || ServerError::not_found(format!("comment {}", comment_id));

        let comment = self.store.get_comment(comment_id).await?.ok_or_else(not_found)?;
        let event = self
            .store
            .get_event(comment.event_id)
            .await?
            .filter(|event| can_view(event, actor))
            .ok_or_else(not_found)?;

        if can_moderate_comments(&event, actor) {
            Ok(())
        } else {
            Err(ServerError::forbidden(
                "only the event organizer or an administrator may moderate comments",
            ))
        }
    }

    /// Flushes the store. A failure is returned to the acting user even
    /// though the change is already applied in memory.
    async fn persist(&self) -> ServerResult<()> {
        self.store.flush().await.map_err(|e| {
            warn!(error = %e, "Failed to persist store");
            ServerError::Store(e)
        })
    }
}
