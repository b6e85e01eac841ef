//! Inbound activity dispatch
//!
//! Stateless classifier plus handlers. Each verified inbound activity is
//! parsed into a closed variant set and routed to exactly one handler;
//! there is no cross-request memory beyond the persisted follower,
//! message and attendee stores.
//!
//! Handlers never leave partial state: persistence happens before any
//! outbound notification derived from it, and a failed notification is
//! logged without rolling the write back.

use std::sync::Arc;

use serde_json::Value;

use super::builder;
use super::delivery::Delivery;
use super::fetch::SignedFetcher;
use super::rsvp::{PollChoice, has_capacity};
use crate::data::{Attendee, Comment, Database, EntityId, Event, Follower};
use crate::error::AppError;
use crate::mail::HostMailer;
use crate::metrics::{ACTIVITIES_RECEIVED_TOTAL, FOLLOWERS_TOTAL};

const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

/// An inbound activity, classified by shape.
///
/// Classification is first-match-wins in the order the variants are
/// listed here; inputs are untrusted and anything that fails a shape
/// check falls through to the next branch.
#[derive(Debug, Clone)]
pub enum InboxActivity {
    /// `Follow` whose object is our actor URI
    Follow {
        id: String,
        actor: String,
        object: String,
        raw: Value,
    },
    /// `Undo` of a `Follow`
    UndoFollow {
        actor: String,
        follow_id: String,
        target: String,
    },
    /// `Accept` referencing an activity id (Mastodon-style RSVP)
    AcceptEvent {
        actor: String,
        object: String,
        to: Vec<String>,
        cc: Vec<String>,
    },
    /// `Undo` of an `Accept`
    UndoAccept {
        actor: String,
        accepted_object: String,
        to: Vec<String>,
    },
    /// `Create(Note)` replying to a poll Question
    PollResponse {
        attributed_to: String,
        in_reply_to: String,
        name: String,
        to: Vec<String>,
        cc: Vec<String>,
    },
    /// `Delete` of a remote object (comment retraction)
    DeleteObject { actor: String, object_id: String },
    /// `Create(Note)` addressed at an event (public comment)
    CreateComment {
        attributed_to: String,
        object: Value,
        to: Vec<String>,
        cc: Vec<String>,
        raw: Value,
    },
    /// Anything else is acked without action
    Unknown,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

impl InboxActivity {
    /// Classify a raw activity.
    pub fn classify(activity: &Value) -> Self {
        let Some(activity_type) = str_field(activity, "type") else {
            return Self::Unknown;
        };
        let actor = str_field(activity, "actor").unwrap_or_default().to_string();

        match activity_type {
            "Follow" => {
                let (Some(id), Some(object)) =
                    (str_field(activity, "id"), str_field(activity, "object"))
                else {
                    return Self::Unknown;
                };
                Self::Follow {
                    id: id.to_string(),
                    actor,
                    object: object.to_string(),
                    raw: activity.clone(),
                }
            }
            "Undo" => {
                let Some(object) = activity.get("object") else {
                    return Self::Unknown;
                };
                match str_field(object, "type") {
                    Some("Follow") => {
                        let (Some(follow_id), Some(target)) =
                            (str_field(object, "id"), str_field(object, "object"))
                        else {
                            return Self::Unknown;
                        };
                        Self::UndoFollow {
                            actor,
                            follow_id: follow_id.to_string(),
                            target: target.to_string(),
                        }
                    }
                    Some("Accept") => {
                        let Some(accepted_object) = str_field(object, "object") else {
                            return Self::Unknown;
                        };
                        Self::UndoAccept {
                            actor,
                            accepted_object: accepted_object.to_string(),
                            to: string_list(activity.get("to")),
                        }
                    }
                    _ => Self::Unknown,
                }
            }
            "Accept" => {
                let Some(object) = str_field(activity, "object") else {
                    return Self::Unknown;
                };
                Self::AcceptEvent {
                    actor,
                    object: object.to_string(),
                    to: string_list(activity.get("to")),
                    cc: string_list(activity.get("cc")),
                }
            }
            "Create" => {
                let Some(object) = activity.get("object") else {
                    return Self::Unknown;
                };
                if str_field(object, "type") != Some("Note") {
                    return Self::Unknown;
                }

                let to = string_list(object.get("to"));
                let cc = string_list(object.get("cc"));
                if to.is_empty() {
                    return Self::Unknown;
                }

                // A reply with inReplyTo is a poll vote candidate; any
                // other addressed Note is comment material.
                if let Some(in_reply_to) = str_field(object, "inReplyTo") {
                    let Some(attributed_to) = str_field(object, "attributedTo") else {
                        return Self::Unknown;
                    };
                    return Self::PollResponse {
                        attributed_to: attributed_to.to_string(),
                        in_reply_to: in_reply_to.to_string(),
                        name: str_field(object, "name").unwrap_or_default().to_string(),
                        to,
                        cc,
                    };
                }

                // Comments are public replies. A Note without a Public
                // recipient is a DM, not comment material.
                if !to.iter().chain(cc.iter()).any(|uri| uri == PUBLIC) {
                    return Self::Unknown;
                }

                let Some(attributed_to) = str_field(object, "attributedTo") else {
                    return Self::Unknown;
                };
                Self::CreateComment {
                    attributed_to: attributed_to.to_string(),
                    object: object.clone(),
                    to,
                    cc,
                    raw: activity.clone(),
                }
            }
            "Delete" => {
                let object_id = match activity.get("object") {
                    Some(Value::String(s)) => s.clone(),
                    Some(object) => match str_field(object, "id") {
                        Some(id) => id.to_string(),
                        None => return Self::Unknown,
                    },
                    None => return Self::Unknown,
                };
                Self::DeleteObject { actor, object_id }
            }
            _ => Self::Unknown,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            Self::Follow { .. } => "Follow",
            Self::UndoFollow { .. } => "Undo(Follow)",
            Self::AcceptEvent { .. } => "Accept",
            Self::UndoAccept { .. } => "Undo(Accept)",
            Self::PollResponse { .. } => "PollResponse",
            Self::DeleteObject { .. } => "Delete",
            Self::CreateComment { .. } => "Create(Note)",
            Self::Unknown => "Unknown",
        }
    }
}

/// Processes verified inbound activities.
///
/// The caller (the inbox route) has already verified the HTTP signature
/// and checked that the signing key belongs to the activity's actor.
pub struct InboxProcessor {
    db: Arc<Database>,
    http_client: Arc<reqwest::Client>,
    delivery: Delivery,
    mailer: Arc<HostMailer>,
    base_url: String,
}

impl InboxProcessor {
    pub fn new(
        db: Arc<Database>,
        http_client: Arc<reqwest::Client>,
        delivery: Delivery,
        mailer: Arc<HostMailer>,
        base_url: String,
    ) -> Self {
        Self {
            db,
            http_client,
            delivery,
            mailer,
            base_url,
        }
    }

    /// Dispatch one verified activity.
    pub async fn process(&self, activity: Value) -> Result<(), AppError> {
        let classified = InboxActivity::classify(&activity);
        ACTIVITIES_RECEIVED_TOTAL
            .with_label_values(&[classified.metric_label()])
            .inc();

        match classified {
            InboxActivity::Follow {
                id,
                actor,
                object,
                raw,
            } => self.handle_follow(&id, &actor, &object, &raw).await,
            InboxActivity::UndoFollow {
                actor,
                follow_id,
                target,
            } => self.handle_undo_follow(&actor, &follow_id, &target).await,
            InboxActivity::AcceptEvent {
                actor,
                object,
                to,
                cc,
            } => self.handle_accept(&actor, &object, &to, &cc).await,
            InboxActivity::UndoAccept {
                actor,
                accepted_object,
                to,
            } => self.handle_undo_accept(&actor, &accepted_object, &to).await,
            InboxActivity::PollResponse {
                attributed_to,
                in_reply_to,
                name,
                to,
                cc,
            } => {
                self.handle_poll_response(&attributed_to, &in_reply_to, &name, &to, &cc)
                    .await
            }
            InboxActivity::DeleteObject { actor, object_id } => {
                self.handle_delete(&actor, &object_id).await
            }
            InboxActivity::CreateComment {
                attributed_to,
                object,
                to,
                cc,
                raw,
            } => {
                self.handle_create_comment(&attributed_to, &object, &to, &cc, &raw)
                    .await
            }
            InboxActivity::Unknown => {
                tracing::debug!("Ignoring unrecognized activity shape");
                Ok(())
            }
        }
    }

    /// Event id from a local actor URI (`{base_url}/{event_id}`).
    fn local_event_id(&self, uri: &str) -> Option<String> {
        let rest = uri.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        if rest.is_empty() || rest.contains('/') {
            return None;
        }
        Some(rest.to_string())
    }

    /// Resolve the local recipient from `to` then `cc` (Mastodon puts it
    /// in `to`, Pleroma in `cc`).
    fn local_recipient(&self, to: &[String], cc: &[String]) -> Option<String> {
        to.iter()
            .chain(cc.iter())
            .find_map(|uri| self.local_event_id(uri))
    }

    async fn handle_follow(
        &self,
        follow_id: &str,
        actor: &str,
        object: &str,
        raw: &Value,
    ) -> Result<(), AppError> {
        let event_id = self
            .local_event_id(object)
            .ok_or(AppError::NotFound)?;
        let event = self
            .db
            .get_event(&event_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if self.db.get_follower(&event.id, actor).await?.is_some() {
            tracing::info!(event_id = %event.id, actor, "Duplicate Follow acked");
            return Ok(());
        }

        let fetcher = SignedFetcher::new(
            &self.http_client,
            &builder::actor_uri(&self.base_url, &event.id),
            &event.private_key_pem,
        );
        let remote = fetcher.fetch_actor(actor).await?;

        let follower = Follower {
            id: EntityId::new().0,
            event_id: event.id.clone(),
            follow_activity_uri: follow_id.to_string(),
            actor_uri: actor.to_string(),
            actor_json: remote.json.to_string(),
            name: remote.name.clone().unwrap_or_default(),
            created_at: chrono::Utc::now(),
        };

        if !self.db.insert_follower_if_absent(&follower).await? {
            tracing::info!(event_id = %event.id, actor, "Lost Follow race, acking");
            return Ok(());
        }
        tracing::info!(event_id = %event.id, actor, "New follower");
        FOLLOWERS_TOTAL.set(self.db.count_followers().await?);

        // Everything below is best-effort notification; the follower
        // record above is the source of truth.
        let event_actor = builder::actor_uri(&self.base_url, &event.id);

        let accept = builder::accept_follow(
            &builder::new_message_id(&self.base_url, &event.id),
            &event_actor,
            raw,
            actor,
        );
        if let Err(e) = self
            .delivery
            .sign_and_send(&self.db, &event, &self.base_url, &remote.inbox, &accept)
            .await
        {
            tracing::warn!(actor, error = %e, "Failed to deliver Accept");
        }

        let event_dm = builder::create_event_dm(
            &builder::new_message_id(&self.base_url, &event.id),
            &event_actor,
            &builder::event_object(&event, &self.base_url),
            actor,
        );
        if let Err(e) = self
            .delivery
            .sign_and_send(&self.db, &event, &self.base_url, &remote.inbox, &event_dm)
            .await
        {
            tracing::warn!(actor, error = %e, "Failed to deliver Event object DM");
        }

        if event.users_can_attend {
            let poll = builder::rsvp_question_dm(
                &builder::new_message_id(&self.base_url, &event.id),
                &event_actor,
                &event.name,
                event.start_time,
                actor,
            );
            if let Err(e) = self
                .delivery
                .sign_and_send(&self.db, &event, &self.base_url, &remote.inbox, &poll)
                .await
            {
                tracing::warn!(actor, error = %e, "Failed to deliver RSVP poll");
            }
        }

        Ok(())
    }

    async fn handle_undo_follow(
        &self,
        actor: &str,
        follow_id: &str,
        target: &str,
    ) -> Result<(), AppError> {
        let event_id = self
            .local_event_id(target)
            .ok_or(AppError::NotFound)?;

        // Removal requires the stored Follow id as credential; a forged
        // Undo silently removes nothing.
        let removed = self
            .db
            .delete_follower_with_credential(&event_id, actor, follow_id)
            .await?;

        if removed {
            tracing::info!(event_id, actor, "Follower removed");
            FOLLOWERS_TOTAL.set(self.db.count_followers().await?);
        } else {
            tracing::info!(event_id, actor, "Undo(Follow) credential mismatch, ignored");
        }
        Ok(())
    }

    async fn handle_accept(
        &self,
        actor: &str,
        object: &str,
        to: &[String],
        cc: &[String],
    ) -> Result<(), AppError> {
        let Some(event_id) = self.local_recipient(to, cc) else {
            tracing::debug!(actor, "Accept with no local recipient, ignored");
            return Ok(());
        };
        let event = self
            .db
            .get_event(&event_id)
            .await?
            .ok_or(AppError::NotFound)?;

        // Correlate against the message log: the reference must be an
        // activity this event sent, to this actor. Failures are silent.
        let Some(message) = self.db.get_message(&event.id, object).await? else {
            tracing::info!(event_id = %event.id, actor, "Accept references unknown message, ignored");
            return Ok(());
        };
        if !message.was_addressed_to(actor) {
            tracing::info!(event_id = %event.id, actor, "Accept references someone else's message, ignored");
            return Ok(());
        }

        if self.db.get_attendee(&event.id, actor).await?.is_some() {
            tracing::info!(event_id = %event.id, actor, "Duplicate Accept RSVP acked");
            return Ok(());
        }

        let fetcher = SignedFetcher::new(
            &self.http_client,
            &builder::actor_uri(&self.base_url, &event.id),
            &event.private_key_pem,
        );
        let remote = fetcher.fetch_actor(actor).await?;

        self.record_rsvp(&event, actor, remote.name.as_deref(), "public", &remote.inbox)
            .await
    }

    async fn handle_undo_accept(
        &self,
        actor: &str,
        accepted_object: &str,
        to: &[String],
    ) -> Result<(), AppError> {
        let Some(event_id) = to.first().and_then(|uri| self.local_event_id(uri)) else {
            tracing::debug!(actor, "Undo(Accept) with no local recipient, ignored");
            return Ok(());
        };
        let event = self
            .db
            .get_event(&event_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let Some(message) = self.db.get_message(&event.id, accepted_object).await? else {
            tracing::info!(event_id = %event.id, actor, "Undo(Accept) references unknown message, ignored");
            return Ok(());
        };
        if !message.was_addressed_to(actor) {
            tracing::info!(event_id = %event.id, actor, "Undo(Accept) references someone else's message, ignored");
            return Ok(());
        }

        if self.db.delete_attendee_by_actor(&event.id, actor).await? {
            tracing::info!(event_id = %event.id, actor, "Attendee removed via Undo(Accept)");
        }
        Ok(())
    }

    async fn handle_poll_response(
        &self,
        attributed_to: &str,
        in_reply_to: &str,
        name: &str,
        to: &[String],
        cc: &[String],
    ) -> Result<(), AppError> {
        let Some(event_id) = self.local_recipient(to, cc) else {
            tracing::debug!(attributed_to, "Poll reply with no local recipient, ignored");
            return Ok(());
        };
        let event = self
            .db
            .get_event(&event_id)
            .await?
            .ok_or(AppError::NotFound)?;

        // Must Follow before voting.
        let Some(follower) = self.db.get_follower(&event.id, attributed_to).await? else {
            tracing::info!(event_id = %event.id, attributed_to, "Poll reply from non-follower, ignored");
            return Ok(());
        };

        // The vote must reference a poll this event sent, to this voter.
        let Some(message) = self.db.get_message(&event.id, in_reply_to).await? else {
            tracing::info!(event_id = %event.id, attributed_to, "Poll reply references unknown message, ignored");
            return Ok(());
        };
        if !message.was_addressed_to(attributed_to) {
            tracing::info!(event_id = %event.id, attributed_to, "Poll reply references someone else's poll, ignored");
            return Ok(());
        }

        let Some(choice) = PollChoice::parse(name) else {
            return Err(AppError::Validation(format!(
                "Unrecognized poll response: {}",
                name
            )));
        };

        let visibility = match choice {
            PollChoice::Decline => {
                tracing::info!(event_id = %event.id, attributed_to, "Poll decline acked");
                return Ok(());
            }
            PollChoice::Attend(visibility) => visibility,
        };

        if self.db.get_attendee(&event.id, attributed_to).await?.is_some() {
            tracing::info!(event_id = %event.id, attributed_to, "Duplicate poll RSVP acked");
            return Ok(());
        }

        let inbox = follower.inbox_uri();
        let name_hint = if follower.name.is_empty() {
            None
        } else {
            Some(follower.name.as_str())
        };

        let Some(inbox) = inbox else {
            tracing::warn!(event_id = %event.id, attributed_to, "Voter has no usable inbox, recording RSVP without confirmation");
            return self
                .record_rsvp_unnotified(&event, attributed_to, name_hint, visibility.as_str())
                .await;
        };

        self.record_rsvp(&event, attributed_to, name_hint, visibility.as_str(), &inbox)
            .await
    }

    /// Apply capacity and approval rules, persist the attendee, then
    /// send the confirmation DM (and host email when approval is
    /// required).
    async fn record_rsvp(
        &self,
        event: &Event,
        actor: &str,
        name: Option<&str>,
        visibility: &str,
        inbox: &str,
    ) -> Result<(), AppError> {
        let event_actor = builder::actor_uri(&self.base_url, &event.id);

        let approved_count = self.db.count_approved_attendees(&event.id).await?;
        if !has_capacity(event, approved_count) {
            // Capacity rejection reaches the human via DM, not an HTTP
            // error.
            let notice = builder::create_note_dm(
                &builder::new_message_id(&self.base_url, &event.id),
                &event_actor,
                &format!(
                    "<p>Sorry, {} is at capacity and cannot take more attendees.</p>",
                    event.name
                ),
                actor,
            );
            if let Err(e) = self
                .delivery
                .sign_and_send(&self.db, event, &self.base_url, inbox, &notice)
                .await
            {
                tracing::warn!(actor, error = %e, "Failed to deliver capacity notice");
            }
            tracing::info!(event_id = %event.id, actor, "RSVP rejected, event at capacity");
            return Ok(());
        }

        let attendee = self
            .persist_attendee(event, actor, name, visibility)
            .await?;
        let Some(attendee) = attendee else {
            return Ok(());
        };

        let content = if event.approve_registrations {
            self.email_host_about_pending(event, &attendee).await;
            format!(
                "<p>Thanks for your interest in {}! Your RSVP is pending approval by the host.</p>",
                event.name
            )
        } else {
            format!(
                "<p>You are attending {}! If you need to cancel, use this link: {}/oneclick/unattend/{}/{}</p>",
                event.name, self.base_url, event.id, attendee.id
            )
        };

        let confirmation = builder::create_note_dm(
            &builder::new_message_id(&self.base_url, &event.id),
            &event_actor,
            &content,
            actor,
        );
        if let Err(e) = self
            .delivery
            .sign_and_send(&self.db, event, &self.base_url, inbox, &confirmation)
            .await
        {
            tracing::warn!(actor, error = %e, "Failed to deliver RSVP confirmation");
        }

        Ok(())
    }

    async fn record_rsvp_unnotified(
        &self,
        event: &Event,
        actor: &str,
        name: Option<&str>,
        visibility: &str,
    ) -> Result<(), AppError> {
        let approved_count = self.db.count_approved_attendees(&event.id).await?;
        if !has_capacity(event, approved_count) {
            tracing::info!(event_id = %event.id, actor, "RSVP rejected, event at capacity");
            return Ok(());
        }

        if let Some(attendee) = self.persist_attendee(event, actor, name, visibility).await? {
            if event.approve_registrations {
                self.email_host_about_pending(event, &attendee).await;
            }
        }
        Ok(())
    }

    /// Insert the attendee row. Returns None when the actor already had
    /// an RSVP (lost race).
    async fn persist_attendee(
        &self,
        event: &Event,
        actor: &str,
        name: Option<&str>,
        visibility: &str,
    ) -> Result<Option<Attendee>, AppError> {
        let attendee = Attendee {
            id: EntityId::new().0,
            event_id: event.id.clone(),
            actor_uri: actor.to_string(),
            name: name.unwrap_or_default().to_string(),
            visibility: visibility.to_string(),
            approved: !event.approve_registrations,
            created_at: chrono::Utc::now(),
        };

        if !self.db.insert_attendee_if_absent(&attendee).await? {
            tracing::info!(event_id = %event.id, actor, "Lost RSVP race, acking");
            return Ok(None);
        }

        tracing::info!(
            event_id = %event.id,
            actor,
            approved = attendee.approved,
            "Attendee recorded"
        );
        Ok(Some(attendee))
    }

    async fn email_host_about_pending(&self, event: &Event, attendee: &Attendee) {
        let display_name = if attendee.name.is_empty() {
            attendee.actor_uri.as_str()
        } else {
            attendee.name.as_str()
        };
        let body = format!(
            "{} has requested to attend {}. Review pending registrations to approve or remove them.",
            display_name, event.name
        );

        if let Err(e) = self
            .mailer
            .notify_host(event.host_email.as_deref(), "RSVP pending approval", body)
            .await
        {
            tracing::warn!(event_id = %event.id, error = %e, "Failed to email host");
        }
    }

    async fn handle_delete(&self, actor: &str, object_id: &str) -> Result<(), AppError> {
        let removed = self
            .db
            .delete_comment_by_activity_object(object_id, actor)
            .await?;

        if !removed {
            return Err(AppError::NotFound);
        }
        tracing::info!(actor, object_id, "Comment removed via Delete");
        Ok(())
    }

    async fn handle_create_comment(
        &self,
        attributed_to: &str,
        object: &Value,
        to: &[String],
        cc: &[String],
        raw: &Value,
    ) -> Result<(), AppError> {
        // Infer the target event from the combined recipient list. A
        // Note addressed at several local events is likely spam.
        let mut event_ids: Vec<String> = to
            .iter()
            .chain(cc.iter())
            .filter_map(|uri| self.local_event_id(uri))
            .collect();
        event_ids.sort();
        event_ids.dedup();

        let event_id = match event_ids.as_slice() {
            [single] => single.clone(),
            [] => {
                tracing::debug!(attributed_to, "Comment with no local recipient, ignored");
                return Ok(());
            }
            _ => {
                tracing::info!(attributed_to, "Comment addressed to multiple events, ignored");
                return Ok(());
            }
        };

        let event = self
            .db
            .get_event(&event_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let fetcher = SignedFetcher::new(
            &self.http_client,
            &builder::actor_uri(&self.base_url, &event.id),
            &event.private_key_pem,
        );
        let remote = fetcher.fetch_actor(attributed_to).await?;

        let raw_content = str_field(object, "content").unwrap_or_default();
        let content = sanitize_comment(raw_content, &event.id);

        let comment = Comment {
            id: EntityId::new().0,
            event_id: event.id.clone(),
            author_uri: attributed_to.to_string(),
            author_name: remote.name.clone().unwrap_or_default(),
            content,
            activity_json: raw.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.db.insert_comment(&comment).await?;
        tracing::info!(event_id = %event.id, attributed_to, "Comment recorded");

        if event.users_can_comment {
            if let Some(comment_object_id) = str_field(object, "id") {
                let announce = builder::announce_comment(
                    &builder::new_message_id(&self.base_url, &event.id),
                    &builder::actor_uri(&self.base_url, &event.id),
                    comment_object_id,
                    attributed_to,
                );
                let followers = self.db.get_followers(&event.id).await?;
                if let Err(e) = self
                    .delivery
                    .broadcast(&self.db, &event, &self.base_url, &announce, &followers)
                    .await
                {
                    tracing::warn!(event_id = %event.id, error = %e, "Failed to announce comment");
                }
            }
        }

        Ok(())
    }
}

/// Strip all HTML and the leading `@eventID` mention from an inbound
/// comment.
fn sanitize_comment(content: &str, event_id: &str) -> String {
    let stripped = ammonia::Builder::empty()
        .clean(content)
        .to_string();

    let trimmed = stripped.trim();
    let mention = format!("@{}", event_id);
    match trimmed.strip_prefix(&mention) {
        Some(rest) => rest.trim_start().to_string(),
        None => trimmed.to_string(),
    }
}
