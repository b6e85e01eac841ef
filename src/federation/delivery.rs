//! Outbound delivery
//!
//! Signs activities with the originating event's key and POSTs them to
//! remote inboxes. Every activity is appended to the event's message
//! log before the first network attempt, so reply correlation works
//! even when delivery fails. The log records intent to send, not
//! confirmed delivery.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;

use super::signature::sign_request;
use crate::data::{Database, Event, Follower, OutboundMessage};
use crate::error::AppError;
use crate::metrics::{ACTIVITIES_SENT_TOTAL, DELIVERIES_TOTAL, FEDERATION_REQUEST_DURATION_SECONDS};

/// Outcome of one follower's delivery attempt within a broadcast.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub actor_uri: String,
    /// None when the follower's cached actor JSON had no usable inbox
    pub inbox_uri: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Delivery service shared across handlers.
#[derive(Clone)]
pub struct Delivery {
    http_client: Arc<reqwest::Client>,
    max_concurrent: usize,
}

impl Delivery {
    pub fn new(http_client: Arc<reqwest::Client>, max_concurrent: usize) -> Self {
        Self {
            http_client,
            max_concurrent,
        }
    }

    /// Append an activity (and its embedded object, when it carries its
    /// own id) to the event's message log.
    ///
    /// Poll replies reference the Question object id rather than the
    /// wrapping Create, so both ids must be resolvable later.
    pub async fn log_outbound(
        &self,
        db: &Database,
        event: &Event,
        activity: &Value,
    ) -> Result<(), AppError> {
        let content = serde_json::to_string(activity)
            .map_err(|e| AppError::Validation(format!("Failed to serialize activity: {}", e)))?;
        let now = Utc::now();

        if let Some(id) = activity.get("id").and_then(Value::as_str) {
            db.insert_message(&OutboundMessage {
                id: id.to_string(),
                event_id: event.id.clone(),
                content: content.clone(),
                created_at: now,
            })
            .await?;
        }

        if let Some(object_id) = activity
            .get("object")
            .and_then(|o| o.get("id"))
            .and_then(Value::as_str)
        {
            db.insert_message(&OutboundMessage {
                id: object_id.to_string(),
                event_id: event.id.clone(),
                content,
                created_at: now,
            })
            .await?;
        }

        Ok(())
    }

    /// Persist an activity to the message log, then sign and POST it to
    /// a single inbox.
    ///
    /// Delivery failure is reported to the caller but never un-persists
    /// the logged message.
    pub async fn sign_and_send(
        &self,
        db: &Database,
        event: &Event,
        base_url: &str,
        inbox_uri: &str,
        activity: &Value,
    ) -> Result<(), AppError> {
        self.log_outbound(db, event, activity).await?;
        self.post_signed(event, base_url, inbox_uri, activity).await
    }

    /// Fan an activity out to a follower list.
    ///
    /// The activity is logged once up front; each follower is then
    /// attempted independently. Followers with unusable cached actor
    /// JSON are skipped with a logged outcome, never failing the
    /// broadcast. Resolves once every follower has been attempted.
    pub async fn broadcast(
        &self,
        db: &Database,
        event: &Event,
        base_url: &str,
        activity: &Value,
        followers: &[Follower],
    ) -> Result<Vec<DeliveryOutcome>, AppError> {
        self.log_outbound(db, event, activity).await?;

        let activity_type = activity.get("type").and_then(Value::as_str).unwrap_or("?");
        tracing::info!(
            event_id = %event.id,
            followers = followers.len(),
            activity_type,
            "Broadcasting to followers"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let activity = Arc::new(activity.clone());
        let base_url = Arc::new(base_url.to_string());
        let event = Arc::new(event.clone());

        let mut tasks = Vec::new();
        let mut outcomes = Vec::new();

        for follower in followers {
            let Some(inbox_uri) = follower.inbox_uri() else {
                tracing::warn!(
                    actor_uri = %follower.actor_uri,
                    "Skipping follower with no usable inbox in cached actor JSON"
                );
                DELIVERIES_TOTAL.with_label_values(&["skipped"]).inc();
                outcomes.push(DeliveryOutcome {
                    actor_uri: follower.actor_uri.clone(),
                    inbox_uri: None,
                    success: false,
                    error: Some("no usable inbox".to_string()),
                });
                continue;
            };

            let semaphore = semaphore.clone();
            let activity = activity.clone();
            let base_url = base_url.clone();
            let event = event.clone();
            let actor_uri = follower.actor_uri.clone();
            let delivery = self.clone();

            let task_actor_uri = actor_uri.clone();
            let task_inbox_uri = inbox_uri.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");

                let result = delivery
                    .post_signed(&event, &base_url, &task_inbox_uri, &activity)
                    .await;

                DeliveryOutcome {
                    actor_uri: task_actor_uri,
                    inbox_uri: Some(task_inbox_uri),
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                }
            });
            tasks.push((actor_uri, inbox_uri, handle));
        }

        for (actor_uri, inbox_uri, handle) in tasks {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(
                        actor_uri = %actor_uri,
                        error = %e,
                        "Delivery task failed to complete"
                    );
                    DELIVERIES_TOTAL.with_label_values(&["failure"]).inc();
                    outcomes.push(DeliveryOutcome {
                        actor_uri,
                        inbox_uri: Some(inbox_uri),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        tracing::info!(
            event_id = %event.id,
            succeeded,
            failed = outcomes.len() - succeeded,
            "Broadcast complete"
        );

        Ok(outcomes)
    }

    async fn post_signed(
        &self,
        event: &Event,
        base_url: &str,
        inbox_uri: &str,
        activity: &Value,
    ) -> Result<(), AppError> {
        let body = serde_json::to_vec(activity)
            .map_err(|e| AppError::Validation(format!("Failed to serialize activity: {}", e)))?;

        let key_id = format!("{}/{}#main-key", base_url, event.id);
        let signed = sign_request("POST", inbox_uri, Some(&body), &event.private_key_pem, &key_id)?;

        let mut request = self
            .http_client
            .post(inbox_uri)
            .header("Content-Type", "application/activity+json")
            .header("Accept", "application/activity+json")
            .header("Date", signed.date)
            .header("Signature", signed.signature);

        if let Some(digest) = signed.digest {
            request = request.header("Digest", digest);
        }

        let timer = FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["outbound_deliver"])
            .start_timer();

        let response = request.body(body).send().await.map_err(|e| {
            DELIVERIES_TOTAL.with_label_values(&["failure"]).inc();
            AppError::Federation(format!("Failed to deliver to {}: {}", inbox_uri, e))
        })?;

        timer.observe_duration();

        if !response.status().is_success() {
            DELIVERIES_TOTAL.with_label_values(&["failure"]).inc();
            return Err(AppError::Federation(format!(
                "Inbox {} rejected activity: HTTP {}",
                inbox_uri,
                response.status()
            )));
        }

        DELIVERIES_TOTAL.with_label_values(&["success"]).inc();
        if let Some(activity_type) = activity.get("type").and_then(Value::as_str) {
            ACTIVITIES_SENT_TOTAL
                .with_label_values(&[activity_type])
                .inc();
        }

        tracing::debug!(inbox_uri, "Delivered activity");
        Ok(())
    }
}
