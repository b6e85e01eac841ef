//! Host-facing event management
//!
//! Consumed by the web layer in front of this engine: event CRUD,
//! attendee approval and removal, comment moderation, and the one-click
//! unattend link embedded in RSVP confirmation DMs.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::data::{Attendee, Comment, Event, OutboundMessage};
use crate::error::AppError;
use crate::federation::builder;
use crate::metrics::EVENTS_TOTAL;

pub fn events_router() -> Router<AppState> {
    Router::new()
        .route("/api/events", post(create_event))
        .route("/api/events/:event_id", get(get_event))
        .route("/api/events/:event_id", put(update_event))
        .route("/api/events/:event_id", delete(delete_event))
        .route("/api/events/:event_id/attendees", get(list_attendees))
        .route(
            "/api/events/:event_id/attendees/:attendee_id/approve",
            post(approve_attendee),
        )
        .route(
            "/api/events/:event_id/attendees/:attendee_id",
            delete(remove_attendee),
        )
        .route("/api/events/:event_id/comments", get(list_comments))
        .route(
            "/api/events/:event_id/comments/:comment_id",
            delete(remove_comment),
        )
        .route(
            "/oneclick/unattend/:event_id/:attendee_id",
            get(oneclick_unattend),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub users_can_attend: bool,
    #[serde(default)]
    pub users_can_comment: bool,
    #[serde(default)]
    pub approve_registrations: bool,
    pub max_attendees: Option<i64>,
    pub host_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub users_can_attend: bool,
    pub users_can_comment: bool,
    pub approve_registrations: bool,
    pub max_attendees: Option<i64>,
    pub host_email: Option<String>,
}

/// Event view without key material.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub users_can_attend: bool,
    pub users_can_comment: bool,
    pub approve_registrations: bool,
    pub max_attendees: Option<i64>,
    pub actor_uri: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventResponse {
    fn from_event(event: Event, base_url: &str) -> Self {
        Self {
            actor_uri: builder::actor_uri(base_url, &event.id),
            id: event.id,
            name: event.name,
            summary: event.summary,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            url: event.url,
            image_url: event.image_url,
            users_can_attend: event.users_can_attend,
            users_can_comment: event.users_can_comment,
            approve_registrations: event.approve_registrations,
            max_attendees: event.max_attendees,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// URL-safe event id, 8 lowercase alphanumeric characters.
fn generate_event_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generate the event's RSA identity off the async runtime.
async fn generate_keypair(bits: usize) -> Result<(String, String), AppError> {
    tokio::task::spawn_blocking(move || {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Key generation failed: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Key encoding failed: {}", e)))?
            .to_string();
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Key encoding failed: {}", e)))?;

        Ok((private_key_pem, public_key_pem))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Key generation task failed: {}", e)))?
}

/// POST /api/events
///
/// Creates the event together with its actor identity: a fresh RSA
/// keypair and a stable Event object id, both kept for the event's
/// lifetime.
async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Event name is required".to_string()));
    }
    if let Some(max) = request.max_attendees {
        if max <= 0 {
            return Err(AppError::Validation(
                "max_attendees must be positive".to_string(),
            ));
        }
    }

    let event_id = generate_event_id();
    let (private_key_pem, public_key_pem) =
        generate_keypair(state.config.federation.key_bits).await?;

    let base_url = state.config.server.base_url();
    let now = Utc::now();
    let event = Event {
        activity_object_id: builder::new_message_id(&base_url, &event_id),
        id: event_id,
        name: request.name,
        summary: request.summary,
        location: request.location,
        start_time: request.start_time,
        end_time: request.end_time,
        url: request.url,
        image_url: request.image_url,
        users_can_attend: request.users_can_attend,
        users_can_comment: request.users_can_comment,
        approve_registrations: request.approve_registrations,
        max_attendees: request.max_attendees,
        host_email: request.host_email,
        private_key_pem,
        public_key_pem,
        created_at: now,
        updated_at: now,
    };

    state.db.insert_event(&event).await?;

    // Log the Event object so replies against its stable id correlate
    // and GET /m/ can serve it.
    let event_object = builder::event_object(&event, &base_url);
    state
        .db
        .insert_message(&OutboundMessage {
            id: event.activity_object_id.clone(),
            event_id: event.id.clone(),
            content: event_object.to_string(),
            created_at: now,
        })
        .await?;

    EVENTS_TOTAL.set(state.db.count_events().await?);
    tracing::info!(event_id = %event.id, "Event created");

    Ok((
        StatusCode::CREATED,
        Json(EventResponse::from_event(event, &base_url)),
    ))
}

/// GET /api/events/:event_id
async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<EventResponse>, AppError> {
    let event = state
        .db
        .get_event(&event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let base_url = state.config.server.base_url();
    Ok(Json(EventResponse::from_event(event, &base_url)))
}

/// PUT /api/events/:event_id
///
/// Updates profile fields, then broadcasts an Update carrying the
/// regenerated Event object. The keypair and the Event object id are
/// preserved.
async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<EventResponse>, AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Event name is required".to_string()));
    }

    let mut event = state
        .db
        .get_event(&event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    event.name = request.name;
    event.summary = request.summary;
    event.location = request.location;
    event.start_time = request.start_time;
    event.end_time = request.end_time;
    event.url = request.url;
    event.image_url = request.image_url;
    event.users_can_attend = request.users_can_attend;
    event.users_can_comment = request.users_can_comment;
    event.approve_registrations = request.approve_registrations;
    event.max_attendees = request.max_attendees;
    event.host_email = request.host_email;
    event.updated_at = Utc::now();

    state.db.update_event(&event).await?;

    let base_url = state.config.server.base_url();
    let update = builder::update_event(
        &builder::new_message_id(&base_url, &event.id),
        &builder::actor_uri(&base_url, &event.id),
        &builder::event_object(&event, &base_url),
    );
    let followers = state.db.get_followers(&event.id).await?;
    if let Err(e) = state
        .delivery
        .broadcast(&state.db, &event, &base_url, &update, &followers)
        .await
    {
        tracing::warn!(event_id = %event.id, error = %e, "Failed to broadcast Update");
    }

    tracing::info!(event_id = %event.id, "Event updated");
    Ok(Json(EventResponse::from_event(event, &base_url)))
}

/// DELETE /api/events/:event_id
///
/// Broadcasts a Delete to followers first (best effort), then removes
/// the event and all its federation state.
async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let event = state
        .db
        .get_event(&event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let base_url = state.config.server.base_url();
    let delete = builder::delete_event(
        &builder::new_message_id(&base_url, &event.id),
        &builder::actor_uri(&base_url, &event.id),
        &event.activity_object_id,
    );
    let followers = state.db.get_followers(&event.id).await?;
    if let Err(e) = state
        .delivery
        .broadcast(&state.db, &event, &base_url, &delete, &followers)
        .await
    {
        tracing::warn!(event_id = %event.id, error = %e, "Failed to broadcast Delete");
    }

    state.db.delete_event(&event.id).await?;
    EVENTS_TOTAL.set(state.db.count_events().await?);
    tracing::info!(event_id = %event.id, "Event deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct AttendeeResponse {
    pub id: String,
    pub actor_uri: String,
    pub name: String,
    pub visibility: String,
    pub approved: bool,
}

impl From<Attendee> for AttendeeResponse {
    fn from(attendee: Attendee) -> Self {
        Self {
            id: attendee.id,
            actor_uri: attendee.actor_uri,
            name: attendee.name,
            visibility: attendee.visibility,
            approved: attendee.approved,
        }
    }
}

/// GET /api/events/:event_id/attendees
async fn list_attendees(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<AttendeeResponse>>, AppError> {
    if state.db.get_event(&event_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let attendees = state
        .db
        .get_attendees(&event_id)
        .await?
        .into_iter()
        .map(AttendeeResponse::from)
        .collect();
    Ok(Json(attendees))
}

/// POST /api/events/:event_id/attendees/:attendee_id/approve
async fn approve_attendee(
    State(state): State<AppState>,
    Path((event_id, attendee_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    if !state.db.approve_attendee(&event_id, &attendee_id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(event_id, attendee_id, "Attendee approved");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/events/:event_id/attendees/:attendee_id
async fn remove_attendee(
    State(state): State<AppState>,
    Path((event_id, attendee_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    if !state
        .db
        .delete_attendee_by_id(&event_id, &attendee_id)
        .await?
    {
        return Err(AppError::NotFound);
    }

    tracing::info!(event_id, attendee_id, "Attendee removed by host");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: String,
    pub author_uri: String,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            author_uri: comment.author_uri,
            author_name: comment.author_name,
            content: comment.content,
            created_at: comment.created_at,
        }
    }
}

/// GET /api/events/:event_id/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    if state.db.get_event(&event_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let comments = state
        .db
        .get_comments(&event_id)
        .await?
        .into_iter()
        .map(CommentResponse::from)
        .collect();
    Ok(Json(comments))
}

/// DELETE /api/events/:event_id/comments/:comment_id
async fn remove_comment(
    State(state): State<AppState>,
    Path((event_id, comment_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    if !state.db.delete_comment(&event_id, &comment_id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(event_id, comment_id, "Comment removed by host");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /oneclick/unattend/:event_id/:attendee_id
///
/// Target of the cancel link embedded in RSVP confirmation DMs.
async fn oneclick_unattend(
    State(state): State<AppState>,
    Path((event_id, attendee_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state
        .db
        .delete_attendee_by_id(&event_id, &attendee_id)
        .await?
    {
        return Err(AppError::NotFound);
    }

    tracing::info!(event_id, attendee_id, "Attendee removed via unattend link");
    Ok(Json(serde_json::json!({
        "message": "You are no longer attending this event."
    })))
}
