//! ActivityPub endpoints
//!
//! - Event actor profile
//! - Shared inbox (activity receiving)
//! - Followers and featured collections
//! - Logged outbound message retrieval

use axum::body::Bytes;
use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use http::HeaderMap;

use crate::AppState;
use crate::error::AppError;
use crate::federation::builder;
use crate::metrics::FEDERATION_REQUEST_DURATION_SECONDS;

/// Create ActivityPub router
///
/// Routes:
/// - GET /:event_id - Event actor document
/// - GET /:event_id/followers - Followers collection
/// - GET /:event_id/featured - Pinned Event object
/// - GET /:event_id/m/:hash - Logged outbound message, verbatim
/// - POST /activitypub/inbox - Shared inbox
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/activitypub/inbox", post(inbox))
        .route("/:event_id", get(actor))
        .route("/:event_id/followers", get(followers))
        .route("/:event_id/featured", get(featured))
        .route("/:event_id/m/:hash", get(message))
}

/// GET /:event_id
///
/// Returns the event's actor document, regenerated from current event
/// state on every fetch.
async fn actor(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let event = state
        .db
        .get_event(&event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let base_url = state.config.server.base_url();
    Ok(Json(builder::actor_document(&event, &base_url)))
}

/// GET /:event_id/followers
async fn followers(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.db.get_event(&event_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let follower_uris: Vec<String> = state
        .db
        .get_followers(&event_id)
        .await?
        .into_iter()
        .map(|f| f.actor_uri)
        .collect();

    let base_url = state.config.server.base_url();
    Ok(Json(builder::followers_collection(
        &base_url,
        &event_id,
        &follower_uris,
    )))
}

/// GET /:event_id/featured
///
/// OrderedCollection pinning the Event object to the actor profile.
async fn featured(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let event = state
        .db
        .get_event(&event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let base_url = state.config.server.base_url();
    let event_object = builder::event_object(&event, &base_url);
    Ok(Json(builder::featured_collection(
        &base_url,
        &event_id,
        &event_object,
    )))
}

/// GET /:event_id/m/:hash
///
/// Returns a previously logged outbound message verbatim.
async fn message(
    State(state): State<AppState>,
    Path((event_id, hash)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let base_url = state.config.server.base_url();
    let message_id = format!("{}/{}/m/{}", base_url, event_id, hash);

    let stored = state
        .db
        .get_message(&event_id, &message_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let content: serde_json::Value = serde_json::from_str(&stored.content)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt logged message: {}", e)))?;
    Ok(Json(content))
}

/// POST /activitypub/inbox
///
/// Shared inbox for every event actor on this instance.
///
/// # Steps
/// 1. Reject unsigned requests
/// 2. Parse the activity and check the signature keyId belongs to its actor
/// 3. Fetch the actor's public key and verify the HTTP signature
/// 4. Dispatch to the inbox processor
async fn inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), AppError> {
    let _timer = FEDERATION_REQUEST_DURATION_SECONDS
        .with_label_values(&["inbound"])
        .start_timer();

    // Reject unsigned requests immediately; nothing unverified is
    // processed.
    if headers.get("signature").is_none() {
        return Err(AppError::Unauthorized);
    }

    let activity: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))?;

    let actor_id = activity
        .get("actor")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AppError::Validation("Missing actor field".to_string()))?
        .to_string();

    // The keyId must point at the activity's own actor before any
    // remote key material is fetched.
    let signature_key_id = crate::federation::extract_signature_key_id(&headers)?;
    if !crate::federation::key_id_matches_actor(&signature_key_id, &actor_id) {
        return Err(AppError::Unauthorized);
    }

    let public_key_pem =
        crate::federation::fetch_public_key(&signature_key_id, state.http_client.as_ref())
            .await
            .map_err(|e| {
                tracing::warn!(actor_id, error = %e, "Failed to fetch signer's public key");
                AppError::Unauthorized
            })?;

    crate::federation::verify_signature(
        "POST",
        "/activitypub/inbox",
        &headers,
        Some(&body),
        &public_key_pem,
    )
    .map_err(|e| {
        tracing::warn!(actor_id, error = %e, "Inbound signature rejected");
        AppError::Unauthorized
    })?;

    state.inbox_processor().process(activity).await
}
