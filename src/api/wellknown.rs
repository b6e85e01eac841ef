//! WebFinger discovery

use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;

pub fn wellknown_router() -> Router<AppState> {
    Router::new().route("/.well-known/webfinger", get(webfinger))
}

#[derive(Debug, Deserialize)]
struct WebfingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger?resource=acct:{event_id}@{domain}
///
/// Resolves an event's acct: address to its actor URI.
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebfingerQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let acct = query
        .resource
        .strip_prefix("acct:")
        .ok_or_else(|| AppError::Validation("Unsupported resource scheme".to_string()))?;

    let (event_id, domain) = acct
        .split_once('@')
        .ok_or_else(|| AppError::Validation("Malformed acct resource".to_string()))?;

    if domain != state.config.server.domain {
        return Err(AppError::NotFound);
    }

    let event = state
        .db
        .get_event(event_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let actor_uri = format!("{}/{}", state.config.server.base_url(), event.id);

    Ok(Json(serde_json::json!({
        "subject": format!("acct:{}@{}", event.id, domain),
        "links": [
            {
                "rel": "self",
                "type": "application/activity+json",
                "href": actor_uri
            }
        ]
    })))
}
