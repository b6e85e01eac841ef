//! GatherPub: ActivityPub federation engine for hosted events
//!
//! Every hosted event is its own ActivityPub actor with its own RSA
//! keypair. Remote users follow an event, RSVP via a poll or a direct
//! Accept, and comment with public replies; the engine maintains the
//! follower list, an append-only outbound message log, attendee records
//! and comments, and broadcasts signed activities back out.

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod mail;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, response::Json, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::data::Database;
use crate::error::AppError;
use crate::federation::{Delivery, InboxProcessor};
use crate::mail::HostMailer;

/// Inbound bodies above this size are rejected before parsing.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub http_client: Arc<reqwest::Client>,
    pub delivery: Delivery,
    pub mailer: Arc<HostMailer>,
}

impl AppState {
    /// Connect the database and build the shared clients.
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        let db = Arc::new(Database::connect(&config.database.path).await?);

        let http_client = Arc::new(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(config.federation.delivery_timeout_seconds))
                .user_agent(format!("GatherPub - {}", config.server.domain))
                .build()?,
        );

        let delivery = Delivery::new(
            http_client.clone(),
            config.federation.max_concurrent_deliveries,
        );
        let mailer = Arc::new(HostMailer::new(&config.mail)?);

        Ok(Self {
            config,
            db,
            http_client,
            delivery,
            mailer,
        })
    }

    /// Processor for verified inbound activities.
    pub fn inbox_processor(&self) -> InboxProcessor {
        InboxProcessor::new(
            self.db.clone(),
            self.http_client.clone(),
            self.delivery.clone(),
            self.mailer.clone(),
            self.config.server.base_url(),
        )
    }
}

/// Build the application router
///
/// Static routes take precedence over the `/:event_id` actor captures.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(api::wellknown::wellknown_router())
        .merge(api::events::events_router())
        .merge(api::activitypub::activitypub_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// GET /health
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /metrics
async fn metrics_handler() -> String {
    crate::metrics::render()
}
