//! Common test utilities for E2E tests

use chrono::{Duration, Utc};
use gatherpub::data::{Attendee, Comment, EntityId, Event, Follower, OutboundMessage};
use gatherpub::{AppState, build_router, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "events.test.example".to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            federation: config::FederationConfig {
                delivery_timeout_seconds: 2,
                max_concurrent_deliveries: 4,
                // Small keys keep event creation fast in tests
                key_bits: 2048,
            },
            mail: config::MailConfig::default(),
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config.clone()).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Public base URL the instance advertises in actor documents.
    ///
    /// Deliberately different from `addr`: federation addressing uses
    /// the configured domain, not the test listener.
    pub fn base_url(&self) -> String {
        self.state.config.server.base_url()
    }

    /// Actor URI for a local event.
    pub fn actor_uri(&self, event_id: &str) -> String {
        format!("{}/{}", self.base_url(), event_id)
    }

    /// Insert a test event directly into the database.
    ///
    /// Keys are placeholders; tests that exercise outbound delivery
    /// expect signing to fail and treat the delivery as best-effort.
    pub async fn create_test_event(&self, id: &str) -> Event {
        let now = Utc::now();
        let event = Event {
            id: id.to_string(),
            name: "Test Picnic".to_string(),
            summary: "Bring snacks".to_string(),
            location: Some("The park".to_string()),
            start_time: now + Duration::days(7),
            end_time: None,
            url: None,
            image_url: None,
            users_can_attend: true,
            users_can_comment: true,
            approve_registrations: false,
            max_attendees: None,
            host_email: None,
            private_key_pem: "test_private_key".to_string(),
            public_key_pem: "test_public_key".to_string(),
            activity_object_id: format!("{}/{}/m/{}object", self.base_url(), id, id),
            created_at: now,
            updated_at: now,
        };
        self.state.db.insert_event(&event).await.unwrap();
        event
    }

    /// Register a follower with a cached actor snapshot.
    pub async fn add_follower(
        &self,
        event_id: &str,
        actor_uri: &str,
        follow_activity_uri: &str,
    ) -> Follower {
        let follower = Follower {
            id: EntityId::new().0,
            event_id: event_id.to_string(),
            follow_activity_uri: follow_activity_uri.to_string(),
            actor_uri: actor_uri.to_string(),
            actor_json: serde_json::json!({
                "id": actor_uri,
                "preferredUsername": "alice",
                "inbox": format!("{}/inbox", actor_uri),
            })
            .to_string(),
            name: "Alice".to_string(),
            created_at: Utc::now(),
        };
        assert!(
            self.state
                .db
                .insert_follower_if_absent(&follower)
                .await
                .unwrap()
        );
        follower
    }

    /// Log an outbound message so inbound replies can correlate.
    pub async fn log_message(&self, event_id: &str, message_id: &str, content: serde_json::Value) {
        self.state
            .db
            .insert_message(&OutboundMessage {
                id: message_id.to_string(),
                event_id: event_id.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    /// Insert an attendee row directly.
    pub async fn add_attendee(&self, event_id: &str, actor_uri: &str, approved: bool) -> Attendee {
        let attendee = Attendee {
            id: EntityId::new().0,
            event_id: event_id.to_string(),
            actor_uri: actor_uri.to_string(),
            name: "Bob".to_string(),
            visibility: "public".to_string(),
            approved,
            created_at: Utc::now(),
        };
        assert!(
            self.state
                .db
                .insert_attendee_if_absent(&attendee)
                .await
                .unwrap()
        );
        attendee
    }

    /// Insert a federated comment whose Create activity is retained.
    pub async fn add_comment(
        &self,
        event_id: &str,
        author_uri: &str,
        object_id: &str,
    ) -> Comment {
        let comment = Comment {
            id: EntityId::new().0,
            event_id: event_id.to_string(),
            author_uri: author_uri.to_string(),
            author_name: "Alice".to_string(),
            content: "See you there!".to_string(),
            activity_json: serde_json::json!({
                "type": "Create",
                "actor": author_uri,
                "object": {
                    "type": "Note",
                    "id": object_id,
                    "attributedTo": author_uri,
                    "content": "See you there!",
                }
            })
            .to_string(),
            created_at: Utc::now(),
        };
        self.state.db.insert_comment(&comment).await.unwrap();
        comment
    }
}
