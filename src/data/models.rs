//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for row IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Event
// =============================================================================

/// A hosted event.
///
/// Every event is its own ActivityPub actor with its own RSA keypair.
/// The actor identity lives for the lifetime of the event: the keypair is
/// generated once at creation and never rotated on edits.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    /// URL-safe event id; doubles as the actor's preferred username
    pub id: String,
    pub name: String,
    /// Free-text description (may contain HTML from the editor)
    pub summary: String,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    /// Whether remote followers are offered an RSVP poll
    pub users_can_attend: bool,
    /// Whether incoming public replies are accepted and announced as comments
    pub users_can_comment: bool,
    /// When set, new attendees start unapproved and must be approved by a host
    pub approve_registrations: bool,
    /// Attendee cap, counted over approved attendees only
    pub max_attendees: Option<i64>,
    /// Host address for approval notifications
    pub host_email: Option<String>,
    /// RSA private key (PEM format), used only for outbound signing
    pub private_key_pem: String,
    /// RSA public key (PEM format), published in the actor document
    pub public_key_pem: String,
    /// Stable id of the AP Event object, minted once and preserved across edits
    pub activity_object_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Federation state
// =============================================================================

/// A remote actor following an event.
///
/// `actor_json` is a snapshot of the remote profile captured at follow time
/// (inbox URL, preferred username). It is never refreshed; a follower whose
/// inbox later moves is skipped by the broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follower {
    pub id: String,
    pub event_id: String,
    /// Id of the inbound Follow activity. The only valid credential for a
    /// later Undo(Follow): an Undo must carry this exact id to be honored.
    pub follow_activity_uri: String,
    pub actor_uri: String,
    pub actor_json: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Follower {
    /// Inbox URL from the cached actor snapshot, if parsable.
    pub fn inbox_uri(&self) -> Option<String> {
        let actor: serde_json::Value = serde_json::from_str(&self.actor_json).ok()?;
        actor
            .get("inbox")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}

/// A logged outbound activity.
///
/// Written durably *before* network delivery is attempted, so inbound
/// replies (Accept, poll votes) can be correlated with what this event
/// actually sent even if delivery later failed. Append-only; rows are only
/// removed when the event itself is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboundMessage {
    /// Activity URI (or the embedded object's URI; both are logged)
    pub id: String,
    pub event_id: String,
    /// Full JSON-serialized activity
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// True when `actor_uri` was a recipient of this message.
    ///
    /// Used to reject replies to a message that was sent to someone
    /// else. Publicly addressed messages count as addressed to anyone;
    /// DMs (poll Questions, confirmations) match their single recipient
    /// only.
    pub fn was_addressed_to(&self, actor_uri: &str) -> bool {
        const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

        let Ok(content) = serde_json::from_str::<serde_json::Value>(&self.content) else {
            return false;
        };

        let contains = |field: &str| {
            match content.get(field) {
                Some(serde_json::Value::String(value)) => value == actor_uri || value == PUBLIC,
                Some(serde_json::Value::Array(values)) => values
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .any(|value| value == actor_uri || value == PUBLIC),
                _ => false,
            }
        };

        contains("to") || contains("cc")
    }
}

// =============================================================================
// Attendance
// =============================================================================

/// Attendee visibility on the public list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendeeVisibility {
    Public,
    Private,
}

impl AttendeeVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// An RSVP from a remote actor.
///
/// `actor_uri` uniqueness enforces one RSVP per remote actor per event.
/// `approved` starts false when the event requires registration approval
/// and unapproved attendees do not count toward capacity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendee {
    pub id: String,
    pub event_id: String,
    pub actor_uri: String,
    pub name: String,
    /// "public" or "private"
    pub visibility: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Comments
// =============================================================================

/// A federated comment on an event.
///
/// The originating Create activity is retained verbatim so a later Delete
/// can be correlated against `activityJson.object.id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub event_id: String,
    pub author_uri: String,
    pub author_name: String,
    /// Sanitized plain text (all tags and attributes stripped)
    pub content: String,
    pub activity_json: String,
    pub created_at: DateTime<Utc>,
}
