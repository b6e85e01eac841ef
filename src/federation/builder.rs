//! Activity document builders
//!
//! Pure constructors for the JSON-LD envelopes the engine sends:
//! Accept, Create, Update, Delete, Announce, the RSVP Question poll,
//! the actor (Person) document and the Event object. Builders never
//! persist or deliver; that is the caller's job.
//!
//! Ephemeral activities get a fresh random id under the event's `/m/`
//! namespace. The actor id and the Event object id are stable for the
//! lifetime of the event.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngCore;
use serde_json::{Value, json};

use crate::data::Event;

/// Poll option text for a public RSVP. Matched byte-for-byte on replies.
pub const OPTION_ATTEND_PUBLIC: &str = "Yes, and show me in the public list";
/// Poll option text for a private RSVP.
pub const OPTION_ATTEND_PRIVATE: &str = "Yes, but hide me from the public list";
/// Poll option text for declining.
pub const OPTION_DECLINE: &str = "No";

const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";
const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Mint a fresh activity id under the event's message namespace.
pub fn new_message_id(base_url: &str, event_id: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}/{}/m/{}", base_url, event_id, hex)
}

pub fn actor_uri(base_url: &str, event_id: &str) -> String {
    format!("{}/{}", base_url, event_id)
}

/// The event's actor (Person) document.
///
/// Regenerated from current event state on every fetch; the id and the
/// published key never change across edits.
pub fn actor_document(event: &Event, base_url: &str) -> Value {
    let actor = actor_uri(base_url, &event.id);

    let mut doc = json!({
        "@context": [
            AS_CONTEXT,
            SECURITY_CONTEXT,
            {
                "toot": "http://joinmastodon.org/ns#",
                "discoverable": "toot:discoverable",
                "indexable": "toot:indexable"
            }
        ],
        "id": actor,
        "type": "Person",
        "preferredUsername": event.id,
        "name": event.name,
        "inbox": format!("{}/activitypub/inbox", base_url),
        "followers": format!("{}/followers", actor),
        "featured": format!("{}/featured", actor),
        "discoverable": false,
        "indexable": false,
        "publicKey": {
            "id": format!("{}#main-key", actor),
            "owner": actor,
            "publicKeyPem": event.public_key_pem
        }
    });

    if !event.summary.is_empty() {
        doc["summary"] = json!(format!("<p>{}</p>", event.summary));
    }
    if let Some(image_url) = &event.image_url {
        doc["icon"] = json!({
            "type": "Image",
            "mediaType": "image/jpeg",
            "url": image_url
        });
    }

    doc
}

/// The AP Event object describing the event itself.
///
/// Keeps the id minted at creation time (`activity_object_id`); edits
/// regenerate the body around the same id.
pub fn event_object(event: &Event, base_url: &str) -> Value {
    let actor = actor_uri(base_url, &event.id);

    let mut object = json!({
        "@context": AS_CONTEXT,
        "id": event.activity_object_id,
        "type": "Event",
        "name": event.name,
        "startTime": format_time(event.start_time),
        "attributedTo": actor,
        "to": PUBLIC,
        "cc": format!("{}/followers", actor)
    });

    if let Some(end_time) = event.end_time {
        object["endTime"] = json!(format_time(end_time));
    }
    if !event.summary.is_empty() {
        object["summary"] = json!(event.summary);
    }
    if let Some(location) = &event.location {
        object["location"] = json!({ "type": "Place", "name": location });
    }
    if let Some(url) = &event.url {
        object["url"] = json!(url);
    }
    if let Some(image_url) = &event.image_url {
        object["attachment"] = json!([{
            "type": "Document",
            "mediaType": "image/jpeg",
            "url": image_url
        }]);
    }

    object
}

/// Accept for an inbound Follow. Echoes the Follow activity back as the
/// object.
pub fn accept_follow(id: &str, actor: &str, follow_activity: &Value, to: &str) -> Value {
    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Accept",
        "actor": actor,
        "to": [to],
        "object": follow_activity
    })
}

/// Create wrapping the Event object, delivered as a DM to one recipient.
pub fn create_event_dm(id: &str, actor: &str, event: &Value, to: &str) -> Value {
    let mut object = event.clone();
    if let Some(map) = object.as_object_mut() {
        map.remove("@context");
        map.insert("to".to_string(), json!([to]));
        map.remove("cc");
    }

    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Create",
        "actor": actor,
        "to": [to],
        "directMessage": true,
        "object": object
    })
}

/// Create with a plain-text Note, delivered as a DM to one recipient.
pub fn create_note_dm(id: &str, actor: &str, content: &str, to: &str) -> Value {
    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Create",
        "actor": actor,
        "to": [to],
        "directMessage": true,
        "object": {
            "id": format!("{}#object", id),
            "type": "Note",
            "attributedTo": actor,
            "to": [to],
            "content": content
        }
    })
}

/// The 3-option RSVP poll, delivered as a DM to one follower.
///
/// The embedded Question id is what poll replies reference via
/// `inReplyTo`.
pub fn rsvp_question_dm(
    id: &str,
    actor: &str,
    event_name: &str,
    end_time: DateTime<Utc>,
    to: &str,
) -> Value {
    let option = |name: &str| {
        json!({
            "type": "Note",
            "name": name,
            "replies": { "type": "Collection", "totalItems": 0 }
        })
    };

    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Create",
        "actor": actor,
        "to": [to],
        "directMessage": true,
        "object": {
            "id": format!("{}#object", id),
            "type": "Question",
            "attributedTo": actor,
            "to": [to],
            "content": format!("<p>Will you attend {}?</p>", event_name),
            "endTime": format_time(end_time),
            "oneOf": [
                option(OPTION_ATTEND_PUBLIC),
                option(OPTION_ATTEND_PRIVATE),
                option(OPTION_DECLINE)
            ]
        }
    })
}

/// Announce boosting a comment to the event's followers.
pub fn announce_comment(
    id: &str,
    actor: &str,
    comment_object_id: &str,
    comment_author: &str,
) -> Value {
    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Announce",
        "actor": actor,
        "to": PUBLIC,
        "cc": [format!("{}/followers", actor), comment_author],
        "object": comment_object_id
    })
}

/// Update carrying the regenerated Event object after an edit.
pub fn update_event(id: &str, actor: &str, event: &Value) -> Value {
    let mut object = event.clone();
    if let Some(map) = object.as_object_mut() {
        map.remove("@context");
    }

    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Update",
        "actor": actor,
        "to": PUBLIC,
        "cc": format!("{}/followers", actor),
        "object": object
    })
}

/// Delete tombstoning the Event object ahead of event removal.
pub fn delete_event(id: &str, actor: &str, object_id: &str) -> Value {
    json!({
        "@context": AS_CONTEXT,
        "id": id,
        "type": "Delete",
        "actor": actor,
        "to": PUBLIC,
        "cc": format!("{}/followers", actor),
        "object": object_id
    })
}

/// Followers collection document for `GET /{event_id}/followers`.
pub fn followers_collection(base_url: &str, event_id: &str, follower_uris: &[String]) -> Value {
    let actor = actor_uri(base_url, event_id);
    json!({
        "@context": AS_CONTEXT,
        "id": format!("{}/followers", actor),
        "type": "OrderedCollection",
        "totalItems": follower_uris.len(),
        "orderedItems": follower_uris
    })
}

/// Featured collection pinning the Event object to the actor's profile.
pub fn featured_collection(base_url: &str, event_id: &str, event: &Value) -> Value {
    let actor = actor_uri(base_url, event_id);
    let mut pinned = event.clone();
    if let Some(map) = pinned.as_object_mut() {
        map.remove("@context");
    }

    json!({
        "@context": AS_CONTEXT,
        "id": format!("{}/featured", actor),
        "type": "OrderedCollection",
        "totalItems": 1,
        "orderedItems": [pinned]
    })
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_event() -> Event {
        let now = Utc::now();
        Event {
            id: "xy2bqyz3".to_string(),
            name: "Rust Meetup".to_string(),
            summary: "Monthly meetup".to_string(),
            location: Some("Community Hall".to_string()),
            start_time: now,
            end_time: None,
            url: None,
            image_url: None,
            users_can_attend: true,
            users_can_comment: true,
            approve_registrations: false,
            max_attendees: None,
            host_email: None,
            private_key_pem: "priv".to_string(),
            public_key_pem: "pub".to_string(),
            activity_object_id: "https://events.example/xy2bqyz3/m/0011223344556677".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn message_ids_are_unique_hex_under_event_namespace() {
        let a = new_message_id("https://events.example", "xy2bqyz3");
        let b = new_message_id("https://events.example", "xy2bqyz3");

        assert_ne!(a, b);
        assert!(a.starts_with("https://events.example/xy2bqyz3/m/"));
        let hash = a.rsplit('/').next().unwrap();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn actor_document_publishes_key_and_collections() {
        let event = sample_event();
        let doc = actor_document(&event, "https://events.example");

        assert_eq!(doc["id"], "https://events.example/xy2bqyz3");
        assert_eq!(doc["type"], "Person");
        assert_eq!(doc["preferredUsername"], "xy2bqyz3");
        assert_eq!(doc["inbox"], "https://events.example/activitypub/inbox");
        assert_eq!(
            doc["publicKey"]["id"],
            "https://events.example/xy2bqyz3#main-key"
        );
        assert_eq!(doc["publicKey"]["publicKeyPem"], "pub");
        assert_eq!(doc["featured"], "https://events.example/xy2bqyz3/featured");
    }

    #[test]
    fn event_object_keeps_stable_id() {
        let event = sample_event();
        let object = event_object(&event, "https://events.example");

        assert_eq!(object["id"], event.activity_object_id);
        assert_eq!(object["type"], "Event");
        assert_eq!(object["location"]["name"], "Community Hall");
    }

    #[test]
    fn rsvp_question_carries_exact_option_strings() {
        let id = "https://events.example/xy2bqyz3/m/aabb";
        let poll = rsvp_question_dm(
            id,
            "https://events.example/xy2bqyz3",
            "Rust Meetup",
            Utc::now(),
            "https://remote.example/users/alice",
        );

        let options: Vec<&str> = poll["object"]["oneOf"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();

        assert_eq!(
            options,
            vec![
                "Yes, and show me in the public list",
                "Yes, but hide me from the public list",
                "No"
            ]
        );
        assert_eq!(poll["object"]["id"], format!("{}#object", id));
        assert_eq!(poll["directMessage"], true);
    }

    #[test]
    fn accept_echoes_follow_activity() {
        let follow = json!({
            "id": "https://remote.example/follows/1",
            "type": "Follow",
            "actor": "https://remote.example/users/alice",
            "object": "https://events.example/xy2bqyz3"
        });

        let accept = accept_follow(
            "https://events.example/xy2bqyz3/m/aabb",
            "https://events.example/xy2bqyz3",
            &follow,
            "https://remote.example/users/alice",
        );

        assert_eq!(accept["type"], "Accept");
        assert_eq!(accept["object"]["id"], "https://remote.example/follows/1");
        assert_eq!(accept["to"][0], "https://remote.example/users/alice");
    }
}
