//! SQLite database operations
//!
//! All database access goes through this module.
//!
//! The follower/attendee uniqueness invariants are enforced here with
//! UNIQUE indexes and conflict-aware inserts rather than in handler logic,
//! so concurrent inbound activities for the same event cannot race a
//! check-then-write into duplicate rows. Removals that require a
//! credential (Undo of a Follow) are expressed as conditional DELETEs.

use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub async fn insert_event(&self, event: &Event) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO events (
                id, name, summary, location, start_time, end_time, url, image_url,
                users_can_attend, users_can_comment, approve_registrations,
                max_attendees, host_email, private_key_pem, public_key_pem,
                activity_object_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.name)
        .bind(&event.summary)
        .bind(&event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.url)
        .bind(&event.image_url)
        .bind(event.users_can_attend)
        .bind(event.users_can_comment)
        .bind(event.approve_registrations)
        .bind(event.max_attendees)
        .bind(&event.host_email)
        .bind(&event.private_key_pem)
        .bind(&event.public_key_pem)
        .bind(&event.activity_object_id)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    /// Update the editable profile fields of an event.
    ///
    /// Keypair and `activity_object_id` are deliberately untouched: edits
    /// regenerate the actor's profile, never its identity.
    pub async fn update_event(&self, event: &Event) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE events SET
                name = ?, summary = ?, location = ?, start_time = ?, end_time = ?,
                url = ?, image_url = ?, users_can_attend = ?, users_can_comment = ?,
                approve_registrations = ?, max_attendees = ?, host_email = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&event.name)
        .bind(&event.summary)
        .bind(&event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.url)
        .bind(&event.image_url)
        .bind(event.users_can_attend)
        .bind(event.users_can_comment)
        .bind(event.approve_registrations)
        .bind(event.max_attendees)
        .bind(&event.host_email)
        .bind(event.updated_at)
        .bind(&event.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete an event and, via cascade, its followers, messages,
    /// attendees and comments.
    pub async fn delete_event(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_events(&self) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    // =========================================================================
    // Followers
    // =========================================================================

    /// Insert a follower unless the actor already follows the event.
    ///
    /// # Returns
    /// `true` if a row was inserted, `false` if the actor was already a
    /// follower (the uniqueness index absorbs the race between concurrent
    /// Follows for the same actor).
    pub async fn insert_follower_if_absent(&self, follower: &Follower) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO followers (
                id, event_id, follow_activity_uri, actor_uri, actor_json, name, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_id, actor_uri) DO NOTHING
            "#,
        )
        .bind(&follower.id)
        .bind(&follower.event_id)
        .bind(&follower.follow_activity_uri)
        .bind(&follower.actor_uri)
        .bind(&follower.actor_json)
        .bind(&follower.name)
        .bind(follower.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_follower(
        &self,
        event_id: &str,
        actor_uri: &str,
    ) -> Result<Option<Follower>, AppError> {
        let follower = sqlx::query_as::<_, Follower>(
            "SELECT * FROM followers WHERE event_id = ? AND actor_uri = ?",
        )
        .bind(event_id)
        .bind(actor_uri)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follower)
    }

    pub async fn get_followers(&self, event_id: &str) -> Result<Vec<Follower>, AppError> {
        let followers = sqlx::query_as::<_, Follower>(
            "SELECT * FROM followers WHERE event_id = ? ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(followers)
    }

    /// Remove a follower, but only when the stored Follow activity id
    /// matches the one presented by the Undo.
    ///
    /// # Returns
    /// `true` if a row was removed; a mismatched credential removes nothing.
    pub async fn delete_follower_with_credential(
        &self,
        event_id: &str,
        actor_uri: &str,
        follow_activity_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM followers WHERE event_id = ? AND actor_uri = ? AND follow_activity_uri = ?",
        )
        .bind(event_id)
        .bind(actor_uri)
        .bind(follow_activity_uri)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_followers(&self) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM followers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    // =========================================================================
    // Outbound message log
    // =========================================================================

    /// Append an outbound activity to the event's message log.
    ///
    /// Idempotent on (id, event_id): redelivery of an already-logged
    /// activity keeps the original row.
    pub async fn insert_message(&self, message: &OutboundMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, event_id, content, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id, event_id) DO NOTHING
            "#,
        )
        .bind(&message.id)
        .bind(&message.event_id)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_message(
        &self,
        event_id: &str,
        id: &str,
    ) -> Result<Option<OutboundMessage>, AppError> {
        let message = sqlx::query_as::<_, OutboundMessage>(
            "SELECT * FROM messages WHERE event_id = ? AND id = ?",
        )
        .bind(event_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    // =========================================================================
    // Attendees
    // =========================================================================

    /// Insert an attendee unless the actor already has an RSVP.
    ///
    /// # Returns
    /// `true` if a row was inserted, `false` on a duplicate RSVP.
    pub async fn insert_attendee_if_absent(&self, attendee: &Attendee) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendees (
                id, event_id, actor_uri, name, visibility, approved, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_id, actor_uri) DO NOTHING
            "#,
        )
        .bind(&attendee.id)
        .bind(&attendee.event_id)
        .bind(&attendee.actor_uri)
        .bind(&attendee.name)
        .bind(&attendee.visibility)
        .bind(attendee.approved)
        .bind(attendee.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_attendee(
        &self,
        event_id: &str,
        actor_uri: &str,
    ) -> Result<Option<Attendee>, AppError> {
        let attendee = sqlx::query_as::<_, Attendee>(
            "SELECT * FROM attendees WHERE event_id = ? AND actor_uri = ?",
        )
        .bind(event_id)
        .bind(actor_uri)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attendee)
    }

    pub async fn get_attendees(&self, event_id: &str) -> Result<Vec<Attendee>, AppError> {
        let attendees = sqlx::query_as::<_, Attendee>(
            "SELECT * FROM attendees WHERE event_id = ? ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attendees)
    }

    /// Count attendees that hold a confirmed spot.
    ///
    /// Pending (unapproved) attendees do not count toward capacity.
    pub async fn count_approved_attendees(&self, event_id: &str) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM attendees WHERE event_id = ? AND approved = 1",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    pub async fn approve_attendee(
        &self,
        event_id: &str,
        attendee_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE attendees SET approved = 1 WHERE event_id = ? AND id = ?")
            .bind(event_id)
            .bind(attendee_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an attendee by their actor URI (Undo of an RSVP).
    pub async fn delete_attendee_by_actor(
        &self,
        event_id: &str,
        actor_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM attendees WHERE event_id = ? AND actor_uri = ?")
            .bind(event_id)
            .bind(actor_uri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove an attendee by row id (the one-click unattend link).
    pub async fn delete_attendee_by_id(
        &self,
        event_id: &str,
        attendee_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM attendees WHERE event_id = ? AND id = ?")
            .bind(event_id)
            .bind(attendee_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO comments (
                id, event_id, author_uri, author_name, content, activity_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.event_id)
        .bind(&comment.author_uri)
        .bind(&comment.author_name)
        .bind(&comment.content)
        .bind(&comment.activity_json)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_comments(&self, event_id: &str) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comments WHERE event_id = ? ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    /// Remove the comment whose originating activity object id matches,
    /// but only when the deleting actor authored it.
    ///
    /// # Returns
    /// `true` if exactly the matching comment was removed.
    pub async fn delete_comment_by_activity_object(
        &self,
        object_id: &str,
        author_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM comments
            WHERE json_extract(activity_json, '$.object.id') = ? AND author_uri = ?
            "#,
        )
        .bind(object_id)
        .bind(author_uri)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_comment(
        &self,
        event_id: &str,
        comment_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM comments WHERE event_id = ? AND id = ?")
            .bind(event_id)
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
