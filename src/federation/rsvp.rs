//! RSVP business rules
//!
//! Poll votes arrive as Notes whose `name` is the literal option text.
//! The three options are matched exactly; anything else is an invalid
//! response. Capacity is counted over approved attendees only, and the
//! same check gates both the poll path and the direct-Accept path.

use crate::data::{AttendeeVisibility, Event};
use crate::federation::builder::{OPTION_ATTEND_PRIVATE, OPTION_ATTEND_PUBLIC, OPTION_DECLINE};

/// A recognized poll answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollChoice {
    Attend(AttendeeVisibility),
    Decline,
}

impl PollChoice {
    /// Match a Note's `name` against the option texts, byte-for-byte.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            OPTION_ATTEND_PUBLIC => Some(Self::Attend(AttendeeVisibility::Public)),
            OPTION_ATTEND_PRIVATE => Some(Self::Attend(AttendeeVisibility::Private)),
            OPTION_DECLINE => Some(Self::Decline),
            _ => None,
        }
    }
}

/// Whether the event can take another approved attendee.
///
/// Unlimited when `max_attendees` is unset. Pending attendees hold no
/// spot, so they are excluded from `approved_count` by the caller.
pub fn has_capacity(event: &Event, approved_count: i64) -> bool {
    match event.max_attendees {
        Some(max) => approved_count < max,
        None => true,
    }
}
