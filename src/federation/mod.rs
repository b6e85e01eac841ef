//! ActivityPub federation
//!
//! Each hosted event is its own actor. This module owns everything that
//! crosses the federation boundary: HTTP signatures, signed fetches,
//! activity construction, inbound dispatch, RSVP rules and outbound
//! delivery.

pub mod builder;
pub mod delivery;
pub mod fetch;
pub mod inbox;
pub mod rsvp;
pub mod signature;

pub use delivery::{Delivery, DeliveryOutcome};
pub use fetch::{RemoteActor, SignedFetcher, fetch_public_key};
pub use inbox::{InboxActivity, InboxProcessor};
pub use rsvp::PollChoice;
pub use signature::{
    extract_actor_domain, extract_signature_key_id, key_id_matches_actor, sign_request,
    verify_signature,
};
