pub mod activitypub;
pub mod events;
pub mod wellknown;
