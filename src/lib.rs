//! Client-side synchronization for admin moderation queues: paged fetches
//! from the moderation API, a generation-checked page cache, an
//! infinite-scroll trigger, and the list view that ties them together.

pub mod client;
pub mod config;
pub mod emoji;
pub mod error;
pub mod model;
pub mod scroll;
pub mod store;
pub mod view;
