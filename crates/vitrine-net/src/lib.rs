// Connection management for the session relay: a background task owning
// the WebSocket, with reconnect scheduling and outbound buffering.

pub mod backoff;
pub mod link;

pub use backoff::Backoff;
pub use link::{spawn_link, LinkCommand, LinkConfig, LinkError, LinkEvent};
