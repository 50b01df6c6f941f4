// Shared protocol surface: the session envelope grammar, the wire DTOs of
// the photo endpoints, and the constants both sides of the protocol use.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::{Envelope, PhotoSelect, TextMessage};
pub use error::ProtocolError;
pub use types::{PhotoListing, PhotoRef, UploadResponse};
