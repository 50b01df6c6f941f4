// Embeddable client core: the reconnecting link, the photo gateway, and
// the session state transitions glued into one handle a UI can drive.

pub mod config;
pub mod session;
pub mod state;

pub use config::ClientConfig;
pub use session::{Session, SessionError};
pub use state::{LogEntry, SessionState, SessionUpdate, StateEvent};
