//! Session state and its transition rules.
//!
//! All mutation goes through [`SessionState::apply`], a synchronous
//! function from (current state, event) to the next state plus the
//! updates a UI needs to re-render. Keeping the rules out of the socket
//! and rendering layers makes every behavior testable in isolation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use vitrine_shared::Envelope;

/// One visible entry in the session log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    /// A chat line from a participant.
    Chat {
        author: String,
        text: String,
        timestamp: DateTime<Utc>,
        /// Whether the line was authored under this session's name.
        from_self: bool,
    },
    /// A locally derived notice (join, disconnect, photo selection).
    System {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// An envelope of unknown type, carried unmodified for the UI to
    /// render or ignore.
    Raw { value: Value },
}

/// Inputs to the transition function.
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// The link completed its handshake.
    Opened,
    /// The link closed or was lost.
    Closed,
    /// An envelope arrived from the relay.
    Received(Envelope),
    /// A local upload or browse selection resolved to an absolute URL.
    PhotoChosen { url: String },
}

/// What changed, for UIs that render incrementally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUpdate {
    ConnectionChanged { connected: bool },
    MessageAppended { entry: LogEntry },
    PhotoChanged { url: String },
}

/// Client-local view of one shared session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    /// Display name this session stamps on outgoing envelopes.
    pub author: String,
    /// Append-only log. Never deduplicated: a duplicate envelope produces
    /// a duplicate entry.
    pub messages: Vec<LogEntry>,
    /// Absolute URL of the shared photo. The last selection processed
    /// wins, regardless of embedded timestamps.
    pub current_photo_url: Option<String>,
    /// True between a completed handshake and the next close.
    pub connected: bool,
}

impl SessionState {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            messages: Vec::new(),
            current_photo_url: None,
            connected: false,
        }
    }

    /// Advance the state by one event.
    ///
    /// Returns the updates in the order they should be rendered. Entries
    /// are only ever appended, never reordered or removed.
    pub fn apply(&mut self, event: StateEvent) -> Vec<SessionUpdate> {
        match event {
            StateEvent::Opened => {
                self.connected = true;
                let text = format!("You joined as {}", self.author);
                let entry = self.append_system(text);
                vec![
                    SessionUpdate::ConnectionChanged { connected: true },
                    SessionUpdate::MessageAppended { entry },
                ]
            }
            StateEvent::Closed => {
                self.connected = false;
                let entry = self.append_system("Disconnected from server".to_string());
                vec![
                    SessionUpdate::ConnectionChanged { connected: false },
                    SessionUpdate::MessageAppended { entry },
                ]
            }
            StateEvent::Received(envelope) => self.apply_envelope(envelope),
            StateEvent::PhotoChosen { url } => {
                self.current_photo_url = Some(url.clone());
                vec![SessionUpdate::PhotoChanged { url }]
            }
        }
    }

    fn apply_envelope(&mut self, envelope: Envelope) -> Vec<SessionUpdate> {
        match envelope {
            Envelope::Text(message) => {
                let entry = LogEntry::Chat {
                    from_self: message.author == self.author,
                    author: message.author,
                    text: message.text,
                    timestamp: message.timestamp,
                };
                self.messages.push(entry.clone());
                vec![SessionUpdate::MessageAppended { entry }]
            }
            Envelope::PhotoSelect(selection) => {
                let mut updates = Vec::new();
                // Selections with an empty URL still announce themselves
                // but leave the current photo alone.
                if !selection.url.is_empty() {
                    self.current_photo_url = Some(selection.url.clone());
                    updates.push(SessionUpdate::PhotoChanged {
                        url: selection.url,
                    });
                }
                let text = format!("{} selected a new photo", selection.author);
                let entry = self.append_system(text);
                updates.push(SessionUpdate::MessageAppended { entry });
                updates
            }
            Envelope::Other(value) => {
                let entry = LogEntry::Raw { value };
                self.messages.push(entry.clone());
                vec![SessionUpdate::MessageAppended { entry }]
            }
        }
    }

    fn append_system(&mut self, text: String) -> LogEntry {
        let entry = LogEntry::System {
            text,
            timestamp: Utc::now(),
        };
        self.messages.push(entry.clone());
        entry
    }
}
