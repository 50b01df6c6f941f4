//! The session handle: spawns the link, pumps its events through the
//! state transitions, and exposes the operations a UI binds to.

use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use vitrine_media::{MediaError, PhotoGateway, UploadedPhoto};
use vitrine_net::{spawn_link, LinkCommand, LinkConfig, LinkEvent};
use vitrine_shared::{Envelope, PhotoRef};

use crate::config::ClientConfig;
use crate::state::{SessionState, SessionUpdate, StateEvent};

/// Errors surfaced by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The background link task is gone; the session is unusable.
    #[error("Session link task has terminated")]
    LinkClosed,

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Handle to one live session.
///
/// Cheap to clone; every clone drives the same connection and state. The
/// update stream returned by [`Session::connect`] is what an embedding UI
/// renders from, while [`Session::snapshot`] serves full redraws.
#[derive(Clone)]
pub struct Session {
    author: String,
    state: Arc<Mutex<SessionState>>,
    cmd_tx: mpsc::Sender<LinkCommand>,
    update_tx: mpsc::Sender<SessionUpdate>,
    gateway: PhotoGateway,
}

impl Session {
    /// Connect to the relay under `author` and start the event pump.
    ///
    /// The connection is established in the background; the first
    /// [`SessionUpdate::ConnectionChanged`] on the returned stream marks
    /// the completed handshake.
    pub fn connect(
        config: ClientConfig,
        author: impl Into<String>,
    ) -> (Session, mpsc::Receiver<SessionUpdate>) {
        let author = author.into();
        let state = Arc::new(Mutex::new(SessionState::new(author.clone())));
        let gateway = PhotoGateway::new(config.http_base);

        let (cmd_tx, link_events) = spawn_link(LinkConfig::new(config.ws_url.clone()));
        let (update_tx, update_rx) = mpsc::channel::<SessionUpdate>(256);
        tokio::spawn(pump_events(link_events, state.clone(), update_tx.clone()));

        info!(author = %author, ws_url = %config.ws_url, "Session started");

        let session = Session {
            author,
            state,
            cmd_tx,
            update_tx,
            gateway,
        };
        (session, update_rx)
    }

    /// The display name this session stamps on outgoing envelopes.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Send a chat line. Empty or whitespace-only text is a no-op.
    ///
    /// The line is not echoed locally; it appears in the log when the
    /// relay fans it back, same as for every other participant.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        self.transmit(Envelope::text(self.author.clone(), trimmed))
            .await
    }

    /// Share a photo already stored on the relay: update the local view
    /// immediately, then broadcast the selection.
    pub async fn select_photo(&self, absolute_url: &str) -> Result<(), SessionError> {
        self.apply_local(StateEvent::PhotoChosen {
            url: absolute_url.to_string(),
        })
        .await;
        self.transmit(Envelope::photo_select(self.author.clone(), absolute_url))
            .await
    }

    /// Upload photo bytes, set the shared photo to the stored URL, and
    /// broadcast a single selection envelope.
    ///
    /// On upload failure the session state is left untouched. Returns the
    /// absolute URL of the stored photo.
    pub async fn upload_photo_bytes(&self, data: bytes::Bytes) -> Result<String, SessionError> {
        let uploaded = self.gateway.upload_bytes(data).await?;
        self.finish_selection(uploaded).await
    }

    /// Read a photo from disk and share it, as [`Session::upload_photo_bytes`].
    pub async fn upload_photo_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<String, SessionError> {
        let uploaded = self.gateway.upload_file(path).await?;
        self.finish_selection(uploaded).await
    }

    /// Fetch the browsing list of photos stored on the relay.
    pub async fn browse_photos(&self) -> Result<Vec<PhotoRef>, SessionError> {
        Ok(self.gateway.list().await?)
    }

    /// Resolve a listed photo's server-relative URL for selection.
    pub fn photo_url(&self, photo: &PhotoRef) -> String {
        self.gateway.absolute_url(&photo.url)
    }

    /// Drop the current socket and reconnect immediately, skipping any
    /// pending backoff delay.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.cmd_tx
            .send(LinkCommand::Reconnect)
            .await
            .map_err(|_| SessionError::LinkClosed)
    }

    /// Close the socket and stop the background tasks.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.cmd_tx
            .send(LinkCommand::Shutdown)
            .await
            .map_err(|_| SessionError::LinkClosed)
    }

    /// Copy of the current state for a full redraw.
    pub fn snapshot(&self) -> SessionState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn finish_selection(&self, uploaded: UploadedPhoto) -> Result<String, SessionError> {
        self.apply_local(StateEvent::PhotoChosen {
            url: uploaded.absolute_url.clone(),
        })
        .await;
        self.transmit(Envelope::photo_select(
            self.author.clone(),
            uploaded.absolute_url.clone(),
        ))
        .await?;
        Ok(uploaded.absolute_url)
    }

    async fn apply_local(&self, event: StateEvent) {
        apply_and_forward(&self.state, &self.update_tx, event).await;
    }

    async fn transmit(&self, envelope: Envelope) -> Result<(), SessionError> {
        self.cmd_tx
            .send(LinkCommand::Send(envelope))
            .await
            .map_err(|_| SessionError::LinkClosed)
    }
}

/// Forward link events through the state transitions to the UI stream.
async fn pump_events(
    mut link_events: mpsc::Receiver<LinkEvent>,
    state: Arc<Mutex<SessionState>>,
    update_tx: mpsc::Sender<SessionUpdate>,
) {
    while let Some(event) = link_events.recv().await {
        let state_event = match event {
            LinkEvent::Opened => StateEvent::Opened,
            LinkEvent::Closed => StateEvent::Closed,
            LinkEvent::Received(envelope) => StateEvent::Received(envelope),
        };
        apply_and_forward(&state, &update_tx, state_event).await;
    }
    info!("Session event pump ended");
}

/// Run one event through the transition function and push the resulting
/// updates to the UI stream. The state lock is released before any await.
async fn apply_and_forward(
    state: &Arc<Mutex<SessionState>>,
    update_tx: &mpsc::Sender<SessionUpdate>,
    event: StateEvent,
) {
    let updates = match state.lock() {
        Ok(mut guard) => guard.apply(event),
        Err(error) => {
            warn!(error = %error, "Session state lock poisoned");
            return;
        }
    };
    for update in updates {
        // A dropped receiver means the UI went away; state stays current
        // for snapshot readers either way.
        let _ = update_tx.send(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LogEntry;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    fn dead_config() -> ClientConfig {
        // Nothing listens on the discard port; the link keeps retrying in
        // the background while local operations stay usable.
        ClientConfig {
            http_base: "http://127.0.0.1:9".to_string(),
            ws_url: "ws://127.0.0.1:9/ws".to_string(),
        }
    }

    async fn recv_update(updates: &mut mpsc::Receiver<SessionUpdate>) -> SessionUpdate {
        tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("timed out waiting for update")
            .expect("update stream closed")
    }

    #[tokio::test]
    async fn test_blank_text_is_a_no_op() {
        let (session, _updates) = Session::connect(dead_config(), "ana");

        session.send_text("   ").await.unwrap();
        session.send_text("").await.unwrap();

        assert!(session.snapshot().messages.is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_starts_disconnected() {
        let (session, _updates) = Session::connect(dead_config(), "ana");

        assert_eq!(session.author(), "ana");
        let snapshot = session.snapshot();
        assert!(!snapshot.connected);
        assert!(snapshot.current_photo_url.is_none());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_select_photo_updates_local_state_while_offline() {
        let (session, mut updates) = Session::connect(dead_config(), "ana");

        session
            .select_photo("http://relay/photos/a.jpg")
            .await
            .unwrap();

        assert_eq!(
            session.snapshot().current_photo_url.as_deref(),
            Some("http://relay/photos/a.jpg")
        );
        match recv_update(&mut updates).await {
            SessionUpdate::PhotoChanged { url } => {
                assert_eq!(url, "http://relay/photos/a.jpg");
            }
            other => panic!("unexpected update: {other:?}"),
        }
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_updates_flow_from_relay_to_ui_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            let frame = Envelope::text("bo", "hello").to_frame().unwrap();
            socket.send(Message::text(frame)).await.unwrap();
            while socket.next().await.is_some() {}
        });

        let config = ClientConfig {
            http_base: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/ws"),
        };
        let (session, mut updates) = Session::connect(config, "ana");

        match recv_update(&mut updates).await {
            SessionUpdate::ConnectionChanged { connected } => assert!(connected),
            other => panic!("unexpected update: {other:?}"),
        }
        match recv_update(&mut updates).await {
            SessionUpdate::MessageAppended {
                entry: LogEntry::System { text, .. },
            } => assert_eq!(text, "You joined as ana"),
            other => panic!("unexpected update: {other:?}"),
        }
        match recv_update(&mut updates).await {
            SessionUpdate::MessageAppended {
                entry:
                    LogEntry::Chat {
                        author,
                        text,
                        from_self,
                        ..
                    },
            } => {
                assert_eq!(author, "bo");
                assert_eq!(text, "hello");
                assert!(!from_self);
            }
            other => panic!("unexpected update: {other:?}"),
        }

        let snapshot = session.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.messages.len(), 2);
        session.close().await.unwrap();
    }
}
