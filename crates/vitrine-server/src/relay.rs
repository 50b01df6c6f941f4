//! Session relay: fans every text frame out to all connected clients.
//!
//! The relay never parses frames. Well-formed envelopes, future message
//! types, and garbage all travel byte-for-byte; interpretation is the
//! clients' concern. The origin receives its own frames back like any
//! other participant, which doubles as delivery confirmation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Frames queued per client before the relay starts dropping for it.
const CLIENT_QUEUE_CAPACITY: usize = 256;

/// Registry of connected clients in the single shared session.
#[derive(Clone)]
pub struct RelayHub {
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a connection. Returns its id and the frame queue its
    /// socket task drains.
    pub async fn join(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);

        let mut clients = self.clients.write().await;
        clients.insert(id, tx);

        info!(
            client = %id,
            connected = clients.len(),
            "Client joined session"
        );

        (id, rx)
    }

    pub async fn leave(&self, id: &Uuid) {
        let mut clients = self.clients.write().await;
        clients.remove(id);

        info!(
            client = %id,
            connected = clients.len(),
            "Client left session"
        );
    }

    /// Queue a frame for every connected client, the origin included.
    /// A client with a full queue misses the frame rather than stalling
    /// the rest of the session.
    pub async fn broadcast(&self, frame: &str) {
        let clients = self.clients.read().await;
        for (id, tx) in clients.iter() {
            if tx.try_send(frame.to_string()).is_err() {
                debug!(client = %id, "Dropping frame for slow client");
            }
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one client socket until it closes: incoming text frames go to
/// the hub, queued frames go down the socket. Binary frames are dropped;
/// the wire carries JSON text only.
pub async fn handle_socket(socket: WebSocket, hub: RelayHub) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut frames) = hub.join().await;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        debug!(client = %id, bytes = text.len(), "Relaying frame");
                        hub.broadcast(&text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(client = %id, "Dropping binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong is answered by the protocol layer.
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        debug!(client = %id, error = %error, "Socket error");
                        break;
                    }
                }
            }
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    hub.leave(&id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_client_including_origin() {
        let hub = RelayHub::new();
        let (_id1, mut rx1) = hub.join().await;
        let (_id2, mut rx2) = hub.join().await;

        hub.broadcast(r#"{"type":"text","author":"ana","text":"hi"}"#).await;

        let frame1 = rx1.recv().await.unwrap();
        let frame2 = rx2.recv().await.unwrap();
        assert_eq!(frame1, frame2);
        assert!(frame1.contains("\"ana\""));
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let hub = RelayHub::new();
        let (id1, mut rx1) = hub.join().await;
        let (_id2, mut rx2) = hub.join().await;
        assert_eq!(hub.client_count().await, 2);

        hub.leave(&id1).await;
        hub.broadcast("after").await;

        assert_eq!(hub.client_count().await, 1);
        assert_eq!(rx2.recv().await.unwrap(), "after");
        // The departed client's queue is closed, nothing was delivered.
        assert!(rx1.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_broadcast() {
        let hub = RelayHub::new();
        let (_slow, _rx_undrained) = hub.join().await;
        let (_live, mut rx_live) = hub.join().await;

        // Overfill the undrained queue; the drained client still gets
        // every frame.
        for i in 0..CLIENT_QUEUE_CAPACITY + 10 {
            hub.broadcast(&format!("frame-{i}")).await;
            assert_eq!(rx_live.recv().await.unwrap(), format!("frame-{i}"));
        }
    }
}
