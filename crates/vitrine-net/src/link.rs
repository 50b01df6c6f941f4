//! Session link: owns the WebSocket connection in a dedicated tokio task.
//!
//! External code communicates with the task through typed command and event
//! channels. The task drives an explicit lifecycle state machine
//! (`Disconnected -> Connecting -> Open -> Disconnected`) with capped
//! exponential backoff between attempts and a bounded buffer for envelopes
//! submitted while the link is down, flushed once the link reopens.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use vitrine_shared::constants::{BACKOFF_BASE_MS, BACKOFF_CAP_MS, OUTBOUND_BUFFER_CAPACITY};
use vitrine_shared::{Envelope, ProtocolError};

use crate::backoff::Backoff;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the link task.
#[derive(Debug)]
pub enum LinkCommand {
    /// Transmit an envelope; buffered while the link is down.
    Send(Envelope),
    /// Drop the current socket (if any), reset backoff, and reconnect now.
    Reconnect,
    /// Gracefully close the socket and terminate the task.
    Shutdown,
}

/// Events sent *from* the link task to the application.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The handshake completed; any buffered envelopes were flushed.
    Opened,
    /// The socket closed or failed; reconnection is scheduled.
    Closed,
    /// A well-formed envelope arrived. Malformed frames are dropped and
    /// logged, never delivered.
    Received(Envelope),
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Configuration for spawning a link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Full WebSocket URL of the relay, e.g. `ws://127.0.0.1:8080/ws`.
    pub ws_url: String,
    /// Envelopes held while the link is down (oldest dropped once full).
    pub outbound_capacity: usize,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Upper bound for reconnect delays.
    pub backoff_cap: Duration,
}

impl LinkConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            outbound_capacity: OUTBOUND_BUFFER_CAPACITY,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(BACKOFF_CAP_MS),
        }
    }
}

/// Spawn the link task for one relay endpoint.
///
/// Returns channels for sending commands and receiving events. The task
/// keeps reconnecting until [`LinkCommand::Shutdown`] is sent or every
/// command sender is dropped.
pub fn spawn_link(config: LinkConfig) -> (mpsc::Sender<LinkCommand>, mpsc::Receiver<LinkEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<LinkCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(256);

    tokio::spawn(async move {
        run_link(config, cmd_rx, event_tx).await;
        info!("Link task terminated");
    });

    (cmd_tx, event_rx)
}

// ---------------------------------------------------------------------------
// Lifecycle state machine
// ---------------------------------------------------------------------------

enum LinkState {
    /// Waiting out the backoff delay before the next attempt.
    Disconnected,
    Connecting,
    Open(WsStream),
}

enum OpenExit {
    /// Socket failed or the server closed it.
    Lost,
    /// Manual reconnect requested.
    Reconnect,
    Shutdown,
}

enum WaitExit {
    Retry,
    Shutdown,
}

async fn run_link(
    config: LinkConfig,
    mut cmd_rx: mpsc::Receiver<LinkCommand>,
    event_tx: mpsc::Sender<LinkEvent>,
) {
    let mut backoff = Backoff::new(config.backoff_base, config.backoff_cap);
    let mut outbound: VecDeque<Envelope> = VecDeque::new();
    let mut state = LinkState::Connecting;

    loop {
        state = match state {
            LinkState::Connecting => {
                debug!(url = %config.ws_url, "Connecting");
                let connect = connect_async(config.ws_url.clone());
                tokio::pin!(connect);
                // Keep absorbing commands while the handshake is in flight.
                loop {
                    tokio::select! {
                        attempt = &mut connect => break match attempt {
                            Ok((socket, _response)) => {
                                backoff.reset();
                                info!(url = %config.ws_url, "Link open");
                                let _ = event_tx.send(LinkEvent::Opened).await;
                                LinkState::Open(socket)
                            }
                            Err(e) => {
                                warn!(url = %config.ws_url, error = %e, "Connect failed");
                                LinkState::Disconnected
                            }
                        },
                        cmd = cmd_rx.recv() => match cmd {
                            Some(LinkCommand::Send(envelope)) => {
                                push_bounded(&mut outbound, envelope, config.outbound_capacity);
                            }
                            Some(LinkCommand::Reconnect) => {
                                // Already connecting.
                            }
                            Some(LinkCommand::Shutdown) | None => {
                                info!("Link shutdown requested");
                                return;
                            }
                        }
                    }
                }
            }

            LinkState::Open(socket) => {
                let exit = drive_open(
                    socket,
                    &mut cmd_rx,
                    &event_tx,
                    &mut outbound,
                    config.outbound_capacity,
                )
                .await;
                let _ = event_tx.send(LinkEvent::Closed).await;
                match exit {
                    OpenExit::Lost => LinkState::Disconnected,
                    OpenExit::Reconnect => {
                        backoff.reset();
                        LinkState::Connecting
                    }
                    OpenExit::Shutdown => return,
                }
            }

            LinkState::Disconnected => {
                match wait_backoff(
                    &mut backoff,
                    &mut cmd_rx,
                    &mut outbound,
                    config.outbound_capacity,
                )
                .await
                {
                    WaitExit::Retry => LinkState::Connecting,
                    WaitExit::Shutdown => return,
                }
            }
        };
    }
}

/// Run one open socket until it is lost, replaced, or shut down.
async fn drive_open(
    socket: WsStream,
    cmd_rx: &mut mpsc::Receiver<LinkCommand>,
    event_tx: &mpsc::Sender<LinkEvent>,
    outbound: &mut VecDeque<Envelope>,
    capacity: usize,
) -> OpenExit {
    let (mut sink, mut source) = socket.split();

    if !outbound.is_empty() {
        info!(count = outbound.len(), "Flushing envelopes buffered while down");
    }
    while let Some(envelope) = outbound.pop_front() {
        match transmit(&mut sink, &envelope).await {
            Ok(()) => {}
            Err(LinkError::Protocol(e)) => {
                error!(error = %e, "Dropping unserializable envelope");
            }
            Err(LinkError::WebSocket(e)) => {
                warn!(error = %e, "Flush failed, keeping remaining envelopes");
                outbound.push_front(envelope);
                return OpenExit::Lost;
            }
        }
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(LinkCommand::Send(envelope)) => {
                    match transmit(&mut sink, &envelope).await {
                        Ok(()) => {}
                        Err(LinkError::Protocol(e)) => {
                            error!(error = %e, "Dropping unserializable envelope");
                        }
                        Err(LinkError::WebSocket(e)) => {
                            warn!(error = %e, "Send failed, buffering for reconnect");
                            push_bounded(outbound, envelope, capacity);
                            return OpenExit::Lost;
                        }
                    }
                }
                Some(LinkCommand::Reconnect) => {
                    info!("Manual reconnect requested");
                    let _ = sink.send(Message::Close(None)).await;
                    return OpenExit::Reconnect;
                }
                Some(LinkCommand::Shutdown) | None => {
                    info!("Link shutdown requested");
                    let _ = sink.send(Message::Close(None)).await;
                    return OpenExit::Shutdown;
                }
            },

            frame = source.next() => match frame {
                Some(Ok(Message::Text(raw))) => match Envelope::from_frame(raw.as_str()) {
                    Ok(envelope) => {
                        let _ = event_tx.send(LinkEvent::Received(envelope)).await;
                    }
                    Err(e) => {
                        warn!(error = %e, len = raw.len(), "Dropping malformed frame");
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    info!("Server closed the connection");
                    return OpenExit::Lost;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by the transport, binary ignored.
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Socket error");
                    return OpenExit::Lost;
                }
                None => {
                    info!("Socket stream ended");
                    return OpenExit::Lost;
                }
            }
        }
    }
}

/// Sit out the backoff delay, still absorbing commands: sends are buffered
/// and a manual reconnect cuts the wait short.
async fn wait_backoff(
    backoff: &mut Backoff,
    cmd_rx: &mut mpsc::Receiver<LinkCommand>,
    outbound: &mut VecDeque<Envelope>,
    capacity: usize,
) -> WaitExit {
    let delay = backoff.next_delay();
    debug!(
        delay_ms = delay.as_millis() as u64,
        attempt = backoff.attempts(),
        "Reconnect scheduled"
    );
    let deadline = Instant::now() + delay;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return WaitExit::Retry,
            cmd = cmd_rx.recv() => match cmd {
                Some(LinkCommand::Send(envelope)) => {
                    push_bounded(outbound, envelope, capacity);
                }
                Some(LinkCommand::Reconnect) => {
                    backoff.reset();
                    return WaitExit::Retry;
                }
                Some(LinkCommand::Shutdown) | None => {
                    info!("Link shutdown requested");
                    return WaitExit::Shutdown;
                }
            }
        }
    }
}

async fn transmit(sink: &mut WsSink, envelope: &Envelope) -> Result<(), LinkError> {
    let frame = envelope.to_frame()?;
    sink.send(Message::text(frame)).await?;
    Ok(())
}

/// Push to the outbound buffer, dropping the oldest entry once `capacity`
/// is reached. No network write happens here.
fn push_bounded(outbound: &mut VecDeque<Envelope>, envelope: Envelope, capacity: usize) {
    if capacity == 0 {
        return;
    }
    if outbound.len() >= capacity {
        outbound.pop_front();
        warn!(capacity, "Outbound buffer full, dropped oldest envelope");
    }
    outbound.push_back(envelope);
}
