//! Client sessions: read/write pumps, frame reassembly, keep-alive pings.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode, Control, Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wsprint_protocol::OutboundResponse;

use crate::SEND_BUFFER_SIZE;
use crate::dispatcher::Dispatcher;
use crate::frame::{FrameAccumulator, FrameError, FrameEvent, FrameKind};

/// Per-session limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Largest reassembled text message, in bytes.
    pub max_message_size: usize,
    /// Read deadline; any inbound frame (including pongs) resets it.
    pub idle_timeout: Duration,
    /// Interval between keep-alive pings.
    pub ping_period: Duration,
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The client sent a close frame.
    ClientClosed,
    /// The TCP stream ended without a close handshake.
    StreamEnded,
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
    /// A message exceeded the size limit.
    MessageTooLarge,
    /// A text message was not valid UTF-8.
    InvalidPayload,
    /// A socket read failed.
    TransportError,
    /// The write pump is gone, so responses can no longer be delivered.
    WriterGone,
    /// Server shutdown.
    Shutdown,
}

impl SessionExit {
    /// Close frame to send on the way out, if the server initiates the
    /// close. Client-initiated closes are answered by the transport.
    fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            Self::MessageTooLarge => (CloseCode::Size, "message too large"),
            Self::InvalidPayload => (CloseCode::Invalid, "invalid utf-8"),
            Self::IdleTimeout => (CloseCode::Away, "idle timeout"),
            Self::Shutdown => (CloseCode::Away, "server shutting down"),
            _ => return None,
        };
        Some(CloseFrame {
            code,
            reason: String::from(reason).into(),
        })
    }
}

/// Handle for queueing frames to the client.
///
/// Cloneable handle over an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

/// Error returned when a response cannot be queued.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to serialize response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("send failed: connection closed")]
    Closed,
}

impl Sender {
    /// Queues a response as a JSON text frame.
    ///
    /// Waits for buffer space rather than dropping: every response the
    /// dispatcher produces must reach the client.
    pub async fn send_response(&self, response: &OutboundResponse) -> Result<(), SendError> {
        let json = serde_json::to_string(response)?;
        self.tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|_| SendError::Closed)
    }

    async fn send_close(&self, frame: CloseFrame) -> Result<(), SendError> {
        self.tx
            .send(WsMessage::Close(Some(frame)))
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Returns `true` if the write pump is still running.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// One accepted client connection.
pub struct Session {
    id: Uuid,
    peer_addr: SocketAddr,
    state: SessionState,
}

impl Session {
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            state: SessionState::AwaitingHandshake,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "session state");
        self.state = next;
    }

    /// Services an upgraded WebSocket until it closes.
    ///
    /// Messages are handled strictly in arrival order: the next frame is
    /// not read until the previous message's response is queued.
    pub async fn run<S>(
        mut self,
        ws_stream: S,
        dispatcher: Arc<Dispatcher>,
        settings: SessionSettings,
        cancel: CancellationToken,
    ) -> SessionExit
    where
        S: futures_util::Stream<Item = Result<WsMessage, WsError>>
            + futures_util::Sink<WsMessage, Error = WsError>
            + Send
            + 'static,
    {
        self.transition(SessionState::Open);
        tracing::info!(session = %self.id, peer = %self.peer_addr, "client connected");

        let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
        let sender = Sender { tx };
        let (ws_sink, mut ws_stream) = ws_stream.split();

        let writer: JoinHandle<()> = tokio::spawn(write_pump(
            ws_sink,
            rx,
            settings.ping_period,
            cancel.clone(),
        ));

        let exit = read_pump(
            &mut ws_stream,
            &sender,
            &dispatcher,
            settings,
            &cancel,
            self.id,
        )
        .await;

        self.transition(SessionState::Closing);
        if let Some(frame) = exit.close_frame() {
            if !cancel.is_cancelled() {
                let _ = sender.send_close(frame).await;
            }
        }

        // Dropping the last sender lets the write pump drain and close.
        drop(sender);
        if let Err(e) = writer.await {
            tracing::error!(session = %self.id, "write pump panicked: {e}");
        }

        self.transition(SessionState::Closed);
        tracing::info!(session = %self.id, peer = %self.peer_addr, reason = ?exit, "client disconnected");
        exit
    }
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<WsMessage>,
    ping_period: Duration,
    cancel: CancellationToken,
) where
    S: futures_util::Sink<WsMessage, Error = WsError> + Send + Unpin,
{
    let start = tokio::time::Instant::now() + ping_period;
    let mut ping_interval = tokio::time::interval_at(start, ping_period);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let frame = SessionExit::Shutdown.close_frame();
                let _ = sink.send(WsMessage::Close(frame)).await;
                break;
            }

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::debug!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::debug!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reassembles frames and dispatches complete messages.
async fn read_pump<S>(
    stream: &mut S,
    sender: &Sender,
    dispatcher: &Dispatcher,
    settings: SessionSettings,
    cancel: &CancellationToken,
    session: Uuid,
) -> SessionExit
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Send + Unpin,
{
    let mut frames = FrameAccumulator::new(settings.max_message_size);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return SessionExit::Shutdown,
            next = tokio::time::timeout(settings.idle_timeout, stream.next()) => next,
        };

        let ws_msg = match next {
            Err(_) => {
                tracing::warn!(%session, "no traffic for {:?}, closing", settings.idle_timeout);
                return SessionExit::IdleTimeout;
            }
            Ok(None) => return SessionExit::StreamEnded,
            Ok(Some(Err(e))) => return transport_exit(session, e),
            Ok(Some(Ok(ws_msg))) => ws_msg,
        };

        let Some((kind, payload, is_final)) = classify(&ws_msg) else {
            continue;
        };

        match frames.push(kind, payload, is_final) {
            Ok(FrameEvent::Message(text)) => {
                let response = tokio::select! {
                    _ = cancel.cancelled() => return SessionExit::Shutdown,
                    response = dispatcher.handle_message(&text) => response,
                };
                if let Some(response) = response {
                    if let Err(e) = sender.send_response(&response).await {
                        tracing::warn!(%session, "could not queue response: {e}");
                        return SessionExit::WriterGone;
                    }
                }
            }
            Ok(FrameEvent::Close) => {
                tracing::debug!(%session, "received close frame");
                return SessionExit::ClientClosed;
            }
            Ok(FrameEvent::Pending | FrameEvent::Ignored) => {}
            Err(e @ FrameError::TooLarge { .. }) => {
                tracing::warn!(%session, "{e}, closing");
                return SessionExit::MessageTooLarge;
            }
            Err(e @ FrameError::InvalidUtf8(_)) => {
                tracing::warn!(%session, "{e}, closing");
                return SessionExit::InvalidPayload;
            }
            Err(e @ FrameError::UnexpectedContinuation) => {
                tracing::warn!(%session, "dropping frame: {e}");
            }
        }
    }
}

/// Maps a transport message onto a frame for the accumulator.
///
/// tokio-tungstenite joins fragments and checks UTF-8 before a message
/// reaches the read pump, so a socket only ever yields whole, final
/// messages here. `Frame` items come from streams that surface raw frames.
fn classify(msg: &WsMessage) -> Option<(FrameKind, &[u8], bool)> {
    match msg {
        WsMessage::Text(text) => Some((FrameKind::Text, text.as_bytes(), true)),
        WsMessage::Binary(data) => Some((FrameKind::Binary, &data[..], true)),
        WsMessage::Ping(data) => Some((FrameKind::Ping, &data[..], true)),
        WsMessage::Pong(data) => Some((FrameKind::Pong, &data[..], true)),
        WsMessage::Close(_) => Some((FrameKind::Close, &[][..], true)),
        WsMessage::Frame(frame) => {
            let header = frame.header();
            let kind = match header.opcode {
                OpCode::Data(Data::Text) => FrameKind::Text,
                OpCode::Data(Data::Binary) => FrameKind::Binary,
                OpCode::Data(Data::Continue) => FrameKind::Continuation,
                OpCode::Control(Control::Close) => FrameKind::Close,
                OpCode::Control(Control::Ping) => FrameKind::Ping,
                OpCode::Control(Control::Pong) => FrameKind::Pong,
                _ => return None,
            };
            Some((kind, &frame.payload()[..], header.is_final))
        }
    }
}

fn transport_exit(session: Uuid, error: WsError) -> SessionExit {
    match error {
        WsError::Capacity(e) => {
            tracing::warn!(%session, "message rejected by transport: {e}");
            SessionExit::MessageTooLarge
        }
        // The stream is fused after any error, so the session cannot go on.
        WsError::Utf8 => {
            tracing::warn!(%session, "text message is not valid UTF-8, closing");
            SessionExit::InvalidPayload
        }
        WsError::ConnectionClosed | WsError::AlreadyClosed => SessionExit::StreamEnded,
        e => {
            tracing::warn!(%session, "read error: {e}");
            SessionExit::TransportError
        }
    }
}
