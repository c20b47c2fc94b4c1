//! Print WebSocket server.
//!
//! Listens on a TCP port, upgrades every incoming connection to WebSocket
//! (any request path) and runs each client session in its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use wsprint_protocol::constants::{
    DEFAULT_HOST, DEFAULT_PORT, WS_IDLE_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD,
};

use crate::ServerError;
use crate::connection::{Session, SessionSettings};
use crate::dispatcher::Dispatcher;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Largest accepted message, in bytes.
    pub max_message_size: usize,
    /// Read deadline per session; also bounds the WebSocket handshake.
    pub idle_timeout: Duration,
    /// Keep-alive ping interval.
    pub ping_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            max_message_size: WS_MAX_MESSAGE_SIZE,
            idle_timeout: WS_IDLE_TIMEOUT,
            ping_period: WS_PING_PERIOD,
        }
    }
}

impl ServerConfig {
    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_message_size: self.max_message_size,
            idle_timeout: self.idle_timeout,
            ping_period: self.ping_period,
        }
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_message_size);
        ws_config.max_frame_size = Some(self.max_message_size);
        ws_config
    }
}

/// The print WebSocket server.
///
/// Sessions are independent; they share only the dispatcher and, through
/// it, the serialized printer.
pub struct PrintServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    sessions: TaskTracker,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl PrintServer {
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            cancel: CancellationToken::new(),
            sessions: TaskTracker::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of connections currently being served (including ones still
    /// in the handshake).
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Gracefully shuts down the server and every open session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown) is called.
    ///
    /// Returns once the listener is closed and all sessions have finished.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("print server listening on ws://{local_addr}/");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            self.sessions.spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        self.sessions.close();
        self.sessions.wait().await;
        tracing::info!("all sessions closed");
        Ok(())
    }

    /// Handles a single TCP connection: upgrades to WS and runs the session.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let session = Session::new(peer_addr);
        tracing::debug!(session = %session.id(), %peer_addr, "tcp connection accepted");

        let handshake = tokio::time::timeout(
            self.config.idle_timeout,
            accept_async_with_config(stream, Some(self.config.ws_config())),
        );
        let ws_stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            result = handshake => result.map_err(|_| ServerError::HandshakeTimeout)??,
        };

        session
            .run(
                ws_stream,
                Arc::clone(&self.dispatcher),
                self.config.session_settings(),
                self.cancel.child_token(),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ReplyPolicy;
    use crate::printer::SharedPrinter;
    use crate::test_support::{RecordingPrinter, print_message};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::tungstenite::protocol::frame::Frame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode, Data, OpCode};
    use wsprint_printer::PageBounds;
    use wsprint_protocol::{OutboundResponse, ResponseAction};

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn start(
        config: ServerConfig,
        sink: &Arc<RecordingPrinter>,
        policy: ReplyPolicy,
    ) -> (Arc<PrintServer>, tokio::task::JoinHandle<()>, String) {
        let printer = SharedPrinter::new(sink.clone(), Duration::from_secs(5));
        let dispatcher = Dispatcher::new(printer, PageBounds::default(), policy);
        let server = PrintServer::new(config, dispatcher);
        let server2 = Arc::clone(&server);

        let handle = tokio::spawn(async move {
            server2.run().await.unwrap();
        });

        // Wait for the server to bind.
        let port = loop {
            let p = server.port().await;
            if p > 0 {
                break p;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        (server, handle, format!("ws://127.0.0.1:{port}/"))
    }

    async fn send_text(ws: &mut Client, text: String) {
        ws.send(WsMessage::Text(text.into())).await.unwrap();
    }

    /// Next text response, skipping control frames. `None` on close, error
    /// or timeout.
    async fn recv_response(ws: &mut Client, wait: Duration) -> Option<OutboundResponse> {
        tokio::time::timeout(wait, async {
            while let Some(frame) = ws.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
                    Ok(WsMessage::Close(_)) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    #[tokio::test]
    async fn server_binds_dynamic_port() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, _) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        assert!(server.port().await > 0);
        assert_eq!(server.active_sessions(), 0);

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn print_roundtrip() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        send_text(&mut ws, print_message("t.png")).await;

        let resp = recv_response(&mut ws, Duration::from_secs(5)).await.unwrap();
        assert_eq!(resp.action, ResponseAction::PrintSuccess);
        assert_eq!(resp.file_name, None);

        let jobs = sink.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!((jobs[0].width, jobs[0].height), (10, 10));
        assert_eq!(jobs[0].document_name, "t.png");

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_action_gets_no_reply() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        send_text(&mut ws, r#"{"action":"ping"}"#.into()).await;

        assert!(
            recv_response(&mut ws, Duration::from_millis(300))
                .await
                .is_none()
        );
        assert!(sink.jobs().is_empty());

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn session_survives_malformed_message() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        send_text(&mut ws, "{this is not json".into()).await;
        send_text(&mut ws, print_message("after.png")).await;

        // The only response belongs to the second message.
        let resp = recv_response(&mut ws, Duration::from_secs(5)).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(sink.jobs()[0].document_name, "after.png");

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_base64_gets_error_reply() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let msg = r#"{"action":"print","imageData":"***","fileName":"t.png"}"#;
        send_text(&mut ws, msg.into()).await;

        let resp = recv_response(&mut ws, Duration::from_secs(5)).await.unwrap();
        assert_eq!(resp.action, ResponseAction::Error);
        assert!(!resp.detail.is_empty());
        assert!(sink.jobs().is_empty());

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn responses_follow_request_order() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Verbose).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        send_text(&mut ws, print_message("1.png")).await;
        send_text(&mut ws, r#"{"action":"nope"}"#.into()).await;
        send_text(&mut ws, print_message("3.png")).await;

        let wait = Duration::from_secs(5);
        assert!(recv_response(&mut ws, wait).await.unwrap().is_success());
        let second = recv_response(&mut ws, wait).await.unwrap();
        assert_eq!(second, OutboundResponse::error("unsupported action: nope"));
        assert!(recv_response(&mut ws, wait).await.unwrap().is_success());

        let names: Vec<_> = sink.jobs().into_iter().map(|j| j.document_name).collect();
        assert_eq!(names, ["1.png", "3.png"]);

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn serves_concurrent_sessions() {
        let sink = Arc::new(RecordingPrinter::new().with_delay(Duration::from_millis(20)));
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let mut clients = Vec::new();
        for i in 0..3 {
            let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
            send_text(&mut ws, print_message(&format!("{i}.png"))).await;
            clients.push(ws);
        }
        for ws in clients.iter_mut() {
            let resp = recv_response(ws, Duration::from_secs(5)).await.unwrap();
            assert!(resp.is_success());
        }

        assert_eq!(sink.jobs().len(), 3);
        assert_eq!(sink.max_in_flight(), 1);

        drop(clients);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn fragmented_message_is_reassembled() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let message = print_message("frames.png");
        let bytes = message.as_bytes();
        let (a, b) = (bytes.len() / 3, 2 * bytes.len() / 3);
        let frames = [
            (&bytes[..a], Data::Text, false),
            (&bytes[a..b], Data::Continue, false),
            (&bytes[b..], Data::Continue, true),
        ];
        for (chunk, opcode, fin) in frames {
            let frame = Frame::message(chunk.to_vec(), OpCode::Data(opcode), fin);
            ws.send(WsMessage::Frame(frame)).await.unwrap();
        }

        let resp = recv_response(&mut ws, Duration::from_secs(5)).await.unwrap();
        assert!(resp.is_success());
        let jobs = sink.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].document_name, "frames.png");

        drop(ws);
        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_utf8_closes_with_1007() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let frame = Frame::message(vec![0xff, 0xfe, b'{'], OpCode::Data(Data::Text), true);
        ws.send(WsMessage::Frame(frame)).await.unwrap();

        let close = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(frame) = ws.next().await {
                match frame {
                    Ok(WsMessage::Close(frame)) => return frame,
                    Ok(_) => continue,
                    Err(e) => panic!("connection dropped without a close frame: {e}"),
                }
            }
            None
        })
        .await
        .unwrap();
        assert_eq!(close.map(|f| f.code), Some(CloseCode::Invalid));
        assert!(sink.jobs().is_empty());

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_message_closes_session() {
        let sink = Arc::new(RecordingPrinter::new());
        let config = ServerConfig {
            max_message_size: 64,
            ..test_config()
        };
        let (server, handle, url) = start(config, &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        send_text(&mut ws, print_message("big.png")).await;

        // Either a close frame or a dropped connection; never a response.
        assert!(recv_response(&mut ws, Duration::from_secs(5)).await.is_none());
        assert!(sink.jobs().is_empty());

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn idle_session_is_closed() {
        let sink = Arc::new(RecordingPrinter::new());
        let config = ServerConfig {
            idle_timeout: Duration::from_millis(200),
            ping_period: Duration::from_secs(60),
            ..test_config()
        };
        let (server, handle, url) = start(config, &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(frame) = ws.next().await {
                if matches!(frame, Ok(WsMessage::Close(_)) | Err(_)) {
                    return true;
                }
            }
            true
        })
        .await
        .unwrap();
        assert!(closed);

        server.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_open_sessions() {
        let sink = Arc::new(RecordingPrinter::new());
        let (server, handle, url) = start(test_config(), &sink, ReplyPolicy::Quiet).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        // Round-trip once so the session is definitely established.
        send_text(&mut ws, print_message("t.png")).await;
        recv_response(&mut ws, Duration::from_secs(5)).await.unwrap();
        assert_eq!(server.active_sessions(), 1);

        server.shutdown();
        handle.await.unwrap();
        assert_eq!(server.active_sessions(), 0);

        // The client observes the close.
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap();
        assert!(matches!(next, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))));
    }
}
