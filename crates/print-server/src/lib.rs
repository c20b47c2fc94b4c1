//! WebSocket print server.
//!
//! Accepts WebSocket clients on a TCP port, reassembles each text message
//! from its frames, decodes it as a print request, and hands the decoded
//! image to a [`PrinterSink`](wsprint_printer::PrinterSink). Every session
//! runs in its own task; the printer is shared and serialized.

mod connection;
mod dispatcher;
mod frame;
mod printer;
mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{Sender, Session, SessionExit, SessionSettings, SessionState};
pub use dispatcher::{DispatchError, Dispatcher, ReplyPolicy};
pub use frame::{FrameAccumulator, FrameError, FrameEvent, FrameKind};
pub use printer::SharedPrinter;
pub use server::{PrintServer, ServerConfig};

/// Send buffer capacity per session.
///
/// Each inbound message produces at most one response and the read pump
/// waits for it to be queued, so a small buffer is enough.
pub const SEND_BUFFER_SIZE: usize = 16;

/// Errors produced by the print server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,
}
