//! Wire protocol for the wsprint agent.
//!
//! Clients send a single JSON object per WebSocket text message and receive
//! at most one JSON object back. This crate owns the message types, the
//! lenient request decoder, and validation of the `print` action.

pub mod constants;
pub mod decode;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::ResponseAction;
pub use decode::{DecodeError, ValidationFailure, decode_request, log_prefix};
pub use messages::{InboundRequest, OutboundResponse, PrintRequest};
