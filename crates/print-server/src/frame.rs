//! Reassembly of fragmented WebSocket text messages.
//!
//! Text data (the opening text frame plus any continuation frames) is
//! buffered as raw bytes and only decoded as UTF-8 once the final frame
//! arrives, so multi-byte characters may straddle frame boundaries.
//!
//! On a tokio-tungstenite socket the transport has already joined the
//! fragments and checked UTF-8, so every push is a single final frame and
//! the accumulator only classifies it and enforces the size limit. The
//! frame-by-frame path serves streams that yield raw frames.

use std::string::FromUtf8Error;

/// Kind of an incoming frame, as far as reassembly cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
    Continuation,
    Ping,
    Pong,
    Close,
}

/// Result of feeding one frame to the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Part of a text message was buffered; more frames follow.
    Pending,
    /// A complete text message.
    Message(String),
    /// The peer asked to close. Any partial message was discarded.
    Close,
    /// Frame carries nothing for the request pipeline (binary data,
    /// ping/pong).
    Ignored,
}

/// Errors raised while reassembling a message.
///
/// `TooLarge` and `InvalidUtf8` end the session (close codes 1009 and
/// 1007); `UnexpectedContinuation` only drops the stray frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("message exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assembling {
    Idle,
    Text,
    Binary,
}

/// Buffers text frames until a message is complete.
#[derive(Debug)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    max_len: usize,
    state: Assembling,
}

impl FrameAccumulator {
    /// Creates an accumulator that rejects messages longer than `max_len`
    /// bytes.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            state: Assembling::Idle,
        }
    }

    /// Bytes currently buffered for an incomplete message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drops any partial message.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = Assembling::Idle;
    }

    /// Feeds one frame.
    ///
    /// On error the buffer is reset, so the accumulator is ready for the
    /// next message.
    pub fn push(
        &mut self,
        kind: FrameKind,
        payload: &[u8],
        is_final: bool,
    ) -> Result<FrameEvent, FrameError> {
        match kind {
            FrameKind::Close => {
                self.reset();
                Ok(FrameEvent::Close)
            }
            FrameKind::Ping | FrameKind::Pong => Ok(FrameEvent::Ignored),
            FrameKind::Binary => {
                // A new data frame abandons whatever was in progress.
                self.reset();
                if !is_final {
                    self.state = Assembling::Binary;
                }
                Ok(FrameEvent::Ignored)
            }
            FrameKind::Text => {
                self.reset();
                self.state = Assembling::Text;
                self.append(payload, is_final)
            }
            FrameKind::Continuation => match self.state {
                Assembling::Text => self.append(payload, is_final),
                Assembling::Binary => {
                    if is_final {
                        self.state = Assembling::Idle;
                    }
                    Ok(FrameEvent::Ignored)
                }
                Assembling::Idle => Err(FrameError::UnexpectedContinuation),
            },
        }
    }

    fn append(&mut self, payload: &[u8], is_final: bool) -> Result<FrameEvent, FrameError> {
        if self.buf.len().saturating_add(payload.len()) > self.max_len {
            self.reset();
            return Err(FrameError::TooLarge {
                limit: self.max_len,
            });
        }
        self.buf.extend_from_slice(payload);

        if !is_final {
            return Ok(FrameEvent::Pending);
        }

        let bytes = std::mem::take(&mut self.buf);
        self.state = Assembling::Idle;
        Ok(FrameEvent::Message(String::from_utf8(bytes)?))
    }
}
