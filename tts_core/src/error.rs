use thiserror::Error;

use crate::frame::Truncation;

/// Errors that end a synthesis session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("TTS backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Stream truncated: {0}")]
    Truncated(Truncation),

    #[error("Decoder unavailable: {0}")]
    DecoderSetup(String),

    #[error("Session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Cancellation is a requested stop, everything else is a failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, SessionError::Cancelled)
    }
}

/// Errors scoped to a single frame. The session skips the frame and continues.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid WAV file: missing RIFF header")]
    Validation,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio output rejected segment: {0}")]
    Output(String),
}

/// Failure reported by a [`SegmentDecoder`](crate::decode::SegmentDecoder).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The codec rejected this payload; later payloads may still decode.
    #[error("{0}")]
    Rejected(String),

    /// The decoder itself cannot run any more.
    #[error("{0}")]
    Unavailable(String),
}
