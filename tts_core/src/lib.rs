//! Client side of a streaming text-to-speech service.
//!
//! The synthesis response is a sequence of length-prefixed WAV containers
//! that arrive while the service is still generating. A [`Session`] reads
//! them as they come, decodes each one and books it on an [`AudioClock`]
//! directly after the previous segment, so playback starts before synthesis
//! has finished and consecutive segments play without gaps.

pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod validate;
mod wav;

pub use clock::{AudioClock, WavRenderClock};
pub use config::{
    endpoint_from_settings, fetch_endpoint, normalize_endpoint, SessionConfig, TruncationPolicy,
    DEFAULT_VOICE,
};
pub use decode::{AudioSegment, DecodedAudio, Pcm, SegmentDecoder};
pub use error::{DecodeError, FrameError, SessionError};
pub use frame::{encode_frame, frames, Frame, FrameDemuxer, FrameEvent, Truncation};
pub use scheduler::{PlaybackScheduler, ScheduledSegment};
pub use session::{
    Session, SessionReport, SessionState, SkipReason, SkippedFrame, StatusCallback,
    STATUS_COMPLETED, STATUS_GENERATING, STATUS_NONE,
};
pub use transport::{ByteStream, HttpTransport, SynthesisRequest, SynthesisTransport};
pub use validate::{validate_frame, WAV_MAGIC};
pub use wav::{decode_wav, encode_wav, WavDecoder};

pub use reqwest::Url;
pub use tokio_util::sync::CancellationToken;
