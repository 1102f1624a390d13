use async_trait::async_trait;
use bytes::Bytes;

use crate::error::DecodeError;

/// Interleaved floating point samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Pcm {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Output of one successful decode.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub pcm: Pcm,
    /// Playback length in seconds.
    pub duration: f64,
}

/// A decoded segment waiting to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub pcm: Pcm,
    pub duration: f64,
    /// Position of the source frame in the stream.
    pub order_index: u64,
}

/// Codec capability used by a session. It is fed exactly one complete,
/// validated payload per call.
#[async_trait]
pub trait SegmentDecoder: Send + Sync {
    async fn decode(&self, payload: Bytes) -> Result<DecodedAudio, DecodeError>;
}
