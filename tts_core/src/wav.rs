use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::decode::{DecodedAudio, Pcm, SegmentDecoder};
use crate::error::DecodeError;

/// Encode mono PCM f32 samples as a 16-bit PCM WAV (RIFF) container.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut out = Vec::<u8>::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut out), spec)?;
        for &s in samples {
            // Convert f32 [-1.0,1.0] to i16
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(out)
}

/// Decode one complete WAV container into interleaved f32 samples.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::Rejected(format!("invalid WAV container: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(DecodeError::Rejected(format!(
            "unplayable WAV format: {} Hz, {} channels",
            spec.sample_rate, spec.channels
        )));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| DecodeError::Rejected(format!("corrupt sample data: {e}")))?,
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| DecodeError::Rejected(format!("corrupt sample data: {e}")))?
        }
        (format, bits) => {
            return Err(DecodeError::Rejected(format!(
                "unsupported sample format {format:?} at {bits} bits"
            )))
        }
    };

    let pcm = Pcm {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    };
    let duration = pcm.duration_secs();
    Ok(DecodedAudio { pcm, duration })
}

/// [`SegmentDecoder`] backed by `hound`. Decoding runs on the blocking pool so a
/// large segment does not stall the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

#[async_trait]
impl SegmentDecoder for WavDecoder {
    async fn decode(&self, payload: Bytes) -> Result<DecodedAudio, DecodeError> {
        tokio::task::spawn_blocking(move || decode_wav(&payload))
            .await
            .map_err(join_failure)?
    }
}

/// A panic while decoding only condemns that payload; a task that never ran means the
/// runtime is going away.
fn join_failure(e: tokio::task::JoinError) -> DecodeError {
    if e.is_panic() {
        DecodeError::Rejected(format!("decoder panicked on segment: {e}"))
    } else {
        DecodeError::Unavailable(format!("decoder task failed: {e}"))
    }
}
