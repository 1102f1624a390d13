//! Length-prefixed framing of the synthesis response body.
//!
//! The body is a flat sequence of records, each a 4-byte big-endian length
//! followed by that many payload bytes. There is no terminator record: the
//! transport closing the stream is the only end-of-sequence signal. Records
//! arrive split across network chunks at arbitrary boundaries, so the
//! [`FrameDemuxer`] keeps the unconsumed tail between reads and [`frames`]
//! turns a chunk stream into a lazy stream of [`FrameEvent`]s.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// One complete record of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    /// Declared payload length as carried on the wire.
    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }
}

/// Bytes left over when the stream ended in the middle of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Truncation {
    /// Payload length announced by the prefix, if the prefix arrived in full.
    pub declared: Option<u32>,
    /// Bytes that arrived after the prefix (or of the prefix itself when it is incomplete).
    pub available: usize,
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.declared {
            Some(declared) => write!(
                f,
                "final frame declared {declared} bytes but only {} arrived",
                self.available
            ),
            None => write!(
                f,
                "stream ended inside a length prefix ({} of {LENGTH_PREFIX} bytes)",
                self.available
            ),
        }
    }
}

/// Item of the lazy frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Frame(Frame),
    /// Emitted at most once, as the last item, when the stream closed mid-record.
    Truncated(Truncation),
}

/// Splits arbitrarily chunked input into complete frames.
///
/// The accumulator only ever holds the suffix of the input that does not yet
/// form a complete frame: every call to [`push`](Self::push) extracts all
/// frames that became complete and drops their bytes from the front.
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    buf: BytesMut,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.extract() {
            frames.push(frame);
        }
        frames
    }

    fn extract(&mut self) -> Option<Frame> {
        let declared = self.declared_len()? as usize;
        if self.buf.len() - LENGTH_PREFIX < declared {
            // Prefix stays in place and is re-read once more bytes arrive.
            return None;
        }
        self.buf.advance(LENGTH_PREFIX);
        let payload = self.buf.split_to(declared).freeze();
        Some(Frame { payload })
    }

    fn declared_len(&self) -> Option<u32> {
        if self.buf.len() < LENGTH_PREFIX {
            return None;
        }
        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX]);
        Some(u32::from_be_bytes(prefix))
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn residual(&self) -> &[u8] {
        &self.buf
    }

    /// Close the input. Returns the truncated trailing record, if any.
    pub fn finish(self) -> Option<Truncation> {
        if self.buf.is_empty() {
            return None;
        }
        let truncation = match self.declared_len() {
            Some(declared) => Truncation {
                declared: Some(declared),
                available: self.buf.len() - LENGTH_PREFIX,
            },
            None => Truncation {
                declared: None,
                available: self.buf.len(),
            },
        };
        Some(truncation)
    }
}

/// Turn a stream of byte chunks into a lazy, finite stream of frames.
///
/// Chunks are pulled only as the consumer asks for more frames. A read error
/// is forwarded and ends the sequence; a clean end of input with a partial
/// record buffered yields one final [`FrameEvent::Truncated`].
pub fn frames<S, E>(chunks: S) -> impl Stream<Item = Result<FrameEvent, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    async_stream::try_stream! {
        let mut demuxer = FrameDemuxer::new();
        futures_util::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for frame in demuxer.push(&chunk) {
                yield FrameEvent::Frame(frame);
            }
        }
        if let Some(truncation) = demuxer.finish() {
            yield FrameEvent::Truncated(truncation);
        }
    }
}

/// Encode one payload as a length-prefixed record.
pub fn encode_frame(payload: &[u8]) -> anyhow::Result<Bytes> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("payload of {} bytes exceeds frame limit", payload.len()))?;
    let mut out = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
    out.put_u32(len);
    out.extend_from_slice(payload);
    Ok(out.freeze())
}
