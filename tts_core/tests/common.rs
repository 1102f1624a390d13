//! Common utilities for session tests: in-memory transport, scripted decoder
//! and a manually driven clock.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tts_core::{
    encode_frame, AudioClock, ByteStream, DecodeError, DecodedAudio, Pcm, SegmentDecoder,
    SessionError, StatusCallback, SynthesisRequest, SynthesisTransport, Url,
};

/// A segment as seen by the clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub start: f64,
    pub frames: usize,
}

/// Clock whose time only moves when a test (or the scripted decoder) says so.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
    booked: Mutex<Vec<Booking>>,
    silenced: AtomicBool,
}

impl ManualClock {
    pub fn starting_at(now: f64) -> Arc<Self> {
        let clock = Self::default();
        *clock.now.lock().unwrap() = now;
        Arc::new(clock)
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }

    pub fn booked(&self) -> Vec<Booking> {
        self.booked.lock().unwrap().clone()
    }

    pub fn starts(&self) -> Vec<f64> {
        self.booked().iter().map(|b| b.start).collect()
    }

    pub fn was_silenced(&self) -> bool {
        self.silenced.load(Ordering::SeqCst)
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }

    fn schedule(&self, pcm: Pcm, start: f64) -> anyhow::Result<()> {
        self.booked.lock().unwrap().push(Booking {
            start,
            frames: pcm.frames(),
        });
        Ok(())
    }

    fn silence(&self) {
        self.silenced.store(true, Ordering::SeqCst);
    }
}

/// Payload layout understood by [`ScriptedDecoder`]:
/// `RIFF` + duration (f64 BE) + decode latency in ms (u32 BE).
pub fn scripted_payload(duration: f64, latency_ms: u32) -> Vec<u8> {
    let mut payload = b"RIFF".to_vec();
    payload.extend_from_slice(&duration.to_be_bytes());
    payload.extend_from_slice(&latency_ms.to_be_bytes());
    payload
}

/// Passes validation but fails to decode.
pub fn undecodable_payload() -> Vec<u8> {
    b"RIFF-garbage".to_vec()
}

/// Fails validation.
pub fn corrupt_header_payload() -> Vec<u8> {
    let mut payload = scripted_payload(0.5, 0);
    payload[..4].copy_from_slice(b"RIFX");
    payload
}

/// Decoder for [`scripted_payload`]s. Sleeps for the scripted latency and
/// advances the clock by the same amount, so late segments can be simulated.
pub struct ScriptedDecoder {
    clock: Arc<ManualClock>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    unavailable: bool,
}

impl ScriptedDecoder {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            unavailable: false,
        })
    }

    pub fn unavailable(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            unavailable: true,
        })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentDecoder for ScriptedDecoder {
    async fn decode(&self, payload: Bytes) -> Result<DecodedAudio, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(DecodeError::Unavailable("codec backend missing".to_string()));
        }
        if payload.len() != 16 {
            return Err(DecodeError::Rejected(format!("bad payload length {}", payload.len())));
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let mut duration = [0u8; 8];
        duration.copy_from_slice(&payload[4..12]);
        let duration = f64::from_be_bytes(duration);
        let mut latency = [0u8; 4];
        latency.copy_from_slice(&payload[12..16]);
        let latency_ms = u32::from_be_bytes(latency);

        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms as u64)).await;
            self.clock.advance(latency_ms as f64 / 1000.0);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let sample_rate = 1000;
        let frames = (duration * sample_rate as f64).round() as usize;
        Ok(DecodedAudio {
            pcm: Pcm {
                samples: vec![0.0; frames],
                sample_rate,
                channels: 1,
            },
            duration,
        })
    }
}

/// Concatenate payloads into one wire body.
pub fn wire(payloads: &[Vec<u8>]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|p| encode_frame(p).unwrap().to_vec())
        .collect()
}

/// Split a body into chunks whose sizes cycle through `sizes`.
pub fn split_chunks(body: &[u8], sizes: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < body.len() {
        let size = sizes[i % sizes.len()].max(1);
        let end = (offset + size).min(body.len());
        chunks.push(Bytes::copy_from_slice(&body[offset..end]));
        offset = end;
        i += 1;
    }
    chunks
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Transport that replays a fixed list of chunks.
#[derive(Default)]
pub struct ChunkTransport {
    chunks: Vec<Bytes>,
    /// Inject a read error after this many chunks.
    fail_after: Option<usize>,
    /// Keep the stream open after the last chunk.
    hang: bool,
    /// Never answer the request.
    silent: bool,
    opens: AtomicUsize,
    requests: Mutex<Vec<SynthesisRequest>>,
    released: Arc<AtomicBool>,
}

impl ChunkTransport {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn never_responding(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Whether the last opened stream has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisTransport for ChunkTransport {
    async fn open(&self, _endpoint: &Url, request: &SynthesisRequest) -> Result<ByteStream, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.silent {
            futures_util::future::pending::<()>().await;
        }

        let mut items: Vec<Result<Bytes, io::Error>> =
            self.chunks.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")));
        }

        let guard = DropFlag(Arc::clone(&self.released));
        let stream = futures_util::stream::iter(items).map(move |item| {
            let _held = &guard;
            item
        });
        if self.hang {
            Ok(Box::pin(stream.chain(futures_util::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }
}

/// Status callback that records every message.
pub fn recording_status() -> (StatusCallback, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: StatusCallback = Arc::new(move |status: &str| {
        sink.lock().unwrap().push(status.to_string());
    });
    (callback, seen)
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
