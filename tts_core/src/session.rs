//! One synthesis request, from submission to the last scheduled segment.
//!
//! A [`Session`] owns its configuration, its playback cursor and its
//! cancellation token. Frames are pulled from the response one at a time and
//! each goes through validation, decoding and scheduling before the next one
//! is read, which is what keeps the cursor consistent with stream order.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clock::AudioClock;
use crate::config::{SessionConfig, TruncationPolicy};
use crate::decode::{AudioSegment, SegmentDecoder};
use crate::error::{DecodeError, FrameError, SessionError};
use crate::frame::{frames, Frame, FrameEvent, Truncation};
use crate::scheduler::{PlaybackScheduler, ScheduledSegment};
use crate::transport::{SynthesisRequest, SynthesisTransport};
use crate::validate::validate_frame;

pub const STATUS_GENERATING: &str = "Generating audio...";
pub const STATUS_COMPLETED: &str = "Audio playback completed.";
/// Clears any status previously shown.
pub const STATUS_NONE: &str = "";

/// Receives human-readable progress.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Draining,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    Validation,
    Decode,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFrame {
    pub order_index: u64,
    pub reason: SkipReason,
    pub message: String,
}

/// What happened during a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// Clock time the playback cursor started at.
    pub origin: f64,
    /// Complete frames extracted from the stream.
    pub frames: u64,
    pub scheduled: Vec<ScheduledSegment>,
    pub skipped: Vec<SkippedFrame>,
    pub truncated: Option<Truncation>,
    /// Total duration of scheduled audio in seconds.
    pub audio_seconds: f64,
}

pub struct Session {
    id: Uuid,
    config: SessionConfig,
    text: String,
    transport: Arc<dyn SynthesisTransport>,
    decoder: Arc<dyn SegmentDecoder>,
    clock: Arc<dyn AudioClock>,
    status: Option<StatusCallback>,
    cancel: CancellationToken,
    state: SessionState,
    report: SessionReport,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        text: impl Into<String>,
        transport: Arc<dyn SynthesisTransport>,
        decoder: Arc<dyn SegmentDecoder>,
        clock: Arc<dyn AudioClock>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            config,
            text: text.into(),
            transport,
            decoder,
            clock,
            status: None,
            cancel: CancellationToken::new(),
            state: SessionState::Idle,
            report: SessionReport {
                session_id: id,
                ..SessionReport::default()
            },
        }
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.status = Some(callback);
        self
    }

    /// Tie the session to an external token, e.g. one shared with a UI.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that stops the session. Cancelling it stops further reads and
    /// scheduling and releases the response; booked audio keeps playing.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Report accumulated so far.
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    /// Drop audio that was booked but has not played yet.
    pub fn silence(&self) {
        self.clock.silence();
    }

    /// Run the session to a terminal state. A session runs once.
    pub async fn run(&mut self) -> Result<SessionReport, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::Configuration(format!(
                "session {} already ran",
                self.id
            )));
        }
        let span = info_span!("tts_session", id = %self.id, voice = %self.config.voice);
        self.drive().instrument(span).await
    }

    async fn drive(&mut self) -> Result<SessionReport, SessionError> {
        let endpoint = match self.config.endpoint_url() {
            Ok(url) => url,
            Err(e) => return Err(self.terminate(e)),
        };
        if self.text.trim().is_empty() {
            let err = SessionError::Configuration("text to synthesize is empty".to_string());
            return Err(self.terminate(err));
        }

        info!("Starting synthesis ({} characters) at {endpoint}", self.text.len());
        self.report_status(STATUS_GENERATING);
        self.transition(SessionState::Requesting);

        let request = SynthesisRequest {
            text: self.text.clone(),
            voice: self.config.voice.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = transport.open(&endpoint, &request) => Some(result),
        };
        let chunks = match opened {
            Some(Ok(chunks)) => chunks,
            Some(Err(e)) if !cancel.is_cancelled() => return Err(self.terminate(e)),
            _ => return Err(self.terminate(SessionError::Cancelled)),
        };

        self.transition(SessionState::Streaming);
        let mut scheduler = PlaybackScheduler::new(Arc::clone(&self.clock));
        self.report.origin = scheduler.origin();

        let events = frames(chunks);
        futures_util::pin_mut!(events);
        let mut order_index = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.terminate(SessionError::Cancelled)),
                next = events.next() => next,
            };

            match next {
                None => break,
                Some(Err(e)) if cancel.is_cancelled() => {
                    debug!("Stream read ended by cancellation: {e}");
                    return Err(self.terminate(SessionError::Cancelled));
                }
                Some(Err(e)) => {
                    let err = SessionError::Transport(format!("stream read failed: {e}"));
                    return Err(self.terminate(err));
                }
                Some(Ok(FrameEvent::Frame(frame))) => {
                    let index = order_index;
                    order_index += 1;
                    if let Err(e) = self.process_frame(&mut scheduler, index, frame).await {
                        return Err(self.terminate(e));
                    }
                }
                Some(Ok(FrameEvent::Truncated(truncation))) => {
                    warn!("Dropping incomplete trailing frame: {truncation}");
                    self.report.truncated = Some(truncation);
                    if self.config.truncation == TruncationPolicy::Fail {
                        return Err(self.terminate(SessionError::Truncated(truncation)));
                    }
                }
            }
        }

        // Transport closed; the last schedule call has been issued.
        self.transition(SessionState::Draining);
        info!(
            "Stream finished: {} frames, {} scheduled, {} skipped, {:.2}s of audio",
            self.report.frames,
            self.report.scheduled.len(),
            self.report.skipped.len(),
            self.report.audio_seconds
        );
        self.transition(SessionState::Completed);
        self.report_status(STATUS_COMPLETED);
        Ok(self.report.clone())
    }

    /// Validate, decode and schedule one frame. Per-frame failures are recorded
    /// and swallowed; only fatal errors are returned.
    async fn process_frame(
        &mut self,
        scheduler: &mut PlaybackScheduler,
        order_index: u64,
        frame: Frame,
    ) -> Result<(), SessionError> {
        self.report.frames += 1;
        debug!(order_index, length = frame.length(), "frame received");

        if let Err(e) = validate_frame(&frame) {
            self.skip(order_index, SkipReason::Validation, e);
            return Ok(());
        }

        let decoder = Arc::clone(&self.decoder);
        let cancel = self.cancel.clone();
        let decoded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            decoded = decoder.decode(frame.payload) => decoded,
        };

        let audio = match decoded {
            Ok(audio) => audio,
            Err(DecodeError::Rejected(msg)) => {
                self.skip(order_index, SkipReason::Decode, FrameError::Decode(msg));
                return Ok(());
            }
            Err(DecodeError::Unavailable(msg)) => return Err(SessionError::DecoderSetup(msg)),
        };

        let segment = AudioSegment {
            pcm: audio.pcm,
            duration: audio.duration,
            order_index,
        };
        match scheduler.schedule(segment) {
            Ok(booked) => {
                self.report.audio_seconds += booked.duration;
                self.report.scheduled.push(booked);
            }
            Err(e) => {
                let reason = match e {
                    FrameError::Output(_) => SkipReason::Output,
                    _ => SkipReason::Decode,
                };
                self.skip(order_index, reason, e);
            }
        }
        Ok(())
    }

    fn skip(&mut self, order_index: u64, reason: SkipReason, err: FrameError) {
        warn!(order_index, "Skipping frame: {err}");
        self.report.skipped.push(SkippedFrame {
            order_index,
            reason,
            message: err.to_string(),
        });
    }

    /// Move to the terminal state matching `err` and surface it.
    fn terminate(&mut self, err: SessionError) -> SessionError {
        if err.is_failure() {
            error!("TTS session failed: {err}");
            self.transition(SessionState::Failed);
            self.report_status(&err.to_string());
        } else {
            info!("TTS session cancelled");
            self.transition(SessionState::Cancelled);
        }
        self.report_status(STATUS_NONE);
        err
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }

    fn report_status(&self, status: &str) {
        if let Some(callback) = &self.status {
            callback(status);
        }
    }
}
