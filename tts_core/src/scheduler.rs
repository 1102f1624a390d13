use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::clock::AudioClock;
use crate::decode::AudioSegment;
use crate::error::FrameError;

/// Where a segment landed on the clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledSegment {
    pub order_index: u64,
    pub start: f64,
    pub duration: f64,
}

/// Books decoded segments back to back on a shared clock.
///
/// The cursor starts at the clock's current time and only ever moves forward
/// by the duration of a segment that was actually booked. Callers must
/// schedule segments in stream order.
pub struct PlaybackScheduler {
    clock: Arc<dyn AudioClock>,
    origin: f64,
    next_start: f64,
}

impl PlaybackScheduler {
    pub fn new(clock: Arc<dyn AudioClock>) -> Self {
        let origin = clock.now();
        Self {
            clock,
            origin,
            next_start: origin,
        }
    }

    /// Clock time the cursor was initialised to.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn schedule(&mut self, segment: AudioSegment) -> Result<ScheduledSegment, FrameError> {
        let duration = segment.duration;
        if !duration.is_finite() || duration < 0.0 {
            return Err(FrameError::Decode(format!(
                "segment {} has invalid duration {duration}",
                segment.order_index
            )));
        }

        let start = self.next_start;
        let now = self.clock.now();
        if start < now {
            // Decode ran past the booked start; play late rather than drop.
            debug!(
                order_index = segment.order_index,
                late_by = now - start,
                "segment start already passed"
            );
        }

        self.clock
            .schedule(segment.pcm, start)
            .map_err(|e| FrameError::Output(e.to_string()))?;
        self.next_start += duration;

        debug!(order_index = segment.order_index, start, duration, "segment scheduled");
        Ok(ScheduledSegment {
            order_index: segment.order_index,
            start,
            duration,
        })
    }
}
