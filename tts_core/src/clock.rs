//! Audio output clocks.
//!
//! An [`AudioClock`] is the shared timeline segments are booked onto: it
//! reports the current time and accepts PCM to start at an absolute time on
//! that same timeline.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, bail};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::decode::Pcm;

pub trait AudioClock: Send + Sync {
    /// Current position of the clock in seconds.
    fn now(&self) -> f64;

    /// Book `pcm` to start at `start` seconds. Start times in the past play as soon as possible.
    fn schedule(&self, pcm: Pcm, start: f64) -> anyhow::Result<()>;

    /// Drop audio that was booked but has not played yet.
    fn silence(&self) {}
}

#[derive(Debug, Default)]
struct Timeline {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

/// Clock that renders the booked segments onto a wall-clock timeline in
/// memory and writes it out as a WAV file.
///
/// Time zero is the moment the clock was created, so the rendered file
/// reproduces the gaps a listener would have heard.
#[derive(Debug)]
pub struct WavRenderClock {
    origin: Instant,
    timeline: Mutex<Timeline>,
}

impl Default for WavRenderClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WavRenderClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timeline: Mutex::new(Timeline::default()),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Timeline>> {
        self.timeline
            .lock()
            .map_err(|_| anyhow!("render timeline lock poisoned"))
    }

    /// Length of the rendered timeline in seconds.
    pub fn rendered_secs(&self) -> f64 {
        match self.lock() {
            Ok(t) if t.sample_rate > 0 && t.channels > 0 => {
                (t.samples.len() / t.channels as usize) as f64 / t.sample_rate as f64
            }
            _ => 0.0,
        }
    }

    /// Write the timeline as 16-bit PCM WAV. Returns the rendered length in seconds.
    pub fn finish(&self, path: impl AsRef<Path>) -> anyhow::Result<f64> {
        let timeline = self.lock()?;
        if timeline.sample_rate == 0 {
            bail!("no audio was scheduled");
        }
        let spec = WavSpec {
            channels: timeline.channels,
            sample_rate: timeline.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path.as_ref(), spec)?;
        for &s in &timeline.samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        drop(timeline);
        Ok(self.rendered_secs())
    }
}

impl AudioClock for WavRenderClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule(&self, pcm: Pcm, start: f64) -> anyhow::Result<()> {
        let mut timeline = self.lock()?;
        if timeline.sample_rate == 0 {
            timeline.sample_rate = pcm.sample_rate;
            timeline.channels = pcm.channels;
        } else if (timeline.sample_rate, timeline.channels) != (pcm.sample_rate, pcm.channels) {
            bail!(
                "segment format {} Hz/{} ch differs from output {} Hz/{} ch",
                pcm.sample_rate,
                pcm.channels,
                timeline.sample_rate,
                timeline.channels
            );
        }

        // A start already in the past plays from now, it cannot be back-dated.
        let at = start.max(self.now());
        let channels = timeline.channels as usize;
        let offset = (at * timeline.sample_rate as f64).round() as usize * channels;
        if timeline.samples.len() < offset {
            timeline.samples.resize(offset, 0.0);
        }
        for (i, s) in pcm.samples.into_iter().enumerate() {
            // Rounding can make consecutive segments touch by one frame; mix instead of overwrite.
            match timeline.samples.get_mut(offset + i) {
                Some(existing) => *existing += s,
                None => timeline.samples.push(s),
            }
        }
        Ok(())
    }

    fn silence(&self) {
        if let Ok(mut timeline) = self.lock() {
            let played = (self.now() * timeline.sample_rate as f64) as usize * timeline.channels as usize;
            timeline.samples.truncate(played);
        }
    }
}
