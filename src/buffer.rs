//! In-memory PCM buffers and the editing primitives the engine builds on.
//!
//! Samples are interleaved `f32`. All lengths are handled in frames (one frame
//! = one sample per channel); millisecond arguments are converted with
//! `ms_to_frames` and always clamped to what the buffer actually holds.

use crate::error::BufferError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        AudioBuffer {
            samples,
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    /// Silence of the given length.
    pub fn silent(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration_ms * sample_rate as u64 / 1000) as usize;
        Self::silent_frames(frames, sample_rate, channels)
    }

    pub fn silent_frames(frames: usize, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        AudioBuffer::new(
            vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        )
    }

    /// Silence in this buffer's format.
    pub fn silent_like(&self, frames: usize) -> Self {
        Self::silent_frames(frames, self.sample_rate, self.channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn ms_to_frames(&self, ms: u64) -> usize {
        (ms * self.sample_rate as u64 / 1000) as usize
    }

    fn same_format(&self, other: &AudioBuffer) -> Result<(), BufferError> {
        if self.sample_rate == other.sample_rate && self.channels == other.channels {
            Ok(())
        } else {
            Err(BufferError::FormatMismatch {
                left_rate: self.sample_rate,
                left_channels: self.channels,
                right_rate: other.sample_rate,
                right_channels: other.channels,
            })
        }
    }

    fn with_samples(&self, samples: Vec<f32>) -> Self {
        AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Frames `[start, end)`, clamped to the buffer.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let frames = self.frames();
        let end = end.min(frames);
        let start = start.min(end);
        let ch = self.channels as usize;
        self.with_samples(self.samples[start * ch..end * ch].to_vec())
    }

    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> Self {
        self.slice_frames(self.ms_to_frames(start_ms), self.ms_to_frames(end_ms))
    }

    /// The first `ms` milliseconds (or everything, if shorter).
    pub fn head_ms(&self, ms: u64) -> Self {
        self.slice_frames(0, self.ms_to_frames(ms))
    }

    /// The last `ms` milliseconds (or everything, if shorter).
    pub fn tail_ms(&self, ms: u64) -> Self {
        let frames = self.frames();
        self.slice_frames(frames.saturating_sub(self.ms_to_frames(ms)), frames)
    }

    pub fn concat(&self, other: &AudioBuffer) -> Result<Self, BufferError> {
        self.same_format(other)?;
        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&other.samples);
        Ok(self.with_samples(samples))
    }

    /// Join `other` after `self`, overlapping the last/first `crossfade_ms`
    /// with opposite linear ramps. The overlap is clamped to the shorter of
    /// the two buffers, so any configured value is accepted.
    pub fn append_crossfade(
        &self,
        other: &AudioBuffer,
        crossfade_ms: u64,
    ) -> Result<Self, BufferError> {
        self.same_format(other)?;
        let overlap = self
            .ms_to_frames(crossfade_ms)
            .min(self.frames())
            .min(other.frames());
        if overlap == 0 {
            return self.concat(other);
        }

        let ch = self.channels as usize;
        let head_end = (self.frames() - overlap) * ch;
        let mut samples =
            Vec::with_capacity(self.samples.len() + other.samples.len() - overlap * ch);
        samples.extend_from_slice(&self.samples[..head_end]);
        for frame in 0..overlap {
            let rise = (frame + 1) as f32 / (overlap + 1) as f32;
            let fall = 1.0 - rise;
            for c in 0..ch {
                let a = self.samples[head_end + frame * ch + c];
                let b = other.samples[frame * ch + c];
                samples.push(a * fall + b * rise);
            }
        }
        samples.extend_from_slice(&other.samples[overlap * ch..]);
        Ok(self.with_samples(samples))
    }

    /// Shift the level by `db` decibels; negative values attenuate.
    pub fn gain_db(&self, db: f32) -> Self {
        let factor = 10.0_f32.powf(db / 20.0);
        self.with_samples(self.samples.iter().map(|s| s * factor).collect())
    }

    pub fn fade_in(&self, ms: u64) -> Self {
        self.fade_in_frames(self.ms_to_frames(ms))
    }

    pub fn fade_out(&self, ms: u64) -> Self {
        self.fade_out_frames(self.ms_to_frames(ms))
    }

    /// Linear ramp from silence over the first `frames` frames.
    pub fn fade_in_frames(&self, frames: usize) -> Self {
        let n = frames.min(self.frames());
        let ch = self.channels as usize;
        let mut samples = self.samples.clone();
        for frame in 0..n {
            let gain = frame as f32 / n as f32;
            for s in &mut samples[frame * ch..(frame + 1) * ch] {
                *s *= gain;
            }
        }
        self.with_samples(samples)
    }

    /// Linear ramp down to silence over the last `frames` frames.
    pub fn fade_out_frames(&self, frames: usize) -> Self {
        let total = self.frames();
        let n = frames.min(total);
        let ch = self.channels as usize;
        let start = total - n;
        let mut samples = self.samples.clone();
        for i in 0..n {
            let gain = 1.0 - (i + 1) as f32 / n as f32;
            let frame = start + i;
            for s in &mut samples[frame * ch..(frame + 1) * ch] {
                *s *= gain;
            }
        }
        self.with_samples(samples)
    }

    /// Mix `other` on top of `self` starting at `offset` frames. The result
    /// keeps `self`'s length; anything of `other` past the end is dropped.
    pub fn overlay(&self, other: &AudioBuffer, offset: usize) -> Result<Self, BufferError> {
        self.same_format(other)?;
        let ch = self.channels as usize;
        let mut samples = self.samples.clone();
        let start = (offset * ch).min(samples.len());
        for (dst, src) in samples[start..].iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
        Ok(self.with_samples(samples))
    }

    /// Repeat the buffer as often as needed, then trim to exactly `frames`.
    pub fn looped_to(&self, frames: usize) -> Result<Self, BufferError> {
        if frames == 0 {
            return Ok(self.silent_like(0));
        }
        if self.is_empty() {
            return Err(BufferError::Empty);
        }
        let wanted = frames * self.channels as usize;
        let samples: Vec<f32> = self.samples.iter().copied().cycle().take(wanted).collect();
        Ok(self.with_samples(samples))
    }

    /// Prepend `frames` of silence.
    pub fn pad_start(&self, frames: usize) -> Self {
        let mut samples = vec![0.0; frames * self.channels as usize];
        samples.extend_from_slice(&self.samples);
        self.with_samples(samples)
    }

    /// Append `frames` of silence.
    pub fn pad_end(&self, frames: usize) -> Self {
        let mut samples = self.samples.clone();
        samples.resize(samples.len() + frames * self.channels as usize, 0.0);
        self.with_samples(samples)
    }
}
