//! Audio Buffer Service: the boundary between files on disk and PCM buffers.
//!
//! The engine never touches file bytes; it asks an `AudioService` to decode a
//! path into an `AudioBuffer` and to encode the finished timeline. Every
//! buffer a service hands out is normalized to the service's output format,
//! so the engine can join buffers without resampling.

use crate::buffer::AudioBuffer;
use crate::error::{BuildError, Result};
use chrono::{DateTime, Local};
use lofty::config::WriteOptions;
use lofty::tag::{Accessor, Tag, TagExt, TagType};
use rodio::Decoder;
use rodio::source::UniformSourceIterator;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 2;

/// Metadata written into an exported show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTags {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl ExportTags {
    pub fn for_show(date: DateTime<Local>) -> Self {
        ExportTags {
            title: format!("Radio Show - {}", date.format("%Y-%m-%d")),
            artist: "Automated Radio Station".to_string(),
            album: "Daily Broadcast".to_string(),
        }
    }
}

/// Decode/encode service consumed by the engine.
pub trait AudioService: Send + Sync {
    /// Output format every decoded buffer is normalized to.
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;

    fn decode(&self, path: &Path) -> Result<AudioBuffer>;

    /// Write `buffer` to `path`; returns the size of the written file in bytes.
    fn encode(&self, buffer: &AudioBuffer, path: &Path, tags: &ExportTags) -> Result<u64>;

    /// Silence in the service's output format.
    fn silence(&self, duration_ms: u64) -> AudioBuffer {
        AudioBuffer::silent(duration_ms, self.sample_rate(), self.channels())
    }
}

/// File-backed service: rodio decoding, 16-bit WAV export via hound, tags via lofty.
#[derive(Debug, Clone)]
pub struct RodioService {
    sample_rate: u32,
    channels: u16,
}

impl RodioService {
    pub fn new() -> Self {
        Self::with_format(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS)
    }

    pub fn with_format(sample_rate: u32, channels: u16) -> Self {
        RodioService {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
        }
    }
}

impl Default for RodioService {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioService for RodioService {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let failure = |reason: String| BuildError::DecodeFailure {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| failure(e.to_string()))?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| failure(e.to_string()))?;
        let uniform: UniformSourceIterator<_, f32> =
            UniformSourceIterator::new(source, self.channels, self.sample_rate);
        let samples: Vec<f32> = uniform.collect();
        if samples.is_empty() {
            return Err(failure("no audio frames".to_string()));
        }
        debug!(path = %path.display(), samples = samples.len(), "decoded");
        Ok(AudioBuffer::new(samples, self.sample_rate, self.channels))
    }

    fn encode(&self, buffer: &AudioBuffer, path: &Path, tags: &ExportTags) -> Result<u64> {
        let export_err = |reason: String| BuildError::Export {
            path: path.to_path_buf(),
            reason,
        };
        let spec = hound::WavSpec {
            channels: buffer.channels(),
            sample_rate: buffer.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer =
            hound::WavWriter::create(path, spec).map_err(|e| export_err(e.to_string()))?;
        for sample in buffer.samples() {
            let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(pcm)
                .map_err(|e| export_err(e.to_string()))?;
        }
        writer.finalize().map_err(|e| export_err(e.to_string()))?;

        if let Err(e) = write_tags(path, tags) {
            warn!(path = %path.display(), "Could not tag export: {}", e);
        }

        Ok(fs::metadata(path)?.len())
    }
}

fn write_tags(path: &Path, tags: &ExportTags) -> std::result::Result<(), lofty::error::LoftyError> {
    let mut tag = Tag::new(TagType::RiffInfo);
    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());
    tag.save_to_path(path, WriteOptions::default())
}

/// In-memory service: decodes from a path → buffer table and records exports
/// instead of writing them. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryService {
    sample_rate: u32,
    channels: u16,
    buffers: Mutex<HashMap<PathBuf, AudioBuffer>>,
    broken: Mutex<HashSet<PathBuf>>,
    exports: Mutex<Vec<(PathBuf, AudioBuffer)>>,
}

impl MemoryService {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        MemoryService {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            ..Default::default()
        }
    }

    /// Register the buffer returned when `path` is decoded.
    pub fn insert(&self, path: impl Into<PathBuf>, buffer: AudioBuffer) {
        lock(&self.buffers).insert(path.into(), buffer);
    }

    /// Make every decode of `path` fail.
    pub fn break_path(&self, path: impl Into<PathBuf>) {
        lock(&self.broken).insert(path.into());
    }

    /// Every export so far, oldest first.
    pub fn exports(&self) -> Vec<(PathBuf, AudioBuffer)> {
        lock(&self.exports).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl AudioService for MemoryService {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        if lock(&self.broken).contains(path) {
            return Err(BuildError::DecodeFailure {
                path: path.to_path_buf(),
                reason: "unreadable".to_string(),
            });
        }
        lock(&self.buffers)
            .get(path)
            .cloned()
            .ok_or_else(|| BuildError::DecodeFailure {
                path: path.to_path_buf(),
                reason: "not registered".to_string(),
            })
    }

    fn encode(&self, buffer: &AudioBuffer, path: &Path, _tags: &ExportTags) -> Result<u64> {
        lock(&self.exports).push((path.to_path_buf(), buffer.clone()));
        // Size of the equivalent 16-bit PCM payload plus a WAV header.
        Ok(44 + buffer.samples().len() as u64 * 2)
    }
}
