//! Ducking Mixer: lays a music bed under a voice segment at reduced level.
//!
//! Two policies:
//! - **Full bed**: the music runs under the whole voice, looped or trimmed to
//!   the voice length.
//! - **Edge only**: music is heard only in the transition windows at the start
//!   and end of the voice ("talk-up" style); the middle of the voice is dry.
//!
//! Ducking is best effort. Any buffer failure falls back to the plain voice.

use crate::buffer::AudioBuffer;
use crate::error::{BufferError, BuildError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Below this edge-window length the voice is returned untouched.
pub const MIN_EDGE_OVERLAP_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuckPolicy {
    #[default]
    FullBed,
    EdgeOnly,
}

impl DuckPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace(['-', ' '], "_").as_str() {
            "full_bed" | "full" => Some(DuckPolicy::FullBed),
            "edge_only" | "edge" | "edges" => Some(DuckPolicy::EdgeOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckConfig {
    pub enabled: bool,
    /// Level change of the bed in dB; never positive.
    pub gain_db: i32,
    /// How fast the bed fades in and out.
    pub fade_ms: u32,
    /// Policy for regular show builds.
    pub policy: DuckPolicy,
    /// Policy for preview builds.
    pub preview_policy: DuckPolicy,
}

impl Default for DuckConfig {
    fn default() -> Self {
        DuckConfig {
            enabled: true,
            gain_db: -15,
            fade_ms: 500,
            policy: DuckPolicy::FullBed,
            preview_policy: DuckPolicy::EdgeOnly,
        }
    }
}

impl DuckConfig {
    pub fn gain(&self) -> f32 {
        self.gain_db.min(0) as f32
    }
}

/// Duck `preceding` under `voice` using `policy`. `following` is the music
/// that comes after the voice; only the edge-only policy uses it.
pub fn duck(
    voice: &AudioBuffer,
    preceding: &AudioBuffer,
    following: Option<&AudioBuffer>,
    config: &DuckConfig,
    policy: DuckPolicy,
    voice_fade_ms: u32,
) -> AudioBuffer {
    let result = match policy {
        DuckPolicy::FullBed => duck_full_bed(voice, preceding, config.gain(), config.fade_ms as u64),
        DuckPolicy::EdgeOnly => duck_edges(
            voice,
            Some(preceding),
            following,
            config.gain(),
            config.fade_ms as u64 + voice_fade_ms as u64,
        ),
    };
    match result {
        Ok(mixed) => mixed,
        Err(e) => {
            warn!("{}, using voice only", BuildError::DuckingFailure(e));
            voice.clone()
        }
    }
}

/// Music looped/trimmed to the voice length, shifted by `gain_db`, faded over
/// `min(fade_ms, length / 4)`, with the voice overlaid at offset 0. The output
/// is exactly as long as the voice.
pub fn duck_full_bed(
    voice: &AudioBuffer,
    music: &AudioBuffer,
    gain_db: f32,
    fade_ms: u64,
) -> Result<AudioBuffer, BufferError> {
    let length = voice.frames();
    let bed = music.looped_to(length)?.gain_db(gain_db);
    let fade = voice.ms_to_frames(fade_ms).min(length / 4);
    let bed = if fade > 0 {
        bed.fade_in_frames(fade).fade_out_frames(fade)
    } else {
        bed
    };
    bed.overlay(voice, 0)
}

/// Edge-only ducking.
///
/// `overlap = min(window_ms, voice_length / 3)`. The tail of `preceding` fades
/// out under the first `overlap` of the voice and the head of `following`
/// fades in under the last `overlap`; music shorter than the window (or
/// absent) is padded with silence on the outer side. The voice between the
/// windows passes through dry, so the output is exactly as long as the voice.
pub fn duck_edges(
    voice: &AudioBuffer,
    preceding: Option<&AudioBuffer>,
    following: Option<&AudioBuffer>,
    gain_db: f32,
    window_ms: u64,
) -> Result<AudioBuffer, BufferError> {
    let length = voice.frames();
    let overlap = voice.ms_to_frames(window_ms).min(length / 3);
    if overlap < voice.ms_to_frames(MIN_EDGE_OVERLAP_MS) {
        debug!(overlap, "voice too short for edge ducking");
        return Ok(voice.clone());
    }

    let before = match preceding {
        Some(music) => {
            let tail = music.slice_frames(music.frames().saturating_sub(overlap), music.frames());
            tail.pad_start(overlap - tail.frames())
        }
        None => voice.silent_like(overlap),
    };
    let after = match following {
        Some(music) => {
            let head = music.slice_frames(0, overlap);
            head.pad_end(overlap - head.frames())
        }
        None => voice.silent_like(overlap),
    };

    let transition_in = before
        .gain_db(gain_db)
        .fade_out_frames(overlap)
        .overlay(&voice.slice_frames(0, overlap), 0)?;
    let transition_out = after
        .gain_db(gain_db)
        .fade_in_frames(overlap)
        .overlay(&voice.slice_frames(length - overlap, length), 0)?;
    let middle = voice.slice_frames(overlap, length - overlap);

    transition_in.concat(&middle)?.concat(&transition_out)
}
