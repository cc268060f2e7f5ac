//! Timeline Assembler: walks the resolved segments and interleaves voice with
//! song blocks into a single buffer.

use crate::assets::{ResolvedSegment, SegmentRole};
use crate::audio_io::AudioService;
use crate::buffer::AudioBuffer;
use crate::cursor::SongCursor;
use crate::ducking::{self, DuckConfig};
use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Overlap between any two joined buffers.
    pub crossfade_ms: u32,
    pub voice_fade_ms: u32,
    pub song_fade_ms: u32,
    /// Songs per block; at least 1.
    pub songs_between: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            crossfade_ms: 2000,
            voice_fade_ms: 500,
            song_fade_ms: 3000,
            songs_between: 2,
        }
    }
}

/// The assembled show and what went into it.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub buffer: AudioBuffer,
    pub song_blocks: usize,
    pub ducked_segments: usize,
    /// False when the last segment was not an Outro and the ducking bed was
    /// still armed at the end.
    pub ended_with_outro: bool,
}

fn join(show: Option<AudioBuffer>, next: &AudioBuffer, crossfade_ms: u32) -> Result<AudioBuffer> {
    match show {
        None => Ok(next.clone()),
        Some(show) => Ok(show.append_crossfade(next, crossfade_ms as u64)?),
    }
}

/// Assemble the show.
///
/// - Intro: voice left dry, then a song block.
/// - Middle: voice ducked against the previous block's last song (when
///   enabled and available), then a fresh song block.
/// - Outro: voice ducked the same way, no songs after it, ducking bed cleared.
pub fn assemble(
    segments: &[ResolvedSegment],
    cursor: &mut SongCursor,
    service: &dyn AudioService,
    duck: &DuckConfig,
    timeline: &TimelineConfig,
) -> Result<Assembly> {
    let songs_between = timeline.songs_between.max(1);
    let voice_fade = timeline.voice_fade_ms as u64;

    let mut show: Option<AudioBuffer> = None;
    let mut bed: Option<AudioBuffer> = None;
    let mut song_blocks = 0;
    let mut ducked_segments = 0;
    let mut ended_with_outro = false;

    for segment in segments {
        let role = segment.spec.role;
        info!(segment = %segment.spec.identifier, ?role, "Processing segment");

        let voice = service
            .decode(&segment.path)?
            .fade_in(voice_fade)
            .fade_out(voice_fade);

        match role {
            SegmentRole::Intro => {
                show = Some(join(show, &voice, timeline.crossfade_ms)?);
                info!("Adding {} songs after intro", songs_between);
                let block = cursor.take_block(songs_between, service, timeline);
                show = Some(join(show, &block.buffer, timeline.crossfade_ms)?);
                bed = block.last_song;
                song_blocks += 1;
                ended_with_outro = false;
            }
            SegmentRole::Middle => {
                // Pulled first so its opening song can serve as the following
                // music for edge-only ducking.
                let block = cursor.take_block(songs_between, service, timeline);
                let voice = match (&bed, duck.enabled) {
                    (Some(music), true) => {
                        ducked_segments += 1;
                        info!("Applying ducking ({} dB) under voice", duck.gain());
                        ducking::duck(
                            &voice,
                            music,
                            block.first_song.as_ref(),
                            duck,
                            duck.policy,
                            timeline.voice_fade_ms,
                        )
                    }
                    _ => voice,
                };
                show = Some(join(show, &voice, timeline.crossfade_ms)?);
                info!("Adding {} songs", songs_between);
                show = Some(join(show, &block.buffer, timeline.crossfade_ms)?);
                bed = block.last_song;
                song_blocks += 1;
                ended_with_outro = false;
            }
            SegmentRole::Outro => {
                let voice = match (&bed, duck.enabled) {
                    (Some(music), true) => {
                        ducked_segments += 1;
                        info!("Applying ducking ({} dB) under outro", duck.gain());
                        ducking::duck(&voice, music, None, duck, duck.policy, timeline.voice_fade_ms)
                    }
                    _ => voice,
                };
                show = Some(join(show, &voice, timeline.crossfade_ms)?);
                bed = None;
                ended_with_outro = true;
            }
        }
    }

    if !ended_with_outro && bed.is_some() {
        debug!("Show has no closing outro; ducking bed left armed");
    }

    let buffer = show.ok_or_else(|| BuildError::NoAssetsFound("voice segments".to_string()))?;
    Ok(Assembly {
        buffer,
        song_blocks,
        ducked_segments,
        ended_with_outro,
    })
}
