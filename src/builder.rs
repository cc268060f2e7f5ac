//! Build orchestration: one full show or one preview per call, guarded by a
//! single build slot so a second request is rejected instead of queued.

use crate::assets::{self, SegmentRole};
use crate::audio_io::{AudioService, ExportTags};
use crate::config::ShowConfig;
use crate::cursor::SongCursor;
use crate::ducking;
use crate::error::{BuildError, Result};
use crate::freshness;
use crate::timeline;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

pub const SHOW_PREFIX: &str = "radio_show";
pub const PREVIEW_PREFIX: &str = "test_preview";

/// Length of each song excerpt in a preview.
pub const PREVIEW_EXCERPT_MS: u64 = 30_000;

/// Extension of exported files.
pub const EXPORT_EXTENSION: &str = "wav";

// --- Build slot ---

/// At most one build at a time, shared by manual and automatic builds.
#[derive(Debug, Clone, Default)]
pub struct BuildSlot {
    busy: Arc<AtomicBool>,
}

impl BuildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claim the slot. The slot is released when the guard drops, on every
    /// exit path.
    pub fn try_acquire(&self) -> Result<BuildGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| BuildError::BuildAlreadyInProgress)?;
        Ok(BuildGuard {
            busy: Arc::clone(&self.busy),
        })
    }
}

#[derive(Debug)]
pub struct BuildGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

// --- Build results ---

/// Metadata reported back after an export.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    pub output_path: PathBuf,
    pub duration_secs: f64,
    pub size_bytes: u64,
    /// Voice segments used, in show order.
    pub segments: Vec<String>,
    pub song_blocks: usize,
    /// Configured identifiers that had no file.
    pub missing: Vec<String>,
    pub preview: bool,
}

impl BuildSummary {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs / 60.0
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// `<prefix>_YYYYMMDD_HHMMSS.wav`
pub fn output_file_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.{}", prefix, now.format("%Y%m%d_%H%M%S"), EXPORT_EXTENSION)
}

fn require_folder(what: &'static str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(BuildError::MissingFolder {
            what,
            path: path.to_path_buf(),
        })
    }
}

fn export(
    service: &dyn AudioService,
    buffer: &crate::buffer::AudioBuffer,
    output_dir: &Path,
    prefix: &str,
    now: DateTime<Local>,
) -> Result<(PathBuf, u64)> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(output_file_name(prefix, now));
    info!("Exporting to {}", path.display());
    let size = service.encode(buffer, &path, &ExportTags::for_show(now))?;
    Ok((path, size))
}

// --- Builds ---

/// Build the full show: resolve, check freshness, assemble, export.
/// Nothing is written unless every check passes.
pub fn run_build(
    config: &ShowConfig,
    service: &dyn AudioService,
    now: DateTime<Local>,
) -> Result<BuildSummary> {
    config.validate()?;
    require_folder("Voice segments", &config.voice_segments_dir)?;
    require_folder("Songs", &config.songs_dir)?;

    let resolution = assets::resolve_segments(&config.segment_specs(), &config.voice_segments_dir)?;
    for id in &resolution.missing {
        warn!("Voice segment not found: {}", id);
    }
    if resolution.found.is_empty() {
        return Err(BuildError::NoAssetsFound("voice segments".to_string()));
    }

    let songs = assets::load_songs(&config.songs_dir)?;
    if songs.is_empty() {
        return Err(BuildError::NoAssetsFound("songs".to_string()));
    }
    info!(
        "Found {} voice segments and {} songs",
        resolution.found.len(),
        songs.len()
    );

    if config.freshness.enabled {
        let report = freshness::check(&resolution.found, config.freshness.max_age_minutes, now);
        if !report.all_fresh {
            return Err(BuildError::StaleAssets(report.stale));
        }
    }

    let mut cursor = SongCursor::new(songs);
    let assembly = timeline::assemble(
        &resolution.found,
        &mut cursor,
        service,
        &config.ducking,
        &config.timeline,
    )?;

    let (output_path, size_bytes) =
        export(service, &assembly.buffer, &config.output_dir, SHOW_PREFIX, now)?;

    let summary = BuildSummary {
        output_path,
        duration_secs: assembly.buffer.duration().as_secs_f64(),
        size_bytes,
        segments: resolution
            .found
            .iter()
            .map(|s| s.spec.identifier.clone())
            .collect(),
        song_blocks: assembly.song_blocks,
        missing: resolution.missing,
        preview: false,
    };
    info!(
        "Show complete: {:.1} min, {:.1} MB",
        summary.duration_minutes(),
        summary.size_mb()
    );
    Ok(summary)
}

/// Quick preview: the last 30 s of one song, one voice segment ducked
/// with the preview policy, then the first 30 s of another. Both songs are
/// drawn from a fresh shuffle of the pool.
///
/// The voice is the first configured Middle segment found, or the first
/// segment found when there is none.
pub fn run_preview(
    config: &ShowConfig,
    service: &dyn AudioService,
    now: DateTime<Local>,
) -> Result<BuildSummary> {
    config.validate()?;
    require_folder("Voice segments", &config.voice_segments_dir)?;
    require_folder("Songs", &config.songs_dir)?;

    let songs = assets::load_songs(&config.songs_dir)?;
    let too_few = || BuildError::NoAssetsFound("songs (a preview needs at least 2)".to_string());
    if songs.len() < 2 {
        return Err(too_few());
    }
    // Two distinct songs from a fresh shuffle, like any other build.
    let mut cursor = SongCursor::new(songs);
    let (Some(first), Some(second)) = (cursor.next(), cursor.next()) else {
        return Err(too_few());
    };

    let resolution = assets::resolve_segments(&config.segment_specs(), &config.voice_segments_dir)?;
    let segment = resolution
        .found
        .iter()
        .find(|s| s.spec.role == SegmentRole::Middle)
        .or_else(|| resolution.found.first())
        .ok_or_else(|| BuildError::NoAssetsFound("voice segments".to_string()))?;

    info!(
        "Preview: {} -> {} -> {}",
        first.name(),
        segment.spec.identifier,
        second.name()
    );

    let tl = &config.timeline;
    let duck = &config.ducking;
    let song_fade = tl.song_fade_ms as u64;
    let voice_fade = tl.voice_fade_ms as u64;

    let song1 = service.decode(&first.path)?;
    let song2 = service.decode(&second.path)?;
    let voice = service
        .decode(&segment.path)?
        .fade_in(voice_fade)
        .fade_out(voice_fade);

    let song1_end = song1
        .tail_ms(PREVIEW_EXCERPT_MS)
        .fade_out(duck.fade_ms as u64);
    let song2_start = song2
        .head_ms(PREVIEW_EXCERPT_MS)
        .fade_in(song_fade)
        .fade_out(song_fade);

    let voice = if duck.enabled {
        ducking::duck(
            &voice,
            &song1,
            Some(&song2),
            duck,
            duck.preview_policy,
            tl.voice_fade_ms,
        )
    } else {
        voice
    };

    let crossfade = tl.crossfade_ms as u64;
    let show = song1_end
        .append_crossfade(&voice, crossfade)?
        .append_crossfade(&song2_start, crossfade)?;

    let (output_path, size_bytes) =
        export(service, &show, &config.output_dir, PREVIEW_PREFIX, now)?;
    let summary = BuildSummary {
        output_path,
        duration_secs: show.duration().as_secs_f64(),
        size_bytes,
        segments: vec![segment.spec.identifier.clone()],
        song_blocks: 0,
        missing: resolution.missing,
        preview: true,
    };
    info!("Preview complete: {:.1} s", summary.duration_secs);
    Ok(summary)
}

/// Full build, or a preview when the config asks for test mode.
pub fn run_configured(
    config: &ShowConfig,
    service: &dyn AudioService,
    now: DateTime<Local>,
) -> Result<BuildSummary> {
    if config.test_mode {
        run_preview(config, service, now)
    } else {
        run_build(config, service, now)
    }
}

/// Run one build on a `show-build` worker thread. Rejected up front when the
/// slot is taken; `on_done` receives the outcome on the worker.
pub fn spawn_build<F>(
    slot: &BuildSlot,
    config: ShowConfig,
    service: Arc<dyn AudioService>,
    on_done: F,
) -> Result<JoinHandle<()>>
where
    F: FnOnce(Result<BuildSummary>) + Send + 'static,
{
    let guard = slot.try_acquire()?;
    thread::Builder::new()
        .name("show-build".to_string())
        .spawn(move || {
            let result = run_configured(&config, service.as_ref(), Local::now());
            if let Err(e) = &result {
                error!("Build failed: {}", e);
            }
            // Free the slot before reporting, so the callback can start another build.
            drop(guard);
            on_done(result);
        })
        .map_err(BuildError::Io)
}
