use crate::error::{BuildError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions accepted for voice segments.
pub const VOICE_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg"];

/// Extensions accepted for songs.
pub const SONG_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac"];

/// Where a segment sits in the show, derived from its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentRole {
    Intro,
    Middle,
    Outro,
}

impl SegmentRole {
    /// Case-insensitive substring match; "intro" wins over "outro".
    pub fn classify(identifier: &str) -> Self {
        let lower = identifier.to_lowercase();
        if lower.contains("intro") {
            SegmentRole::Intro
        } else if lower.contains("outro") {
            SegmentRole::Outro
        } else {
            SegmentRole::Middle
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    pub identifier: String,
    pub role: SegmentRole,
}

impl SegmentSpec {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let role = SegmentRole::classify(&identifier);
        SegmentSpec { identifier, role }
    }
}

/// Build the ordered segment list from configured identifiers.
/// Blank entries and repeats of an earlier identifier are dropped.
pub fn specs_from_identifiers(identifiers: &[String]) -> Vec<SegmentSpec> {
    let mut seen: Vec<String> = Vec::new();
    let mut specs = Vec::new();
    for id in identifiers {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        let key = id.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        specs.push(SegmentSpec::new(id));
    }
    specs
}

/// A segment matched to a file. `mtime` is sampled once, at resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegment {
    pub spec: SegmentSpec,
    pub path: PathBuf,
    pub mtime: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongAsset {
    pub path: PathBuf,
}

impl SongAsset {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Outcome of resolving the segment order against a folder.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub found: Vec<ResolvedSegment>,
    pub missing: Vec<String>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

pub fn is_voice_file(path: &Path) -> bool {
    has_extension(path, VOICE_EXTENSIONS)
}

pub fn is_song_file(path: &Path) -> bool {
    has_extension(path, SONG_EXTENSIONS)
}

/// Files in `folder` (non-recursive) with one of `extensions`, sorted by name.
fn list_audio_files(folder: &Path, what: &'static str, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(BuildError::MissingFolder {
            what,
            path: folder.to_path_buf(),
        });
    }
    let mut files: Vec<PathBuf> = fs::read_dir(folder)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    files.sort();
    Ok(files)
}

fn stem_lower(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Match each identifier, in order, to the first voice file whose stem starts
/// with it (case-insensitive). Unmatched identifiers are reported in
/// `missing`; a partial result is still a success.
pub fn resolve_segments(order: &[SegmentSpec], folder: &Path) -> Result<Resolution> {
    let files = list_audio_files(folder, "Voice segments", VOICE_EXTENSIONS)?;
    let stems: Vec<String> = files.iter().map(|p| stem_lower(p)).collect();

    let mut resolution = Resolution::default();
    for spec in order {
        let prefix = spec.identifier.to_lowercase();
        match stems.iter().position(|stem| stem.starts_with(&prefix)) {
            Some(idx) => {
                let path = files[idx].clone();
                let modified = fs::metadata(&path)?.modified()?;
                resolution.found.push(ResolvedSegment {
                    spec: spec.clone(),
                    path,
                    mtime: DateTime::<Local>::from(modified),
                });
            }
            None => resolution.missing.push(spec.identifier.clone()),
        }
    }
    Ok(resolution)
}

/// Every song in the folder. Order is the caller's business (see `SongCursor`).
pub fn load_songs(folder: &Path) -> Result<Vec<SongAsset>> {
    Ok(list_audio_files(folder, "Songs", SONG_EXTENSIONS)?
        .into_iter()
        .map(|path| SongAsset { path })
        .collect())
}

/// All voice stems in the folder, intros first, then middle segments, then
/// outros; each group sorted alphabetically.
pub fn scan_voice_folder(folder: &Path) -> Result<Vec<String>> {
    let files = list_audio_files(folder, "Voice segments", VOICE_EXTENSIONS)?;

    let mut intros = Vec::new();
    let mut middles = Vec::new();
    let mut outros = Vec::new();
    for path in &files {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        match SegmentRole::classify(&stem) {
            SegmentRole::Intro => intros.push(stem),
            SegmentRole::Middle => middles.push(stem),
            SegmentRole::Outro => outros.push(stem),
        }
    }
    intros.sort();
    middles.sort();
    outros.sort();

    intros.extend(middles);
    intros.extend(outros);
    Ok(intros)
}
