use crate::assets::{self, SegmentSpec};
use crate::ducking::DuckConfig;
use crate::error::{BuildError, Result};
use crate::freshness::FreshnessConfig;
use crate::timeline::TimelineConfig;
use crate::trigger::AutoWatchConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CONFIG_FILE: &str = "showbuilder_config.json";

/// Segment order used when nothing has been configured.
pub const DEFAULT_SEGMENTS: &[&str] = &[
    "001_intro",
    "002_weather",
    "003_traffic",
    "004_headlines",
    "005_bumper",
    "006_outro",
];

/// Everything a build needs. Passed by value into each build; nothing in the
/// engine reads global settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    pub voice_segments_dir: PathBuf,
    pub songs_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Ordered segment identifiers.
    pub segments: Vec<String>,
    pub timeline: TimelineConfig,
    pub ducking: DuckConfig,
    pub freshness: FreshnessConfig,
    pub auto_watch: AutoWatchConfig,
    /// Build a short preview instead of the full show.
    pub test_mode: bool,
}

fn station_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("RadioStation")
}

impl Default for ShowConfig {
    fn default() -> Self {
        let root = station_dir();
        ShowConfig {
            voice_segments_dir: root.join("voice_segments"),
            songs_dir: root.join("songs"),
            output_dir: root.join("output"),
            segments: DEFAULT_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            timeline: TimelineConfig::default(),
            ducking: DuckConfig::default(),
            freshness: FreshnessConfig::default(),
            auto_watch: AutoWatchConfig::default(),
            test_mode: false,
        }
    }
}

impl ShowConfig {
    /// Load from `path`. A missing file gives the defaults; a corrupt one is
    /// an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(ShowConfig::default());
        }
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| BuildError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Like `load`, but falls back to the defaults on any error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not load config, using defaults: {}", e);
                ShowConfig::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BuildError::Config(format!("Serialize error: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.timeline.songs_between == 0 {
            return Err(BuildError::Config(
                "songs_between must be at least 1".to_string(),
            ));
        }
        if self.ducking.gain_db > 0 {
            return Err(BuildError::Config(format!(
                "ducking gain must not be positive (got {} dB)",
                self.ducking.gain_db
            )));
        }
        Ok(())
    }

    /// The configured identifiers as segment specs, blanks and repeats dropped.
    pub fn segment_specs(&self) -> Vec<SegmentSpec> {
        assets::specs_from_identifiers(&self.segments)
    }

    pub fn apply_timeline_preset(&mut self, preset: TimelinePreset) {
        let songs_between = self.timeline.songs_between;
        self.timeline = preset.config();
        self.timeline.songs_between = songs_between;
    }

    pub fn apply_duck_preset(&mut self, preset: DuckPreset) {
        let policy = self.ducking.policy;
        let preview_policy = self.ducking.preview_policy;
        self.ducking = preset.config();
        self.ducking.policy = policy;
        self.ducking.preview_policy = preview_policy;
    }
}

// --- Presets ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelinePreset {
    Smooth,
    Quick,
    Podcast,
}

impl TimelinePreset {
    pub const ALL: [TimelinePreset; 3] = [
        TimelinePreset::Smooth,
        TimelinePreset::Quick,
        TimelinePreset::Podcast,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimelinePreset::Smooth => "smooth",
            TimelinePreset::Quick => "quick",
            TimelinePreset::Podcast => "podcast",
        }
    }

    /// Fades and crossfade for the preset; `songs_between` is the default.
    pub fn config(&self) -> TimelineConfig {
        let (crossfade_ms, song_fade_ms, voice_fade_ms) = match self {
            TimelinePreset::Smooth => (3000, 4000, 800),
            TimelinePreset::Quick => (500, 1000, 200),
            TimelinePreset::Podcast => (1500, 2000, 500),
        };
        TimelineConfig {
            crossfade_ms,
            voice_fade_ms,
            song_fade_ms,
            ..TimelineConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuckPreset {
    Classic,
    Subtle,
    Heavy,
    None,
}

impl DuckPreset {
    pub const ALL: [DuckPreset; 4] = [
        DuckPreset::Classic,
        DuckPreset::Subtle,
        DuckPreset::Heavy,
        DuckPreset::None,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            DuckPreset::Classic => "classic",
            DuckPreset::Subtle => "subtle",
            DuckPreset::Heavy => "heavy",
            DuckPreset::None => "none",
        }
    }

    pub fn config(&self) -> DuckConfig {
        let (enabled, gain_db, fade_ms) = match self {
            DuckPreset::Classic => (true, -15, 500),
            DuckPreset::Subtle => (true, -8, 300),
            DuckPreset::Heavy => (true, -25, 400),
            DuckPreset::None => (false, -15, 500),
        };
        DuckConfig {
            enabled,
            gain_db,
            fade_ms,
            ..DuckConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ducking::DuckPolicy;

    #[test]
    fn defaults_match_the_station_layout() {
        let config = ShowConfig::default();
        assert_eq!(config.segments.len(), 6);
        assert_eq!(config.timeline.crossfade_ms, 2000);
        assert_eq!(config.timeline.song_fade_ms, 3000);
        assert_eq!(config.timeline.voice_fade_ms, 500);
        assert_eq!(config.timeline.songs_between, 2);
        assert!(config.ducking.enabled);
        assert_eq!(config.ducking.gain_db, -15);
        assert!(!config.freshness.enabled);
        assert!(config.voice_segments_dir.ends_with("RadioStation/voice_segments"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = ShowConfig::default();
        config.segments = vec!["a_intro".into(), "b_outro".into()];
        config.ducking.policy = DuckPolicy::EdgeOnly;
        config.save(&path).unwrap();

        let loaded = ShowConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ShowConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, ShowConfig::default());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{"segments":["x_intro"],"timeline":{"crossfade_ms":750}}"#;
        let config: ShowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.segments, vec!["x_intro".to_string()]);
        assert_eq!(config.timeline.crossfade_ms, 750);
        assert_eq!(config.timeline.songs_between, 2);
        assert_eq!(config.ducking, DuckConfig::default());
    }

    #[test]
    fn corrupt_file_is_an_error_but_load_or_default_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ShowConfig::load(&path), Err(BuildError::Config(_))));
        assert_eq!(ShowConfig::load_or_default(&path), ShowConfig::default());
    }

    #[test]
    fn validate_rejects_zero_songs_and_positive_gain() {
        let mut config = ShowConfig::default();
        config.timeline.songs_between = 0;
        assert!(config.validate().is_err());

        let mut config = ShowConfig::default();
        config.ducking.gain_db = 3;
        assert!(config.validate().is_err());

        assert!(ShowConfig::default().validate().is_ok());
    }

    #[test]
    fn timeline_preset_keeps_songs_between() {
        let mut config = ShowConfig::default();
        config.timeline.songs_between = 4;
        config.apply_timeline_preset(TimelinePreset::from_name("Smooth").unwrap());
        assert_eq!(config.timeline.crossfade_ms, 3000);
        assert_eq!(config.timeline.song_fade_ms, 4000);
        assert_eq!(config.timeline.voice_fade_ms, 800);
        assert_eq!(config.timeline.songs_between, 4);
    }

    #[test]
    fn duck_preset_none_disables_and_keeps_policy() {
        let mut config = ShowConfig::default();
        config.ducking.policy = DuckPolicy::EdgeOnly;
        config.apply_duck_preset(DuckPreset::None);
        assert!(!config.ducking.enabled);
        assert_eq!(config.ducking.policy, DuckPolicy::EdgeOnly);

        config.apply_duck_preset(DuckPreset::from_name("heavy").unwrap());
        assert!(config.ducking.enabled);
        assert_eq!(config.ducking.gain_db, -25);
    }

    #[test]
    fn unknown_preset_names() {
        assert!(TimelinePreset::from_name("slow").is_none());
        assert!(DuckPreset::from_name("loud").is_none());
    }
}
