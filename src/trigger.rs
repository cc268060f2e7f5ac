use crate::assets::{self, ResolvedSegment, SegmentSpec};
use crate::error::{BuildError, Result};
use crate::freshness::{self, FreshnessConfig, StaleSegment};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

// --- Auto-watch configuration ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoWatchConfig {
    pub enabled: bool,
    /// Quiet period after the last file event before a build is considered.
    pub delay_secs: u64,
}

impl Default for AutoWatchConfig {
    fn default() -> Self {
        AutoWatchConfig {
            enabled: false,
            delay_secs: 10,
        }
    }
}

impl AutoWatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

// --- State machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Watching,
    Debouncing { deadline: Instant },
    Building,
}

/// Decides when a change in the voice folder should turn into a build.
///
/// Transitions:
/// - `Stopped → Watching` on `start`, any state → `Stopped` on `stop`
/// - `Watching | Debouncing → Debouncing` on a voice file event; the deadline
///   restarts on every event
/// - `Debouncing → Watching` when the deadline passes (`on_timer` returns true
///   and the caller evaluates readiness)
/// - `Watching → Building` on `begin_build`, back on `finish_build`
///
/// Time is passed in, never read, so the machine is deterministic.
#[derive(Debug, Clone)]
pub struct AutoBuildTrigger {
    state: WatchState,
    delay: Duration,
}

impl AutoBuildTrigger {
    pub fn new(delay: Duration) -> Self {
        AutoBuildTrigger {
            state: WatchState::Stopped,
            delay,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn start(&mut self) {
        if self.state == WatchState::Stopped {
            self.state = WatchState::Watching;
        }
    }

    /// Drops any pending deadline. A build already running is not affected;
    /// the caller simply stops listening for it.
    pub fn stop(&mut self) {
        self.state = WatchState::Stopped;
    }

    /// A create/modify event for `path`. Returns true when the debounce
    /// deadline was (re)scheduled.
    pub fn on_file_event(&mut self, path: &Path, now: Instant) -> bool {
        if !assets::is_voice_file(path) {
            return false;
        }
        match self.state {
            WatchState::Stopped | WatchState::Building => false,
            WatchState::Watching | WatchState::Debouncing { .. } => {
                self.state = WatchState::Debouncing {
                    deadline: now + self.delay,
                };
                debug!(path = %path.display(), "debounce restarted");
                true
            }
        }
    }

    /// The single outstanding deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WatchState::Debouncing { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Returns true when the deadline has passed. The machine goes back to
    /// `Watching`; the caller should evaluate readiness and call
    /// `begin_build` if everything is in place.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        match self.state {
            WatchState::Debouncing { deadline } if now >= deadline => {
                self.state = WatchState::Watching;
                true
            }
            _ => false,
        }
    }

    pub fn begin_build(&mut self) -> Result<()> {
        match self.state {
            WatchState::Building => Err(BuildError::BuildAlreadyInProgress),
            WatchState::Stopped => Err(BuildError::Watch("auto-build is stopped".to_string())),
            _ => {
                self.state = WatchState::Building;
                Ok(())
            }
        }
    }

    pub fn finish_build(&mut self) {
        if self.state == WatchState::Building {
            self.state = WatchState::Watching;
        }
    }
}

// --- Readiness ---

/// Whether the voice folder is ready for an automatic build.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready(Vec<ResolvedSegment>),
    Missing(Vec<String>),
    Stale(Vec<StaleSegment>),
}

/// Resolve `order` against `voice_dir` and, when freshness checking is on,
/// reject stale files. Missing identifiers are reported before staleness.
pub fn evaluate_readiness(
    order: &[SegmentSpec],
    voice_dir: &Path,
    freshness: &FreshnessConfig,
    now: DateTime<Local>,
) -> Result<Readiness> {
    let resolution = assets::resolve_segments(order, voice_dir)?;
    if !resolution.is_complete() {
        info!("Auto-build waiting, missing: {}", resolution.missing.join(", "));
        return Ok(Readiness::Missing(resolution.missing));
    }
    if resolution.found.is_empty() {
        return Err(BuildError::NoAssetsFound("voice segments".to_string()));
    }
    if freshness.enabled {
        let report = freshness::check(&resolution.found, freshness.max_age_minutes, now);
        if !report.all_fresh {
            info!("Auto-build waiting, {}", BuildError::StaleAssets(report.stale.clone()));
            return Ok(Readiness::Stale(report.stale));
        }
    }
    Ok(Readiness::Ready(resolution.found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DELAY: Duration = Duration::from_secs(10);

    fn watching() -> AutoBuildTrigger {
        let mut trigger = AutoBuildTrigger::new(DELAY);
        trigger.start();
        trigger
    }

    #[test]
    fn starts_stopped_and_ignores_events() {
        let mut trigger = AutoBuildTrigger::new(DELAY);
        assert_eq!(trigger.state(), WatchState::Stopped);
        assert!(!trigger.on_file_event(Path::new("a_intro.mp3"), Instant::now()));
        assert_eq!(trigger.deadline(), None);
    }

    #[test]
    fn burst_of_events_builds_once() {
        let mut trigger = watching();
        let t0 = Instant::now();
        let mut builds = 0;

        // Three events two seconds apart, all inside the window.
        for i in 0..3 {
            let now = t0 + Duration::from_secs(2 * i);
            assert!(!trigger.on_timer(now));
            assert!(trigger.on_file_event(Path::new("002_news.mp3"), now));
        }
        assert_eq!(trigger.deadline(), Some(t0 + Duration::from_secs(4) + DELAY));

        // Tick every second well past the last deadline.
        for s in 0..30 {
            if trigger.on_timer(t0 + Duration::from_secs(s)) {
                trigger.begin_build().unwrap();
                builds += 1;
                trigger.finish_build();
            }
        }
        assert_eq!(builds, 1);
        assert_eq!(trigger.state(), WatchState::Watching);
    }

    #[test]
    fn new_event_pushes_the_deadline_back() {
        let mut trigger = watching();
        let t0 = Instant::now();
        trigger.on_file_event(Path::new("a.wav"), t0);
        trigger.on_file_event(Path::new("a.wav"), t0 + Duration::from_secs(9));
        // The first deadline passes without firing.
        assert!(!trigger.on_timer(t0 + Duration::from_secs(10)));
        assert!(trigger.on_timer(t0 + Duration::from_secs(19)));
    }

    #[test]
    fn non_audio_files_are_ignored() {
        let mut trigger = watching();
        assert!(!trigger.on_file_event(Path::new("notes.txt"), Instant::now()));
        assert!(!trigger.on_file_event(Path::new("song.flac"), Instant::now()));
        assert_eq!(trigger.state(), WatchState::Watching);
    }

    #[test]
    fn events_while_building_are_ignored() {
        let mut trigger = watching();
        trigger.begin_build().unwrap();
        assert!(!trigger.on_file_event(Path::new("a.mp3"), Instant::now()));
        assert_eq!(trigger.state(), WatchState::Building);
        assert!(matches!(
            trigger.begin_build(),
            Err(BuildError::BuildAlreadyInProgress)
        ));
        trigger.finish_build();
        assert_eq!(trigger.state(), WatchState::Watching);
    }

    #[test]
    fn stop_cancels_pending_deadline() {
        let mut trigger = watching();
        let t0 = Instant::now();
        trigger.on_file_event(Path::new("a.mp3"), t0);
        trigger.stop();
        assert_eq!(trigger.deadline(), None);
        assert!(!trigger.on_timer(t0 + DELAY * 2));
        assert!(trigger.begin_build().is_err());
    }

    fn order(ids: &[&str]) -> Vec<SegmentSpec> {
        ids.iter().map(|id| SegmentSpec::new(*id)).collect()
    }

    #[test]
    fn readiness_reports_missing_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("001_intro.mp3"), b"x").unwrap();
        let fresh = FreshnessConfig {
            enabled: true,
            max_age_minutes: 60,
        };
        let r = evaluate_readiness(&order(&["001_intro", "002_outro"]), dir.path(), &fresh, Local::now())
            .unwrap();
        assert_eq!(r, Readiness::Missing(vec!["002_outro".to_string()]));
    }

    #[test]
    fn readiness_rejects_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("001_intro.mp3"), b"x").unwrap();
        let fresh = FreshnessConfig {
            enabled: true,
            max_age_minutes: 5,
        };
        let later = Local::now() + chrono::Duration::minutes(30);
        let r = evaluate_readiness(&order(&["001_intro"]), dir.path(), &fresh, later).unwrap();
        match r {
            Readiness::Stale(stale) => assert_eq!(stale[0].identifier, "001_intro"),
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn readiness_ignores_age_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("001_intro.mp3"), b"x").unwrap();
        let later = Local::now() + chrono::Duration::days(3);
        let r = evaluate_readiness(
            &order(&["001_intro"]),
            dir.path(),
            &FreshnessConfig::default(),
            later,
        )
        .unwrap();
        assert!(matches!(r, Readiness::Ready(found) if found.len() == 1));
    }
}
