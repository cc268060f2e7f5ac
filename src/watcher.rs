//! Auto-build runtime: a control thread that owns the `AutoBuildTrigger` and a
//! file-system watch that feeds it.
//!
//! Everything that changes trigger state arrives as a `ControlMsg` on one
//! channel: file events from the notify callback, build results from the
//! worker, and stop requests from the handle. The control thread waits with
//! `recv_timeout` until the single outstanding debounce deadline, so there is
//! never a separate timer to cancel.

use crate::audio_io::AudioService;
use crate::builder::{self, BuildSlot, BuildSummary};
use crate::config::ShowConfig;
use crate::error::{BuildError, Result};
use crate::freshness::StaleSegment;
use crate::trigger::{self, AutoBuildTrigger, Readiness};
use chrono::Local;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Messages & Events ────────────────────────────────────────────────────────

/// Messages processed by the control thread.
#[derive(Debug)]
pub enum ControlMsg {
    FileChanged(PathBuf),
    BuildFinished(std::result::Result<BuildSummary, String>),
    Stop,
}

/// What the control thread reports back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoBuildEvent {
    Watching,
    Debouncing { path: PathBuf },
    /// Deadline passed but some identifiers have no file yet.
    Missing(Vec<String>),
    /// Deadline passed but some files are too old.
    Stale(Vec<StaleSegment>),
    /// A build could not be started.
    Rejected(String),
    Built(BuildSummary),
    BuildFailed(String),
    Stopped,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Controls a running auto-builder. Dropping the handle stops it.
pub struct AutoBuildHandle {
    tx: mpsc::Sender<ControlMsg>,
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl AutoBuildHandle {
    /// Report a change in the voice folder, as the fs watch does.
    pub fn file_changed(&self, path: impl Into<PathBuf>) {
        let _ = self.tx.send(ControlMsg::FileChanged(path.into()));
    }

    /// Unsubscribe from file events, drop any pending deadline and wait for
    /// the control thread to exit. A build already running finishes on its
    /// own worker.
    pub fn stop(&mut self) {
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(ControlMsg::Stop);
            if thread.join().is_err() {
                warn!("auto-build control thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for AutoBuildHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the control thread without a file-system watch. File events are fed
/// through `AutoBuildHandle::file_changed`.
///
/// `on_event` is called from the control thread.
pub fn spawn_controller<F>(
    config: ShowConfig,
    service: Arc<dyn AudioService>,
    slot: BuildSlot,
    on_event: F,
) -> Result<AutoBuildHandle>
where
    F: Fn(AutoBuildEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<ControlMsg>();
    let loop_tx = tx.clone();

    let thread = thread::Builder::new()
        .name("auto-build".into())
        .spawn(move || control_loop(rx, loop_tx, config, service, slot, on_event))?;

    Ok(AutoBuildHandle {
        tx,
        watcher: None,
        thread: Some(thread),
    })
}

/// Spawn the control thread and watch the voice folder (non-recursive) for
/// created and modified files. Refused unless `auto_watch.enabled` is set.
pub fn spawn_auto_builder<F>(
    config: ShowConfig,
    service: Arc<dyn AudioService>,
    slot: BuildSlot,
    on_event: F,
) -> Result<AutoBuildHandle>
where
    F: Fn(AutoBuildEvent) + Send + 'static,
{
    if !config.auto_watch.enabled {
        return Err(BuildError::Config("auto-watch is disabled".to_string()));
    }
    let voice_dir = config.voice_segments_dir.clone();
    if !voice_dir.is_dir() {
        return Err(BuildError::MissingFolder {
            what: "Voice segments",
            path: voice_dir,
        });
    }

    let mut handle = spawn_controller(config, service, slot, on_event)?;

    let fs_tx = handle.tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        let _ = fs_tx.send(ControlMsg::FileChanged(path));
                    }
                }
            }
            Err(e) => warn!("watch error: {}", e),
        }
    })
    .map_err(|e| BuildError::Watch(e.to_string()))?;
    watcher
        .watch(&voice_dir, RecursiveMode::NonRecursive)
        .map_err(|e| BuildError::Watch(e.to_string()))?;

    info!("Watching {}", voice_dir.display());
    handle.watcher = Some(watcher);
    Ok(handle)
}

/// Main loop for the control thread. Owns the trigger.
fn control_loop<F>(
    rx: mpsc::Receiver<ControlMsg>,
    tx: mpsc::Sender<ControlMsg>,
    config: ShowConfig,
    service: Arc<dyn AudioService>,
    slot: BuildSlot,
    on_event: F,
) where
    F: Fn(AutoBuildEvent),
{
    let order = config.segment_specs();
    // Automatic builds always produce the full show.
    let build_config = ShowConfig {
        test_mode: false,
        ..config.clone()
    };
    let mut trigger = AutoBuildTrigger::new(config.auto_watch.delay());
    trigger.start();
    on_event(AutoBuildEvent::Watching);

    loop {
        let msg = match trigger.deadline() {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match msg {
            Ok(ControlMsg::FileChanged(path)) => {
                if trigger.on_file_event(&path, Instant::now()) {
                    on_event(AutoBuildEvent::Debouncing { path });
                }
            }
            Ok(ControlMsg::BuildFinished(result)) => {
                trigger.finish_build();
                match result {
                    Ok(summary) => on_event(AutoBuildEvent::Built(summary)),
                    Err(e) => on_event(AutoBuildEvent::BuildFailed(e)),
                }
            }
            Ok(ControlMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if !trigger.on_timer(Instant::now()) {
            continue;
        }

        debug!("debounce expired, checking voice folder");
        let readiness = trigger::evaluate_readiness(
            &order,
            &config.voice_segments_dir,
            &config.freshness,
            Local::now(),
        );
        match readiness {
            Ok(Readiness::Ready(found)) => {
                if let Err(e) = trigger.begin_build() {
                    on_event(AutoBuildEvent::Rejected(e.to_string()));
                    continue;
                }
                info!("Auto-building show from {} segments", found.len());
                let done_tx = tx.clone();
                let spawned = builder::spawn_build(
                    &slot,
                    build_config.clone(),
                    Arc::clone(&service),
                    move |result| {
                        let _ = done_tx.send(ControlMsg::BuildFinished(
                            result.map_err(|e| e.to_string()),
                        ));
                    },
                );
                if let Err(e) = spawned {
                    trigger.finish_build();
                    on_event(AutoBuildEvent::Rejected(e.to_string()));
                }
            }
            Ok(Readiness::Missing(ids)) => on_event(AutoBuildEvent::Missing(ids)),
            Ok(Readiness::Stale(stale)) => on_event(AutoBuildEvent::Stale(stale)),
            Err(e) => on_event(AutoBuildEvent::BuildFailed(e.to_string())),
        }
    }

    trigger.stop();
    on_event(AutoBuildEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_io::MemoryService;
    use std::fs;
    use std::time::Duration;

    fn config_in(dir: &std::path::Path) -> ShowConfig {
        let mut config = ShowConfig::default();
        config.voice_segments_dir = dir.join("voice");
        config.songs_dir = dir.join("songs");
        config.output_dir = dir.join("out");
        config.segments = vec!["001_intro".into(), "002_outro".into()];
        config.auto_watch.delay_secs = 0;
        fs::create_dir_all(&config.voice_segments_dir).unwrap();
        fs::create_dir_all(&config.songs_dir).unwrap();
        config
    }

    fn recv_until<P>(rx: &mpsc::Receiver<AutoBuildEvent>, pred: P) -> AutoBuildEvent
    where
        P: Fn(&AutoBuildEvent) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let event = rx.recv_timeout(left).expect("expected event");
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn missing_files_keep_watching() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(config.voice_segments_dir.join("001_intro.mp3"), b"x").unwrap();

        let (ev_tx, ev_rx) = mpsc::channel();
        let service: Arc<dyn AudioService> = Arc::new(MemoryService::new(1000, 1));
        let mut handle = spawn_controller(config, service, BuildSlot::new(), move |e| {
            let _ = ev_tx.send(e);
        })
        .unwrap();

        handle.file_changed("001_intro.mp3");
        let event = recv_until(&ev_rx, |e| matches!(e, AutoBuildEvent::Missing(_)));
        assert_eq!(event, AutoBuildEvent::Missing(vec!["002_outro".to_string()]));

        handle.stop();
        recv_until(&ev_rx, |e| *e == AutoBuildEvent::Stopped);
        assert!(!handle.is_running());
    }

    #[test]
    fn busy_slot_rejects_auto_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(config.voice_segments_dir.join("001_intro.mp3"), b"x").unwrap();
        fs::write(config.voice_segments_dir.join("002_outro.mp3"), b"x").unwrap();

        let slot = BuildSlot::new();
        let _manual = slot.try_acquire().unwrap();

        let (ev_tx, ev_rx) = mpsc::channel();
        let service: Arc<dyn AudioService> = Arc::new(MemoryService::new(1000, 1));
        let handle = spawn_controller(config, service, slot, move |e| {
            let _ = ev_tx.send(e);
        })
        .unwrap();

        handle.file_changed("002_outro.mp3");
        let event = recv_until(&ev_rx, |e| matches!(e, AutoBuildEvent::Rejected(_)));
        assert_eq!(
            event,
            AutoBuildEvent::Rejected(BuildError::BuildAlreadyInProgress.to_string())
        );
    }

    #[test]
    fn auto_builder_needs_the_voice_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShowConfig::default();
        config.auto_watch.enabled = true;
        config.voice_segments_dir = dir.path().join("missing");
        let service: Arc<dyn AudioService> = Arc::new(MemoryService::new(1000, 1));
        let result = spawn_auto_builder(config, service, BuildSlot::new(), |_| {});
        assert!(matches!(result, Err(BuildError::MissingFolder { .. })));
    }

    #[test]
    fn auto_builder_refuses_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShowConfig::default();
        config.voice_segments_dir = dir.path().to_path_buf();
        assert!(!config.auto_watch.enabled);
        let service: Arc<dyn AudioService> = Arc::new(MemoryService::new(1000, 1));
        let (tx, rx) = mpsc::channel();
        let result = spawn_auto_builder(config, service, BuildSlot::new(), move |event| {
            let _ = tx.send(event);
        });
        assert!(matches!(result, Err(BuildError::Config(_))));
        // No control thread was started.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
