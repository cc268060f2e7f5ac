use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use show_builder::assets;
use show_builder::audio_io::{AudioService, RodioService};
use show_builder::builder::{self, BuildSlot, BuildSummary};
use show_builder::config::{CONFIG_FILE, DuckPreset, ShowConfig, TimelinePreset};
use show_builder::ducking::DuckPolicy;
use show_builder::freshness::{self, age_minutes};
use show_builder::watcher::{self, AutoBuildEvent};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "showbuilder", about = "Radio show builder CLI")]
struct Cli {
    /// Config file to read and update
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current configuration and folder contents
    Status,
    /// Build the full show (or a preview when test mode is on)
    Build {
        /// Build a preview regardless of test mode
        #[arg(long)]
        preview: bool,
    },
    /// Build a short preview: song 1 end, one voice segment, song 2 start
    Preview,
    /// Watch the voice folder and build when fresh files are in place
    Watch,
    /// List voice segments found in the voice folder
    Scan {
        /// Replace the configured segment order with the scan result
        #[arg(long)]
        save: bool,
    },
    /// Check that every configured segment exists and is fresh
    Check,
    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the configuration
    Show,
    /// Apply a fade preset: smooth, quick, podcast
    Preset { name: String },
    /// Apply a ducking preset: classic, subtle, heavy, none
    Ducking { name: String },
    /// Set the ducking policy: full-bed or edge-only
    Policy {
        policy: String,
        /// Set the policy used for previews instead
        #[arg(long)]
        preview: bool,
    },
    /// Set fade and crossfade lengths in milliseconds
    Fades {
        #[arg(long)]
        crossfade: Option<u32>,
        #[arg(long)]
        song: Option<u32>,
        #[arg(long)]
        voice: Option<u32>,
    },
    /// Songs played between voice segments
    Songs { count: usize },
    /// Set working folders
    Folders {
        #[arg(long)]
        voice: Option<PathBuf>,
        #[arg(long)]
        songs: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace the segment order
    Segments {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Refuse to build from old voice files
    Freshness {
        state: Toggle,
        /// Maximum file age in minutes
        #[arg(long)]
        max_age: Option<u32>,
    },
    /// Build automatically when voice files change
    AutoWatch {
        state: Toggle,
        /// Quiet period in seconds before building
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Build a preview instead of the full show
    TestMode { state: Toggle },
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

fn save(config: &ShowConfig, path: &Path) {
    if let Err(e) = config.save(path) {
        fail(e);
    }
}

fn print_summary(summary: &BuildSummary) {
    println!("Output: {}", summary.output_path.display());
    if summary.preview {
        println!("Duration: {:.1} s", summary.duration_secs);
    } else {
        println!(
            "Duration: {:.1} min | Song blocks: {}",
            summary.duration_minutes(),
            summary.song_blocks
        );
    }
    println!("Size: {:.1} MB", summary.size_mb());
    if !summary.missing.is_empty() {
        println!("Skipped (not found): {}", summary.missing.join(", "));
    }
}

fn print_config(config: &ShowConfig) {
    println!("Voice folder:  {}", config.voice_segments_dir.display());
    println!("Songs folder:  {}", config.songs_dir.display());
    println!("Output folder: {}", config.output_dir.display());
    println!("Segments: {}", config.segments.join(", "));
    let tl = &config.timeline;
    println!(
        "Crossfade: {}ms | Song fade: {}ms | Voice fade: {}ms | Songs between: {}",
        tl.crossfade_ms, tl.song_fade_ms, tl.voice_fade_ms, tl.songs_between
    );
    let duck = &config.ducking;
    if duck.enabled {
        println!(
            "Ducking: {} dB, {}ms fade | policy {:?} | preview {:?}",
            duck.gain_db, duck.fade_ms, duck.policy, duck.preview_policy
        );
    } else {
        println!("Ducking: off");
    }
    if config.freshness.enabled {
        println!("Freshness: max {} min", config.freshness.max_age_minutes);
    } else {
        println!("Freshness: off");
    }
    if config.auto_watch.enabled {
        println!("Auto-watch: {}s delay", config.auto_watch.delay_secs);
    } else {
        println!("Auto-watch: off");
    }
    println!("Test mode: {}", if config.test_mode { "on" } else { "off" });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,show_builder=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config;
    let mut config = ShowConfig::load_or_default(&config_path);

    match cli.command {
        Commands::Status => {
            println!("showBuilder v{}", env!("CARGO_PKG_VERSION"));
            print_config(&config);
            let voices = assets::scan_voice_folder(&config.voice_segments_dir)
                .map(|v| v.len().to_string())
                .unwrap_or_else(|_| "folder missing".to_string());
            let songs = assets::load_songs(&config.songs_dir)
                .map(|s| s.len().to_string())
                .unwrap_or_else(|_| "folder missing".to_string());
            println!("Voice files: {} | Songs: {}", voices, songs);
        }
        Commands::Build { preview } => {
            let service = RodioService::new();
            let result = if preview {
                builder::run_preview(&config, &service, Local::now())
            } else {
                builder::run_configured(&config, &service, Local::now())
            };
            match result {
                Ok(summary) => print_summary(&summary),
                Err(e) => fail(e),
            }
        }
        Commands::Preview => {
            let service = RodioService::new();
            match builder::run_preview(&config, &service, Local::now()) {
                Ok(summary) => print_summary(&summary),
                Err(e) => fail(e),
            }
        }
        Commands::Watch => {
            let service: Arc<dyn AudioService> = Arc::new(RodioService::new());
            let handle = watcher::spawn_auto_builder(
                config.clone(),
                service,
                BuildSlot::new(),
                |event| match event {
                    AutoBuildEvent::Watching => println!("Watching for voice files..."),
                    AutoBuildEvent::Debouncing { path } => {
                        println!("Change: {}", path.display())
                    }
                    AutoBuildEvent::Missing(ids) => println!("Waiting, missing: {}", ids.join(", ")),
                    AutoBuildEvent::Stale(stale) => {
                        for s in stale {
                            println!("Waiting, too old: {} ({:.1} min)", s.identifier, s.age_minutes);
                        }
                    }
                    AutoBuildEvent::Rejected(e) => println!("Build not started: {}", e),
                    AutoBuildEvent::Built(summary) => print_summary(&summary),
                    AutoBuildEvent::BuildFailed(e) => eprintln!("Build failed: {}", e),
                    AutoBuildEvent::Stopped => println!("Auto-build stopped."),
                },
            );
            let mut handle = handle.unwrap_or_else(|e| fail(e));
            println!("Press Enter to stop.");
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            handle.stop();
        }
        Commands::Scan { save: write } => {
            let found = assets::scan_voice_folder(&config.voice_segments_dir)
                .unwrap_or_else(|e| fail(e));
            if found.is_empty() {
                println!("No voice segments found.");
                return;
            }
            for (i, id) in found.iter().enumerate() {
                println!("{:>3}. {}", i + 1, id);
            }
            if write {
                config.segments = found;
                save(&config, &config_path);
                println!("Segment order saved.");
            }
        }
        Commands::Check => {
            let resolution =
                assets::resolve_segments(&config.segment_specs(), &config.voice_segments_dir)
                    .unwrap_or_else(|e| fail(e));
            let now = Local::now();
            for seg in &resolution.found {
                println!(
                    "  ok  {} ({:.1} min old)",
                    seg.spec.identifier,
                    age_minutes(seg.mtime, now)
                );
            }
            for id in &resolution.missing {
                println!("  --  {} (not found)", id);
            }
            if config.freshness.enabled {
                let report =
                    freshness::check(&resolution.found, config.freshness.max_age_minutes, now);
                if !report.all_fresh {
                    fail(show_builder::error::BuildError::StaleAssets(report.stale));
                }
            }
            if !resolution.is_complete() {
                std::process::exit(1);
            }
            println!("All segments ready.");
        }
        Commands::Config { action } => {
            match action {
                ConfigCmd::Show => {
                    print_config(&config);
                    return;
                }
                ConfigCmd::Preset { name } => {
                    let preset = TimelinePreset::from_name(&name)
                        .unwrap_or_else(|| fail(format!("unknown preset '{}'", name)));
                    config.apply_timeline_preset(preset);
                    println!("Applied '{}' preset.", preset.name());
                }
                ConfigCmd::Ducking { name } => {
                    let preset = DuckPreset::from_name(&name)
                        .unwrap_or_else(|| fail(format!("unknown ducking preset '{}'", name)));
                    config.apply_duck_preset(preset);
                    println!("Applied '{}' ducking.", preset.name());
                }
                ConfigCmd::Policy { policy, preview } => {
                    let parsed = DuckPolicy::from_name(&policy)
                        .unwrap_or_else(|| fail(format!("unknown policy '{}'", policy)));
                    if preview {
                        config.ducking.preview_policy = parsed;
                    } else {
                        config.ducking.policy = parsed;
                    }
                    println!("Ducking policy set to {:?}.", parsed);
                }
                ConfigCmd::Fades {
                    crossfade,
                    song,
                    voice,
                } => {
                    if let Some(ms) = crossfade {
                        config.timeline.crossfade_ms = ms;
                    }
                    if let Some(ms) = song {
                        config.timeline.song_fade_ms = ms;
                    }
                    if let Some(ms) = voice {
                        config.timeline.voice_fade_ms = ms;
                    }
                }
                ConfigCmd::Songs { count } => {
                    if count == 0 {
                        fail("songs between segments must be at least 1");
                    }
                    config.timeline.songs_between = count;
                }
                ConfigCmd::Folders {
                    voice,
                    songs,
                    output,
                } => {
                    if let Some(p) = voice {
                        config.voice_segments_dir = p;
                    }
                    if let Some(p) = songs {
                        config.songs_dir = p;
                    }
                    if let Some(p) = output {
                        config.output_dir = p;
                    }
                }
                ConfigCmd::Segments { ids } => {
                    config.segments = ids;
                }
                ConfigCmd::Freshness { state, max_age } => {
                    config.freshness.enabled = state.enabled();
                    if let Some(minutes) = max_age {
                        config.freshness.max_age_minutes = minutes;
                    }
                }
                ConfigCmd::AutoWatch { state, delay } => {
                    config.auto_watch.enabled = state.enabled();
                    if let Some(secs) = delay {
                        config.auto_watch.delay_secs = secs;
                    }
                }
                ConfigCmd::TestMode { state } => {
                    config.test_mode = state.enabled();
                }
            }
            if let Err(e) = config.validate() {
                fail(e);
            }
            save(&config, &config_path);
            print_config(&config);
        }
    }
}
