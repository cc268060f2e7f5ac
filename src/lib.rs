//! showBuilder: Core library for assembling radio shows from voice segments
//! and songs.
//!
//! Timeline assembly, ducking, freshness checks and the auto-build trigger
//! live here. The `showbuilder` CLI consumes this crate.

pub mod assets;
pub mod audio_io;
pub mod buffer;
pub mod builder;
pub mod config;
pub mod cursor;
pub mod ducking;
pub mod error;
pub mod freshness;
pub mod timeline;
pub mod trigger;
pub mod watcher;
