//! Song Cursor: an endless, reshuffling walk over the song pool.

use crate::assets::SongAsset;
use crate::audio_io::AudioService;
use crate::buffer::AudioBuffer;
use crate::timeline::TimelineConfig;
use tracing::{debug, warn};

/// Length of the filler returned when there are no songs at all.
pub const EMPTY_BLOCK_SILENCE_MS: u64 = 1000;

/// A run of songs crossfaded together.
#[derive(Debug, Clone)]
pub struct SongBlock {
    pub buffer: AudioBuffer,
    /// First song of the block, raw (before song fades).
    pub first_song: Option<AudioBuffer>,
    /// Last song of the block, raw (before song fades).
    pub last_song: Option<AudioBuffer>,
    pub songs_added: usize,
}

/// Cycles over a shuffled copy of the pool and reshuffles on every lap, so it
/// never runs dry. Iterating yields `None` only for an empty pool.
pub struct SongCursor {
    songs: Vec<SongAsset>,
    index: usize,
    rng: fastrand::Rng,
}

impl SongCursor {
    pub fn new(pool: Vec<SongAsset>) -> Self {
        Self::with_rng(pool, fastrand::Rng::new())
    }

    pub fn with_seed(pool: Vec<SongAsset>, seed: u64) -> Self {
        Self::with_rng(pool, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(mut songs: Vec<SongAsset>, mut rng: fastrand::Rng) -> Self {
        rng.shuffle(&mut songs);
        SongCursor {
            songs,
            index: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Order of the current lap.
    pub fn lap_order(&self) -> &[SongAsset] {
        &self.songs
    }

    /// New random order for the next lap. A lap never repeats the previous
    /// lap's order when there are at least two songs.
    fn reshuffle(&mut self) {
        let previous = self.songs.clone();
        self.rng.shuffle(&mut self.songs);
        if self.songs.len() > 1 && self.songs == previous {
            self.songs.rotate_left(1);
        }
        self.index = 0;
        debug!(songs = self.songs.len(), "song pool reshuffled");
    }

    /// Pull `count` songs, fade each, and crossfade them into one block.
    ///
    /// Songs that fail to decode are skipped with a warning and the next
    /// cursor position is tried; after a full pool's worth of consecutive
    /// failures the block is returned as it stands.
    pub fn take_block(
        &mut self,
        count: usize,
        service: &dyn AudioService,
        timeline: &TimelineConfig,
    ) -> SongBlock {
        let silence = || service.silence(EMPTY_BLOCK_SILENCE_MS);
        if self.songs.is_empty() {
            return SongBlock {
                buffer: silence(),
                first_song: None,
                last_song: None,
                songs_added: 0,
            };
        }

        let fade = timeline.song_fade_ms as u64;
        let crossfade = timeline.crossfade_ms as u64;
        let mut block: Option<AudioBuffer> = None;
        let mut first_song = None;
        let mut last_song = None;
        let mut songs_added = 0;
        let mut failures = 0;

        while songs_added < count && failures < self.songs.len() {
            let Some(song) = self.next() else { break };

            let raw = match service.decode(&song.path) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("Could not load {}: {}", song.name(), e);
                    failures += 1;
                    continue;
                }
            };
            debug!("Loaded song {}", song.name());
            let faded = raw.fade_in(fade).fade_out(fade);

            let joined = match &block {
                None => Ok(faded),
                Some(existing) => existing.append_crossfade(&faded, crossfade),
            };
            match joined {
                Ok(buffer) => block = Some(buffer),
                Err(e) => {
                    warn!("Could not join {}: {}", song.name(), e);
                    failures += 1;
                    continue;
                }
            }

            failures = 0;
            songs_added += 1;
            if first_song.is_none() {
                first_song = Some(raw.clone());
            }
            last_song = Some(raw);
        }

        SongBlock {
            buffer: block.unwrap_or_else(silence),
            first_song,
            last_song,
            songs_added,
        }
    }
}

impl Iterator for SongCursor {
    type Item = SongAsset;

    fn next(&mut self) -> Option<SongAsset> {
        if self.songs.is_empty() {
            return None;
        }
        if self.index >= self.songs.len() {
            self.reshuffle();
        }
        let song = self.songs[self.index].clone();
        self.index += 1;
        Some(song)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_io::MemoryService;
    use std::path::PathBuf;

    fn pool(n: usize) -> Vec<SongAsset> {
        (0..n)
            .map(|i| SongAsset {
                path: PathBuf::from(format!("song{i}.mp3")),
            })
            .collect()
    }

    fn timeline() -> TimelineConfig {
        TimelineConfig {
            crossfade_ms: 100,
            voice_fade_ms: 0,
            song_fade_ms: 50,
            songs_between: 2,
        }
    }

    fn service_with(songs: &[SongAsset], ms: usize) -> MemoryService {
        let service = MemoryService::new(1000, 1);
        for song in songs {
            service.insert(song.path.clone(), AudioBuffer::new(vec![0.5; ms], 1000, 1));
        }
        service
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut cursor = SongCursor::new(Vec::new());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn next_never_runs_dry() {
        let mut cursor = SongCursor::with_seed(pool(3), 7);
        for _ in 0..50 {
            assert!(cursor.next().is_some());
        }
    }

    #[test]
    fn every_lap_is_a_permutation_and_differs_from_the_last() {
        for seed in 0..20 {
            let mut cursor = SongCursor::with_seed(pool(3), seed);
            let mut previous: Option<Vec<SongAsset>> = None;
            for _ in 0..10 {
                let lap: Vec<SongAsset> = (0..3).map(|_| cursor.next().unwrap()).collect();
                let mut sorted: Vec<_> = lap.iter().map(|s| s.path.clone()).collect();
                sorted.sort();
                assert_eq!(sorted, pool(3).into_iter().map(|s| s.path).collect::<Vec<_>>());
                if let Some(prev) = &previous {
                    assert_ne!(prev, &lap, "seed {seed}: lap repeated");
                }
                previous = Some(lap);
            }
        }
    }

    #[test]
    fn single_song_pool_loops() {
        let mut cursor = SongCursor::with_seed(pool(1), 1);
        let a = cursor.next().unwrap();
        let b = cursor.next().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn take_block_crossfades_songs() {
        let songs = pool(3);
        let service = service_with(&songs, 1000);
        let mut cursor = SongCursor::with_seed(songs, 3);

        let block = cursor.take_block(2, &service, &timeline());
        assert_eq!(block.songs_added, 2);
        // 1000 + 1000 - 100 ms crossfade.
        assert_eq!(block.buffer.frames(), 1900);
        // Raw song: no fade applied.
        let last = block.last_song.unwrap();
        assert_eq!(last.samples()[0], 0.5);
        assert!(block.first_song.is_some());
    }

    #[test]
    fn take_block_wraps_around_small_pool() {
        let songs = pool(1);
        let service = service_with(&songs, 500);
        let mut cursor = SongCursor::with_seed(songs, 3);

        let block = cursor.take_block(3, &service, &timeline());
        assert_eq!(block.songs_added, 3);
        assert_eq!(block.buffer.frames(), 500 * 3 - 200);
    }

    #[test]
    fn take_block_on_empty_pool_is_silence() {
        let service = MemoryService::new(1000, 1);
        let mut cursor = SongCursor::new(Vec::new());
        let block = cursor.take_block(2, &service, &timeline());
        assert_eq!(block.songs_added, 0);
        assert!(block.last_song.is_none());
        assert_eq!(block.buffer.duration_ms(), EMPTY_BLOCK_SILENCE_MS);
    }

    #[test]
    fn take_block_skips_songs_that_fail_to_decode() {
        let songs = pool(3);
        let service = service_with(&songs, 1000);
        service.break_path(songs[0].path.clone());
        let mut cursor = SongCursor::with_seed(songs, 11);

        let block = cursor.take_block(2, &service, &timeline());
        assert_eq!(block.songs_added, 2);
    }

    #[test]
    fn take_block_gives_up_when_every_song_fails() {
        let songs = pool(2);
        let service = MemoryService::new(1000, 1);
        let mut cursor = SongCursor::with_seed(songs, 5);

        let block = cursor.take_block(2, &service, &timeline());
        assert_eq!(block.songs_added, 0);
        assert!(block.last_song.is_none());
        assert_eq!(block.buffer.duration_ms(), EMPTY_BLOCK_SILENCE_MS);
    }
}
