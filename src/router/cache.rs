//! Persistent, key-addressable travel-time cache (§4.A, §6 wire format).
//!
//! The cache is modeled as an owned component with one writer and many
//! readers: reads go through a `parking_lot::RwLock` so they never block on
//! each other, and writes are batched, flushing to disk no more than once
//! per 500ms of contiguous mutation, plus an explicit flush on shutdown.
//! Rewriting the backing file is an atomic tempfile-then-rename so a reader
//! restarting mid-write never observes a torn file.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

const FLUSH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Rounds a coordinate to 5 decimal places, matching §4.A's cache key.
fn round5(v: f64) -> f64 {
    (v * 1e5).round() / 1e5
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
struct CacheKey {
    lat_a: f64,
    lon_a: f64,
    lat_b: f64,
    lon_b: f64,
}

impl CacheKey {
    fn new(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            lat_a: round5(a.0),
            lon_a: round5(a.1),
            lat_b: round5(b.0),
            lon_b: round5(b.1),
        }
    }

    fn to_line(self, minutes: u32) -> String {
        format!(
            "{:.5},{:.5}|{:.5},{:.5}={}",
            self.lat_a, self.lon_a, self.lat_b, self.lon_b, minutes
        )
    }

    fn from_line(line: &str) -> Option<(Self, u32)> {
        let (coords, minutes) = line.rsplit_once('=')?;
        let minutes: u32 = minutes.trim().parse().ok()?;
        let (a, b) = coords.split_once('|')?;
        let (lat_a, lon_a) = a.split_once(',')?;
        let (lat_b, lon_b) = b.split_once(',')?;
        Some((
            Self {
                lat_a: lat_a.trim().parse().ok()?,
                lon_a: lon_a.trim().parse().ok()?,
                lat_b: lat_b.trim().parse().ok()?,
                lon_b: lon_b.trim().parse().ok()?,
            },
            minutes,
        ))
    }
}

// f64 fields above are always the output of `round5`, so bit-for-bit
// equality is meaningful as a cache key. `Eq`/`Hash` are implemented on the
// rounded representation via the bit pattern to sidestep `f64`'s missing
// `Eq` impl.
impl Eq for CacheKey {}
impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.lat_a.to_bits().hash(state);
        self.lon_a.to_bits().hash(state);
        self.lat_b.to_bits().hash(state);
        self.lon_b.to_bits().hash(state);
    }
}

pub struct TravelTimeCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<CacheKey, u32>>,
    pending: Mutex<PendingWrites>,
}

struct PendingWrites {
    dirty: bool,
    last_flush: Instant,
}

impl TravelTimeCache {
    /// Loads the cache from `path` if it exists; an absent or unreadable
    /// file just starts an empty cache (the host is responsible for
    /// creating directories — the core never does, per §6).
    pub fn load(path: Option<PathBuf>) -> Self {
        let mut entries = HashMap::new();
        if let Some(path) = &path {
            if let Ok(file) = fs::File::open(path) {
                for line in BufReader::new(file).lines().map_while(Result::ok) {
                    if let Some((key, minutes)) = CacheKey::from_line(&line) {
                        entries.insert(key, minutes);
                    }
                }
            }
        }
        Self {
            path,
            entries: RwLock::new(entries),
            pending: Mutex::new(PendingWrites {
                dirty: false,
                last_flush: Instant::now() - FLUSH_DEBOUNCE,
            }),
        }
    }

    pub fn get(&self, a: (f64, f64), b: (f64, f64)) -> Option<u32> {
        self.entries.read().get(&CacheKey::new(a, b)).copied()
    }

    /// Inserts an entry and flushes to disk if the debounce window has
    /// elapsed since the last flush.
    pub fn put(&self, a: (f64, f64), b: (f64, f64), minutes: u32) {
        self.entries.write().insert(CacheKey::new(a, b), minutes);
        let mut pending = self.pending.lock();
        pending.dirty = true;
        if pending.last_flush.elapsed() >= FLUSH_DEBOUNCE {
            drop(pending);
            self.flush();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically rewrites the backing file with the current in-memory
    /// contents. No-op if the cache was constructed without a path, or if
    /// nothing has changed since the last flush.
    pub fn flush(&self) {
        let mut pending = self.pending.lock();
        if !pending.dirty {
            return;
        }
        let Some(path) = &self.path else {
            pending.dirty = false;
            return;
        };
        if write_atomic(path, &self.entries.read()).is_ok() {
            pending.dirty = false;
            pending.last_flush = Instant::now();
        }
    }
}

impl Drop for TravelTimeCache {
    fn drop(&mut self) {
        self.flush();
    }
}

fn write_atomic(path: &Path, entries: &HashMap<CacheKey, u32>) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut keys: Vec<_> = entries.iter().collect();
        keys.sort_by(|a, b| a.0.partial_cmp(b.0).unwrap_or(std::cmp::Ordering::Equal));
        for (key, minutes) in keys {
            writeln!(tmp, "{}", key.to_line(*minutes))?;
        }
        tmp.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
