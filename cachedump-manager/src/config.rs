//! Dump configuration and its hot-swappable holder.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use chrono::TimeDelta;

/// Number of dumps retained after cleanup unless configured otherwise.
pub const DEFAULT_MAX_DUMP_COUNT: usize = 1;

/// Immutable snapshot of a cache's dump configuration.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Directory holding this cache's dumps.
    pub dump_directory: PathBuf,

    /// Serialization format version, owned by the cache's schema author and
    /// bumped on every incompatible layout change.
    pub dump_format_version: u64,

    /// Dumps older than this are unusable and removed on cleanup.
    /// `None` disables the age cutoff.
    pub max_dump_age: Option<TimeDelta>,

    /// Number of current-version dumps retained after cleanup.
    pub max_dump_count: usize,
}

impl DumpConfig {
    /// Create a config with defaults: no age cutoff,
    /// [`DEFAULT_MAX_DUMP_COUNT`] retained dumps.
    pub fn new(dump_directory: impl Into<PathBuf>, dump_format_version: u64) -> Self {
        Self {
            dump_directory: dump_directory.into(),
            dump_format_version,
            max_dump_age: None,
            max_dump_count: DEFAULT_MAX_DUMP_COUNT,
        }
    }

    /// Builder: set the maximum dump age.
    pub fn with_max_dump_age(mut self, max_dump_age: TimeDelta) -> Self {
        self.max_dump_age = Some(max_dump_age);
        self
    }

    /// Builder: set the number of dumps retained after cleanup.
    pub fn with_max_dump_count(mut self, max_dump_count: usize) -> Self {
        self.max_dump_count = max_dump_count;
        self
    }
}

/// Single-writer, many-reader holder of the current [`DumpConfig`].
///
/// [`read`](ConfigCell::read) returns a snapshot handle whose config stays
/// stable for the handle's lifetime even if [`assign`](ConfigCell::assign)
/// runs concurrently, so a long directory walk never observes a torn
/// config. Replaced configs are parked on a retired list and reclaimed by
/// [`cleanup`](ConfigCell::cleanup) once no handle references them.
#[derive(Debug)]
pub struct ConfigCell {
    current: RwLock<Arc<DumpConfig>>,
    retired: Mutex<Vec<Arc<DumpConfig>>>,
}

impl ConfigCell {
    pub fn new(config: DumpConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot handle to the current config.
    pub fn read(&self) -> Arc<DumpConfig> {
        Arc::clone(&self.current.read().expect("config lock poisoned"))
    }

    /// Atomically replace the current config.
    pub fn assign(&self, config: DumpConfig) {
        let retired = {
            let mut current = self.current.write().expect("config lock poisoned");
            std::mem::replace(&mut *current, Arc::new(config))
        };
        self.retired
            .lock()
            .expect("retired list poisoned")
            .push(retired);
    }

    /// Drop retired configs that no snapshot handle references.
    pub fn cleanup(&self) {
        self.retired
            .lock()
            .expect("retired list poisoned")
            .retain(|config| Arc::strong_count(config) > 1);
    }
}
