//! Persisting and restoring cache dumps.
//!
//! The `Dumper` owns a cache's dump directory: it writes new dumps
//! atomically, finds the latest usable dump on startup, renames dumps whose
//! cache state was revalidated without producing new bytes, and removes
//! dumps that fall out of retention. All blocking filesystem work runs on
//! the filesystem task pool; the calling task only awaits.
//!
//! The public operations never fail except through their return values:
//! errors are logged with the cache name and converted to `false` / `None`
//! at the boundary so a cache update loop cannot be aborted by disk issues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use cachedump_clock::{round_to_micros, Clock};
use cachedump_fs::{Filesystem, FsTaskProcessor, TaskError};

use crate::config::{ConfigCell, DumpConfig};
use crate::logger::Logger;
use crate::naming::{self, DumpNameMatch, ParsedDumpName};

/// Mode bits of newly written dump files: owner read and write only.
pub const DUMP_FILE_MODE: u32 = 0o600;

/// A cache dump: opaque serialized contents plus the logical instant of the
/// cache state they capture.
///
/// `update_time` must be rounded to microsecond resolution (see
/// `cachedump_clock::round_to_micros`); the filename carries no more
/// precision than that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpContents {
    pub contents: Vec<u8>,
    pub update_time: DateTime<Utc>,
}

/// Persists and restores dumps of a single cache.
///
/// Callers serialize `write_new` / `bump_time` / `cleanup` among themselves
/// (the owning cache's update loop already does); `read_latest` and
/// `set_config` are safe to call concurrently with anything.
pub struct Dumper {
    config: ConfigCell,
    fs_tasks: FsTaskProcessor,
    shared: Arc<DumperShared>,
}

/// State cloned into every offloaded blocking closure.
struct DumperShared {
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    cache_name: String,
}

impl Dumper {
    pub fn new(
        config: DumpConfig,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
        fs_tasks: FsTaskProcessor,
        cache_name: impl Into<String>,
    ) -> Self {
        Self {
            config: ConfigCell::new(config),
            fs_tasks,
            shared: Arc::new(DumperShared {
                fs,
                clock,
                logger,
                cache_name: cache_name.into(),
            }),
        }
    }

    /// Persist a new dump.
    ///
    /// Returns `false` without mutating the filesystem when a dump with the
    /// same update time and version already exists, and on any write error.
    pub async fn write_new(&self, dump: DumpContents) -> bool {
        let config = self.config.read();
        let shared = Arc::clone(&self.shared);
        let result = self
            .fs_tasks
            .run("cachedump-write", move || {
                shared.write_new_blocking(&config, dump)
            })
            .await;
        self.finish_task(result, false)
    }

    /// Read the latest usable dump, if any.
    ///
    /// Usable means: current format version, inside the age window when
    /// `max_dump_age` is set. Any error yields `None`.
    pub async fn read_latest(&self) -> Option<DumpContents> {
        let config = self.config.read();
        let shared = Arc::clone(&self.shared);
        let result = self
            .fs_tasks
            .run("cachedump-read", move || {
                shared.read_latest_blocking(&config)
            })
            .await;
        self.finish_task(result, None)
    }

    /// Rename the dump at `old_update_time` so its name carries
    /// `new_update_time`, preserving the contents.
    ///
    /// Returns `false` when the old dump is missing (the caller should
    /// write a fresh dump) and on rename errors.
    pub async fn bump_time(
        &self,
        old_update_time: DateTime<Utc>,
        new_update_time: DateTime<Utc>,
    ) -> bool {
        debug_assert!(old_update_time <= new_update_time);
        let config = self.config.read();
        let shared = Arc::clone(&self.shared);
        let result = self
            .fs_tasks
            .run("cachedump-bump", move || {
                shared.bump_time_blocking(&config, old_update_time, new_update_time)
            })
            .await;
        self.finish_task(result, false)
    }

    /// Remove dumps that fell out of retention, then reclaim retired config
    /// snapshots. Errors are logged; the operation always returns normally.
    pub async fn cleanup(&self) {
        let config = self.config.read();
        let shared = Arc::clone(&self.shared);
        let result = self
            .fs_tasks
            .run("cachedump-cleanup", move || {
                shared.cleanup_blocking(&config)
            })
            .await;
        self.finish_task(result, ());
        self.config.cleanup();
    }

    /// Atomically replace the live configuration.
    ///
    /// Operations already in flight keep the snapshot they started with;
    /// the next operation picks up the new config.
    pub fn set_config(&self, config: DumpConfig) {
        self.config.assign(config);
    }

    fn finish_task<T>(&self, result: Result<T, TaskError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                self.shared.logger.error(&format!(
                    "filesystem task failed for cache {}: {}",
                    self.shared.cache_name, err
                ));
                fallback
            }
        }
    }
}

impl DumperShared {
    fn dump_path(&self, config: &DumpConfig, update_time: DateTime<Utc>) -> PathBuf {
        config
            .dump_directory
            .join(naming::dump_filename(update_time, config.dump_format_version))
    }

    /// Oldest acceptable update time under `config`, or `None` when the age
    /// cutoff is disabled.
    fn min_acceptable_update_time(&self, config: &DumpConfig) -> Option<DateTime<Utc>> {
        config
            .max_dump_age
            .map(|age| round_to_micros(self.clock.now_utc()) - age)
    }

    /// Decode a directory entry as a dump name, warning on near misses.
    fn parse_dump_name(&self, filename: &str) -> Option<ParsedDumpName> {
        match naming::match_dump_name(filename) {
            DumpNameMatch::Dump(parsed) => Some(parsed),
            DumpNameMatch::Malformed { reason } => {
                self.logger.warn(&format!(
                    "a filename looks like a dump of cache {}, but it is not: \"{}\": {}",
                    self.cache_name, filename, reason
                ));
                None
            }
            DumpNameMatch::NotADump => None,
        }
    }

    fn write_new_blocking(&self, config: &DumpConfig, dump: DumpContents) -> bool {
        let dump_size = dump.contents.len();
        let path = self.dump_path(config, dump.update_time);

        if self.fs.exists(&path) {
            self.logger.error(&format!(
                "could not dump cache {} to \"{}\": file already exists",
                self.cache_name,
                path.display()
            ));
            return false;
        }

        match self.fs.write_atomic(&path, &dump.contents, DUMP_FILE_MODE) {
            Ok(()) => {
                self.logger.info(&format!(
                    "dumped cache {} to \"{}\" ({} bytes)",
                    self.cache_name,
                    path.display(),
                    dump_size
                ));
                true
            }
            Err(err) => {
                self.logger.error(&format!(
                    "failed to dump cache {} to \"{}\": {}",
                    self.cache_name,
                    path.display(),
                    err
                ));
                false
            }
        }
    }

    fn read_latest_blocking(&self, config: &DumpConfig) -> Option<DumpContents> {
        let Some(best) = self.latest_usable_dump(config) else {
            self.logger.info(&format!(
                "no usable dumps found for cache {}",
                self.cache_name
            ));
            return None;
        };

        let path = config.dump_directory.join(&best.filename);
        self.logger.debug(&format!(
            "usable dump found for cache {}: \"{}\"",
            self.cache_name,
            path.display()
        ));

        match self.fs.read(&path) {
            Ok(contents) => Some(DumpContents {
                contents,
                update_time: best.update_time,
            }),
            Err(err) => {
                self.logger.error(&format!(
                    "failed to read dump contents for cache {}: {}",
                    self.cache_name, err
                ));
                None
            }
        }
    }

    /// Scan the dump directory for the newest dump at the current version
    /// inside the age window.
    fn latest_usable_dump(&self, config: &DumpConfig) -> Option<ParsedDumpName> {
        let min_update_time = self.min_acceptable_update_time(config);

        let names = match self.fs.list_regular_files(&config.dump_directory) {
            Ok(names) => names,
            Err(err) => {
                self.logger.error(&format!(
                    "failed to scan dumps of cache {}: {}",
                    self.cache_name, err
                ));
                return None;
            }
        };

        let mut best: Option<ParsedDumpName> = None;
        for name in names {
            let Some(dump) = self.parse_dump_name(&name) else {
                continue;
            };

            if dump.format_version != config.dump_format_version {
                self.logger.debug(&format!(
                    "ignoring dump \"{}\": its format version ({}) != current version ({})",
                    dump.filename, dump.format_version, config.dump_format_version
                ));
                continue;
            }

            if let Some(min) = min_update_time {
                if dump.update_time < min {
                    self.logger.debug(&format!(
                        "ignoring dump \"{}\": older than the maximum dump age",
                        dump.filename
                    ));
                    continue;
                }
            }

            if best
                .as_ref()
                .map_or(true, |b| dump.update_time > b.update_time)
            {
                best = Some(dump);
            }
        }
        best
    }

    fn bump_time_blocking(
        &self,
        config: &DumpConfig,
        old_update_time: DateTime<Utc>,
        new_update_time: DateTime<Utc>,
    ) -> bool {
        let old_path = self.dump_path(config, old_update_time);
        let new_path = self.dump_path(config, new_update_time);

        if !self.fs.exists(&old_path) {
            self.logger.warn(&format!(
                "the previous dump \"{}\" of cache {} has disappeared, a fresh dump will be written",
                old_path.display(),
                self.cache_name
            ));
            return false;
        }

        match self.fs.rename(&old_path, &new_path) {
            Ok(()) => {
                self.logger.info(&format!(
                    "renamed dump \"{}\" of cache {} to \"{}\"",
                    old_path.display(),
                    self.cache_name,
                    new_path.display()
                ));
                true
            }
            Err(err) => {
                self.logger.error(&format!(
                    "failed to rename dump \"{}\" of cache {} to \"{}\": {}",
                    old_path.display(),
                    self.cache_name,
                    new_path.display(),
                    err
                ));
                false
            }
        }
    }

    fn cleanup_blocking(&self, config: &DumpConfig) {
        let min_update_time = self.min_acceptable_update_time(config);

        let names = match self.fs.list_regular_files(&config.dump_directory) {
            Ok(names) => names,
            Err(err) => {
                self.logger.error(&format!(
                    "failed to scan dumps of cache {} for cleanup: {}",
                    self.cache_name, err
                ));
                return;
            }
        };

        let mut kept: Vec<ParsedDumpName> = Vec::new();
        for name in names {
            let path = config.dump_directory.join(&name);

            if naming::is_tmp_name(&name) {
                self.logger.debug(&format!(
                    "removing a leftover tmp file \"{}\"",
                    path.display()
                ));
                self.remove_logged(&path);
                continue;
            }

            let Some(dump) = self.parse_dump_name(&name) else {
                continue;
            };

            let expired = dump.format_version < config.dump_format_version
                || min_update_time.is_some_and(|min| dump.update_time < min);
            if expired {
                self.logger.debug(&format!(
                    "removing an expired dump \"{}\" of cache {}",
                    path.display(),
                    self.cache_name
                ));
                self.remove_logged(&path);
                continue;
            }

            if dump.format_version == config.dump_format_version {
                kept.push(dump);
            }
            // Dumps at a newer version stay: they may belong to a process
            // that was rolled back and will be upgraded again.
        }

        kept.sort_by(|a, b| b.update_time.cmp(&a.update_time));

        for dump in kept.iter().skip(config.max_dump_count) {
            let path = config.dump_directory.join(&dump.filename);
            self.logger.debug(&format!(
                "removing an excess dump \"{}\" of cache {}",
                path.display(),
                self.cache_name
            ));
            self.remove_logged(&path);
        }
    }

    /// Remove a file, logging failure without aborting the cleanup pass.
    fn remove_logged(&self, path: &Path) {
        if let Err(err) = self.fs.remove(path) {
            self.logger.error(&format!(
                "failed to remove a dump file of cache {}: {}",
                self.cache_name, err
            ));
        }
    }
}
