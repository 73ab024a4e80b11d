//! Cache dump management.
//!
//! A cache dump is a snapshot of an in-memory cache persisted to a local
//! directory, addressed by its logical update time and the cache's
//! serialization format version. This crate provides:
//! - Encoding and decoding of dump filenames (`naming`)
//! - The hot-swappable dump configuration (`config`)
//! - Trait-based logging with a capturing mock (`logger`)
//! - The `Dumper` itself: atomic writes, latest-dump selection, timestamp
//!   bumping and retention cleanup, with all blocking work offloaded to the
//!   filesystem task pool (`dumper`)

pub mod config;
pub mod dumper;
pub mod logger;
pub mod naming;

pub use config::{ConfigCell, DumpConfig, DEFAULT_MAX_DUMP_COUNT};
pub use dumper::{DumpContents, Dumper, DUMP_FILE_MODE};
pub use logger::{Level, Logger, MockLogger, NullLogger, StderrLogger};
pub use naming::{
    dump_filename, is_tmp_name, match_dump_name, DumpNameMatch, ParsedDumpName,
    DUMP_NAME_DATE_FORMAT,
};
