//! Filesystem adapter for the cache dump manager.
//!
//! This crate provides:
//! - A blocking `Filesystem` trait with real and mock implementations
//! - `FsError`, naming the failing operation and path
//! - `FsTaskProcessor`, which runs blocking filesystem work on the
//!   runtime's dedicated blocking pool so cooperative tasks never touch
//!   disk directly

pub mod filesystem;
pub mod task;

pub use filesystem::{
    tmp_sidecar_path, Filesystem, FsError, MockFilesystem, RealFilesystem,
};
pub use task::{FsTaskProcessor, TaskError};
