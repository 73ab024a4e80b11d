//! Blocking filesystem operations.
//!
//! The dump manager never calls `std::fs` directly; it goes through the
//! `Filesystem` trait so tests can run against an in-memory mock and so
//! every failure carries the operation name and path.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Error from a blocking filesystem operation.
///
/// Carries the failing operation and path so callers can log a useful
/// diagnostic without reconstructing context.
#[derive(Debug, Error)]
#[error("{op} failed for \"{}\": {source}", .path.display())]
pub struct FsError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FsError {
    fn new(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Path of the temporary sidefile used by `write_atomic` for `path`.
///
/// The `.tmp` suffix is appended to the whole filename; dump names contain
/// dots, so extension replacement would corrupt them.
pub fn tmp_sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Trait for blocking filesystem operations.
///
/// Every method either succeeds or returns an [`FsError`]. Implementations
/// must be thread-safe; the dump manager calls them from the blocking task
/// pool.
pub trait Filesystem: Send + Sync {
    /// Check whether a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Read a file's full contents.
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    /// Atomically replace `path` with `data`, with unix mode `mode`.
    ///
    /// Writes to a `.tmp` sidefile, fsyncs, applies the mode, then renames
    /// onto `path`; the caller-visible effect is all-or-nothing.
    fn write_atomic(&self, path: &Path, data: &[u8], mode: u32) -> Result<(), FsError>;

    /// Rename `old` to `new`.
    fn rename(&self, old: &Path, new: &Path) -> Result<(), FsError>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> Result<(), FsError>;

    /// List the names of regular files directly under `dir`.
    ///
    /// Subdirectories and special files are excluded; nothing else is
    /// filtered.
    fn list_regular_files(&self, dir: &Path) -> Result<Vec<String>, FsError>;
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        fs::read(path).map_err(|e| FsError::new("read", path, e))
    }

    fn write_atomic(&self, path: &Path, data: &[u8], mode: u32) -> Result<(), FsError> {
        let tmp = tmp_sidecar_path(path);

        let mut file = fs::File::create(&tmp).map_err(|e| FsError::new("create", &tmp, e))?;
        file.write_all(data)
            .map_err(|e| FsError::new("write", &tmp, e))?;
        file.sync_all().map_err(|e| FsError::new("fsync", &tmp, e))?;
        drop(file);

        set_mode(&tmp, mode)?;
        fs::rename(&tmp, path).map_err(|e| FsError::new("rename", &tmp, e))
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<(), FsError> {
        fs::rename(old, new).map_err(|e| FsError::new("rename", old, e))
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path).map_err(|e| FsError::new("remove", path, e))
    }

    fn list_regular_files(&self, dir: &Path) -> Result<Vec<String>, FsError> {
        let entries = fs::read_dir(dir).map_err(|e| FsError::new("read_dir", dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::new("read_dir", dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| FsError::new("stat", &entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), FsError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| FsError::new("chmod", path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), FsError> {
    Ok(())
}

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    mode: u32,
}

/// In-memory filesystem for testing.
///
/// Cloning creates a new handle to the same underlying data. Paths added to
/// the failure set make any fallible operation on them return an error, so
/// error-tolerance paths can be exercised deterministically.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    files: Arc<RwLock<HashMap<PathBuf, MockFile>>>,
    fail_paths: Arc<RwLock<HashSet<PathBuf>>>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file directly (for test setup). The mode defaults to `0644`.
    pub fn add_file(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files
            .write()
            .unwrap()
            .insert(path.into(), MockFile { data, mode: 0o644 });
    }

    /// Make every fallible operation on `path` fail.
    pub fn fail_path(&self, path: impl Into<PathBuf>) {
        self.fail_paths.write().unwrap().insert(path.into());
    }

    /// Contents of a specific file.
    pub fn file_data(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(path).map(|f| f.data.clone())
    }

    /// Unix mode of a specific file.
    pub fn file_mode(&self, path: &Path) -> Option<u32> {
        self.files.read().unwrap().get(path).map(|f| f.mode)
    }

    /// Number of files currently present.
    pub fn file_count(&self) -> usize {
        self.files.read().unwrap().len()
    }

    fn check_fail(&self, op: &'static str, path: &Path) -> Result<(), FsError> {
        if self.fail_paths.read().unwrap().contains(path) {
            return Err(FsError::new(
                op,
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "injected failure"),
            ));
        }
        Ok(())
    }
}

impl Filesystem for MockFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().unwrap().contains_key(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.check_fail("read", path)?;
        self.file_data(path).ok_or_else(|| {
            FsError::new(
                "read",
                path,
                io::Error::new(io::ErrorKind::NotFound, "file not found"),
            )
        })
    }

    fn write_atomic(&self, path: &Path, data: &[u8], mode: u32) -> Result<(), FsError> {
        self.check_fail("write_atomic", path)?;
        self.files.write().unwrap().insert(
            path.to_path_buf(),
            MockFile {
                data: data.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn rename(&self, old: &Path, new: &Path) -> Result<(), FsError> {
        self.check_fail("rename", old)?;
        let mut files = self.files.write().unwrap();
        match files.remove(old) {
            Some(file) => {
                files.insert(new.to_path_buf(), file);
                Ok(())
            }
            None => Err(FsError::new(
                "rename",
                old,
                io::Error::new(io::ErrorKind::NotFound, "file not found"),
            )),
        }
    }

    fn remove(&self, path: &Path) -> Result<(), FsError> {
        self.check_fail("remove", path)?;
        match self.files.write().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(FsError::new(
                "remove",
                path,
                io::Error::new(io::ErrorKind::NotFound, "file not found"),
            )),
        }
    }

    fn list_regular_files(&self, dir: &Path) -> Result<Vec<String>, FsError> {
        self.check_fail("read_dir", dir)?;
        let mut names: Vec<String> = self
            .files
            .read()
            .unwrap()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ===========================================
    // Sidecar path
    // ===========================================

    #[test]
    fn test_tmp_sidecar_path_appends_suffix() {
        let path = Path::new("/d/2024-01-02T03:04:05.000000-v3");
        assert_eq!(
            tmp_sidecar_path(path),
            PathBuf::from("/d/2024-01-02T03:04:05.000000-v3.tmp")
        );
    }

    #[test]
    fn test_tmp_sidecar_path_keeps_inner_dots() {
        // Extension replacement would have produced "file.tmp" here.
        let path = Path::new("/d/file.000000");
        assert_eq!(tmp_sidecar_path(path), PathBuf::from("/d/file.000000.tmp"));
    }

    // ===========================================
    // MockFilesystem
    // ===========================================

    #[test]
    fn test_mock_write_atomic_stores_data_and_mode() {
        let fs = MockFilesystem::new();
        let path = PathBuf::from("/d/dump");

        fs.write_atomic(&path, b"payload", 0o600).expect("write");

        assert!(fs.exists(&path));
        assert_eq!(fs.file_data(&path), Some(b"payload".to_vec()));
        assert_eq!(fs.file_mode(&path), Some(0o600));
    }

    #[test]
    fn test_mock_read_not_found() {
        let fs = MockFilesystem::new();
        let err = fs.read(Path::new("/d/missing")).unwrap_err();
        assert_eq!(err.op, "read");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_rename_moves_file() {
        let fs = MockFilesystem::new();
        fs.add_file("/d/old", b"x".to_vec());

        fs.rename(Path::new("/d/old"), Path::new("/d/new"))
            .expect("rename");

        assert!(!fs.exists(Path::new("/d/old")));
        assert_eq!(fs.file_data(Path::new("/d/new")), Some(b"x".to_vec()));
    }

    #[test]
    fn test_mock_rename_missing_source() {
        let fs = MockFilesystem::new();
        let err = fs
            .rename(Path::new("/d/old"), Path::new("/d/new"))
            .unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_remove() {
        let fs = MockFilesystem::new();
        fs.add_file("/d/dump", vec![]);

        fs.remove(Path::new("/d/dump")).expect("remove");
        assert!(!fs.exists(Path::new("/d/dump")));

        let err = fs.remove(Path::new("/d/dump")).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_list_regular_files_scopes_to_dir() {
        let fs = MockFilesystem::new();
        fs.add_file("/d/a", vec![]);
        fs.add_file("/d/b", vec![]);
        fs.add_file("/other/c", vec![]);
        fs.add_file("/d/sub/nested", vec![]);

        let names = fs.list_regular_files(Path::new("/d")).expect("list");
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_mock_fail_path_injection() {
        let fs = MockFilesystem::new();
        fs.add_file("/d/dump", b"x".to_vec());
        fs.fail_path("/d/dump");

        assert!(fs.read(Path::new("/d/dump")).is_err());
        assert!(fs.remove(Path::new("/d/dump")).is_err());
        assert!(fs.write_atomic(Path::new("/d/dump"), b"y", 0o600).is_err());

        // The file is untouched by the failed operations.
        assert_eq!(fs.file_data(Path::new("/d/dump")), Some(b"x".to_vec()));
    }

    #[test]
    fn test_mock_clone_shares_state() {
        let fs = MockFilesystem::new();
        let fs2 = fs.clone();

        fs.add_file("/d/dump", vec![]);
        assert!(fs2.exists(Path::new("/d/dump")));
    }

    #[test]
    fn test_fs_error_display_names_operation_and_path() {
        let err = FsError::new(
            "remove",
            Path::new("/d/dump"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("remove"));
        assert!(message.contains("/d/dump"));
    }

    // ===========================================
    // RealFilesystem (tempdir)
    // ===========================================

    #[test]
    fn test_real_write_atomic_contents() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let path = dir.path().join("2024-01-02T03:04:05.000000-v3");

        fs.write_atomic(&path, b"hello", 0o600).expect("write");

        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!tmp_sidecar_path(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_real_write_atomic_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let path = dir.path().join("dump");

        fs.write_atomic(&path, b"hello", 0o600).expect("write");

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_real_write_atomic_overwrites() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let path = dir.path().join("dump");

        fs.write_atomic(&path, b"first", 0o600).expect("write 1");
        fs.write_atomic(&path, b"second", 0o600).expect("write 2");

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_real_rename_and_remove() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let old = dir.path().join("old");
        let new = dir.path().join("new");

        fs::write(&old, b"x").expect("seed file");
        fs.rename(&old, &new).expect("rename");
        assert!(!old.exists());
        assert_eq!(fs::read(&new).unwrap(), b"x");

        fs.remove(&new).expect("remove");
        assert!(!new.exists());
    }

    #[test]
    fn test_real_remove_missing_errors() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let err = fs.remove(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_real_list_regular_files_skips_directories() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;

        fs::write(dir.path().join("a"), b"").expect("write a");
        fs::write(dir.path().join("b"), b"").expect("write b");
        fs::create_dir(dir.path().join("subdir")).expect("mkdir");

        let mut names = fs.list_regular_files(dir.path()).expect("list");
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_real_list_missing_dir_errors() {
        let dir = tempdir().expect("create temp dir");
        let fs = RealFilesystem;
        let err = fs
            .list_regular_files(&dir.path().join("missing"))
            .unwrap_err();
        assert_eq!(err.op, "read_dir");
    }
}
