//! Ephemeral on-disk copies of unsaved editor buffers.
//!
//! The analysis tool only reads files, so the unsaved text of a buffer is
//! written to a uniquely named temp directory before each run. The returned
//! [`BufferSnapshot`] owns that directory: dropping it (or calling
//! [`BufferSnapshot::release`]) deletes the directory recursively, so every
//! exit path of a run releases the snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use tracing::debug;

const SNAPSHOT_DIR_PREFIX: &str = "lintel-";

/// File name used when the original path has none.
const FALLBACK_FILE_NAME: &str = "buffer.php";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("creating snapshot directory: {0}")]
    CreateDir(#[source] io::Error),
    #[error("writing snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A buffer written to an ephemeral directory. Deleted on drop.
#[derive(Debug)]
pub struct BufferSnapshot {
    dir: TempDir,
    path: PathBuf,
}

impl BufferSnapshot {
    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the snapshot file.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the snapshot directory now, reporting failures.
    ///
    /// Dropping the snapshot performs the same cleanup but swallows errors.
    pub fn release(self) -> io::Result<()> {
        let dir = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(dir = %dir.display(), "Released buffer snapshot");
        Ok(())
    }
}

/// Write `content` to a fresh snapshot under the system temp directory.
///
/// The snapshot keeps the file name of `original` so tool output stays
/// readable.
pub fn write_snapshot(original: &Path, content: &str) -> Result<BufferSnapshot, SnapshotError> {
    let dir = Builder::new()
        .prefix(SNAPSHOT_DIR_PREFIX)
        .tempdir()
        .map_err(SnapshotError::CreateDir)?;
    fill_snapshot(dir, original, content)
}

/// Like [`write_snapshot`], but creates the snapshot directory under `parent`.
pub fn write_snapshot_in(
    parent: &Path,
    original: &Path,
    content: &str,
) -> Result<BufferSnapshot, SnapshotError> {
    let dir = Builder::new()
        .prefix(SNAPSHOT_DIR_PREFIX)
        .tempdir_in(parent)
        .map_err(SnapshotError::CreateDir)?;
    fill_snapshot(dir, original, content)
}

fn fill_snapshot(
    dir: TempDir,
    original: &Path,
    content: &str,
) -> Result<BufferSnapshot, SnapshotError> {
    let file_name = original
        .file_name()
        .map_or_else(|| FALLBACK_FILE_NAME.into(), ToOwned::to_owned);
    let path = dir.path().join(file_name);
    fs::write(&path, content).map_err(|source| SnapshotError::Write {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), bytes = content.len(), "Wrote buffer snapshot");
    Ok(BufferSnapshot { dir, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keeps_original_file_name_and_content() {
        let parent = tempfile::tempdir().unwrap();
        let snapshot =
            write_snapshot_in(parent.path(), Path::new("/repo/src/Foo.php"), "<?php echo 1;")
                .unwrap();

        assert_eq!(snapshot.path().file_name().unwrap(), "Foo.php");
        assert!(snapshot.path().starts_with(parent.path()));
        assert_eq!(fs::read_to_string(snapshot.path()).unwrap(), "<?php echo 1;");
    }

    #[test]
    fn snapshots_are_uniquely_named() {
        let parent = tempfile::tempdir().unwrap();
        let a = write_snapshot_in(parent.path(), Path::new("Foo.php"), "a").unwrap();
        let b = write_snapshot_in(parent.path(), Path::new("Foo.php"), "b").unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(fs::read_to_string(a.path()).unwrap(), "a");
        assert_eq!(fs::read_to_string(b.path()).unwrap(), "b");
    }

    #[test]
    fn drop_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let snapshot = write_snapshot_in(parent.path(), Path::new("Foo.php"), "x").unwrap();
        let dir = snapshot.dir().to_path_buf();
        assert!(dir.exists());
        drop(snapshot);
        assert!(!dir.exists());
    }

    #[test]
    fn release_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let snapshot = write_snapshot_in(parent.path(), Path::new("Foo.php"), "x").unwrap();
        let dir = snapshot.dir().to_path_buf();
        snapshot.release().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn missing_file_name_uses_fallback() {
        let parent = tempfile::tempdir().unwrap();
        let snapshot = write_snapshot_in(parent.path(), Path::new("/"), "x").unwrap();
        assert_eq!(snapshot.path().file_name().unwrap(), FALLBACK_FILE_NAME);
    }

    #[test]
    fn unwritable_parent_is_an_error() {
        let parent = tempfile::tempdir().unwrap();
        let missing = parent.path().join("does-not-exist");
        let err = write_snapshot_in(&missing, Path::new("Foo.php"), "x").unwrap_err();
        assert!(matches!(err, SnapshotError::CreateDir(_)));
    }
}
