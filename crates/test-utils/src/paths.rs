//! Temporary locations for test snapshots.

use std::path::PathBuf;

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// Path of the snapshot file inside a test directory.
pub fn snapshot_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("usage.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_is_cleaned_up() {
        let path = {
            let dir = temp_test_dir_with_prefix("bikeshare_test");
            assert!(dir.path().exists());
            assert!(dir
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("bikeshare_test"));
            dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_snapshot_path() {
        let dir = temp_test_dir();
        assert!(snapshot_path(&dir).ends_with("usage.sqlite"));
    }
}
