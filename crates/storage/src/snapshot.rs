//! Local snapshot provisioning.
//!
//! The analytical database is distributed as a single immutable file in
//! object storage. At startup the service makes sure a local copy exists,
//! downloading it once and reusing it on later restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use bikeshare_common::{BikeResult, BikeshareError};

use crate::object_store::ObjectStorage;

/// Somewhere a snapshot can be streamed from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Open a byte stream for the object stored under `key`.
    async fn open(&self, key: &str) -> BikeResult<BoxStream<'static, BikeResult<Bytes>>>;

    /// Human-readable location of `key`, for logs.
    fn describe(&self, key: &str) -> String;
}

#[async_trait]
impl SnapshotSource for ObjectStorage {
    async fn open(&self, key: &str) -> BikeResult<BoxStream<'static, BikeResult<Bytes>>> {
        self.get_stream(key).await
    }

    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key)
    }
}

/// Make sure `local_path` holds the snapshot, downloading `remote_key` if needed.
///
/// An existing non-empty file is reused as is. Downloads go to a sibling
/// `.partial` file which is renamed into place only once complete, so an
/// interrupted download never leaves a file that looks valid.
#[instrument(skip_all, fields(key = %remote_key, path = %local_path.display()))]
pub async fn ensure_local_copy(
    source: &dyn SnapshotSource,
    remote_key: &str,
    local_path: &Path,
) -> BikeResult<PathBuf> {
    if let Some(size) = existing_size(local_path).await? {
        info!(bytes = size, "Snapshot already present, skipping download");
        return Ok(local_path.to_path_buf());
    }

    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            BikeshareError::Retrieval(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let temp_path = partial_path(local_path);
    if fs::remove_file(&temp_path).await.is_ok() {
        warn!(path = %temp_path.display(), "Removed stale partial snapshot");
    }

    info!(source = %source.describe(remote_key), "Downloading snapshot");

    let bytes = match download_to(source, remote_key, &temp_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            fs::remove_file(&temp_path).await.ok();
            return Err(e);
        }
    };

    if bytes == 0 {
        fs::remove_file(&temp_path).await.ok();
        return Err(BikeshareError::Retrieval(format!(
            "Downloaded snapshot {} is empty",
            source.describe(remote_key)
        )));
    }

    fs::rename(&temp_path, local_path).await.map_err(|e| {
        BikeshareError::Retrieval(format!(
            "Failed to move snapshot into {}: {}",
            local_path.display(),
            e
        ))
    })?;

    info!(bytes = bytes, "Snapshot download completed");
    Ok(local_path.to_path_buf())
}

/// Whether a usable local snapshot already exists at `path`.
pub async fn is_present(path: &Path) -> BikeResult<bool> {
    Ok(existing_size(path).await?.is_some())
}

/// Size of a usable local snapshot, or `None` when it must be downloaded.
async fn existing_size(path: &Path) -> BikeResult<Option<u64>> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(meta.len())),
        Ok(meta) if meta.is_dir() => Err(BikeshareError::Retrieval(format!(
            "Snapshot path {} is a directory",
            path.display()
        ))),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BikeshareError::Retrieval(format!(
            "Failed to stat {}: {}",
            path.display(),
            e
        ))),
    }
}

fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".partial");
    local_path.with_file_name(name)
}

async fn download_to(source: &dyn SnapshotSource, key: &str, temp_path: &Path) -> BikeResult<u64> {
    let io_err = |e: std::io::Error| {
        BikeshareError::Retrieval(format!("Failed to write {}: {}", temp_path.display(), e))
    };

    let mut stream = source.open(key).await?;
    let mut file = File::create(temp_path).await.map_err(io_err)?;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed bytes and counts how often it was asked.
    struct CountingSource {
        data: Vec<Bytes>,
        fail_midway: bool,
        opens: AtomicUsize,
    }

    impl CountingSource {
        fn new(chunks: &[&'static str]) -> Self {
            Self {
                data: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
                fail_midway: false,
                opens: AtomicUsize::new(0),
            }
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn open(&self, key: &str) -> BikeResult<BoxStream<'static, BikeResult<Bytes>>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if key == "missing" {
                return Err(BikeshareError::Retrieval("Object not found".into()));
            }
            let mut items: Vec<BikeResult<Bytes>> = self.data.iter().cloned().map(Ok).collect();
            if self.fail_midway {
                items.push(Err(BikeshareError::Retrieval("connection reset".into())));
            }
            Ok(futures::stream::iter(items).boxed())
        }

        fn describe(&self, key: &str) -> String {
            format!("memory://{}", key)
        }
    }

    #[tokio::test]
    async fn test_downloads_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data").join("usage.sqlite");
        let source = CountingSource::new(&["SQLite ", "format 3"]);

        let path = ensure_local_copy(&source, "usage.sqlite", &target).await.unwrap();

        assert_eq!(path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"SQLite format 3");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_second_call_does_not_retrieve_again() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        let source = CountingSource::new(&["data"]);

        ensure_local_copy(&source, "usage.sqlite", &target).await.unwrap();
        ensure_local_copy(&source, "usage.sqlite", &target).await.unwrap();

        assert_eq!(source.opens(), 1);
    }

    #[tokio::test]
    async fn test_empty_local_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        std::fs::write(&target, b"").unwrap();
        let source = CountingSource::new(&["fresh"]);

        ensure_local_copy(&source, "usage.sqlite", &target).await.unwrap();

        assert_eq!(source.opens(), 1);
        assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_missing_object_fails_without_leaving_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        let source = CountingSource::new(&["unused"]);

        let err = ensure_local_copy(&source, "missing", &target).await.unwrap_err();

        assert!(matches!(err, BikeshareError::Retrieval(_)));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        let mut source = CountingSource::new(&["half of the"]);
        source.fail_midway = true;

        assert!(ensure_local_copy(&source, "usage.sqlite", &target).await.is_err());
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_empty_download_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        let source = CountingSource::new(&[]);

        let err = ensure_local_copy(&source, "usage.sqlite", &target).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_stale_partial_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        std::fs::write(partial_path(&target), b"garbage from a crash").unwrap();
        let source = CountingSource::new(&["ok"]);

        ensure_local_copy(&source, "usage.sqlite", &target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_is_present() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("usage.sqlite");
        assert!(!is_present(&target).await.unwrap());
        std::fs::write(&target, b"").unwrap();
        assert!(!is_present(&target).await.unwrap());
        std::fs::write(&target, b"SQLite").unwrap();
        assert!(is_present(&target).await.unwrap());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/app/data/bicimad.sqlite")),
            PathBuf::from("/app/data/bicimad.sqlite.partial")
        );
    }
}
