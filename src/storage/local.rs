use std::{
    env, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ContentStream, StorageBackend, StorageError, StoredFile, StoredFileReference, validate_filename};

const DEFAULT_BASE_PATH: &str = "files";

/// How many suffixed names are tried before giving up on a colliding upload.
const MAX_COLLISION_ATTEMPTS: u32 = 1000;

// Local filesystem storage
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf, // Directory every upload lands in
}

impl LocalStorage {
    /// Creates a new LocalStorage instance and ensures the base directory exists
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    /// Reads `RIKKA_FS_DIR` (default `files`).
    pub async fn from_env() -> Result<Self, StorageError> {
        let base_path =
            env::var("RIKKA_FS_DIR").unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string());
        info!("Filesystem storage root: {}", base_path);
        Self::new(base_path).await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn temp_file(&self) -> TempFile {
        TempFile {
            path: self.base_path.join(format!(".{}.part", Uuid::new_v4())),
        }
    }

    /// Drains the stream into `path` and makes it durable. Returns the byte count.
    async fn write_temp(&self, path: &Path, mut content: ContentStream<'_>) -> Result<u64, StorageError> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let mut written = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Links the finished temp file under the first free name.
    ///
    /// `hard_link` fails if the target exists, so two uploads racing for the
    /// same name can never clobber each other.
    async fn promote(&self, temp: &Path, filename: &str) -> Result<(String, PathBuf), StorageError> {
        for attempt in 0..MAX_COLLISION_ATTEMPTS {
            let candidate = collision_name(filename, attempt);
            let target = self.base_path.join(&candidate);
            match fs::hard_link(temp, &target).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!("{} taken, stored as {}", filename, candidate);
                    }
                    sync_dir(&self.base_path).await?;
                    return Ok((candidate, target));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::IoError(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {filename} after {MAX_COLLISION_ATTEMPTS} attempts"),
        )))
    }
}

/// Removes the temp file when dropped, including when the store future is
/// cancelled mid-upload.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        // The final name is a second link, so the temp name always goes
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove temp file {:?}: {}", self.path, e);
            }
        }
    }
}

/// `a.txt` -> `a-1.txt`, `archive` -> `archive-1`, `.env` -> `.env-1`.
fn collision_name(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{attempt}.{ext}"),
        _ => format!("{filename}-{attempt}"),
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "fs"
    }

    /// Streams the upload to a hidden temp file, then promotes it.
    async fn store(
        &self,
        filename: &str,
        content: ContentStream<'_>,
        size_hint: Option<u64>,
    ) -> Result<StoredFile, StorageError> {
        validate_filename(filename)?;
        debug!("Storing {} (size hint {:?})", filename, size_hint);

        let temp = self.temp_file();
        let size = self.write_temp(temp.path(), content).await?;
        let (filename, path) = self.promote(temp.path(), filename).await?;
        drop(temp);

        info!("Saved file at {:?} ({} bytes)", path, size);

        Ok(StoredFile {
            reference: StoredFileReference::new(path.display().to_string()),
            filename,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn chunks(parts: Vec<Result<Bytes, StorageError>>) -> ContentStream<'static> {
        stream::iter(parts).boxed()
    }

    fn body(data: &'static [u8]) -> ContentStream<'static> {
        chunks(vec![Ok(Bytes::from_static(data))])
    }

    async fn entries(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut read = fs::read_dir(dir).await.unwrap();
        while let Some(entry) = read.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[test]
    fn test_collision_names() {
        assert_eq!(collision_name("a.txt", 0), "a.txt");
        assert_eq!(collision_name("a.txt", 1), "a-1.txt");
        assert_eq!(collision_name("a.tar.gz", 2), "a.tar-2.gz");
        assert_eq!(collision_name("README", 3), "README-3");
        assert_eq!(collision_name(".env", 1), ".env-1");
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let stored = storage
            .store(
                "a.txt",
                chunks(vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(stored.filename, "a.txt");
        assert_eq!(stored.size, 11);
        let content = fs::read(stored.reference.as_str()).await.unwrap();
        assert_eq!(content, b"hello world");
        assert_eq!(entries(dir.path()).await, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_collision_renames_instead_of_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let first = storage.store("a.txt", body(b"first"), None).await.unwrap();
        let second = storage.store("a.txt", body(b"second"), None).await.unwrap();

        assert_eq!(first.filename, "a.txt");
        assert_eq!(second.filename, "a-1.txt");
        assert_eq!(fs::read(first.reference.as_str()).await.unwrap(), b"first");
        assert_eq!(fs::read(second.reference.as_str()).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let err = storage
            .store(
                "big.bin",
                chunks(vec![
                    Ok(Bytes::from(vec![0u8; 1024])),
                    Err(StorageError::LimitExceeded { limit: 1024 }),
                ]),
                Some(4096),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::LimitExceeded { limit: 1024 }));
        assert!(entries(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_store_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        // One chunk arrives, then the client goes quiet forever
        let content = stream::iter(vec![Ok(Bytes::from(vec![7u8; 4096]))])
            .chain(stream::pending::<Result<Bytes, StorageError>>())
            .boxed();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            storage.store("a.txt", content, None),
        )
        .await;

        assert!(outcome.is_err(), "store should still be waiting for the body");
        assert!(entries(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("root")).await.unwrap();

        let err = storage
            .store("../escape.txt", body(b"nope"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidFilename(_)));
        assert!(entries(&dir.path().join("root")).await.is_empty());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                let parts = (0..32)
                    .map(|_| Ok(Bytes::from(vec![i; 512])))
                    .collect::<Vec<_>>();
                storage
                    .store(&format!("file-{i}.bin"), chunks(parts), None)
                    .await
                    .unwrap()
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let stored = task.await.unwrap();
            let content = fs::read(stored.reference.as_str()).await.unwrap();
            assert_eq!(content.len(), 32 * 512);
            assert!(content.iter().all(|b| *b == i as u8));
        }
    }

    #[tokio::test]
    async fn test_concurrent_same_name_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                storage
                    .store("same.txt", chunks(vec![Ok(Bytes::from(vec![i; 64]))]), None)
                    .await
                    .unwrap()
            }));
        }

        let mut names = Vec::new();
        for task in tasks {
            names.push(task.await.unwrap().filename);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert_eq!(entries(dir.path()).await.len(), 8);
    }
}
