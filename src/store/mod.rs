//! # Image Store
//!
//! Persists rendered labels as PNG files, one per label, named by id:
//!
//! ```text
//! labels/
//! ├── 00000001.png
//! ├── 00000002.png
//! └── 00000003.png
//! ```
//!
//! Saves run concurrently; [`ImageStore::clear_all`] waits for in-flight
//! saves and blocks new ones until the directory is empty again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::render::RenderedLabel;

/// A label image on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredImage {
    pub id: u64,
    pub path: PathBuf,
    pub width_px: u32,
    pub height_px: u32,
    /// Requested print quantity; only known for labels stored by this process.
    pub quantity: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// File name for a label id.
pub fn file_name(id: u64) -> String {
    format!("{id:08}.png")
}

/// Parse a label id back out of a file name, or `None` for other files.
fn parse_file_name(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[derive(Debug, Default)]
pub struct ImageStore {
    /// Saves hold the read side; clearing holds the write side.
    gate: RwLock<()>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a label as PNG and write it to `base`, creating the directory
    /// if needed. Never overwrites an existing file.
    ///
    /// The PNG is written to `NNNNNNNN.png.tmp` first and linked into place
    /// once complete, so a listing never sees a partial image.
    pub async fn save(&self, label: &RenderedLabel, base: &Path) -> Result<StoredImage, StorageError> {
        let _guard = self.gate.read().await;

        tokio::fs::create_dir_all(base)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: base.to_path_buf(),
                source,
            })?;

        let png = label.to_png().map_err(|e| StorageError::Encode(e.to_string()))?;
        let path = base.join(file_name(label.id));
        let tmp_path = base.join(format!("{}.tmp", file_name(label.id)));

        tokio::fs::write(&tmp_path, &png)
            .await
            .map_err(|source| StorageError::Write {
                path: tmp_path.clone(),
                source,
            })?;

        // Unlike rename, a hard link fails instead of replacing an existing label.
        let linked = tokio::fs::hard_link(&tmp_path, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            warn!(path = %tmp_path.display(), error = %e, "Failed to remove temporary label file");
        }
        linked.map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                StorageError::Collision(label.id)
            } else {
                StorageError::Write {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        debug!(id = label.id, path = %path.display(), bytes = png.len(), "Stored label");

        Ok(StoredImage {
            id: label.id,
            width_px: label.width_px() as u32,
            height_px: label.height_px() as u32,
            quantity: Some(label.quantity),
            created_at: label.created_at,
            path,
        })
    }

    /// Every stored label in `base`, ordered by id. A missing directory
    /// holds no labels; files that cannot be read as PNGs are skipped.
    pub async fn list_all(&self, base: &Path) -> Result<Vec<StoredImage>, StorageError> {
        let _guard = self.gate.read().await;
        let mut images = Vec::new();

        for (id, path) in label_files(base).await? {
            match read_stored(id, &path).await {
                Ok(image) => images.push(image),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable label"),
            }
        }

        images.sort_by_key(|image| image.id);
        Ok(images)
    }

    /// Delete every label file in `base`. Other files and the directory
    /// itself are left alone.
    pub async fn clear_all(&self, base: &Path) -> Result<usize, StorageError> {
        let _guard = self.gate.write().await;
        let files = label_files(base).await?;
        let count = files.len();

        for (_, path) in files {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|source| StorageError::Remove { path, source })?;
        }

        info!(count, dir = %base.display(), "Cleared stored labels");
        Ok(count)
    }
}

/// Describe one label file from its metadata and PNG header.
async fn read_stored(id: u64, path: &Path) -> Result<StoredImage, StorageError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let (width_px, height_px) =
        image::image_dimensions(path).map_err(|e| StorageError::Encode(format!("{}: {e}", path.display())))?;
    let created_at = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(StoredImage {
        id,
        path: path.to_path_buf(),
        width_px,
        height_px,
        quantity: None,
        created_at,
    })
}

/// Label files (id, path) in `base`, unordered.
async fn label_files(base: &Path) -> Result<Vec<(u64, PathBuf)>, StorageError> {
    let read_err = |source| StorageError::Read {
        path: base.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(base).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_err(e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if let Some(id) = parse_file_name(&path) {
            files.push((id, path));
        }
    }
    Ok(files)
}

/// Hands out label ids, unique for the lifetime of the source.
#[derive(Debug)]
pub struct IdSource {
    next: AtomicU64,
}

impl IdSource {
    /// Start counting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    /// Start past the highest id already stored in `base`.
    pub async fn after_existing(base: &Path) -> Result<Self, StorageError> {
        let highest = label_files(base)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .max()
            .unwrap_or(0);
        Ok(Self::starting_at(highest + 1))
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Bitmap, Ink};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn label(id: u64) -> RenderedLabel {
        let mut bitmap = Bitmap::new(16, 8).unwrap();
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            bitmap.paint(x, y, Ink::Black);
        }
        RenderedLabel {
            id,
            bitmap,
            quantity: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(7), "00000007.png");
        assert_eq!(parse_file_name(Path::new("labels/00000007.png")), Some(7));
        assert_eq!(parse_file_name(Path::new("labels/notes.png")), None);
        assert_eq!(parse_file_name(Path::new("labels/00000007.txt")), None);
    }

    #[tokio::test]
    async fn test_save_creates_dir_and_lists() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("nested").join("labels");
        let store = ImageStore::new();

        let saved = store.save(&label(2), &base).await.unwrap();
        store.save(&label(1), &base).await.unwrap();
        assert_eq!(saved.path, base.join("00000002.png"));
        assert_eq!((saved.width_px, saved.height_px), (16, 8));

        let listed = store.list_all(&base).await.unwrap();
        let ids: Vec<u64> = listed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!((listed[1].width_px, listed[1].height_px), (16, 8));
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new();
        store.save(&label(5), tmp.path()).await.unwrap();
        let err = store.save(&label(5), tmp.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::Collision(5)));
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let listed = ImageStore::new().list_all(&tmp.path().join("absent")).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_only_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new();
        for id in 1..=3 {
            store.save(&label(id), tmp.path()).await.unwrap();
        }
        std::fs::write(tmp.path().join("README.txt"), "keep").unwrap();

        assert_eq!(store.clear_all(tmp.path()).await.unwrap(), 3);
        assert!(store.list_all(tmp.path()).await.unwrap().is_empty());
        assert!(tmp.path().join("README.txt").exists());

        // Directory is still usable.
        store.save(&label(4), tmp.path()).await.unwrap();
        assert_eq!(store.list_all(tmp.path()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temporary_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new();
        store.save(&label(3), tmp.path()).await.unwrap();
        store.save(&label(3), tmp.path()).await.unwrap_err();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["00000003.png".to_string()]);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped_when_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new();
        store.save(&label(1), tmp.path()).await.unwrap();
        std::fs::write(tmp.path().join("00000002.png"), b"").unwrap();
        std::fs::write(tmp.path().join("00000003.png"), b"not a png").unwrap();

        let listed = store.list_all(tmp.path()).await.unwrap();
        let ids: Vec<u64> = listed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_list_while_saving_sees_only_whole_images() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().to_path_buf();
        let store = Arc::new(ImageStore::new());

        let writer = {
            let (store, base) = (store.clone(), base.clone());
            tokio::spawn(async move {
                for id in 1..=50 {
                    store.save(&label(id), &base).await.unwrap();
                }
            })
        };

        while !writer.is_finished() {
            for image in store.list_all(&base).await.unwrap() {
                assert_eq!((image.width_px, image.height_px), (16, 8));
            }
        }
        writer.await.unwrap();
        assert_eq!(store.list_all(&base).await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_clear_waits_for_in_flight_save() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ImageStore::new());
        store.save(&label(1), tmp.path()).await.unwrap();

        // A save in progress holds the read side of the gate.
        let in_flight = store.gate.read().await;
        let clear = {
            let (store, base) = (store.clone(), tmp.path().to_path_buf());
            tokio::spawn(async move { store.clear_all(&base).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!clear.is_finished());
        assert!(tmp.path().join("00000001.png").exists());

        drop(in_flight);
        assert_eq!(clear.await.unwrap().unwrap(), 1);
        assert!(!tmp.path().join("00000001.png").exists());
    }

    #[tokio::test]
    async fn test_id_source_skips_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ImageStore::new();
        store.save(&label(41), tmp.path()).await.unwrap();

        let ids = IdSource::after_existing(tmp.path()).await.unwrap();
        assert_eq!(ids.next(), 42);
        assert_eq!(ids.next(), 43);

        let fresh = IdSource::after_existing(&tmp.path().join("absent")).await.unwrap();
        assert_eq!(fresh.next(), 1);
    }
}
