use std::ffi::OsString;
use std::path::{Path, PathBuf};

use panotour_tour::TourDocument;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::assets::discard_file;
use crate::error::StorageError;

/// The tour document on disk.
///
/// Every [`TourStore::update`] holds one async mutex across load, mutate and
/// write, so two appends through the same store never read the same snapshot.
/// Writers outside this process are not coordinated.
#[derive(Debug)]
pub struct TourStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TourStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub async fn load(&self) -> Result<TourDocument, StorageError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(StorageError::io("read", &self.path))?;
        TourDocument::parse(&text).map_err(|source| StorageError::Tour {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the document on disk with `document`.
    ///
    /// The new text goes to `{path}.tmp` first and is renamed over the
    /// document, so readers see either the old or the new version.
    pub async fn save(&self, document: &TourDocument) -> Result<(), StorageError> {
        let text = document.to_xml_string().map_err(|source| StorageError::Tour {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.temp_path();
        let written = async {
            write_synced(&tmp, text.as_bytes()).await?;
            tokio::fs::rename(&tmp, &self.path)
                .await
                .map_err(StorageError::io("replace", &self.path))
        }
        .await;
        if written.is_err() {
            discard_file(&tmp).await;
        }
        written
    }

    /// Load, apply `mutate`, and write back, holding the store lock
    /// throughout. Nothing is written when `mutate` fails.
    pub async fn update<T, E, F>(&self, mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut TourDocument) -> Result<T, E> + Send,
        T: Send,
        E: From<StorageError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let value = mutate(&mut document)?;
        self.save(&document).await?;
        tracing::debug!(
            path = %self.path.display(),
            scenes = document.scene_count(),
            "tour document written"
        );
        Ok(value)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(StorageError::io("create", path))?;
    file.write_all(bytes)
        .await
        .map_err(StorageError::io("write", path))?;
    file.sync_all()
        .await
        .map_err(StorageError::io("sync", path))
}
