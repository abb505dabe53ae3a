use std::path::{Path, PathBuf};

use panotour_tour::TourDocument;

use crate::error::StorageError;
use crate::tour_store::TourStore;

/// Where a tour lives on disk. Relative entries resolve against `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TourLayout {
    pub root: PathBuf,
    pub tour_file: PathBuf,
    pub staging_dir: PathBuf,
    pub asset_dir: PathBuf,
    /// Prefix written into `<cube url>`; relative to the tour document.
    pub asset_url_prefix: String,
}

impl TourLayout {
    pub const DEFAULT_TOUR_FILE: &'static str = "tour.xml";
    pub const DEFAULT_STAGING_DIR: &'static str = "uploads";
    pub const DEFAULT_ASSET_DIR: &'static str = "panos";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tour_file: PathBuf::from(Self::DEFAULT_TOUR_FILE),
            staging_dir: PathBuf::from(Self::DEFAULT_STAGING_DIR),
            asset_dir: PathBuf::from(Self::DEFAULT_ASSET_DIR),
            asset_url_prefix: Self::DEFAULT_ASSET_DIR.to_string(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn tour_path(&self) -> PathBuf {
        self.resolve(&self.tour_file)
    }

    pub fn staging_path(&self) -> PathBuf {
        self.resolve(&self.staging_dir)
    }

    pub fn asset_path(&self) -> PathBuf {
        self.resolve(&self.asset_dir)
    }

    /// Create the staging and asset directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [self.staging_path(), self.asset_path()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(StorageError::io("create directory", &dir))?;
        }
        Ok(())
    }

    /// Write an empty `<krpano/>` tour document unless one already exists.
    ///
    /// Returns `true` when a new document was written.
    pub async fn init_tour(&self) -> Result<bool, StorageError> {
        let path = self.tour_path();
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(StorageError::io("inspect", &path))?;
        if exists {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::io("create directory", parent))?;
        }
        TourStore::new(&path).save(&TourDocument::empty()).await?;
        Ok(true)
    }
}
