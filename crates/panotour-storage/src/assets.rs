//! Uploaded panorama files.
//!
//! An upload is first written to the staging directory under a generated
//! `{unix_millis}_{original_name}` file name, then moved (not copied) into the
//! asset directory under the same name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;
use crate::layout::TourLayout;

const FALLBACK_FILE_NAME: &str = "upload";
const MAX_NAME_ATTEMPTS: u32 = 64;

fn base_name(original: &str) -> &str {
    let base = original
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => FALLBACK_FILE_NAME,
        other => other,
    }
}

/// `{millis}_{basename}`; directory components of `original` are dropped.
pub fn asset_file_name(original: &str, millis: i64) -> String {
    format!("{millis}_{}", base_name(original))
}

/// A file sitting in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub name: String,
    pub path: PathBuf,
}

/// A file in the asset directory, as referenced from the tour document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
}

/// Streams one upload into the staging directory.
pub struct StagedWriter {
    asset: StagedAsset,
    file: File,
    written: u64,
}

impl StagedWriter {
    pub fn asset(&self) -> &StagedAsset {
        &self.asset
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(StorageError::io("write", &self.asset.path))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), StorageError> {
        self.file
            .flush()
            .await
            .map_err(StorageError::io("flush", &self.asset.path))?;
        self.file
            .sync_all()
            .await
            .map_err(StorageError::io("sync", &self.asset.path))
    }

    /// Flush and sync the file. On failure the partial file is removed.
    pub async fn finish(mut self) -> Result<StagedAsset, StorageError> {
        if let Err(err) = self.sync().await {
            self.abort().await;
            return Err(err);
        }
        tracing::debug!(
            asset = %self.asset.path.display(),
            bytes = self.written,
            "staged upload"
        );
        Ok(self.asset)
    }

    /// Drop the partially written file.
    pub async fn abort(self) {
        let StagedWriter { asset, file, .. } = self;
        drop(file);
        discard_file(&asset.path).await;
    }
}

pub(crate) async fn discard_file(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove file");
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    staging_dir: PathBuf,
    asset_dir: PathBuf,
    url_prefix: String,
}

impl AssetStore {
    pub fn new(layout: &TourLayout) -> Self {
        Self {
            staging_dir: layout.staging_path(),
            asset_dir: layout.asset_path(),
            url_prefix: layout.asset_url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, name: &str) -> String {
        if self.url_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.url_prefix, name)
        }
    }

    /// Open a new staging file for an upload named `original`.
    ///
    /// Two uploads with the same name in the same millisecond get distinct
    /// files (`{millis}_{n}_{name}`) instead of overwriting each other.
    pub async fn begin_upload(&self, original: &str) -> Result<StagedWriter, StorageError> {
        let millis = chrono::Utc::now().timestamp_millis();
        let base = base_name(original);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                asset_file_name(base, millis)
            } else {
                format!("{millis}_{attempt}_{base}")
            };
            let path = self.staging_dir.join(&name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(StagedWriter {
                        asset: StagedAsset { name, path },
                        file,
                        written: 0,
                    })
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(StorageError::io("create", &path)(err)),
            }
        }

        let path = self.staging_dir.join(asset_file_name(base, millis));
        Err(StorageError::Io {
            action: "pick a free name for",
            path,
            source: ErrorKind::AlreadyExists.into(),
        })
    }

    /// Stage an in-memory upload.
    pub async fn stage_bytes(&self, original: &str, bytes: &[u8]) -> Result<StagedAsset, StorageError> {
        let mut writer = self.begin_upload(original).await?;
        if let Err(err) = writer.write_chunk(bytes).await {
            writer.abort().await;
            return Err(err);
        }
        writer.finish().await
    }

    /// Stage a copy of a local file, keeping `source` in place.
    pub async fn stage_copy(&self, source: &Path) -> Result<StagedAsset, StorageError> {
        let original = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let writer = self.begin_upload(&original).await?;
        let staged = writer.asset().clone();
        drop(writer);
        if let Err(err) = fs::copy(source, &staged.path).await {
            discard_file(&staged.path).await;
            return Err(StorageError::io("copy", source)(err));
        }
        Ok(staged)
    }

    pub async fn discard(&self, staged: StagedAsset) {
        discard_file(&staged.path).await;
    }

    /// Move a staged file into the asset directory.
    ///
    /// Uses a rename, falling back to copy + remove when staging and asset
    /// directories are on different filesystems. An existing asset with the
    /// same name is never overwritten.
    pub async fn relocate(&self, staged: StagedAsset) -> Result<StoredAsset, StorageError> {
        let target = self.asset_dir.join(&staged.name);
        let exists = fs::try_exists(&target)
            .await
            .map_err(StorageError::io("inspect", &target))?;
        if exists {
            return Err(StorageError::AssetExists(target));
        }

        if let Err(rename_err) = fs::rename(&staged.path, &target).await {
            if rename_err.kind() == ErrorKind::NotFound {
                return Err(StorageError::io("move", &staged.path)(rename_err));
            }
            tracing::debug!(
                from = %staged.path.display(),
                to = %target.display(),
                error = %rename_err,
                "rename failed; copying instead"
            );
            fs::copy(&staged.path, &target)
                .await
                .map_err(StorageError::io("copy", &staged.path))?;
            fs::remove_file(&staged.path)
                .await
                .map_err(StorageError::io("remove", &staged.path))?;
        }

        Ok(StoredAsset {
            url: self.url_for(&staged.name),
            name: staged.name,
            path: target,
        })
    }

    /// Delete an asset that ended up unreferenced.
    pub async fn remove_stored(&self, stored: &StoredAsset) -> Result<(), StorageError> {
        fs::remove_file(&stored.path)
            .await
            .map_err(StorageError::io("remove", &stored.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_name_is_millis_and_basename() {
        assert_eq!(asset_file_name("photo.jpg", 1_700_000_000_000), "1700000000000_photo.jpg");
    }

    #[test]
    fn directory_components_are_dropped() {
        assert_eq!(asset_file_name("../../etc/passwd", 1), "1_passwd");
        assert_eq!(asset_file_name(r"C:\Users\me\pano.jpg", 2), "2_pano.jpg");
    }

    #[test]
    fn empty_names_fall_back() {
        assert_eq!(asset_file_name("", 3), "3_upload");
        assert_eq!(asset_file_name("dir/..", 4), "4_upload");
    }
}
