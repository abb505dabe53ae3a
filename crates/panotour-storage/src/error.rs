use std::path::PathBuf;

use panotour_tour::TourError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to {action} `{}`: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset `{}` already exists", .0.display())]
    AssetExists(PathBuf),

    #[error("invalid tour document `{}`: {source}", .path.display())]
    Tour {
        path: PathBuf,
        #[source]
        source: TourError,
    },
}

impl StorageError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}
