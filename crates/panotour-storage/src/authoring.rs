//! The scene append step shared by the HTTP endpoint and `panotour scene add`.

use panotour_tour::{NewScene, Scene, SceneRejection, ScenePolicy};
use thiserror::Error;

use crate::assets::{AssetStore, StagedAsset, StoredAsset};
use crate::error::StorageError;
use crate::layout::TourLayout;
use crate::tour_store::TourStore;

/// Form fields that accompany an upload. Values are opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneFields {
    pub scene_name: String,
    pub ath: String,
    pub atv: String,
    pub linkedscene: String,
}

#[derive(Debug, Clone)]
pub struct AddedScene {
    pub scene: Scene,
    pub asset: StoredAsset,
    /// Position of the scene in the document's scene sequence.
    pub index: usize,
}

#[derive(Debug, Error)]
pub enum AuthoringError {
    #[error("scene rejected: {0}")]
    Rejected(#[from] SceneRejection),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
pub struct SceneAppendService {
    assets: AssetStore,
    tour: TourStore,
    policy: ScenePolicy,
}

impl SceneAppendService {
    pub fn new(layout: &TourLayout, policy: ScenePolicy) -> Self {
        Self {
            assets: AssetStore::new(layout),
            tour: TourStore::new(layout.tour_path()),
            policy,
        }
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn tour(&self) -> &TourStore {
        &self.tour
    }

    /// Move `staged` into the asset directory, then append a scene that
    /// references it.
    ///
    /// The asset is moved before the document is touched. If the document
    /// step fails for a storage reason the moved asset stays where it is and
    /// is reported in the log; a policy rejection removes it again.
    pub async fn append(
        &self,
        staged: StagedAsset,
        fields: SceneFields,
    ) -> Result<AddedScene, AuthoringError> {
        let asset = self.assets.relocate(staged).await?;
        tracing::info!(asset = %asset.path.display(), "moved upload into asset directory");

        let scene = Scene::authored(NewScene {
            name: fields.scene_name,
            ath: fields.ath,
            atv: fields.atv,
            linkedscene: fields.linkedscene,
            image_url: asset.url.clone(),
        });

        let policy = self.policy;
        let result = self
            .tour
            .update(|document| {
                document.check_scene(&scene, &policy)?;
                Ok::<_, AuthoringError>(document.append_scene(&scene))
            })
            .await;

        match result {
            Ok(index) => {
                tracing::info!(
                    scene = %scene.name,
                    index,
                    tour = %self.tour.path().display(),
                    "appended scene to tour document"
                );
                Ok(AddedScene {
                    scene,
                    asset,
                    index,
                })
            }
            Err(AuthoringError::Rejected(reason)) => {
                if let Err(err) = self.assets.remove_stored(&asset).await {
                    tracing::warn!(error = %err, "failed to remove asset of rejected scene");
                }
                Err(AuthoringError::Rejected(reason))
            }
            Err(err) => {
                tracing::warn!(
                    asset = %asset.path.display(),
                    "asset was moved but the tour document was not updated"
                );
                Err(err)
            }
        }
    }
}
