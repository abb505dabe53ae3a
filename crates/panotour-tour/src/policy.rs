//! Optional checks applied to a scene before it is appended.
//!
//! The authoring endpoint has always accepted duplicate names, non-numeric
//! angles and links to scenes that do not exist. [`ScenePolicy::default`]
//! keeps that behavior; each check can be switched on separately.

use thiserror::Error;

use crate::document::TourDocument;
use crate::scene::Scene;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenePolicy {
    pub reject_duplicate_names: bool,
    pub require_numeric_angles: bool,
    /// An empty `linkedscene` means "no link" and always passes.
    pub require_known_linkedscene: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneRejection {
    #[error("scene `{0}` already exists")]
    DuplicateName(String),

    #[error("hotspot `{field}` is not a number: `{value}`")]
    NonNumericAngle { field: &'static str, value: String },

    #[error("linked scene `{0}` does not exist")]
    UnknownLinkedScene(String),
}

fn is_number(value: &str) -> bool {
    value.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

impl ScenePolicy {
    pub fn is_permissive(&self) -> bool {
        *self == Self::default()
    }

    pub fn check(&self, document: &TourDocument, scene: &Scene) -> Result<(), SceneRejection> {
        if self.is_permissive() {
            return Ok(());
        }

        if self.reject_duplicate_names && document.find_scene(&scene.name).is_some() {
            return Err(SceneRejection::DuplicateName(scene.name.clone()));
        }

        for hotspot in &scene.hotspots {
            if self.require_numeric_angles {
                for (field, value) in [("ath", &hotspot.ath), ("atv", &hotspot.atv)] {
                    if !is_number(value) {
                        return Err(SceneRejection::NonNumericAngle {
                            field,
                            value: value.clone(),
                        });
                    }
                }
            }
            if self.require_known_linkedscene
                && !hotspot.linkedscene.is_empty()
                && document.find_scene(&hotspot.linkedscene).is_none()
            {
                return Err(SceneRejection::UnknownLinkedScene(hotspot.linkedscene.clone()));
            }
        }
        Ok(())
    }
}
