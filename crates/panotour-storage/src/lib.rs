//! Panotour storage layer
//!
//! ```text
//!   upload ──► staging/{millis}_{name} ──move──► panos/{millis}_{name}
//!                                                      │
//!                                                      ▼
//!                       tour.xml ◄── load · append <scene> · atomic write
//! ```
//!
//! - [`TourLayout`] names the directories and the tour document under a root.
//! - [`AssetStore`] stages uploads and moves them into the asset directory.
//! - [`TourStore`] serializes every read-modify-write of the tour document, so
//!   concurrent appends cannot overwrite each other.
//! - [`SceneAppendService`] runs the whole authoring step: move the asset,
//!   then append the scene that references it.

pub mod assets;
pub mod authoring;
pub mod error;
pub mod layout;
pub mod tour_store;


pub use assets::{asset_file_name, AssetStore, StagedAsset, StagedWriter, StoredAsset};
pub use authoring::{AddedScene, AuthoringError, SceneAppendService, SceneFields};
pub use error::StorageError;
pub use layout::TourLayout;
pub use tour_store::TourStore;
