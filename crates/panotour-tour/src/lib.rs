//! Panotour tour document
//!
//! Typed access to a krpano tour configuration (`tour.xml`):
//!
//! - [`TourDocument`] parses the whole document into an owned XML tree, so
//!   elements the scene model does not describe (`<include>`, `<action>`, skin
//!   settings, ...) survive a rewrite untouched.
//! - [`Scene`] is the typed scene record. New scenes are built with
//!   [`Scene::authored`] and appended with [`TourDocument::append_scene`].
//! - [`ScenePolicy`] holds the optional input checks applied before an append.
//!
//! Serialization keeps the exact element and attribute order existing tour
//! consumers expect.

pub mod document;
pub mod error;
pub mod policy;
pub mod scene;
pub mod xml;

pub use document::{TourDocument, ROOT_ELEMENT, SCENE_ELEMENT};
pub use error::TourError;
pub use policy::{SceneRejection, ScenePolicy};
pub use scene::{Hotspot, NewScene, Scene, SceneImage, View, DEFAULT_HOTSPOT_STYLE};
pub use xml::{XmlDecl, XmlElement, XmlNode};
