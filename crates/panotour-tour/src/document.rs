use crate::error::TourError;
use crate::policy::{SceneRejection, ScenePolicy};
use crate::scene::Scene;
use crate::xml::{self, XmlDecl, XmlElement, XmlNode};

pub const ROOT_ELEMENT: &str = "krpano";
pub const SCENE_ELEMENT: &str = "scene";

/// A whole `tour.xml`, held in memory for a single read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TourDocument {
    decl: Option<XmlDecl>,
    root: XmlElement,
}

impl Default for TourDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl TourDocument {
    /// `<krpano/>` with no scenes and no declaration.
    pub fn empty() -> Self {
        Self {
            decl: None,
            root: XmlElement::new(ROOT_ELEMENT),
        }
    }

    pub fn parse(xml: &str) -> Result<Self, TourError> {
        let parsed = xml::parse_document(xml)?;
        if parsed.root.name != ROOT_ELEMENT {
            return Err(TourError::UnexpectedRoot {
                found: parsed.root.name,
            });
        }
        Ok(Self {
            decl: parsed.decl,
            root: parsed.root,
        })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    fn scene_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.root
            .child_elements()
            .filter(|el| el.name == SCENE_ELEMENT)
    }

    pub fn scenes(&self) -> Vec<Scene> {
        self.scene_elements().map(Scene::from_element).collect()
    }

    pub fn scene_count(&self) -> usize {
        self.scene_elements().count()
    }

    /// First scene with the given name. Names are not unique.
    pub fn find_scene(&self, name: &str) -> Option<Scene> {
        self.scene_elements()
            .find(|el| el.attr("name") == Some(name))
            .map(Scene::from_element)
    }

    pub fn check_scene(&self, scene: &Scene, policy: &ScenePolicy) -> Result<(), SceneRejection> {
        policy.check(self, scene)
    }

    /// Append `scene` to the end of the scene sequence.
    ///
    /// The new node goes directly after the last existing `<scene>`, or at the
    /// end of the root when there is none. Other root children keep their
    /// positions. Returns the scene's index in [`TourDocument::scenes`].
    pub fn append_scene(&mut self, scene: &Scene) -> usize {
        let index = self.scene_count();
        let insert_at = self
            .root
            .children
            .iter()
            .rposition(|node| matches!(node, XmlNode::Element(el) if el.name == SCENE_ELEMENT))
            .map(|pos| pos + 1)
            .unwrap_or(self.root.children.len());
        self.root
            .children
            .insert(insert_at, XmlNode::Element(scene.to_element()));
        index
    }

    pub fn to_xml_string(&self) -> Result<String, TourError> {
        xml::write_document(self.decl.as_ref(), &self.root)
    }
}
