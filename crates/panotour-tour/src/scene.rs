//! Scene records.
//!
//! A scene as written by the authoring endpoint:
//!
//! ```text
//! <scene name="Lobby" title="Lobby" preload="false">
//!   <view hlookat="0.0" vlookat="0.0" fovtype="MFOV" fov="120" fovmin="70" fovmax="140" limitview="auto"/>
//!   <image>
//!     <cube url="panos/1700000000000_photo.jpg"/>
//!   </image>
//!   <hotspot name="hotspot_Lobby" style="skin_hotspotstyle" ath="45" atv="-10" linkedscene="Hall" use3dtransition="true"/>
//! </scene>
//! ```
//!
//! Reading is lenient: scenes written by other tools may lack any of these
//! parts, and missing attributes come back as empty strings.

use serde::Serialize;

use crate::xml::{XmlElement, XmlNode};

pub const DEFAULT_HOTSPOT_STYLE: &str = "skin_hotspotstyle";

fn bool_attr(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn attr_string(element: &XmlElement, key: &str) -> String {
    element.attr(key).unwrap_or_default().to_string()
}

/// Camera parameters of a scene. Authored scenes always use [`View::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    pub hlookat: String,
    pub vlookat: String,
    pub fovtype: String,
    pub fov: String,
    pub fovmin: String,
    pub fovmax: String,
    pub limitview: String,
}

impl Default for View {
    fn default() -> Self {
        Self {
            hlookat: "0.0".to_string(),
            vlookat: "0.0".to_string(),
            fovtype: "MFOV".to_string(),
            fov: "120".to_string(),
            fovmin: "70".to_string(),
            fovmax: "140".to_string(),
            limitview: "auto".to_string(),
        }
    }
}

impl View {
    pub fn to_element(&self) -> XmlElement {
        XmlElement::new("view")
            .with_attr("hlookat", &self.hlookat)
            .with_attr("vlookat", &self.vlookat)
            .with_attr("fovtype", &self.fovtype)
            .with_attr("fov", &self.fov)
            .with_attr("fovmin", &self.fovmin)
            .with_attr("fovmax", &self.fovmax)
            .with_attr("limitview", &self.limitview)
    }

    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            hlookat: attr_string(element, "hlookat"),
            vlookat: attr_string(element, "vlookat"),
            fovtype: attr_string(element, "fovtype"),
            fov: attr_string(element, "fov"),
            fovmin: attr_string(element, "fovmin"),
            fovmax: attr_string(element, "fovmax"),
            limitview: attr_string(element, "limitview"),
        }
    }
}

/// Image source of a scene: `kind` is the child of `<image>` (`cube`,
/// `sphere`, ...) that carries the `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneImage {
    pub kind: String,
    pub url: String,
}

impl SceneImage {
    pub fn cube(url: impl Into<String>) -> Self {
        Self {
            kind: "cube".to_string(),
            url: url.into(),
        }
    }

    pub fn to_element(&self) -> XmlElement {
        XmlElement::new("image")
            .with_child(XmlElement::new(self.kind.as_str()).with_attr("url", &self.url))
    }

    pub fn from_element(element: &XmlElement) -> Option<Self> {
        element.child_elements().find_map(|source| {
            source.attr("url").map(|url| Self {
                kind: source.name.clone(),
                url: url.to_string(),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub name: String,
    pub style: String,
    pub ath: String,
    pub atv: String,
    pub linkedscene: String,
    pub use3dtransition: bool,
}

impl Hotspot {
    pub fn to_element(&self) -> XmlElement {
        XmlElement::new("hotspot")
            .with_attr("name", &self.name)
            .with_attr("style", &self.style)
            .with_attr("ath", &self.ath)
            .with_attr("atv", &self.atv)
            .with_attr("linkedscene", &self.linkedscene)
            .with_attr("use3dtransition", bool_attr(self.use3dtransition))
    }

    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: attr_string(element, "name"),
            style: attr_string(element, "style"),
            ath: attr_string(element, "ath"),
            atv: attr_string(element, "atv"),
            linkedscene: attr_string(element, "linkedscene"),
            use3dtransition: element.attr("use3dtransition") == Some("true"),
        }
    }
}

/// Caller input for a new scene. Values are taken as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewScene {
    pub name: String,
    pub ath: String,
    pub atv: String,
    pub linkedscene: String,
    /// Path of the stored asset, relative to the tour document.
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scene {
    pub name: String,
    pub title: String,
    pub preload: bool,
    pub view: Option<View>,
    pub image: Option<SceneImage>,
    pub hotspots: Vec<Hotspot>,
}

impl Scene {
    /// Build the record the authoring endpoint appends: title mirrors the
    /// name, default view, cube image, and one hotspot named `hotspot_{name}`.
    pub fn authored(input: NewScene) -> Self {
        let hotspot = Hotspot {
            name: format!("hotspot_{}", input.name),
            style: DEFAULT_HOTSPOT_STYLE.to_string(),
            ath: input.ath,
            atv: input.atv,
            linkedscene: input.linkedscene,
            use3dtransition: true,
        };
        Self {
            title: input.name.clone(),
            name: input.name,
            preload: false,
            view: Some(View::default()),
            image: Some(SceneImage::cube(input.image_url)),
            hotspots: vec![hotspot],
        }
    }

    pub fn to_element(&self) -> XmlElement {
        let mut element = XmlElement::new(crate::SCENE_ELEMENT)
            .with_attr("name", &self.name)
            .with_attr("title", &self.title)
            .with_attr("preload", bool_attr(self.preload));
        if let Some(view) = &self.view {
            element.children.push(XmlNode::Element(view.to_element()));
        }
        if let Some(image) = &self.image {
            element.children.push(XmlNode::Element(image.to_element()));
        }
        for hotspot in &self.hotspots {
            element.children.push(XmlNode::Element(hotspot.to_element()));
        }
        element
    }

    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: attr_string(element, "name"),
            title: attr_string(element, "title"),
            preload: element.attr("preload") == Some("true"),
            view: element.first_child("view").map(View::from_element),
            image: element
                .first_child("image")
                .and_then(SceneImage::from_element),
            hotspots: element
                .child_elements()
                .filter(|child| child.name == "hotspot")
                .map(Hotspot::from_element)
                .collect(),
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image.as_ref().map(|image| image.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> NewScene {
        NewScene {
            name: "Lobby".to_string(),
            ath: "45".to_string(),
            atv: "-10".to_string(),
            linkedscene: "Hall".to_string(),
            image_url: "panos/1700000000000_photo.jpg".to_string(),
        }
    }

    #[test]
    fn authored_scene_has_fixed_defaults() {
        let scene = Scene::authored(lobby());
        assert_eq!(scene.name, "Lobby");
        assert_eq!(scene.title, "Lobby");
        assert!(!scene.preload);
        assert_eq!(scene.view, Some(View::default()));
        assert_eq!(scene.image_url(), Some("panos/1700000000000_photo.jpg"));

        let hotspot = &scene.hotspots[0];
        assert_eq!(hotspot.name, "hotspot_Lobby");
        assert_eq!(hotspot.style, DEFAULT_HOTSPOT_STYLE);
        assert_eq!((hotspot.ath.as_str(), hotspot.atv.as_str()), ("45", "-10"));
        assert_eq!(hotspot.linkedscene, "Hall");
        assert!(hotspot.use3dtransition);
    }

    #[test]
    fn attribute_order_matches_tour_format() {
        let element = Scene::authored(lobby()).to_element();
        let keys = |el: &XmlElement| -> Vec<String> {
            el.attributes.iter().map(|(k, _)| k.clone()).collect()
        };

        assert_eq!(keys(&element), ["name", "title", "preload"]);
        let children: Vec<&XmlElement> = element.child_elements().collect();
        assert_eq!(children.len(), 3);
        assert_eq!(
            keys(children[0]),
            ["hlookat", "vlookat", "fovtype", "fov", "fovmin", "fovmax", "limitview"]
        );
        assert_eq!(children[1].name, "image");
        assert_eq!(children[1].first_child("cube").and_then(|c| c.attr("url")), Some("panos/1700000000000_photo.jpg"));
        assert_eq!(
            keys(children[2]),
            ["name", "style", "ath", "atv", "linkedscene", "use3dtransition"]
        );
    }

    #[test]
    fn element_conversion_is_lossless_for_authored_scenes() {
        let scene = Scene::authored(lobby());
        assert_eq!(Scene::from_element(&scene.to_element()), scene);
    }

    #[test]
    fn foreign_scene_reads_leniently() {
        let element = XmlElement::new("scene")
            .with_attr("name", "Garden")
            .with_child(XmlElement::new("image").with_child(
                XmlElement::new("sphere").with_attr("url", "panos/garden.jpg"),
            ));
        let scene = Scene::from_element(&element);
        assert_eq!(scene.name, "Garden");
        assert_eq!(scene.title, "");
        assert!(scene.view.is_none());
        assert_eq!(
            scene.image,
            Some(SceneImage {
                kind: "sphere".to_string(),
                url: "panos/garden.jpg".to_string(),
            })
        );
        assert!(scene.hotspots.is_empty());
    }
}
