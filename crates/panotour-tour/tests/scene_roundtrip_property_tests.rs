use panotour_tour::{NewScene, Scene, TourDocument};
use proptest::prelude::*;

fn field() -> impl Strategy<Value = String> {
    // Includes markup characters and the whitespace that attribute values
    // must carry as character references.
    proptest::string::string_regex(r#"[A-Za-z0-9 _\-.&<>"'/\t\n\r]{0,16}"#).unwrap()
}

fn new_scene() -> impl Strategy<Value = NewScene> {
    (field(), field(), field(), field(), field()).prop_map(
        |(name, ath, atv, linkedscene, file)| NewScene {
            name,
            ath,
            atv,
            linkedscene,
            image_url: format!("panos/1700000000000_{file}"),
        },
    )
}

proptest! {
    #[test]
    fn appended_scenes_survive_serialization(inputs in proptest::collection::vec(new_scene(), 1..5)) {
        let mut doc = TourDocument::parse(r#"<krpano><scene name="Hall"/></krpano>"#).unwrap();
        for input in &inputs {
            doc.append_scene(&Scene::authored(input.clone()));
        }

        let xml = doc.to_xml_string().unwrap();
        let reparsed = TourDocument::parse(&xml).unwrap();
        let scenes = reparsed.scenes();
        prop_assert_eq!(scenes.len(), inputs.len() + 1);

        for (scene, input) in scenes[1..].iter().zip(&inputs) {
            prop_assert_eq!(&scene.name, &input.name);
            prop_assert_eq!(scene.image_url(), Some(input.image_url.as_str()));
            let hotspot = &scene.hotspots[0];
            prop_assert_eq!(&hotspot.ath, &input.ath);
            prop_assert_eq!(&hotspot.atv, &input.atv);
            prop_assert_eq!(&hotspot.linkedscene, &input.linkedscene);
        }
    }
}
