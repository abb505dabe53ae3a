//! Integration tests for the complete Panotour pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Staged upload → asset directory → `tour.xml`
//! - Tour document parse → append → serialize → parse
//! - Scene policies across the storage layer
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;
use tempfile::tempdir;

use panotour_storage::{AuthoringError, SceneAppendService, SceneFields, TourLayout, TourStore};
use panotour_tour::{ScenePolicy, TourDocument};

const VTOUR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<krpano version="1.21" title="Office">
  <include url="skin/vtourskin.xml"/>
  <skin_settings maps="false" thumbs="true"/>
  <action name="startup" autorun="onstart">
    if(startscene === null OR !scene[get(startscene)], copy(startscene,scene[0].name); );
    loadscene(get(startscene), null, MERGE);
  </action>
  <scene name="Hall" title="Hall" onstart="" thumburl="panos/hall.tiles/thumb.jpg" lat="" lng="" heading="">
    <view hlookat="0" vlookat="0" fovtype="MFOV" fov="120" maxpixelzoom="2.0" fovmin="70" fovmax="140" limitview="auto"/>
    <preview url="panos/hall.tiles/preview.jpg"/>
    <image>
      <cube url="panos/hall.tiles/pano_%s.jpg"/>
    </image>
  </scene>
  <!-- viewer plugins follow the scenes -->
  <plugin name="gyro" devices="html5"/>
</krpano>
"#;

fn fields(name: &str, ath: &str, atv: &str, link: &str) -> SceneFields {
    SceneFields {
        scene_name: name.to_string(),
        ath: ath.to_string(),
        atv: atv.to_string(),
        linkedscene: link.to_string(),
    }
}

async fn seeded_layout(tour: &str) -> (TourLayout, tempfile::TempDir) {
    let dir = tempdir().expect("tempdir");
    let layout = TourLayout::new(dir.path());
    layout.ensure_dirs().await.expect("ensure dirs");
    std::fs::write(layout.tour_path(), tour).expect("seed tour");
    (layout, dir)
}

// ============================================================================
// Upload → tour document
// ============================================================================

#[tokio::test]
async fn test_generated_tour_keeps_everything_but_gains_a_scene() {
    let (layout, _dir) = seeded_layout(VTOUR).await;
    let service = SceneAppendService::new(&layout, ScenePolicy::default());

    let staged = service
        .assets()
        .stage_bytes("lobby.jpg", b"jpeg")
        .await
        .unwrap();
    let added = service
        .append(staged, fields("Lobby", "45", "-10", "Hall"))
        .await
        .unwrap();

    let text = std::fs::read_to_string(layout.tour_path()).unwrap();
    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"), "{text}");
    assert!(text.contains("<skin_settings maps=\"false\" thumbs=\"true\"/>"), "{text}");
    assert!(text.contains("loadscene(get(startscene), null, MERGE);"), "{text}");
    assert!(text.contains("<plugin name=\"gyro\" devices=\"html5\"/>"), "{text}");
    assert!(text.contains("thumburl=\"panos/hall.tiles/thumb.jpg\""), "{text}");

    // New scene sits right after the existing one, before the plugin.
    let lobby_at = text.find("name=\"Lobby\"").unwrap();
    assert!(text.find("name=\"Hall\"").unwrap() < lobby_at);
    assert!(lobby_at < text.find("name=\"gyro\"").unwrap());

    let doc = TourDocument::parse(&text).unwrap();
    let names: Vec<String> = doc.scenes().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["Hall", "Lobby"]);

    let lobby = doc.find_scene("Lobby").unwrap();
    assert_eq!(lobby.image_url(), Some(added.asset.url.as_str()));
    let view = lobby.view.as_ref().unwrap();
    assert_eq!(view.fovtype, "MFOV");
    assert_eq!(view.fov, "120");
    assert_eq!(lobby.hotspots.len(), 1);
    assert!(lobby.hotspots[0].use3dtransition);
}

#[tokio::test]
async fn test_init_then_append_from_empty_tour() {
    let dir = tempdir().unwrap();
    let layout = TourLayout::new(dir.path().join("site"));
    layout.ensure_dirs().await.unwrap();
    assert!(layout.init_tour().await.unwrap());

    let service = SceneAppendService::new(&layout, ScenePolicy::default());
    let staged = service.assets().stage_bytes("a.jpg", b"a").await.unwrap();
    let added = service.append(staged, fields("A", "", "", "")).await.unwrap();
    assert_eq!(added.index, 0);

    let doc = TourStore::new(layout.tour_path()).load().await.unwrap();
    assert_eq!(doc.scene_count(), 1);
    let a = doc.find_scene("A").unwrap();
    assert_eq!(a.hotspots[0].ath, "");
    assert_eq!(a.hotspots[0].linkedscene, "");
}

#[tokio::test]
async fn test_opaque_field_values_survive_the_document() {
    let (layout, _dir) = seeded_layout(VTOUR).await;
    let service = SceneAppendService::new(&layout, ScenePolicy::default());

    let staged = service.assets().stage_bytes("x.jpg", b"x").await.unwrap();
    service
        .append(staged, fields("Tom & \"Jerry\" <3", "left", "1e3", "Hall"))
        .await
        .unwrap();

    let doc = TourStore::new(layout.tour_path()).load().await.unwrap();
    let scene = doc.find_scene("Tom & \"Jerry\" <3").unwrap();
    assert_eq!(scene.title, "Tom & \"Jerry\" <3");
    assert_eq!(scene.hotspots[0].ath, "left");
    assert_eq!(scene.hotspots[0].atv, "1e3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_uploads_all_land_in_the_tour() {
    let (layout, _dir) = seeded_layout(VTOUR).await;
    let service = Arc::new(SceneAppendService::new(&layout, ScenePolicy::default()));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                // Same original file name for every upload.
                let staged = service.assets().stage_bytes("pano.jpg", b"x").await?;
                service
                    .append(staged, fields(&format!("Room{i}"), "0", "0", "Hall"))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let doc = TourStore::new(layout.tour_path()).load().await.unwrap();
    assert_eq!(doc.scene_count(), 9);
    let urls: std::collections::BTreeSet<String> = doc
        .scenes()
        .iter()
        .filter_map(|s| s.image_url().map(str::to_string))
        .collect();
    assert_eq!(urls.len(), 9, "every scene references its own asset");
}

// ============================================================================
// Policies
// ============================================================================

#[tokio::test]
async fn test_strict_policy_rejects_bad_scenes() {
    let (layout, _dir) = seeded_layout(VTOUR).await;
    let policy = ScenePolicy {
        reject_duplicate_names: true,
        require_numeric_angles: true,
        require_known_linkedscene: true,
    };
    let service = SceneAppendService::new(&layout, policy);

    for bad in [
        fields("Hall", "0", "0", ""),
        fields("Lobby", "left", "0", ""),
        fields("Lobby", "0", "NaN", ""),
        fields("Lobby", "0", "0", "Nowhere"),
    ] {
        let staged = service.assets().stage_bytes("p.jpg", b"x").await.unwrap();
        let err = service.append(staged, bad.clone()).await.unwrap_err();
        assert!(matches!(err, AuthoringError::Rejected(_)), "{bad:?}: {err}");
    }
    assert_eq!(std::fs::read_to_string(layout.tour_path()).unwrap(), VTOUR);
    assert!(std::fs::read_dir(layout.asset_path()).unwrap().next().is_none());

    let staged = service.assets().stage_bytes("p.jpg", b"x").await.unwrap();
    service
        .append(staged, fields("Lobby", "-12.5", "3", "Hall"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_default_policy_accepts_duplicates() {
    let (layout, _dir) = seeded_layout(VTOUR).await;
    let service = SceneAppendService::new(&layout, ScenePolicy::default());

    for _ in 0..2 {
        let staged = service.assets().stage_bytes("p.jpg", b"x").await.unwrap();
        service.append(staged, fields("Hall", "", "", "")).await.unwrap();
    }
    let doc = TourStore::new(layout.tour_path()).load().await.unwrap();
    assert_eq!(doc.scene_count(), 3);
}
