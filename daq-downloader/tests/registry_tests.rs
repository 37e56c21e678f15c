//! Registry persistence: note preservation, atomic replace, sensor fallback

mod helpers;

use std::sync::Arc;
use tempfile::TempDir;

use daq_common::Error;
use daq_downloader::registry::{Registry, RunsDocument, SensorsDocument};
use daq_downloader::window::Window;
use helpers::hour;

fn window(start: i64, end: i64) -> Window {
    Window {
        start: hour(start),
        end: hour(end),
        bins: (end - start) as u32,
        row_count: Some(((end - start) * 3600) as u64),
    }
}

fn registry(dir: &TempDir) -> Registry {
    Registry::new(dir.path(), chrono_tz::America::Toronto)
}

#[tokio::test]
async fn test_rescan_preserves_note_fields() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);

    let doc = registry.merge_runs("WFR25", vec![window(0, 2)]).await.unwrap();
    let key = doc.runs[0].key.clone();

    let noted = registry.set_note("WFR25", &key, "  skidpad, wet track  ").await.unwrap();
    assert_eq!(noted.note.as_deref(), Some("skidpad, wet track"));
    let noted_at = noted.note_updated_at.unwrap();

    let mut rescanned = window(0, 2);
    rescanned.row_count = Some(1);
    let doc = registry.merge_runs("WFR25", vec![rescanned]).await.unwrap();

    assert_eq!(doc.runs.len(), 1);
    assert_eq!(doc.runs[0].key, key);
    assert_eq!(doc.runs[0].note.as_deref(), Some("skidpad, wet track"));
    assert_eq!(doc.runs[0].note_updated_at, Some(noted_at));
    assert_eq!(doc.runs[0].row_count, Some(1));
}

#[tokio::test]
async fn test_set_note_unknown_key_leaves_document_byte_identical() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    registry.merge_runs("WFR25", vec![window(0, 2), window(5, 6)]).await.unwrap();

    let path = dir.path().join("WFR25").join("runs.json");
    let before = std::fs::read(&path).unwrap();

    let result = registry.set_note("WFR25", "run-that-does-not-exist", "text").await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn test_empty_note_clears_text_but_stamps_time() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    let doc = registry.merge_runs("WFR25", vec![window(0, 1)]).await.unwrap();
    let key = doc.runs[0].key.clone();

    registry.set_note("WFR25", &key, "first").await.unwrap();
    let cleared = registry.set_note("WFR25", &key, "   ").await.unwrap();

    assert_eq!(cleared.note, None);
    assert!(cleared.note_updated_at.is_some());
}

#[tokio::test]
async fn test_vanished_runs_are_kept() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    registry.merge_runs("WFR25", vec![window(0, 2)]).await.unwrap();

    let doc = registry.merge_runs("WFR25", vec![window(6, 7)]).await.unwrap();

    let starts: Vec<_> = doc.runs.iter().map(|r| r.start_utc).collect();
    assert_eq!(starts, vec![hour(0), hour(6)]);
}

#[tokio::test]
async fn test_reads_before_any_scan_are_empty() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);

    assert_eq!(registry.read_runs("WFR25").await.unwrap(), RunsDocument::default());
    assert_eq!(registry.read_sensors("WFR25").await.unwrap(), SensorsDocument::default());
}

#[tokio::test]
async fn test_sensor_set_survives_empty_discoveries() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);

    registry
        .write_sensors("WFR25", vec!["voltage".to_string(), "rpm".to_string()])
        .await
        .unwrap();
    registry.write_sensors("WFR25", Vec::new()).await.unwrap();
    let doc = registry.write_sensors("WFR25", Vec::new()).await.unwrap();

    assert_eq!(doc.sensors, vec!["rpm", "voltage"]);
    assert_eq!(registry.read_sensors("WFR25").await.unwrap().sensors, vec!["rpm", "voltage"]);
}

#[tokio::test]
async fn test_datasets_are_isolated() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    registry.merge_runs("WFR25", vec![window(0, 1)]).await.unwrap();

    assert!(registry.read_runs("WFR24").await.unwrap().runs.is_empty());
}

#[tokio::test]
async fn test_path_like_season_names_rejected() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);

    for name in ["", "..", "../etc", "a/b"] {
        assert!(
            matches!(registry.read_runs(name).await, Err(Error::InvalidInput(_))),
            "{:?} accepted",
            name
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reader_never_sees_partial_document() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(registry(&dir));
    registry.merge_runs("WFR25", vec![window(0, 1)]).await.unwrap();
    let path = dir.path().join("WFR25").join("runs.json");

    let writer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for i in 0..60i64 {
                let windows = (0..=i % 20).map(|h| window(h * 2, h * 2 + 1)).collect();
                registry.merge_runs("WFR25", windows).await.unwrap();
            }
        })
    };

    let reader = tokio::task::spawn_blocking(move || {
        let mut reads = 0;
        while reads < 500 {
            let bytes = std::fs::read(&path).unwrap();
            let parsed: RunsDocument = serde_json::from_slice(&bytes)
                .expect("reader observed a document that does not parse");
            assert!(!parsed.runs.is_empty());
            reads += 1;
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_notes_on_one_dataset_all_land() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(registry(&dir));
    let windows = (0..8).map(|h| window(h * 2, h * 2 + 1)).collect();
    let doc = registry.merge_runs("WFR25", windows).await.unwrap();

    let mut handles = Vec::new();
    for run in doc.runs {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry
                .set_note("WFR25", &run.key, &format!("note {}", run.key))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let doc = registry.read_runs("WFR25").await.unwrap();
    assert!(doc
        .runs
        .iter()
        .all(|r| r.note.as_deref() == Some(format!("note {}", r.key).as_str())));
}
