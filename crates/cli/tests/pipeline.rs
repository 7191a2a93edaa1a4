use organizer_cli::report::{self, PlanSummary};
use organizer_core::config::AppConfig;
use organizer_core::models::Provenance;
use organizer_core::pipeline::{self, PlanRequest};
use organizer_core::scanner::ScanOptions;
use organizer_core::suggester::{NoopSource, StaticSource};
use organizer_core::DecisionEngine;
use std::fs;
use tempfile::tempdir;

fn config_in(dir: &std::path::Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.stores.cache_path = dir.join("data/ai_cache.json").to_string_lossy().into_owned();
    cfg.stores.memory_path = dir.join("data/memory.json").to_string_lossy().into_owned();
    cfg.stores.categories_path = dir.join("data/categories.json").to_string_lossy().into_owned();
    cfg
}

#[tokio::test]
async fn test_full_plan() {
    // 1. Setup a scan directory with one batchable folder and some loose files
    let temp = tempdir().unwrap();
    let src = temp.path().join("inbox");
    let finance = src.join("Finance");
    let tiny = src.join("Tiny");
    fs::create_dir_all(&finance).unwrap();
    fs::create_dir_all(&tiny).unwrap();
    for name in ["a.pdf", "b.pdf", "c.xlsx"] {
        fs::write(finance.join(name), "statement").unwrap();
    }
    fs::write(tiny.join("hw2.pdf"), "homework").unwrap();
    fs::write(src.join("notes.txt"), "grocery list").unwrap();
    fs::write(src.join("mystery.zip"), "PK").unwrap();
    fs::write(src.join("ignored.exe"), "MZ").unwrap();

    let suggestions = temp.path().join("suggestions.json");
    fs::write(
        &suggestions,
        r#"{"notes.txt": {"context": "Personal", "naming_strategy": "use-new-description",
             "description": "Grocery List", "confidence": 0.7}}"#,
    )
    .unwrap();

    // 2. Plan with a static suggestion source
    let cfg = config_in(temp.path());
    let mut engine = DecisionEngine::open(&cfg);
    let source = StaticSource::load(&suggestions).unwrap();
    let request = PlanRequest {
        root: src.clone(),
        scan: ScanOptions::from_config(&cfg.scan, true),
        min_folder_files: Some(cfg.scan.min_folder_files),
        batch_size: 3,
    };
    let plan = pipeline::plan(&mut engine, &source, &request).await.unwrap();

    // 3. Verify
    assert_eq!(plan.len(), 6);
    assert_eq!(plan.folders.len(), 1);
    let folder = &plan.folders[0];
    assert_eq!(folder.name, "Finance");
    assert!(folder.auto_apply);
    assert!(folder.files.iter().all(|f| f.decision.category == "Finance"));
    assert!(folder.files.iter().all(|f| f.decision.provenance == Provenance::LearnedFolder));

    let by_name = |name: &str| {
        plan.loose
            .iter()
            .find(|f| f.signature.file_name() == name)
            .unwrap()
    };
    assert_eq!(by_name("hw2.pdf").decision.provenance, Provenance::Pattern);
    let notes = by_name("notes.txt");
    assert_eq!(notes.decision.category, "Personal");
    assert!(notes.placement.file_name.ends_with("__Personal__grocery-list.txt"));
    assert_eq!(by_name("mystery.zip").decision.category, "Misc");
    assert_eq!(plan.suggestion_requests, 1);

    let summary = PlanSummary::of(&plan);
    assert_eq!(summary.files, 6);
    assert_eq!(summary.auto_folders, 1);

    let rows = report::filter_fields(report::plan_rows(&plan), &["category".to_string()]);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.as_object().unwrap().len() == 1));

    // 4. Stores were written next to the config paths
    assert!(temp.path().join("data/ai_cache.json").exists());
    assert!(engine.persistence_warnings().is_empty());
}

#[tokio::test]
async fn second_plan_is_served_from_cache() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("drop");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("receipt_0412.pdf"), "total 12.00").unwrap();

    let cfg = config_in(temp.path());
    let request = PlanRequest {
        root: src.clone(),
        scan: ScanOptions::from_config(&cfg.scan, false),
        min_folder_files: None,
        batch_size: 3,
    };

    let mut engine = DecisionEngine::open(&cfg);
    let first = pipeline::plan(&mut engine, &NoopSource, &request).await.unwrap();
    assert!(!first.loose[0].decision.cached);
    drop(engine);

    let mut engine = DecisionEngine::open(&cfg);
    let second = pipeline::plan(&mut engine, &NoopSource, &request).await.unwrap();
    assert!(second.loose[0].decision.cached);
    assert_eq!(second.loose[0].decision.category, "Finance");
    assert_eq!(second.suggestion_requests, 0);
}

#[tokio::test]
async fn numbered_scans_are_reported_as_a_series() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("scans");
    fs::create_dir_all(&src).unwrap();
    for name in ["scan_01.png", "scan_02.png", "cover.png"] {
        fs::write(src.join(name), "img").unwrap();
    }

    let cfg = config_in(temp.path());
    let mut engine = DecisionEngine::open(&cfg);
    let request = PlanRequest {
        root: src.clone(),
        scan: ScanOptions::from_config(&cfg.scan, false),
        min_folder_files: None,
        batch_size: 3,
    };
    let plan = pipeline::plan(&mut engine, &NoopSource, &request).await.unwrap();

    assert_eq!(plan.len(), 3);
    assert_eq!(plan.series.len(), 1);
    assert_eq!(
        plan.series["scan"],
        vec![("scan_01".to_string(), 1), ("scan_02".to_string(), 2)]
    );
}
