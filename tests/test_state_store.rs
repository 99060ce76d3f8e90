//! Tests for CandidateStore implementations: JsonFileStore and MemoryStore.

use hirepipe::pipeline::types::ResumeUpload;
use hirepipe::pipeline::{Analysis, Application, CandidateRecord, Recommendation};
use hirepipe::storage::json_store::{backup_path, read_records};
use hirepipe::storage::{CandidateStore, JsonFileStore, MemoryStore, Records};

fn record(name: &str) -> CandidateRecord {
    let app = Application {
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        skills: "python".into(),
        resume: Some(ResumeUpload {
            filename: "cv.txt".into(),
            bytes: Vec::new(),
        }),
    };
    CandidateRecord::new(&app, "resume text".into())
}

// ===== MemoryStore =====

#[tokio::test]
async fn memory_store_put_and_get() {
    let store = MemoryStore::new();
    assert!(store.get("t1").await.unwrap().is_none());

    store.put("t1", record("Ada")).await.unwrap();
    assert_eq!(store.get("t1").await.unwrap().unwrap().name, "Ada");
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn memory_store_save_replaces_everything() {
    let store = MemoryStore::new();
    store.put("t1", record("Ada")).await.unwrap();

    let mut replacement = Records::new();
    replacement.insert("t2".into(), record("Grace"));
    store.save(replacement).await.unwrap();

    assert!(store.get("t1").await.unwrap().is_none());
    assert_eq!(store.load().await.unwrap().len(), 1);
}

// ===== JsonFileStore =====

#[tokio::test]
async fn json_store_creates_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("states.json");

    let store = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 0);
    assert!(path.exists());
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
}

#[tokio::test]
async fn json_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        let mut r = record("Ada");
        r.coding_analysis = Some(Analysis::new(85, "solid", Recommendation::Pass));
        r.coding_test_completed = true;
        store.put("t1", r).await.unwrap();
    }

    let store = JsonFileStore::open(&path).await.unwrap();
    let loaded = store.get("t1").await.unwrap().unwrap();
    assert_eq!(loaded.name, "Ada");
    assert!(loaded.coding_test_completed);
    assert_eq!(loaded.coding_analysis.unwrap().score, 85);
}

#[tokio::test]
async fn json_store_keeps_previous_version_as_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    let store = JsonFileStore::open(&path).await.unwrap();

    store.put("t1", record("Ada")).await.unwrap();
    store.put("t2", record("Grace")).await.unwrap();

    let backup = read_records(&backup_path(&path)).await.unwrap();
    assert_eq!(backup.len(), 1);
    assert!(backup.contains_key("t1"));

    let primary = read_records(&path).await.unwrap();
    assert_eq!(primary.len(), 2);
}

#[tokio::test]
async fn json_store_moves_corrupt_file_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    std::fs::write(&path, "{ not json").unwrap();
    std::fs::write(backup_path(&path), "{}").unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 0);

    let corrupt: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("states.json.corrupt-"))
        .collect();
    assert_eq!(corrupt.len(), 1);
    let aside = dir.path().join(&corrupt[0]);
    assert_eq!(std::fs::read_to_string(aside).unwrap(), "{ not json");
}

#[tokio::test]
async fn json_store_treats_blank_file_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    std::fs::write(&path, "  \n").unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn json_store_preserves_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    std::fs::write(
        &path,
        r#"{"t1": {"name": "Ada", "email": "ada@example.com", "referral": "meetup"}}"#,
    )
    .unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    let mut r = store.get("t1").await.unwrap().unwrap();
    r.skills = "python".into();
    store.put("t1", r).await.unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["t1"]["referral"], "meetup");
    assert_eq!(raw["t1"]["skills"], "python");
    assert_eq!(raw["t1"]["coding_test_completed"], false);
}

#[tokio::test]
async fn json_store_load_rereads_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    let store = JsonFileStore::open(&path).await.unwrap();
    store.put("t1", record("Ada")).await.unwrap();

    let mut edited = read_records(&path).await.unwrap();
    edited.insert("t2".into(), record("Grace"));
    std::fs::write(&path, serde_json::to_string(&edited).unwrap()).unwrap();

    assert_eq!(store.load().await.unwrap().len(), 2);
    assert!(store.get("t2").await.unwrap().is_some());
}

#[tokio::test]
async fn json_store_accepts_loosely_typed_legacy_analyses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    std::fs::write(
        &path,
        r#"{
            "good-token": {"name": "Ada", "email": "ada@example.com"},
            "float-token": {
                "name": "Grace",
                "email": "grace@example.com",
                "coding_analysis": {"score": 85.0, "feedback": "fine", "recommendation": "PASS"},
                "tech_analysis": {"score": "72.6", "recommendation": "fail"},
                "hr_analysis": {"score": 140, "feedback": "great", "recommendation": " Pass "}
            }
        }"#,
    )
    .unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 2);
    assert!(store.get("good-token").await.unwrap().is_some());

    let r = store.get("float-token").await.unwrap().unwrap();
    let coding = r.coding_analysis.unwrap();
    assert_eq!((coding.score, coding.recommendation), (85, Recommendation::Pass));
    let tech = r.tech_analysis.unwrap();
    assert_eq!((tech.score, tech.recommendation), (73, Recommendation::Fail));
    assert_eq!(tech.feedback, "");
    assert_eq!(r.hr_analysis.unwrap().score, 100);

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert!(!names.iter().any(|n| n.contains(".corrupt-") || n.contains(".rejected-")));
}

#[tokio::test]
async fn json_store_sets_aside_only_undecodable_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    std::fs::write(
        &path,
        r#"{
            "good-token": {"name": "Ada", "email": "ada@example.com"},
            "bad-token": {"name": "Grace", "email": "grace@example.com",
                          "coding_analysis": {"score": "lots", "recommendation": "PASS"}}
        }"#,
    )
    .unwrap();

    let store = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(store.len().await.unwrap(), 1);
    assert_eq!(store.get("good-token").await.unwrap().unwrap().name, "Ada");
    assert!(store.get("bad-token").await.unwrap().is_none());

    let rejected: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("states.json.rejected-"))
        .collect();
    assert_eq!(rejected.len(), 1);
    let kept: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(&rejected[0])).unwrap()).unwrap();
    assert_eq!(kept["bad-token"]["coding_analysis"]["score"], "lots");
    assert!(kept.get("good-token").is_none());
}

#[tokio::test]
async fn json_store_write_failure_keeps_previous_primary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.json");
    let store = JsonFileStore::open(&path).await.unwrap();
    store.put("t1", record("Ada")).await.unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    // A directory squatting on the backup name makes rotation fail before
    // the primary is touched.
    std::fs::remove_file(backup_path(&path)).unwrap();
    std::fs::create_dir(backup_path(&path)).unwrap();
    std::fs::write(backup_path(&path).join("keep"), "x").unwrap();

    assert!(store.put("t2", record("Grace")).await.is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}
