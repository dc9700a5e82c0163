use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use scorelabel_core::backup::{self, BackupGuard};
use scorelabel_core::config::CurationConfig;
use scorelabel_core::error::{Error, Result};
use scorelabel_core::planner::Strategy;
use scorelabel_core::predict::PredictProgress;
use scorelabel_core::session::{ReviewInput, SessionState};
use scorelabel_core::store::RecordStore;
use scorelabel_core::Curator;

/// Lay out a corpus directory with one image and one feature sidecar per id.
/// The single feature value becomes the score under `mean_scorer`.
fn create_corpus(root: &Path, items: &[(&str, Option<f32>)]) -> PathBuf {
    let dir = root.join("shoot");
    fs::create_dir_all(&dir).unwrap();
    for (id, feature) in items {
        fs::write(dir.join(format!("{id}.jpg")), b"jpeg bytes").unwrap();
        if let Some(value) = feature {
            fs::write(dir.join(format!("{id}.features.json")), format!("[{value}]")).unwrap();
        }
    }
    dir
}

fn mean_scorer(features: &[Vec<f32>]) -> Result<Vec<f64>> {
    Ok(features
        .iter()
        .map(|f| f.iter().map(|&v| f64::from(v)).sum::<f64>() / f.len() as f64)
        .collect())
}

fn quiet_config() -> CurationConfig {
    CurationConfig {
        snapshot_probability: 0.0,
        ..CurationConfig::default()
    }
}

// ── Curator::open ────────────────────────────────────────────────

#[test]
fn test_open_fresh_corpus_has_empty_store() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None), ("b", None)]);

    let curator = Curator::open(&dir, quiet_config()).unwrap();
    assert_eq!(curator.store_path(), tmp.path().join("shoot.csv"));
    assert!(curator.store().is_empty());
    assert!(!curator.store_path().exists());

    let stats = curator.status().unwrap();
    assert_eq!(stats.corpus_images, 2);
    assert_eq!(stats.unreviewed, 2);
    assert_eq!(stats.backup, None);
}

#[test]
fn test_open_missing_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    let err = Curator::open(&tmp.path().join("nope"), quiet_config())
        .err()
        .unwrap();
    assert!(matches!(err, Error::CorpusNotFound(_)));
}

#[test]
fn test_open_legacy_store_backfills_in_memory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None), ("b", None)]);
    let store_path = tmp.path().join("shoot.csv");
    let legacy = "uuid,label,timestamp\na,0.7,1700000000\nstale,,1700000001.9\n";
    fs::write(&store_path, legacy).unwrap();

    let curator = Curator::open(&dir, quiet_config()).unwrap();
    let a = curator.record("a").unwrap();
    assert_eq!(a.label, Some(0.7));
    assert_eq!(a.predicted_label, Some(0.7));
    assert_eq!(curator.record("stale").unwrap().updated_at, 1_700_000_001);

    // Opening never rewrites the file.
    assert_eq!(fs::read_to_string(&store_path).unwrap(), legacy);

    let stats = curator.status().unwrap();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.orphaned, 1);
    assert_eq!(stats.unreviewed, 1);
}

#[test]
fn test_open_corrupt_store_then_restore() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None)]);
    let store_path = tmp.path().join("shoot.csv");
    fs::write(&store_path, "id,label,predicted_label,updated_at\na,0.4,0.4,10\n").unwrap();
    backup::snapshot(&store_path).unwrap();

    fs::write(&store_path, "id,label\na,not-a-score\n").unwrap();
    assert!(matches!(
        Curator::open(&dir, quiet_config()).err().unwrap(),
        Error::CorruptStore { .. }
    ));

    backup::restore(&store_path).unwrap();
    let curator = Curator::open(&dir, quiet_config()).unwrap();
    assert_eq!(curator.record("a").unwrap().label, Some(0.4));
}

// ── Curator::predict ─────────────────────────────────────────────

#[test]
fn test_predict_scores_unlabeled_and_protects_labels() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(
        tmp.path(),
        &[("a", Some(0.2)), ("b", Some(0.9)), ("c", None), ("d", Some(0.5))],
    );
    fs::write(
        tmp.path().join("shoot.csv"),
        "id,label,predicted_label,updated_at\nd,0.1,0.1,5\n",
    )
    .unwrap();

    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    let mut scored = Vec::new();
    let mut cb = |p: PredictProgress| {
        if let PredictProgress::Scored { id, .. } = p {
            scored.push(id);
        }
    };
    let summary = curator.predict(&mean_scorer, Some(&mut cb)).unwrap();

    assert_eq!(summary.scored, 2);
    assert_eq!(summary.already_labeled, 1);
    assert_eq!(summary.missing_features, vec!["c".to_string()]);
    scored.sort();
    assert_eq!(scored, vec!["a", "b"]);

    let reloaded = RecordStore::load(curator.store_path()).unwrap();
    let a = reloaded.get("a").unwrap();
    assert_eq!(a.label, None);
    assert!((a.predicted_label.unwrap() - 0.2).abs() < 1e-6);
    let d = reloaded.get("d").unwrap();
    assert_eq!((d.label, d.predicted_label), (Some(0.1), Some(0.1)));
    assert!(reloaded.get("c").is_none());
}

// ── Review flow ──────────────────────────────────────────────────

#[test]
fn test_predict_then_review_worst_first() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(
        tmp.path(),
        &[("a", Some(0.8)), ("b", Some(0.1)), ("c", Some(0.5))],
    );

    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    curator.predict(&mean_scorer, None).unwrap();
    let order = curator.plan(Strategy::PredictedAscending);
    assert_eq!(order.as_slice(), &["b", "c", "a"]);

    let mut session = curator
        .into_session(Strategy::PredictedAscending)
        .with_backup_guard(BackupGuard::with_rng(StdRng::seed_from_u64(7)));
    assert_eq!(session.start().unwrap(), SessionState::Presenting(0));

    let shown = session.present().unwrap();
    assert_eq!(shown.item.id, "b");
    assert_eq!(shown.caption(), "predicted: 0.10");

    session.handle_raw("3").unwrap();
    assert_eq!(session.current_id(), Some("c"));
    session.present().unwrap();
    session.handle(ReviewInput::Next).unwrap();
    assert_eq!(session.current_id(), Some("a"));
    session.present().unwrap();
    session.handle_raw("0.95").unwrap();

    // Only "c" is left; moving forward from "a" wraps past the labeled "b".
    assert_eq!(session.current_id(), Some("c"));
    session.present().unwrap();
    assert_eq!(session.handle(ReviewInput::Quit).unwrap(), SessionState::Terminating);
    assert_eq!(session.committed(), 2);

    let store_path = session.store_path().to_path_buf();
    session.finish().unwrap();

    let reloaded = RecordStore::load(&store_path).unwrap();
    let b = reloaded.get("b").unwrap();
    assert_eq!((b.label, b.predicted_label), (Some(0.3), Some(0.3)));
    assert_eq!(reloaded.get("a").unwrap().label, Some(0.95));
    assert_eq!(reloaded.get("c").unwrap().label, None);
}

#[test]
fn test_review_resumes_where_it_left_off() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None), ("b", None), ("c", None)]);

    {
        let curator = Curator::open(&dir, quiet_config()).unwrap();
        let mut session = curator.into_session(Strategy::IdentifierOrder);
        session.start().unwrap();
        session.present().unwrap();
        session.handle(ReviewInput::Label(0.6)).unwrap();
        session.present().unwrap();
        session.handle(ReviewInput::Quit).unwrap();
    }

    let curator = Curator::open(&dir, quiet_config()).unwrap();
    assert_eq!(curator.status().unwrap().unreviewed, 2);
    let mut session = curator.into_session(Strategy::IdentifierOrder);
    session.start().unwrap();
    assert_eq!(session.present().unwrap().item.id, "b");
}

#[test]
fn test_review_takes_backups_when_probability_is_one() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None), ("b", None)]);
    let config = CurationConfig {
        snapshot_probability: 1.0,
        ..CurationConfig::default()
    };

    let curator = Curator::open(&dir, config).unwrap();
    let store_path = curator.store_path().to_path_buf();
    let mut session = curator.into_session(Strategy::IdentifierOrder);
    session.start().unwrap();
    session.present().unwrap();
    session.handle(ReviewInput::Label(0.2)).unwrap();
    session.present().unwrap();
    session.handle(ReviewInput::Label(0.4)).unwrap();

    assert!(session.is_finished());
    assert_eq!(session.snapshots(), 2);

    // Only the newest backup survives.
    let backups: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("shoot_db_backup_"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(backup::find_backup(&store_path).unwrap(), Some(backups[0].path()));
}

// ── Backups and backfill ─────────────────────────────────────────

#[test]
fn test_snapshot_and_restore_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None)]);

    let curator = Curator::open(&dir, quiet_config()).unwrap();
    let mut session = curator.into_session(Strategy::IdentifierOrder);
    session.start().unwrap();
    session.present().unwrap();
    session.handle(ReviewInput::Label(0.5)).unwrap();
    session.finish().unwrap();

    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    let backup_path = curator.snapshot().unwrap();
    assert!(backup_path.exists());
    assert_eq!(curator.status().unwrap().backup, Some(backup_path.clone()));

    fs::write(curator.store_path(), "id,label,predicted_label,updated_at\n").unwrap();
    assert_eq!(curator.restore().unwrap(), backup_path);
    assert_eq!(curator.record("a").unwrap().label, Some(0.5));
    assert!(backup_path.exists());
}

#[test]
fn test_restore_without_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None)]);
    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    assert!(matches!(
        curator.restore().unwrap_err(),
        Error::NoBackupAvailable(_)
    ));
}

#[test]
fn test_backfill_persists_and_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None), ("b", None)]);
    let store_path = tmp.path().join("shoot.csv");
    fs::write(&store_path, "id,label,predicted_label,updated_at\na,0.3,,1\nb,,0.8,2\n").unwrap();

    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    assert_eq!(curator.backfill().unwrap(), 1);
    assert_eq!(curator.backfill().unwrap(), 0);

    let reloaded = RecordStore::load(&store_path).unwrap();
    assert_eq!(reloaded.get("a").unwrap().predicted_label, Some(0.3));
    assert_eq!(reloaded.get("b").unwrap().predicted_label, Some(0.8));
    assert_eq!(reloaded.get("b").unwrap().label, None);

    let mut reopened = Curator::open(&dir, quiet_config()).unwrap();
    assert_eq!(reopened.backfill().unwrap(), 0);
}

#[test]
fn test_backfill_counts_stale_predictions_fixed_on_open() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = create_corpus(tmp.path(), &[("a", None), ("b", None), ("c", None)]);
    let store_path = tmp.path().join("shoot.csv");
    fs::write(
        &store_path,
        "id,label,predicted_label,updated_at\na,0.3,0.9,1\nb,0.6,,2\nc,0.1,0.1,3\n",
    )
    .unwrap();

    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    assert_eq!(curator.backfill().unwrap(), 2);
    let reloaded = RecordStore::load(&store_path).unwrap();
    assert_eq!(reloaded.get("a").unwrap().predicted_label, Some(0.3));
    assert_eq!(reloaded.get("b").unwrap().predicted_label, Some(0.6));

    // A plain save already persists the open-time fix.
    fs::write(
        &store_path,
        "id,label,predicted_label,updated_at\na,0.3,0.9,1\n",
    )
    .unwrap();
    let mut curator = Curator::open(&dir, quiet_config()).unwrap();
    curator.save().unwrap();
    assert_eq!(curator.backfill().unwrap(), 0);
}
