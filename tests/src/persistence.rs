//! On-disk format round-trips: dump/restore, import and statistics.

use crate::util::fresh_db;
use osbf::{classify, learn, ClassifyFlags, Config, LearnFlags};
use tempfile::tempdir;

#[test]
fn fresh_database_reports_clean_stats() {
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 1, 94321);
    let s = osbf::stats(&db.classes[0], true).unwrap();
    assert_eq!(s.total_buckets, 94321);
    assert_eq!(s.used_buckets, 0);
    assert_eq!(s.num_chains, 0);
    assert_eq!(s.max_chain, 0);
    assert_eq!(s.learnings, 0);
    assert_eq!(s.classifications, 0);
}

#[test]
fn dump_restore_is_byte_exact() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 1, 5000);
    learn(&cfg, b"persistent feature soup", &db, 0, LearnFlags::empty()).unwrap();
    learn(&cfg, b"second helping", &db, 0, LearnFlags::MISTAKE).unwrap();

    let csv = dir.path().join("dump.csv");
    let restored = dir.path().join("restored.cfc");
    osbf::dump(&db.classes[0], &csv).unwrap();
    osbf::restore(&restored, &csv).unwrap();

    let original_bytes = std::fs::read(&db.classes[0]).unwrap();
    let restored_bytes = std::fs::read(&restored).unwrap();
    assert_eq!(original_bytes, restored_bytes);
}

#[test]
fn restored_database_classifies_identically() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let mut db = fresh_db(&dir, 2, 8192);
    learn(&cfg, b"apples pears plums", &db, 0, LearnFlags::empty()).unwrap();
    learn(&cfg, b"hammers nails saws", &db, 1, LearnFlags::empty()).unwrap();
    let before = classify(&cfg, b"apples pears", &db, ClassifyFlags::empty(), 1.0).unwrap();

    // move class 0 through the CSV representation
    let csv = dir.path().join("class0.csv");
    let copy = dir.path().join("copy0.cfc");
    osbf::dump(&db.classes[0], &csv).unwrap();
    osbf::restore(&copy, &csv).unwrap();
    db.classes[0] = copy;

    let after = classify(&cfg, b"apples pears", &db, ClassifyFlags::empty(), 1.0).unwrap();
    assert_eq!(before.probabilities, after.probabilities);
    assert_eq!(before.best, after.best);
    assert_eq!(before.pr, after.pr);
}

#[test]
fn import_is_equivalent_to_training_both_texts() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();

    // one class trained on both texts
    let combined = fresh_db(&dir, 1, 8192);
    learn(&cfg, b"first document", &combined, 0, LearnFlags::empty()).unwrap();
    learn(&cfg, b"second document", &combined, 0, LearnFlags::empty()).unwrap();

    // two classes trained separately, then merged
    let a = dir.path().join("part_a.cfc");
    let b = dir.path().join("part_b.cfc");
    osbf::create_db(&[&a, &b], 8192).unwrap();
    let db_a = osbf::DbConfig {
        classes: vec![a.clone()],
        ncfs: 1,
        delimiters: Vec::new(),
    };
    let db_b = osbf::DbConfig {
        classes: vec![b.clone()],
        ncfs: 1,
        delimiters: Vec::new(),
    };
    learn(&cfg, b"first document", &db_a, 0, LearnFlags::empty()).unwrap();
    learn(&cfg, b"second document", &db_b, 0, LearnFlags::empty()).unwrap();
    osbf::import(&cfg, &a, &b).unwrap();

    let s_combined = osbf::stats(&combined.classes[0], true).unwrap();
    let s_merged = osbf::stats(&a, true).unwrap();
    assert_eq!(s_merged.learnings, s_combined.learnings);
    assert_eq!(s_merged.used_buckets, s_combined.used_buckets);
}

#[test]
fn classifications_counter_survives_reopen() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 2, 4096);
    learn(&cfg, b"count me", &db, 0, LearnFlags::empty()).unwrap();

    for _ in 0..3 {
        classify(
            &cfg,
            b"count me",
            &db,
            ClassifyFlags::COUNT_CLASSIFICATIONS,
            1.0,
        )
        .unwrap();
    }
    let s = osbf::stats(&db.classes[0], false).unwrap();
    assert_eq!(s.classifications, 3);
}

#[test]
fn remove_db_deletes_all_classes() {
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 3, 256);
    assert_eq!(osbf::remove_db(&db.classes).unwrap(), 3);
    for class in &db.classes {
        assert!(!class.exists());
    }
}
