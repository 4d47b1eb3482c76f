//! Behavior under table pressure: microgrooming, saturation and the
//! full-database error path.

use crate::util::{fresh_db, max_bucket_value};
use osbf::{classify, learn, ClassifyFlags, Config, LearnFlags, OsbfError};
use tempfile::tempdir;

#[test]
fn heavy_training_keeps_table_invariants() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 1, 1000);

    // far more features than slots: inserts must groom their way in
    for i in 0..300 {
        let text = format!("tok{}", i);
        learn(&cfg, text.as_bytes(), &db, 0, LearnFlags::empty()).unwrap();
    }

    let s = osbf::stats(&db.classes[0], true).unwrap();
    assert_eq!(s.learnings, 300);
    assert!(s.used_buckets <= s.total_buckets);
    assert!(s.used_buckets > 0);
    // grooming bounds how far a slot may sit from its home
    assert!(
        s.max_displacement <= 29,
        "displacement {} exceeds the chain limit",
        s.max_displacement
    );
    assert_eq!(s.unreachable, 0);
    assert!(s.num_chains > 0);
    assert!(s.avg_chain >= 1.0);
}

#[test]
fn groomed_database_still_classifies() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 2, 1000);

    for i in 0..150 {
        let text = format!("left{}", i);
        learn(&cfg, text.as_bytes(), &db, 0, LearnFlags::empty()).unwrap();
        let text = format!("right{}", i);
        learn(&cfg, text.as_bytes(), &db, 1, LearnFlags::empty()).unwrap();
    }
    // a recently learned text still lands in its class
    let out = classify(&cfg, b"left149", &db, ClassifyFlags::empty(), 1.0).unwrap();
    assert_eq!(out.best, 0);
}

#[test]
fn no_microgroom_fills_and_fails() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 1, 4);

    // a text with far more distinct features than slots
    match learn(
        &cfg,
        b"one two three four five",
        &db,
        0,
        LearnFlags::NO_MICROGROOM,
    ) {
        Err(OsbfError::DatabaseFull(_)) => {}
        other => panic!("expected DatabaseFull, got {:?}", other),
    }

    let s = osbf::stats(&db.classes[0], true).unwrap();
    // the failed learn is not counted
    assert_eq!(s.learnings, 0);
    assert_eq!(s.used_buckets, 4);
}

#[test]
fn counts_saturate_at_the_ceiling() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.cfc");
    let b = dir.path().join("b.cfc");
    osbf::create_db(&[&a, &b], 2048).unwrap();

    let db = osbf::DbConfig {
        classes: vec![a.clone()],
        ncfs: 1,
        delimiters: Vec::new(),
    };
    learn(&cfg, b"hello", &db, 0, LearnFlags::empty()).unwrap();

    // ping-pong imports snowball the counts past the ceiling
    for _ in 0..13 {
        osbf::import(&cfg, &b, &a).unwrap();
        osbf::import(&cfg, &a, &b).unwrap();
    }
    assert_eq!(max_bucket_value(&dir, &a), 65535);

    // saturated counts stay put under further training
    learn(&cfg, b"hello", &db, 0, LearnFlags::empty()).unwrap();
    assert_eq!(max_bucket_value(&dir, &a), 65535);
}
