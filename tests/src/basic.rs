//! End-to-end learn/classify behavior over real class files.

use crate::util::fresh_db;
use osbf::{classify, learn, unlearn, ClassifyFlags, Config, LearnFlags, DEFAULT_NUM_BUCKETS};
use tempfile::tempdir;

#[test]
fn single_word_classifies_into_its_class() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 2, DEFAULT_NUM_BUCKETS);

    learn(&cfg, b"hello", &db, 0, LearnFlags::empty()).unwrap();
    let out = classify(&cfg, b"hello", &db, ClassifyFlags::empty(), 1.0).unwrap();

    assert_eq!(out.best, 0);
    assert!(out.probabilities[0] > 0.5, "p = {:?}", out.probabilities);
    assert_eq!(out.trainings, vec![1, 0]);
}

#[test]
fn disjoint_corpora_separate_cleanly() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 2, 16384);

    let t1: &[u8] = b"wine cheese bread olives";
    let t2: &[u8] = b"gears pistons torque camshaft";
    learn(&cfg, t1, &db, 0, LearnFlags::empty()).unwrap();
    learn(&cfg, t2, &db, 1, LearnFlags::empty()).unwrap();

    let out = classify(&cfg, t1, &db, ClassifyFlags::empty(), 1.0).unwrap();
    assert_eq!(out.best, 0);
    assert!(out.pr > 0.0);
    let sum: f64 = out.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-9);

    let out = classify(&cfg, t2, &db, ClassifyFlags::empty(), 1.0).unwrap();
    assert_eq!(out.best, 1);
    assert!(out.pr < 0.0);
}

#[test]
fn repeated_training_strengthens_the_verdict() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 2, 16384);

    let spam: &[u8] = b"free money click now";
    let ham: &[u8] = b"meeting notes attached regards";
    learn(&cfg, spam, &db, 0, LearnFlags::empty()).unwrap();
    learn(&cfg, ham, &db, 1, LearnFlags::empty()).unwrap();
    let before = classify(&cfg, spam, &db, ClassifyFlags::empty(), 1.0).unwrap();

    for _ in 0..5 {
        learn(&cfg, spam, &db, 0, LearnFlags::EXTRA_LEARNING).unwrap();
    }
    let after = classify(&cfg, spam, &db, ClassifyFlags::empty(), 1.0).unwrap();

    assert_eq!(after.best, 0);
    assert!(after.pr >= before.pr, "{} < {}", after.pr, before.pr);
}

#[test]
fn learn_then_unlearn_returns_to_indifference() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 2, 16384);

    let text: &[u8] = b"completely reversible training sample";
    learn(&cfg, text, &db, 0, LearnFlags::empty()).unwrap();
    unlearn(&cfg, text, &db, 0, LearnFlags::empty()).unwrap();

    let out = classify(&cfg, text, &db, ClassifyFlags::empty(), 1.0).unwrap();
    assert!((out.probabilities[0] - 0.5).abs() < 1e-9);
    assert!((out.probabilities[1] - 0.5).abs() < 1e-9);
    assert_eq!(out.trainings, vec![0, 0]);
}

#[test]
fn delimiters_split_otherwise_identical_texts() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let mut db = fresh_db(&dir, 2, 16384);
    db.delimiters = b".".to_vec();

    // with '.' as a delimiter both spellings produce the same tokens
    learn(&cfg, b"alpha.beta gamma", &db, 0, LearnFlags::empty()).unwrap();
    let out = classify(&cfg, b"alpha beta gamma", &db, ClassifyFlags::empty(), 1.0).unwrap();
    assert_eq!(out.best, 0);
    assert!(out.probabilities[0] > 0.5);
}

#[test]
fn mistake_learning_is_tracked() {
    let cfg = Config::default();
    let dir = tempdir().unwrap();
    let db = fresh_db(&dir, 1, 4096);

    learn(&cfg, b"misrouted message body", &db, 0, LearnFlags::MISTAKE).unwrap();
    let s = osbf::stats(&db.classes[0], false).unwrap();
    assert_eq!(s.mistakes, 1);
    assert_eq!(s.learnings, 1);
}
