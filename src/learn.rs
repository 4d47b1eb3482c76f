//! Training: applies a +1/-1 delta for every composite feature of a text
//! to the target class database.

use bitflags::bitflags;
use log::debug;

use crate::class::{Class, OpenMode, Probe, MAX_BUCKET_VALUE};
use crate::config::{Config, DbConfig};
use crate::error::{OsbfError, Result};
use crate::features::FeatureStream;

bitflags! {
    /// Training options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LearnFlags: u32 {
        /// Never evict on chain overflow; inserts fail instead of groom.
        const NO_MICROGROOM = 1;
        /// The text was previously misclassified; track it.
        const MISTAKE = 2;
        /// Re-learning a document that was already learned once.
        const EXTRA_LEARNING = 4;
    }
}

/// Learns `text` into `db.classes[class]`.
pub fn learn(
    cfg: &Config,
    text: &[u8],
    db: &DbConfig,
    class: usize,
    flags: LearnFlags,
) -> Result<()> {
    train(cfg, text, db, class, 1, flags)
}

/// Reverses a previous [`learn`] of `text` on `db.classes[class]`.
pub fn unlearn(
    cfg: &Config,
    text: &[u8],
    db: &DbConfig,
    class: usize,
    flags: LearnFlags,
) -> Result<()> {
    train(cfg, text, db, class, -1, flags)
}

fn train(
    cfg: &Config,
    text: &[u8],
    db: &DbConfig,
    class_idx: usize,
    sense: i32,
    flags: LearnFlags,
) -> Result<()> {
    if db.classes.is_empty() {
        return Err(OsbfError::InvalidArgument(
            "at least one class must be given".into(),
        ));
    }
    if text.is_empty() {
        return Err(OsbfError::InvalidArgument(
            "attempt to train on an empty text".into(),
        ));
    }
    let path = db.classes.get(class_idx).ok_or_else(|| {
        OsbfError::InvalidArgument(format!(
            "class index {} out of range ({} classes)",
            class_idx,
            db.classes.len()
        ))
    })?;

    let mut class = Class::open(path, OpenMode::ReadWrite)?;
    let allow_groom = !flags.contains(LearnFlags::NO_MICROGROOM);

    let mut features = 0usize;
    let mut result = Ok(());
    for feature in FeatureStream::new(cfg, text, &db.delimiters) {
        features += 1;
        match class.probe(feature.h1, feature.h2) {
            Probe::Hit(i) => {
                // a locked slot was already reinforced by this document
                if !(sense > 0 && class.is_locked(i)) {
                    class.update_bucket(i, sense);
                }
            }
            Probe::Miss(i) => {
                if sense > 0 {
                    class.insert_bucket(cfg, i, feature.h1, feature.h2, sense as u32, allow_groom);
                }
                // an absent feature cannot be unlearned
            }
            Probe::Full => {
                result = Err(OsbfError::DatabaseFull(path.clone()));
                break;
            }
        }
    }

    if result.is_ok() {
        apply_counters(&mut class, sense, flags);
        debug!(
            "trained {:?}: sense {:+}, {} features",
            path, sense, features
        );
    }

    class.close()?;
    result
}

/// Document-level counter algebra; increments saturate at the bucket
/// ceiling, decrements at zero.
fn apply_counters(class: &mut Class, sense: i32, flags: LearnFlags) {
    let header = class.header_mut();
    if sense > 0 {
        if flags.contains(LearnFlags::EXTRA_LEARNING) {
            header.extra_learnings += 1;
        } else {
            if header.learnings < MAX_BUCKET_VALUE {
                header.learnings += 1;
            }
            if flags.contains(LearnFlags::MISTAKE) {
                header.mistakes += 1;
            }
        }
    } else if flags.contains(LearnFlags::EXTRA_LEARNING) {
        header.extra_learnings = header.extra_learnings.saturating_sub(1);
    } else {
        header.learnings = header.learnings.saturating_sub(1);
        if flags.contains(LearnFlags::MISTAKE) {
            header.mistakes = header.mistakes.saturating_sub(1);
        }
    }
}
