//! Classification: sequential Bayesian updating over the feature stream,
//! with per-feature confidence-factor damping.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::mem;
use std::path::Path;

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};

use crate::class::{lock, Class, Header, OpenMode, Probe};
use crate::config::{Config, DbConfig};
use crate::error::{OsbfError, Result};
use crate::features::{FeatureStream, WINDOW_LEN};

bitflags! {
    /// Classification options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassifyFlags: u32 {
        /// Disable the confidence-factor damping (CF pinned just
        /// below 1).
        const NO_EDDC = 1;
        /// Bump the winning class's classification counter on disk.
        const COUNT_CLASSIFICATIONS = 2;
    }
}

/// Result of a classification.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Posterior probability per class, summing to 1.
    pub probabilities: Vec<f64>,
    /// Signed log10 ratio between the two configured class subsets;
    /// positive means the first subset won.
    pub pr: f64,
    /// Index of the most probable class.
    pub best: usize,
    /// Learnings count per class at classification time.
    pub trainings: Vec<u32>,
}

/// Posterior floor, also the seed of the pR subset sums.
const P_MIN: f64 = 10.0 * f64::MIN_POSITIVE;

/// Empirical per-window weights, `(5 - d) ^ (5 - d)` for gap `d`.
const FEATURE_WEIGHT: [f64; WINDOW_LEN + 1] = [0.0, 3125.0, 256.0, 27.0, 4.0, 1.0];

/// Scores `text` against every class in `db` and reports posteriors,
/// the pR partition ratio and the per-class training counts.
pub fn classify(
    cfg: &Config,
    text: &[u8],
    db: &DbConfig,
    flags: ClassifyFlags,
    min_pmax_pmin_ratio: f64,
) -> Result<Classification> {
    if db.classes.is_empty() {
        return Err(OsbfError::InvalidArgument(
            "at least one class must be given".into(),
        ));
    }
    if text.is_empty() {
        return Err(OsbfError::InvalidArgument(
            "attempt to classify an empty text".into(),
        ));
    }

    let mut classes = Vec::with_capacity(db.classes.len());
    let mut trainings = Vec::with_capacity(db.classes.len());
    let mut total_learnings: u64 = 0;
    for path in &db.classes {
        let mut class = Class::open(path, OpenMode::ReadOnly)?;
        let raw = class.header().learnings;
        trainings.push(raw);
        // avoid division by zero for untrained classes
        class.learnings = raw.max(1);
        total_learnings += u64::from(class.learnings);
        classes.push(class);
    }

    let feature_weight = scaled_weights(total_learnings);

    // priors proportional to class size
    let mut p: Vec<f64> = classes
        .iter()
        .map(|c| f64::from(c.learnings) / total_learnings as f64)
        .collect();

    let mut total_features = 0u32;
    for feature in FeatureStream::new(cfg, text, &db.delimiters) {
        total_features += 1;

        let mut min_local_p = 1.0f64;
        let mut max_local_p = 0.0f64;
        let mut i_min = 0usize;
        let mut i_max = 0usize;
        let mut already_seen = false;

        for (idx, class) in classes.iter_mut().enumerate() {
            class.hits = 0.0;
            match class.probe(feature.h1, feature.h2) {
                Probe::Hit(slot) => {
                    if class.is_seen(slot) {
                        already_seen = true;
                    } else {
                        class.uniquefeatures += 1;
                        let hits = f64::from(class.value(slot));
                        class.hits = hits;
                        class.totalhits = class.totalhits.saturating_add(class.value(slot));
                        let p_feat = hits / f64::from(class.learnings);
                        if p_feat <= min_local_p {
                            i_min = idx;
                            min_local_p = p_feat;
                        }
                        if p_feat >= max_local_p {
                            i_max = idx;
                            max_local_p = p_feat;
                        }
                        // Only found features are marked: a miss lands on
                        // the empty slot shared by every absent feature of
                        // the chain, and marking it would suppress
                        // unrelated features.
                        class.mark_seen(slot);
                    }
                }
                Probe::Miss(_) | Probe::Full => {
                    i_min = idx;
                    min_local_p = 0.0;
                    class.missedfeatures += 1;
                }
            }
        }

        // ignore repeats and features with no discriminating power
        if already_seen || (max_local_p - min_local_p) < 1e-6 {
            continue;
        }
        if min_local_p > 0.0 && max_local_p / min_local_p < min_pmax_pmin_ratio {
            continue;
        }

        let confidence_factor = if flags.contains(ClassifyFlags::NO_EDDC) {
            1.0 - f64::MIN_POSITIVE
        } else {
            confidence(cfg, &classes, i_min, i_max, feature_weight[feature.window])
        };

        let mut renorm = 0.0;
        for (idx, class) in classes.iter().enumerate() {
            p[idx] *= 0.5 + confidence_factor * (class.hits / f64::from(class.learnings) - 0.5);
            if p[idx] < P_MIN {
                p[idx] = P_MIN;
            }
            renorm += p[idx];
        }
        for value in p.iter_mut() {
            *value /= renorm;
        }
    }

    let mut best = 0;
    for (idx, value) in p.iter().enumerate() {
        if *value > p[best] {
            best = idx;
        }
    }

    let ncfs = db.ncfs.min(classes.len());
    let mut p_first = P_MIN;
    let mut p_second = P_MIN;
    for (idx, value) in p.iter().enumerate() {
        if idx < ncfs {
            p_first += value;
        } else {
            p_second += value;
        }
    }
    let pr = cfg.pr_scf * (p_first / p_second).log10();

    debug!(
        "classified {} features over {} classes: best {}, pR {:.3}",
        total_features,
        classes.len(),
        best,
        pr
    );

    for class in classes {
        class.close()?;
    }

    if flags.contains(ClassifyFlags::COUNT_CLASSIFICATIONS) {
        bump_classifications(&db.classes[best])?;
    }

    Ok(Classification {
        probabilities: p,
        pr,
        best,
        trainings,
    })
}

/// Window weights for the given corpus size. Small corpora flatten the
/// weights so no single window position dominates early training.
fn scaled_weights(total_learnings: u64) -> [f64; WINDOW_LEN + 1] {
    let mut weights = FEATURE_WEIGHT;
    let exponent = (total_learnings as f64 * 3.0).powf(0.2);
    if exponent < 5.0 {
        for (w, weight) in weights.iter_mut().enumerate().take(WINDOW_LEN).skip(1) {
            let e = exponent * (5 - w + 1) as f64 / 5.0;
            *weight = e.powf(e);
        }
    }
    weights
}

/// Confidence factor for the current feature, in `[0, 1)`.
///
/// Damps features whose hit counts are low or whose best and worst
/// classes barely disagree, instead of letting a zero count imply false
/// certainty.
fn confidence(cfg: &Config, classes: &[Class], i_min: usize, i_max: usize, weight: f64) -> f64 {
    let cmin = &classes[i_min];
    let cmax = &classes[i_max];

    // normalize hit counts to the larger of the two classes
    let mut hits_min = cmin.hits;
    let mut hits_max = cmax.hits;
    if cmin.learnings < cmax.learnings {
        hits_min *= f64::from(cmax.learnings) / f64::from(cmin.learnings);
    } else {
        hits_max *= f64::from(cmin.learnings) / f64::from(cmax.learnings);
    }

    let sum = hits_max + hits_min;
    let diff = (hits_max - hits_min).abs();
    let raw_sum = cmax.hits + cmin.hits;

    let cfx = (0.8
        + (f64::from(cmax.header().learnings) + f64::from(cmin.header().learnings)) / 20.0)
        .min(1.0);

    cfx * ((diff * diff - cfg.k1 / raw_sum) / (sum * sum)).powi(2)
        / (1.0 + cfg.k3 / (raw_sum * weight))
}

/// Increments the on-disk classification counter of the winning class,
/// under an advisory lock over the header range. Lock contention is not
/// fatal to the classification itself.
fn bump_classifications(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| OsbfError::io(path, e))?;
    let header_len = mem::size_of::<Header>() as u64;
    if let Err(err) = lock::acquire(&file, 0, header_len) {
        warn!("skipping classification count on {:?}: {}", path, err);
        return Ok(());
    }
    let result = (|| {
        // classifications lives right after the six leading u32 fields
        file.seek(SeekFrom::Start(24))?;
        let count = file.read_u64::<LittleEndian>()?;
        file.seek(SeekFrom::Start(24))?;
        file.write_u64::<LittleEndian>(count + 1)
    })();
    let unlocked = lock::release(&file, 0, header_len);
    result.map_err(|e| OsbfError::io(path, e))?;
    unlocked.map_err(|e| OsbfError::io(path, e))?;
    Ok(())
}
