//! Database management: creating, removing and merging class files.

use std::fs;
use std::io;
use std::path::Path;

use crate::class::{Class, OpenMode, Probe};
use crate::config::Config;
use crate::error::{OsbfError, Result};

/// Creates one zero-initialized class file per path, each with
/// `num_buckets` slots. Stops at the first failure.
pub fn create_db<P: AsRef<Path>>(paths: &[P], num_buckets: u32) -> Result<usize> {
    for path in paths {
        Class::create(path.as_ref(), num_buckets)?;
    }
    Ok(paths.len())
}

/// Removes the given class files. Stops at the first failure and reports
/// how many were removed up to that point on success.
pub fn remove_db<P: AsRef<Path>>(paths: &[P]) -> Result<usize> {
    let mut removed = 0;
    for path in paths {
        let path = path.as_ref();
        fs::remove_file(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OsbfError::FileNotFound(path.to_owned()),
            _ => OsbfError::io(path, e),
        })?;
        removed += 1;
    }
    Ok(removed)
}

/// Merges class `src` into class `dst`.
///
/// Counters are summed and every nonzero source bucket is folded into
/// the destination through the regular find/update/insert algebra, so
/// the destination's chain invariants hold afterwards.
pub fn import(cfg: &Config, dst: &Path, src: &Path) -> Result<()> {
    let mut to = Class::open(dst, OpenMode::ReadWrite)?;
    let from = Class::open(src, OpenMode::ReadOnly)?;

    {
        let learnings = from.header().learnings;
        let extra = from.header().extra_learnings;
        let classifications = from.header().classifications;
        let mistakes = from.header().mistakes;
        let header = to.header_mut();
        header.learnings = header.learnings.saturating_add(learnings);
        header.extra_learnings = header.extra_learnings.saturating_add(extra);
        header.classifications = header.classifications.saturating_add(classifications);
        header.mistakes = header.mistakes.saturating_add(mistakes);
    }

    for i in 0..from.num_buckets() {
        let bucket = from.bucket(i);
        if bucket.value == 0 {
            continue;
        }
        match to.probe(bucket.hash, bucket.key) {
            Probe::Hit(slot) => to.update_bucket(slot, bucket.value as i32),
            Probe::Miss(slot) => {
                to.insert_bucket(cfg, slot, bucket.hash, bucket.key, bucket.value, true);
            }
            Probe::Full => return Err(OsbfError::DatabaseFull(dst.to_owned())),
        }
    }

    from.close()?;
    to.close()?;
    Ok(())
}
