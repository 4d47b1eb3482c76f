//! Offline statistics over a class file.
//!
//! The walk streams the file instead of mapping it, so it is safe to
//! point at a database another process is training into.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::class::{Bucket, BUCKET_SIZE, DB_VERSION, HEADER_BUCKETS};
use crate::error::{OsbfError, Result};

/// Snapshot of a class database's health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub version: u32,
    pub total_buckets: u32,
    pub bucket_size: u32,
    pub header_size: u32,
    pub learnings: u32,
    pub extra_learnings: u32,
    pub mistakes: u32,
    pub classifications: u64,
    /// Fields below are only filled by a full walk.
    pub used_buckets: u32,
    pub num_chains: u32,
    pub max_chain: u32,
    pub avg_chain: f64,
    pub max_displacement: u32,
    /// Nonzero slots whose home-to-slot path crosses an empty slot. Any
    /// nonzero count indicates a packing bug or on-disk corruption.
    pub unreachable: u32,
}

/// Reads header statistics, plus the full chain analysis when `full` is
/// set.
pub fn stats(cfc: &Path, full: bool) -> Result<Stats> {
    let file = File::open(cfc).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OsbfError::FileNotFound(cfc.to_owned()),
        _ => OsbfError::io(cfc, e),
    })?;
    let mut reader = BufReader::new(file);
    let io_err = |e| OsbfError::io(cfc, e);

    let version = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let db_flags = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let buckets_start = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let num_buckets = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let learnings = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let mistakes = reader.read_u32::<LittleEndian>().map_err(io_err)?;
    let classifications = reader.read_u64::<LittleEndian>().map_err(io_err)?;
    let extra_learnings = reader.read_u32::<LittleEndian>().map_err(io_err)?;

    if version != DB_VERSION || db_flags != 0 {
        return Err(OsbfError::format(cfc, "wrong version or flags"));
    }

    let mut stats = Stats {
        version,
        total_buckets: num_buckets,
        bucket_size: BUCKET_SIZE as u32,
        header_size: buckets_start * BUCKET_SIZE as u32,
        learnings,
        extra_learnings,
        mistakes,
        classifications,
        ..Stats::default()
    };
    if !full {
        return Ok(stats);
    }

    reader
        .seek(SeekFrom::Start(u64::from(buckets_start) * BUCKET_SIZE as u64))
        .map_err(io_err)?;
    let mut buckets = Vec::with_capacity(num_buckets as usize);
    for _ in 0..num_buckets {
        let hash = reader.read_u32::<LittleEndian>().map_err(io_err)?;
        let key = reader.read_u32::<LittleEndian>().map_err(io_err)?;
        let value = reader.read_u32::<LittleEndian>().map_err(io_err)?;
        buckets.push(Bucket { hash, key, value });
    }
    let mut probe = [0u8; 1];
    if reader.read(&mut probe).map_err(io_err)? != 0 {
        return Err(OsbfError::format(cfc, "trailing bytes after bucket array"));
    }

    analyze(&buckets, &mut stats);
    Ok(stats)
}

/// Chain and displacement analysis. Chains wrap around the table end,
/// so a run touching the last slot and one touching the first count as
/// a single chain.
fn analyze(buckets: &[Bucket], stats: &mut Stats) {
    let n = buckets.len();
    let num = n as u32;

    for (i, bucket) in buckets.iter().enumerate() {
        if bucket.value == 0 {
            continue;
        }
        stats.used_buckets += 1;

        let home = (bucket.hash % num) as usize;
        let displacement = if i >= home {
            (i - home) as u32
        } else {
            num + i as u32 - home as u32
        };
        if displacement > stats.max_displacement {
            stats.max_displacement = displacement;
        }

        // walk home -> slot; hitting an empty slot on the way means the
        // chain was broken underneath this bucket
        let mut rp = home;
        while rp != i {
            if buckets[rp].value == 0 {
                stats.unreachable += 1;
                break;
            }
            rp = (rp + 1) % n;
        }
    }

    let mut chain_sum = 0u64;
    match buckets.iter().position(|b| b.value == 0) {
        None => {
            // a table with no empty slot is one chain spanning the ring
            if n > 0 {
                stats.num_chains = 1;
                stats.max_chain = num;
                chain_sum = u64::from(num);
            }
        }
        Some(zero) => {
            let mut run = 0u32;
            for step in 1..=n {
                let idx = (zero + step) % n;
                if buckets[idx].value != 0 {
                    run += 1;
                } else if run > 0 {
                    stats.num_chains += 1;
                    if run > stats.max_chain {
                        stats.max_chain = run;
                    }
                    chain_sum += u64::from(run);
                    run = 0;
                }
            }
        }
    }
    if stats.num_chains > 0 {
        stats.avg_chain = chain_sum as f64 / f64::from(stats.num_chains);
    }
}
