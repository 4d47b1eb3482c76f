//! Adaptive Bayesian text classification over orthogonal sparse bigrams.
//!
//! Each class is a memory-mapped, fixed-size open-addressed hash table
//! of feature counts. Training applies a per-feature delta to the target
//! class; classification runs sequential Bayesian updating over the same
//! feature stream, damped per feature by a confidence factor.

// the mapped fast path reads on-disk little-endian words in place
#[cfg(target_endian = "big")]
compile_error!("class databases are little-endian; big-endian targets are not supported");

/// Class databases and the on-disk hash table
mod class;
/// Classification
mod classify;
/// Engine tunables
mod config;
/// CSV dump/restore
mod csv;
/// Database management
mod db;
/// Error types
mod error;
/// Feature extraction
mod features;
/// Training
mod learn;
/// Offline statistics
mod stats;

pub use crate::class::DEFAULT_NUM_BUCKETS;
pub use crate::classify::{classify, Classification, ClassifyFlags};
pub use crate::config::{Config, DbConfig};
pub use crate::csv::{dump, restore};
pub use crate::db::{create_db, import, remove_db};
pub use crate::error::{OsbfError, Result};
pub use crate::features::token_hash;
pub use crate::learn::{learn, unlearn, LearnFlags};
pub use crate::stats::{stats, Stats};
