//! Open-addressed table operations over a mapped class.
//!
//! Probing is strictly linear with wrap-around: chain order is what the
//! packing and grooming passes rely on, so slots only ever move toward
//! their home, never past another live slot.

use log::debug;

use super::{Bucket, Class, MAX_BUCKET_VALUE};
use crate::config::Config;

/// Outcome of probing for a feature.
pub(crate) enum Probe {
    /// The feature's slot.
    Hit(u32),
    /// First empty slot of the chain, where the feature could be placed.
    Miss(u32),
    /// No match and no empty slot anywhere.
    Full,
}

impl Class {
    #[inline]
    pub(crate) fn home_slot(&self, hash: u32) -> u32 {
        hash % self.num_buckets()
    }

    #[inline]
    pub(crate) fn next_slot(&self, i: u32) -> u32 {
        if i + 1 >= self.num_buckets() {
            0
        } else {
            i + 1
        }
    }

    #[inline]
    pub(crate) fn prev_slot(&self, i: u32) -> u32 {
        if i == 0 {
            self.num_buckets() - 1
        } else {
            i - 1
        }
    }

    /// Ring distance from `home` forward to `i`.
    #[inline]
    pub(crate) fn displacement(&self, home: u32, i: u32) -> u32 {
        if i >= home {
            i - home
        } else {
            self.num_buckets() + i - home
        }
    }

    #[inline]
    pub(crate) fn in_chain(&self, i: u32) -> bool {
        self.value(i) != 0
    }

    /// Scans forward from the feature's home slot.
    pub(crate) fn probe(&self, hash: u32, key: u32) -> Probe {
        let start = self.home_slot(hash);
        let mut i = start;
        loop {
            let b = self.bucket(i);
            if b.value == 0 {
                return Probe::Miss(i);
            }
            if b.hash == hash && b.key == key {
                return Probe::Hit(i);
            }
            i = self.next_slot(i);
            if i == start {
                return Probe::Full;
            }
        }
    }

    /// Last slot of the chain containing `i`, or `None` when the ring has
    /// no empty slot at all.
    fn last_in_chain(&self, i: u32) -> Option<u32> {
        debug_assert!(self.in_chain(i));
        let start = i;
        let mut i = i;
        while self.in_chain(i) {
            i = self.next_slot(i);
            if i == start {
                return None;
            }
        }
        Some(self.prev_slot(i))
    }

    /// Applies a count delta to a live slot.
    ///
    /// Any write that leaves the slot nonzero also locks it: the slot was
    /// observed in training, as opposed to merely sitting in a collided
    /// chain. A decrement that would reach zero vacates the slot and
    /// repacks the tail of its chain instead.
    pub(crate) fn update_bucket(&mut self, i: u32, delta: i32) {
        let value = self.value(i);
        if delta > 0 && value.saturating_add(delta as u32) >= MAX_BUCKET_VALUE {
            self.set_value_locked(i, MAX_BUCKET_VALUE);
        } else if delta < 0 && value <= delta.unsigned_abs() {
            if value != 0 {
                self.mark_free(i);
                let packlen = match self.last_in_chain(i) {
                    Some(last) => self.displacement(i, last) + 1,
                    None => self.num_buckets(),
                };
                self.pack_chain(i, packlen);
            }
        } else {
            let updated = (i64::from(value) + i64::from(delta)) as u32;
            self.set_value_locked(i, updated);
        }
    }

    /// Writes a new feature into the empty slot `i` obtained from
    /// [`Class::probe`].
    ///
    /// When the slot sits further from the feature's home than the
    /// configured chain limit, the chain in front of it is groomed (and
    /// the insertion point re-probed) until the distance is acceptable.
    pub(crate) fn insert_bucket(
        &mut self,
        cfg: &Config,
        mut i: u32,
        hash: u32,
        key: u32,
        value: u32,
        allow_groom: bool,
    ) -> u32 {
        let home = self.home_slot(hash);
        let limit = cfg.chain_limit(self.num_buckets());
        if allow_groom && value > 0 {
            while self.displacement(home, i) > limit {
                let before = self.prev_slot(i);
                self.microgroom(cfg, before);
                i = match self.probe(hash, key) {
                    Probe::Miss(slot) | Probe::Hit(slot) => slot,
                    Probe::Full => break,
                };
            }
        }
        self.set_bucket(i, Bucket { hash, key, value });
        self.lock_slot(i);
        i
    }

    /// Compacts the ring segment `[packstart, packstart + packlen)`.
    ///
    /// Pass 1 migrates each live slot into the earliest freed slot on the
    /// path from its home, which keeps every survivor reachable by
    /// forward probing. Pass 2 zeroes whatever is still marked free.
    pub(crate) fn pack_chain(&mut self, packstart: u32, packlen: u32) {
        let num = self.num_buckets();
        let mut packend = packstart + packlen;
        if packend >= num {
            packend -= num;
        }

        let mut free_start = packstart;
        while free_start != packend && !self.is_free(free_start) {
            free_start = self.next_slot(free_start);
        }

        if free_start != packend {
            let mut ifrom = self.next_slot(free_start);
            while ifrom != packend {
                if !self.is_free(ifrom) {
                    let b = self.bucket(ifrom);
                    let mut ito = self.home_slot(b.hash);
                    while ito != ifrom && !self.is_free(ito) {
                        ito = self.next_slot(ito);
                    }
                    if self.is_free(ito) {
                        self.set_bucket(ito, b);
                        self.copy_flags(ifrom, ito);
                        self.mark_free(ifrom);
                    }
                }
                ifrom = self.next_slot(ifrom);
            }
        }

        let mut i = packstart;
        while i != packend {
            if self.is_free(i) {
                self.set_value(i, 0);
                self.clear_free(i);
            }
            i = self.next_slot(i);
        }
    }

    /// Prunes the chain containing `bindex` and repacks it.
    ///
    /// Minimum-count slots go first, preferring those sitting at (or
    /// near) their home, which tend to be the oldest entries. Locked
    /// slots are spared unless nothing else qualifies or the policy
    /// forces them in. Returns the number of slots zeroed.
    pub(crate) fn microgroom(&mut self, cfg: &Config, bindex: u32) -> u32 {
        let start = bindex % self.num_buckets();
        if !self.in_chain(start) {
            return 0;
        }

        // walk back to the chain start, collecting the eviction minima
        let mut min_unlocked = MAX_BUCKET_VALUE;
        let mut min_any = self.value(start);
        let mut i = start;
        while self.in_chain(i) {
            let v = self.value(i);
            if v < min_any {
                min_any = v;
            }
            if v < min_unlocked && !self.is_locked(i) {
                min_unlocked = v;
            }
            i = self.prev_slot(i);
            if i == start {
                break; // 100% full ring
            }
        }
        let packstart = self.next_slot(i);

        let mut end = packstart;
        while self.in_chain(end) {
            end = self.next_slot(end);
            if end == packstart {
                break;
            }
        }
        let packlen = if end > packstart {
            end - packstart
        } else {
            self.num_buckets() + end - packstart
        };

        // no unlocked candidate leaves only the locked ones
        let (min_value, groom_locked) = if cfg.groom_locked || min_unlocked == MAX_BUCKET_VALUE {
            (min_any, true)
        } else {
            (min_unlocked, false)
        };

        let stop_after = cfg.stop_after;
        let mut countdown = stop_after;
        let mut max_distance = 1u32;
        while countdown == stop_after {
            let mut i = packstart;
            while self.in_chain(i) && countdown > 0 {
                if self.value(i) == min_value && (groom_locked || !self.is_locked(i)) {
                    let home = self.home_slot(self.bucket(i).hash);
                    if self.displacement(home, i) < max_distance {
                        self.mark_free(i);
                        countdown -= 1;
                    }
                }
                i = self.next_slot(i);
            }
            // nothing within reach: allow candidates further from home
            if countdown == stop_after {
                max_distance += 1;
            }
        }

        self.pack_chain(packstart, packlen);
        let zeroed = stop_after - countdown;
        debug!(
            "microgroom {:?}: zeroed {} in chain of {}",
            self.path(),
            zeroed,
            packlen
        );
        zeroed
    }
}
