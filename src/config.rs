use std::path::PathBuf;

/// Engine tunables, read once at operation start.
///
/// Operations take the configuration by reference instead of consulting
/// process globals, so two calls with different settings never interfere.
#[derive(Debug, Clone)]
pub struct Config {
    /// Longest chain segment an insert may create before microgrooming
    /// kicks in. `0` derives the limit from the table size.
    pub max_chain: u32,
    /// Upper bound on buckets zeroed by a single microgroom call.
    pub stop_after: u32,
    /// Confidence-factor constant.
    pub k1: f64,
    /// Confidence-factor constant, reserved for the variable-exponent
    /// formula variants.
    pub k2: f64,
    /// Confidence-factor constant.
    pub k3: f64,
    /// Cut tokens at `max_token_size` bytes while scanning.
    pub limit_token_size: bool,
    /// Token length at which long-token accumulation starts.
    pub max_token_size: u32,
    /// How many oversized tokens may fold into one accumulated hash.
    pub max_long_tokens: u32,
    /// pR scale calibration factor.
    pub pr_scf: f64,
    /// Let microgroom evict locked buckets even when unlocked candidates
    /// exist.
    pub groom_locked: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chain: 0,
            stop_after: 128,
            k1: 0.25,
            k2: 12.0,
            k3: 8.0,
            limit_token_size: false,
            max_token_size: 60,
            max_long_tokens: 1000,
            pr_scf: 0.59,
            groom_locked: false,
        }
    }
}

impl Config {
    /// Applies an option bag of `(key, numeric value)` pairs.
    ///
    /// Unknown keys are ignored. Returns how many options were recognized
    /// and set.
    pub fn apply<'a, I>(&mut self, options: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut options_set = 0;
        for (key, value) in options {
            match key {
                "max_chain" => self.max_chain = value as u32,
                "stop_after" => self.stop_after = value as u32,
                "K1" => self.k1 = value,
                "K2" => self.k2 = value,
                "K3" => self.k3 = value,
                "limit_token_size" => self.limit_token_size = value != 0.0,
                "max_token_size" => self.max_token_size = value as u32,
                "max_long_tokens" => self.max_long_tokens = value as u32,
                "pR_SCF" => self.pr_scf = value,
                _ => continue,
            }
            options_set += 1;
        }
        options_set
    }

    /// Chain length limit for a table with `num_buckets` slots.
    ///
    /// The derived value comes from experimental data; it is never below
    /// 29 slots.
    pub(crate) fn chain_limit(&self, num_buckets: u32) -> u32 {
        if self.max_chain != 0 {
            self.max_chain
        } else {
            let derived = (14.85 + 1.5e-4 * f64::from(num_buckets)) as u32;
            derived.max(29)
        }
    }
}

/// The set of class databases an operation works on.
#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    /// One file per class, in partition order.
    pub classes: Vec<PathBuf>,
    /// Number of leading classes in the first pR subset.
    pub ncfs: usize,
    /// Extra token delimiters on top of the non-graphic defaults.
    pub delimiters: Vec<u8>,
}
