//! Feature extraction: byte tokenizer, token hashing and the OSB
//! sliding-window stream of composite feature hashes.

use crate::config::Config;

/// Sliding window length, in token hashes.
pub(crate) const WINDOW_LEN: usize = 5;

/// Seed value the window is primed with, also fed as the end-of-stream
/// padding token.
const PIPE_SEED: u32 = 0xDEAD_BEEF;

/// Coefficients for the two composite hashes. Relatively prime,
/// superincreasing, and the tables share no common prime.
const HCTABLE1: [u32; 10] = [1, 3, 5, 11, 23, 47, 97, 197, 397, 797];
const HCTABLE2: [u32; 10] = [7, 13, 29, 51, 101, 203, 407, 817, 1637, 3277];

cfg_if::cfg_if! {
    if #[cfg(feature = "crm114-compat")] {
        #[inline]
        fn hc2_index(window: usize) -> usize {
            window - 1
        }
    } else {
        #[inline]
        fn hc2_index(window: usize) -> usize {
            window
        }
    }
}

/// Mixes a byte string into a 32-bit hash.
///
/// The function is part of the on-disk contract: every bit of it is
/// load-bearing for class file compatibility, so the steps below must not
/// be reordered or simplified.
pub fn token_hash(s: &[u8]) -> u32 {
    let mut h = s.len() as u32;
    for &b in s {
        // broadcast the byte so every bit of input lands in the state
        let t = u32::from(b);
        let t = t | (t << 8) | (t << 16) | (t << 24);
        h ^= t;
        // fold some middle bits down into the low order ones
        h = h.wrapping_add((h >> 12) & 0x0000_ffff);
        // swap the extreme bytes
        let swapped = (h << 24) | ((h >> 24) & 0xff);
        h = (h & 0x00ff_ff00) | swapped;
        // 3-bit left rotation
        h = (h << 3) | (h >> 29);
    }
    h
}

/// Byte-class table: a byte starts/continues a token iff it is ASCII
/// graphic and not listed as an extra delimiter.
struct DelimSet {
    table: [bool; 256],
}

impl DelimSet {
    fn new(extra: &[u8]) -> Self {
        let mut table = [false; 256];
        for (b, is_delim) in table.iter_mut().enumerate() {
            *is_delim = !(b as u8).is_ascii_graphic();
        }
        for &b in extra {
            table[b as usize] = true;
        }
        Self { table }
    }

    #[inline]
    fn is_delim(&self, b: u8) -> bool {
        self.table[b as usize]
    }
}

/// Forward scanner producing raw token slices.
struct Tokens<'a> {
    text: &'a [u8],
    pos: usize,
    delims: DelimSet,
    /// Token byte cap, active when `limit_token_size` is configured.
    limit: Option<usize>,
}

impl<'a> Tokens<'a> {
    fn new(cfg: &Config, text: &'a [u8], extra_delims: &[u8]) -> Self {
        Self {
            text,
            pos: 0,
            delims: DelimSet::new(extra_delims),
            limit: if cfg.limit_token_size {
                Some(cfg.max_token_size as usize)
            } else {
                None
            },
        }
    }

    fn next_token(&mut self) -> Option<&'a [u8]> {
        while self.pos < self.text.len() && self.delims.is_delim(self.text[self.pos]) {
            self.pos += 1;
        }
        let start = self.pos;
        let cap = match self.limit {
            Some(max) => usize::min(self.text.len(), start.saturating_add(max)),
            None => self.text.len(),
        };
        while self.pos < cap && !self.delims.is_delim(self.text[self.pos]) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(&self.text[start..self.pos])
        }
    }
}

/// Token hash stream with long-token accumulation.
///
/// A token whose length reaches `max_token_size` (base64 blobs, long
/// URLs) does not stand on its own: its hash is XOR-folded with the
/// following oversized tokens, up to `max_long_tokens` of them, and the
/// first short token closes the group. This keeps one encoded line from
/// swamping the window.
struct TokenHashes<'a> {
    tokens: Tokens<'a>,
    max_token_size: usize,
    max_long_tokens: u32,
}

impl<'a> TokenHashes<'a> {
    fn new(cfg: &Config, text: &'a [u8], extra_delims: &[u8]) -> Self {
        Self {
            tokens: Tokens::new(cfg, text, extra_delims),
            max_token_size: cfg.max_token_size as usize,
            max_long_tokens: cfg.max_long_tokens,
        }
    }

    fn next_hash(&mut self) -> Option<u32> {
        let mut acc = 0u32;
        let mut long_tokens = 0u32;
        let mut token = self.tokens.next_token();
        while let Some(t) = token {
            if t.len() >= self.max_token_size && long_tokens < self.max_long_tokens {
                long_tokens += 1;
                acc ^= token_hash(t);
                token = self.tokens.next_token();
            } else {
                break;
            }
        }
        match token {
            Some(t) => Some(acc ^ token_hash(t)),
            None if long_tokens > 0 => Some(acc),
            None => None,
        }
    }
}

/// One composite feature: the pair of 32-bit hashes identifying a sparse
/// bigram, plus the window distance it was drawn from (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Feature {
    pub h1: u32,
    pub h2: u32,
    pub window: usize,
}

/// The OSB feature stream over a text.
///
/// Each token advance shifts the 5-slot hash pipe and emits 4 composite
/// features, pairing the newest hash with each of the previous 4 window
/// positions. After the input runs dry the pipe is flushed with
/// `WINDOW_LEN - 1` seed tokens so the last real token passes through
/// every position. A text with no token at all emits nothing.
pub(crate) struct FeatureStream<'a> {
    hashes: TokenHashes<'a>,
    pipe: [u32; WINDOW_LEN],
    window: usize,
    paddings_left: usize,
    seen_token: bool,
    done: bool,
}

impl<'a> FeatureStream<'a> {
    pub(crate) fn new(cfg: &Config, text: &'a [u8], extra_delims: &[u8]) -> Self {
        Self {
            hashes: TokenHashes::new(cfg, text, extra_delims),
            pipe: [PIPE_SEED; WINDOW_LEN],
            window: WINDOW_LEN,
            paddings_left: WINDOW_LEN - 1,
            seen_token: false,
            done: false,
        }
    }

    fn advance(&mut self) -> bool {
        let next = match self.hashes.next_hash() {
            Some(h) => {
                self.seen_token = true;
                h
            }
            None if self.seen_token && self.paddings_left > 0 => {
                self.paddings_left -= 1;
                PIPE_SEED
            }
            None => return false,
        };
        for i in (1..WINDOW_LEN).rev() {
            self.pipe[i] = self.pipe[i - 1];
        }
        self.pipe[0] = next;
        self.window = 1;
        true
    }
}

impl<'a> Iterator for FeatureStream<'a> {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        if self.done {
            return None;
        }
        if self.window >= WINDOW_LEN {
            if !self.advance() {
                self.done = true;
                return None;
            }
        }
        let w = self.window;
        self.window += 1;
        let h1 = self.pipe[0]
            .wrapping_mul(HCTABLE1[0])
            .wrapping_add(self.pipe[w].wrapping_mul(HCTABLE1[w]));
        let h2 = self.pipe[0]
            .wrapping_mul(HCTABLE2[0])
            .wrapping_add(self.pipe[w].wrapping_mul(HCTABLE2[hc2_index(w)]));
        Some(Feature { h1, h2, window: w })
    }
}
