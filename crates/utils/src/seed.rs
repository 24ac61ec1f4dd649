//! Deterministic seed plumbing.
//!
//! A run is reproducible from a single [`Seed`]: every function obfuscated in
//! the run draws from an RNG keyed by [`Seed::derive`], so the same seed and
//! input always produce byte-identical output no matter how the work is
//! scheduled across threads.

use std::fmt;
use std::str::FromStr;

use crate::errors::SeedError;

/// Root seed for one obfuscation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed(u64);

impl Seed {
    pub fn new(value: u64) -> Self {
        Seed(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Derives an independent sub-seed for the item at `index`.
    ///
    /// Uses a splitmix64 finalizer over the root seed offset by the index, so
    /// sibling functions never share an RNG stream and the streams do not
    /// depend on the order the functions are processed in.
    pub fn derive(&self, index: usize) -> u64 {
        let mut z = self
            .0
            .wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Seed {
    type Err = SeedError;

    /// Accepts a decimal u64 or a `0x`-prefixed hex u64.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else {
            s.parse::<u64>()
        };
        parsed
            .map(Seed)
            .map_err(|_| SeedError::InvalidSeed(s.to_string()))
    }
}
