//! Structural fingerprints for context cache keys.
//!
//! A node is described as text (registration, version, ordered options and,
//! when the core asks for it, the description of its upstream nodes). The
//! text is hashed with seeded XXH3-128. Collisions are treated as equal keys.

use std::fmt;
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x6a09e667f3bcc909;

/// 128-bit structural digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl Fingerprint {
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

pub struct StructuralHasher {
    inner: Xxh3,
}

impl StructuralHasher {
    pub fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Length-prefixed so that `("ab", "c")` and `("a", "bc")` differ.
    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    pub fn finish(self) -> Fingerprint {
        let v = self.inner.digest128();
        Fingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

impl Default for StructuralHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a textual node description.
pub fn fingerprint_text(text: &str) -> Fingerprint {
    let mut h = StructuralHasher::new();
    h.write_str(text);
    h.finish()
}
