
use std::fmt;

/// Sentinel base prepended before the first reference k-mer of a region.
pub const START_SENTINEL: u8 = b'B';
/// Sentinel base appended after the last reference k-mer of a region.
pub const END_SENTINEL: u8 = b'E';

/// Identifies one occurrence of a k-mer: the base sequence plus a small
/// disambiguator separating repeated occurrences of the same sequence.
/// Equality and hashing require both to match.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KmerKey {
    /// The k bases, alphabet ACGT plus the region sentinels.
    bases: Vec<u8>,
    /// Disambiguator for repeated sequences; 0 for the first occurrence.
    number: u32
}

impl KmerKey {
    /// Creates a key from a sequence window with disambiguator 0.
    pub fn new(window: &[u8]) -> KmerKey {
        KmerKey {
            bases: window.to_vec(),
            number: 0
        }
    }

    /// Slides the k-mer right by one base: drops the first base and appends `base`.
    pub fn advance(&mut self, base: u8) {
        self.bases.rotate_left(1);
        let last = self.bases.len() - 1;
        self.bases[last] = base;
        self.number = 0;
    }

    /// Slides the k-mer left by one base: drops the last base and prepends `base`.
    pub fn back(&mut self, base: u8) {
        self.bases.rotate_right(1);
        self.bases[0] = base;
        self.number = 0;
    }

    pub fn size(&self) -> u32 {
        self.bases.len() as u32
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    /// The last base of the window, the one most recently advanced in.
    pub fn last_base(&self) -> u8 {
        self.bases[self.bases.len() - 1]
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Returns a copy of this key carrying a different disambiguator.
    pub fn with_number(&self, number: u32) -> KmerKey {
        KmerKey {
            bases: self.bases.clone(),
            number
        }
    }

    /// True if the base sequences match, ignoring the disambiguators.
    pub fn same_sequence(&self, other: &KmerKey) -> bool {
        self.bases == other.bases
    }
}

impl fmt::Debug for KmerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", String::from_utf8_lossy(&self.bases), self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_back() {
        let mut key = KmerKey::new(b"ACGT");
        key.advance(b'A');
        assert_eq!(key.bases(), b"CGTA");
        assert_eq!(key.last_base(), b'A');

        key.back(START_SENTINEL);
        assert_eq!(key.bases(), b"BCGT");
        assert_eq!(key.size(), 4);
    }

    #[test]
    fn test_disambiguator_equality() {
        let key = KmerKey::new(b"ACGT");
        let renumbered = key.with_number(1);
        assert!(key != renumbered);
        assert!(key.same_sequence(&renumbered));
        assert_eq!(renumbered.number(), 1);
    }
}
