//! UTF-16 filename handling
//!
//! PAR archives store filenames as UTF-16LE code units with no
//! terminator. [`UniName`] keeps the units as parsed so that legacy
//! archives round-trip bit-exactly; surrogate pairs are carried through
//! opaquely. Case folding is ASCII-range, matching what the original
//! archives can actually contain.

use std::path::{Path, PathBuf};

/// Outcome of comparing two filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Equal,
    /// Equal only after case folding. Callers prefer an [`NameMatch::Equal`]
    /// candidate but may accept this one when ignore-case is enabled.
    CaseOnly,
    Different,
}

/// A filename as a sequence of UTF-16 code units.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct UniName {
    units: Vec<u16>,
}

#[inline]
fn fold(u: u16) -> u16 {
    if u < 0x80 {
        (u as u8).to_ascii_lowercase() as u16
    } else {
        u
    }
}

impl UniName {
    pub fn new(units: Vec<u16>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Parse from on-disk UTF-16LE bytes (no terminator). A trailing odd
    /// byte is ignored.
    pub fn from_utf16le(bytes: &[u8]) -> Self {
        let units = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Self { units }
    }

    /// Encode to on-disk UTF-16LE bytes (no terminator).
    pub fn to_utf16le(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.units.len() * 2);
        for u in &self.units {
            out.extend_from_slice(&u.to_le_bytes());
        }
        out
    }

    /// Compare two names.
    ///
    /// Returns [`NameMatch::CaseOnly`] when the names differ only in
    /// ASCII case; the caller decides whether that counts as a match.
    pub fn compare(&self, other: &UniName) -> NameMatch {
        if self.units == other.units {
            return NameMatch::Equal;
        }
        if self.units.len() == other.units.len()
            && self
                .units
                .iter()
                .zip(&other.units)
                .all(|(a, b)| fold(*a) == fold(*b))
        {
            return NameMatch::CaseOnly;
        }
        NameMatch::Different
    }

    /// Caseless ordering used for list insertion.
    pub fn caseless_cmp(&self, other: &UniName) -> std::cmp::Ordering {
        let a = self.units.iter().map(|u| fold(*u));
        let b = other.units.iter().map(|u| fold(*u));
        a.cmp(b)
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.to_string())
    }

    /// The final path component, for display and directory-entry
    /// comparison.
    pub fn file_name(&self) -> UniName {
        let sep = self
            .units
            .iter()
            .rposition(|&u| u == '/' as u16 || u == '\\' as u16);
        match sep {
            Some(i) => UniName::new(self.units[i + 1..].to_vec()),
            None => self.clone(),
        }
    }
}

impl From<&str> for UniName {
    fn from(s: &str) -> Self {
        Self {
            units: s.encode_utf16().collect(),
        }
    }
}

impl From<&Path> for UniName {
    fn from(p: &Path) -> Self {
        UniName::from(&*p.to_string_lossy())
    }
}

impl std::fmt::Display for UniName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf16_lossy(&self.units))
    }
}

impl std::fmt::Debug for UniName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UniName({:?})", self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_utf16le() {
        let name = UniName::from("data.bin");
        let bytes = name.to_utf16le();
        assert_eq!(bytes.len(), 16);
        assert_eq!(UniName::from_utf16le(&bytes), name);
    }

    #[test]
    fn compare_exact() {
        assert_eq!(
            UniName::from("a.txt").compare(&UniName::from("a.txt")),
            NameMatch::Equal
        );
    }

    #[test]
    fn compare_case_only() {
        assert_eq!(
            UniName::from("A.TXT").compare(&UniName::from("a.txt")),
            NameMatch::CaseOnly
        );
    }

    #[test]
    fn compare_different() {
        assert_eq!(
            UniName::from("a.txt").compare(&UniName::from("b.txt")),
            NameMatch::Different
        );
    }

    #[test]
    fn caseless_ordering_ignores_case() {
        let a = UniName::from("Alpha");
        let b = UniName::from("beta");
        assert_eq!(a.caseless_cmp(&b), std::cmp::Ordering::Less);
        let c = UniName::from("ALPHA");
        assert_eq!(a.caseless_cmp(&c), std::cmp::Ordering::Equal);
    }

    #[test]
    fn non_ascii_units_fold_as_themselves() {
        let a = UniName::new(vec![0x00C4]); // Ä
        let b = UniName::new(vec![0x00E4]); // ä
        assert_eq!(a.compare(&b), NameMatch::Different);
    }

    #[test]
    fn file_name_strips_directories() {
        let p = UniName::from("some/dir/file.dat");
        assert_eq!(p.file_name(), UniName::from("file.dat"));
        let bare = UniName::from("file.dat");
        assert_eq!(bare.file_name(), bare);
    }
}
