//! Color tables: ordered RGB triples, 2..256 entries, a power of two long.

/// A GIF color table (global or local).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<[u8; 3]>,
}

impl ColorTable {
    /// Builds a table from raw entries, padding to the next power of two
    /// (minimum 2) with black as required by the format.
    pub fn new(mut entries: Vec<[u8; 3]>) -> Self {
        if entries.is_empty() {
            entries.push([0, 0, 0]);
        }
        let padded_len = entries.len().max(2).next_power_of_two();
        entries.resize(padded_len, [0, 0, 0]);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.entries.get(index as usize).copied()
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    /// `gct_size`/`lct_size` field: log2(len) - 1.
    pub fn size_field(&self) -> u8 {
        (self.entries.len().trailing_zeros() - 1) as u8
    }
}
