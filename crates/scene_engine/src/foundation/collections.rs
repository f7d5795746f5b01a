//! Specialized collection types

pub use slotmap::{new_key_type, SlotMap};

/// Packed bit array used for per-batch culling flags
///
/// Bits are stored in 32-bit words; a set bit means "culled".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitArray {
    words: Vec<u32>,
    len: usize,
}

impl BitArray {
    /// Create a bit array with `len` cleared bits
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; Self::word_count(len)],
            len,
        }
    }

    fn word_count(len: usize) -> usize {
        (len + 31) / 32
    }

    /// Number of addressable bits
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the array holds no bits
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resize, clearing every bit
    pub fn reset(&mut self, len: usize) {
        self.words.clear();
        self.words.resize(Self::word_count(len), 0);
        self.len = len;
    }

    /// Set bit `idx`; out-of-range indices are ignored
    pub fn set(&mut self, idx: usize) {
        if idx < self.len {
            self.words[idx / 32] |= 1 << (idx % 32);
        }
    }

    /// Clear bit `idx`; out-of-range indices are ignored
    pub fn clear(&mut self, idx: usize) {
        if idx < self.len {
            self.words[idx / 32] &= !(1 << (idx % 32));
        }
    }

    /// Set or clear bit `idx`
    pub fn assign(&mut self, idx: usize, value: bool) {
        if value {
            self.set(idx);
        } else {
            self.clear(idx);
        }
    }

    /// Test bit `idx`; out-of-range indices read as cleared
    pub fn test(&self, idx: usize) -> bool {
        idx < self.len && (self.words[idx / 32] & (1 << (idx % 32))) != 0
    }

    /// Set every bit
    pub fn set_all(&mut self) {
        for w in &mut self.words {
            *w = u32::MAX;
        }
    }

    /// Clear every bit
    pub fn clear_all(&mut self) {
        for w in &mut self.words {
            *w = 0;
        }
    }

    /// True when every addressable bit is set
    pub fn all(&self) -> bool {
        (0..self.len).all(|i| self.test(i))
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        (0..self.len).filter(|&i| self.test(i)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_array_set_clear() {
        let mut bits = BitArray::new(40);
        bits.set(0);
        bits.set(33);
        assert!(bits.test(0));
        assert!(bits.test(33));
        assert!(!bits.test(1));
        bits.clear(33);
        assert!(!bits.test(33));
        assert_eq!(bits.count_ones(), 1);
    }

    #[test]
    fn test_bit_array_out_of_range_is_ignored() {
        let mut bits = BitArray::new(3);
        bits.set(10);
        assert!(!bits.test(10));
        bits.set_all();
        assert!(bits.all());
        assert_eq!(bits.count_ones(), 3);
    }
}
