//! Memory management utilities
//!
//! Frame-scoped scratch heaps. A heap is purged (its cursor reset) rather
//! than freed, so reclaiming a whole frame of scratch allocations is O(1).

use super::collections::BitArray;

/// Bump-style scratch heap owned by one worker (or shared behind a lock)
#[derive(Debug)]
pub struct LocalHeap {
    id: usize,
    buffer: Vec<u8>,
    used: usize,
    fixed: bool,
    peak: usize,
    purge_count: u64,
    indices: Vec<u32>,
    stamps: BitArray,
}

impl LocalHeap {
    /// Create a heap; `size == 0` makes it growable, otherwise allocations
    /// beyond `size` bytes fail.
    pub fn new(id: usize, size: usize) -> Self {
        Self {
            id,
            buffer: vec![0; size],
            used: 0,
            fixed: size > 0,
            peak: 0,
            purge_count: 0,
            indices: Vec::new(),
            stamps: BitArray::default(),
        }
    }

    /// Owner id (worker index, or `usize::MAX` for the shared heap)
    pub fn id(&self) -> usize {
        self.id
    }

    /// Allocate `bytes` zeroed bytes, valid until the next allocation or purge
    pub fn alloc(&mut self, bytes: usize) -> Option<&mut [u8]> {
        let start = self.used;
        let end = start.checked_add(bytes)?;
        if end > self.buffer.len() {
            if self.fixed {
                log::debug!("Local heap {} exhausted ({} + {} bytes)", self.id, start, bytes);
                return None;
            }
            self.buffer.resize(end.max(self.buffer.len() * 2), 0);
        }
        self.used = end;
        self.peak = self.peak.max(end);
        let block = &mut self.buffer[start..end];
        block.fill(0);
        Some(block)
    }

    /// Index list and stamp bits for polygon queries, cleared on return
    pub fn poly_scratch(&mut self, stamp_count: usize) -> (&mut Vec<u32>, &mut BitArray) {
        self.indices.clear();
        self.stamps.reset(stamp_count);
        (&mut self.indices, &mut self.stamps)
    }

    /// Bytes currently allocated
    pub fn used(&self) -> usize {
        self.used
    }

    /// Highest `used()` seen since creation
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Number of purges performed
    pub fn purge_count(&self) -> u64 {
        self.purge_count
    }

    /// Reset the allocation cursor without releasing memory
    pub fn purge(&mut self) {
        self.used = 0;
        self.purge_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_heap_exhaustion() {
        let mut heap = LocalHeap::new(0, 16);
        assert!(heap.alloc(12).is_some());
        assert!(heap.alloc(8).is_none());
        heap.purge();
        assert_eq!(heap.used(), 0);
        assert!(heap.alloc(16).is_some());
        assert_eq!(heap.purge_count(), 1);
    }

    #[test]
    fn test_growable_heap_keeps_capacity_after_purge() {
        let mut heap = LocalHeap::new(1, 0);
        let block = heap.alloc(100).map(|b| b.len());
        assert_eq!(block, Some(100));
        heap.purge();
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.peak(), 100);
    }
}
