//! Specialized collection types
//!
//! Fixed-capacity sequences replace the raw arrays-with-counts the display
//! geometry used to be stored in. Producers push through [`push_clipped`],
//! which drops overflowing elements instead of growing or panicking.

pub use heapless::Vec as BoundedVec;

/// Push `item`, dropping it when the sequence is full.
///
/// Returns `false` when the element was dropped.
pub fn push_clipped<T, const N: usize>(seq: &mut BoundedVec<T, N>, item: T) -> bool {
    seq.push(item).is_ok()
}

/// Fill `seq` from an iterator, keeping at most `N` elements.
///
/// Returns how many elements were dropped.
pub fn fill_clipped<T, const N: usize, I>(seq: &mut BoundedVec<T, N>, items: I) -> usize
where
    I: IntoIterator<Item = T>,
{
    seq.clear();
    let mut dropped = 0;
    for item in items {
        if !push_clipped(seq, item) {
            dropped += 1;
        }
    }
    dropped
}

/// Two copies of a value: readers see the front copy while the back copy is rebuilt.
///
/// `publish` swaps the roles once a rebuild is complete, so a reader never
/// observes a half-written value.
#[derive(Debug, Clone, Default)]
pub struct DoubleBuffered<T> {
    buffers: [T; 2],
    front: usize,
}

impl<T> DoubleBuffered<T> {
    /// Create from two initial copies
    pub fn new(front: T, back: T) -> Self {
        Self { buffers: [front, back], front: 0 }
    }

    /// The copy currently visible to readers
    pub fn front(&self) -> &T {
        &self.buffers[self.front]
    }

    /// The copy being written
    pub fn back_mut(&mut self) -> &mut T {
        &mut self.buffers[1 - self.front]
    }

    /// Make the back copy visible
    pub fn publish(&mut self) {
        self.front = 1 - self.front;
    }
}

impl<T: Clone> DoubleBuffered<T> {
    /// Create with both copies equal to `value`
    pub fn from_value(value: T) -> Self {
        Self::new(value.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_clipped_drops_overflow() {
        let mut seq: BoundedVec<u32, 2> = BoundedVec::new();
        assert!(push_clipped(&mut seq, 1));
        assert!(push_clipped(&mut seq, 2));
        assert!(!push_clipped(&mut seq, 3));
        assert_eq!(seq.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_fill_clipped_reports_dropped() {
        let mut seq: BoundedVec<u32, 3> = BoundedVec::new();
        seq.push(9).unwrap();
        let dropped = fill_clipped(&mut seq, 0..5);
        assert_eq!(dropped, 2);
        assert_eq!(seq.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_double_buffer_hides_back_until_publish() {
        let mut buffered = DoubleBuffered::from_value(0u32);
        *buffered.back_mut() = 7;
        assert_eq!(*buffered.front(), 0);
        buffered.publish();
        assert_eq!(*buffered.front(), 7);
    }
}
