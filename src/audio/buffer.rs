//! Fixed-capacity pre-roll buffer for `f32` audio samples.
//!
//! The boundary-mode windower keeps the most recent few hundred milliseconds
//! of silence in a [`PrerollBuffer`].  When speech onset is detected, the
//! buffered tail is prepended to the new window so the first phoneme is not
//! clipped.  When the buffer is full, new samples displace the oldest ones —
//! only the tail of the silence matters.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// PrerollBuffer
// ---------------------------------------------------------------------------

/// A bounded FIFO that always holds the most recent `capacity` samples.
///
/// # Example
///
/// ```rust
/// use livesub::audio::PrerollBuffer;
///
/// let mut buf = PrerollBuffer::new(4);
/// buf.push(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 samples into capacity 4
/// assert_eq!(buf.take(), vec![2.0, 3.0, 4.0, 5.0]); // oldest dropped
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct PrerollBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl PrerollBuffer {
    /// Create a pre-roll buffer holding at most `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "PrerollBuffer capacity must be > 0");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, discarding the oldest samples once full.
    pub fn push(&mut self, data: &[f32]) {
        for &s in data {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(s);
        }
    }

    /// Remove and return all buffered samples in chronological order.
    pub fn take(&mut self) -> Vec<f32> {
        self.samples.drain(..).collect()
    }

    /// Discard all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples the buffer retains.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_within_capacity_preserves_order() {
        let mut buf = PrerollBuffer::new(8);
        buf.push(&[1.0, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.take(), vec![1.0, 2.0, 3.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_keeps_newest() {
        let mut buf = PrerollBuffer::new(4);
        buf.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.take(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn overflow_across_multiple_pushes() {
        let mut buf = PrerollBuffer::new(3);
        buf.push(&[1.0, 2.0, 3.0]);
        buf.push(&[4.0, 5.0]);
        assert_eq!(buf.take(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn reusable_after_take() {
        let mut buf = PrerollBuffer::new(3);
        buf.push(&[1.0, 2.0]);
        let _ = buf.take();
        buf.push(&[9.0]);
        assert_eq!(buf.take(), vec![9.0]);
    }

    #[test]
    fn clear_resets_state() {
        let mut buf = PrerollBuffer::new(3);
        buf.push(&[1.0, 2.0, 3.0]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.take(), Vec::<f32>::new());
    }

    #[test]
    #[should_panic(expected = "PrerollBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = PrerollBuffer::new(0);
    }
}
