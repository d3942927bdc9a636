// Bounded FIFO buffers for per-tick metrics

use std::collections::VecDeque;

/// Fixed-capacity FIFO; pushing into a full buffer evicts the oldest item
#[derive(Debug, Clone, PartialEq)]
pub struct RollingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingBuffer<T> {
    /// Capacity is raised to one so a buffer can always hold its latest item
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted one if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }
}

impl RollingBuffer<f32> {
    /// Arithmetic mean, `None` when empty
    pub fn mean(&self) -> Option<f32> {
        if self.items.is_empty() {
            return None;
        }
        let sum: f64 = self.items.iter().map(|&v| v as f64).sum();
        Some((sum / self.items.len() as f64) as f32)
    }
}

/// The three per-tick deviation series the scoring engine reduces
#[derive(Debug, Clone, PartialEq)]
pub struct MetricBuffers {
    /// `|actual - expected| / expected`, only for voiced ticks with a reference
    pub pitch_error: RollingBuffer<f32>,
    /// `|mean beat interval - expected| / expected`
    pub beat_diff: RollingBuffer<f32>,
    /// Mid-band energy share per tick
    pub clarity: RollingBuffer<f32>,
}

impl MetricBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            pitch_error: RollingBuffer::new(capacity),
            beat_diff: RollingBuffer::new(capacity),
            clarity: RollingBuffer::new(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.pitch_error.clear();
        self.beat_diff.clear();
        self.clarity.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pitch_error.is_empty() && self.beat_diff.is_empty() && self.clarity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = RollingBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(buffer.first(), Some(&2));
        assert_eq!(buffer.last(), Some(&4));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = RollingBuffer::new(200);
        for i in 0..1_000 {
            buffer.push(i as f32);
            assert!(buffer.len() <= 200);
        }
        assert_eq!(buffer.first(), Some(&800.0));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = RollingBuffer::new(0);
        buffer.push('a');
        buffer.push('b');
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.last(), Some(&'b'));
    }

    #[test]
    fn mean_of_values() {
        let mut buffer = RollingBuffer::new(4);
        assert_eq!(buffer.mean(), None);
        buffer.push(0.1);
        buffer.push(0.3);
        assert!((buffer.mean().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn metric_buffers_clear_together() {
        let mut metrics = MetricBuffers::new(10);
        metrics.pitch_error.push(0.1);
        metrics.beat_diff.push(0.2);
        metrics.clarity.push(0.3);
        assert!(!metrics.is_empty());
        metrics.clear();
        assert!(metrics.is_empty());
    }
}
