//! Sliding window of recent samples for live display

use crate::sample::SensorSample;
use std::collections::VecDeque;
use tracing::debug;

/// Default number of samples kept for live display
pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

/// Bounded window of the most recent samples
///
/// When full, the oldest sample is evicted (strict FIFO, exactly one per
/// insertion). Once frozen the window is read-only until [`clear`] starts a
/// new session.
///
/// [`clear`]: SampleWindow::clear
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<SensorSample>,
    capacity: usize,
    frozen: bool,
    evicted: u64,
}

impl SampleWindow {
    /// Create an empty window holding at most `capacity` samples
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            frozen: false,
            evicted: 0,
        }
    }

    /// Append a sample, evicting the oldest when at capacity
    ///
    /// Returns the evicted sample, if any. Pushes into a frozen window are
    /// ignored.
    pub fn push(&mut self, sample: SensorSample) -> Option<SensorSample> {
        if self.frozen {
            debug!("Window is frozen, sample ignored");
            return None;
        }

        let evicted = if self.samples.len() >= self.capacity {
            self.evicted += 1;
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);

        evicted
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<SensorSample> {
        self.samples.iter().cloned().collect()
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &SensorSample> {
        self.samples.iter()
    }

    /// Most recently inserted sample
    pub fn latest(&self) -> Option<&SensorSample> {
        self.samples.back()
    }

    /// Make the window read-only
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Empty the window and make it writable again
    pub fn clear(&mut self) {
        self.samples.clear();
        self.frozen = false;
        self.evicted = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples evicted since the last clear
    pub fn total_evicted(&self) -> u64 {
        self.evicted
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sample::Vector3;

    fn make_sample(ts: i64) -> SensorSample {
        SensorSample::new(Vector3::new(ts as f64, 0.0, 0.0), Vector3::default(), ts).unwrap()
    }

    fn timestamps(window: &SampleWindow) -> Vec<i64> {
        window.iter().map(SensorSample::timestamp).collect()
    }

    #[test]
    fn test_push_below_capacity() {
        let mut window = SampleWindow::new(20);
        for ts in 0..5 {
            assert!(window.push(make_sample(ts)).is_none());
        }

        assert_eq!(window.len(), 5);
        assert_eq!(timestamps(&window), vec![0, 1, 2, 3, 4]);
        assert_eq!(window.total_evicted(), 0);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut window = SampleWindow::new(3);
        for ts in 0..3 {
            window.push(make_sample(ts));
        }

        let evicted = window.push(make_sample(3)).unwrap();
        assert_eq!(evicted.timestamp(), 0);
        assert_eq!(timestamps(&window), vec![1, 2, 3]);
        assert_eq!(window.total_evicted(), 1);
    }

    #[test]
    fn test_window_holds_most_recent_in_order() {
        for n in [0usize, 1, 19, 20, 21, 57] {
            let mut window = SampleWindow::default();
            for ts in 0..n as i64 {
                window.push(make_sample(ts));
            }

            let expected: Vec<i64> = (n.saturating_sub(20) as i64..n as i64).collect();
            assert_eq!(window.len(), n.min(20), "n = {n}");
            assert_eq!(timestamps(&window), expected, "n = {n}");
        }
    }

    #[test]
    fn test_out_of_order_timestamps_kept_in_arrival_order() {
        let mut window = SampleWindow::new(4);
        for ts in [5, 3, 9, 1] {
            window.push(make_sample(ts));
        }
        assert_eq!(timestamps(&window), vec![5, 3, 9, 1]);
        assert_eq!(window.latest().unwrap().timestamp(), 1);
    }

    #[test]
    fn test_frozen_window_is_read_only() {
        let mut window = SampleWindow::new(5);
        window.push(make_sample(1));
        window.freeze();

        assert!(window.push(make_sample(2)).is_none());
        assert_eq!(timestamps(&window), vec![1]);
        assert!(window.is_frozen());

        window.clear();
        assert!(window.is_empty());
        assert!(!window.is_frozen());
        window.push(make_sample(3));
        assert_eq!(timestamps(&window), vec![3]);
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let mut window = SampleWindow::new(0);
        window.push(make_sample(1));
        window.push(make_sample(2));
        assert_eq!(window.capacity(), 1);
        assert_eq!(timestamps(&window), vec![2]);
    }
}
