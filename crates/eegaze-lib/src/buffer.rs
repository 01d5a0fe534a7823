use crate::signal::GazeSample;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Fixed-capacity ring of recent gaze samples, oldest overwritten first.
#[derive(Debug, Clone)]
pub struct GazeDataBuffer {
    slots: Vec<GazeSample>,
    capacity: usize,
    /// Index of the oldest sample once the ring has wrapped
    head: usize,
    total_added: u64,
}

impl GazeDataBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            total_added: 0,
        }
    }

    pub fn add(&mut self, sample: GazeSample) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
        self.total_added += 1;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples ever added since construction or the last `clear`.
    pub fn total_added(&self) -> u64 {
        self.total_added
    }

    /// Sample at chronological position `idx` (0 = oldest).
    pub fn get(&self, idx: usize) -> Option<&GazeSample> {
        if idx >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + idx) % self.slots.len())
    }

    pub fn latest(&self) -> Option<&GazeSample> {
        self.slots.len().checked_sub(1).and_then(|idx| self.get(idx))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &GazeSample> + '_ {
        (0..self.slots.len()).filter_map(move |idx| self.get(idx))
    }

    /// Samples no older than `seconds` before the newest one, in chronological order.
    ///
    /// A non-positive window is empty.
    pub fn recent_by_duration(&self, seconds: f64) -> Vec<GazeSample> {
        let Some(newest) = self.latest() else {
            return Vec::new();
        };
        if seconds.is_nan() || seconds <= 0.0 {
            return Vec::new();
        }
        let cutoff = newest.timestamp - seconds;
        let mut recent: Vec<GazeSample> = self
            .iter()
            .rev()
            .take_while(|sample| sample.timestamp >= cutoff)
            .copied()
            .collect();
        recent.reverse();
        recent
    }

    /// The most recent `count` samples, in chronological order.
    pub fn recent_by_count(&self, count: usize) -> Vec<GazeSample> {
        let skip = self.slots.len().saturating_sub(count);
        self.iter().skip(skip).copied().collect()
    }

    /// Index-range query; negative indices count from the end and both
    /// bounds are clamped, so this never fails.
    pub fn slice(&self, start_idx: i64, end_idx: i64) -> Vec<GazeSample> {
        let len = self.slots.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let start = if start_idx < 0 { len + start_idx } else { start_idx };
        let end = if end_idx < 0 { len + end_idx } else { end_idx };
        let start = start.clamp(0, len - 1) as usize;
        let end = end.clamp(0, len) as usize;
        if start >= end {
            return Vec::new();
        }
        (start..end).filter_map(|idx| self.get(idx)).copied().collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
        self.total_added = 0;
    }
}

impl Default for GazeDataBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64) -> GazeSample {
        GazeSample::new(0.5, 0.5, t, 0.9)
    }

    fn filled(n: usize, capacity: usize) -> GazeDataBuffer {
        let mut buffer = GazeDataBuffer::new(capacity);
        for i in 0..n {
            buffer.add(sample(i as f64 * 0.1));
        }
        buffer
    }

    fn times(samples: &[GazeSample]) -> Vec<f64> {
        samples.iter().map(|s| (s.timestamp * 10.0).round() / 10.0).collect()
    }

    #[test]
    fn overwrites_oldest_at_capacity() {
        let buffer = filled(7, 5);
        assert_eq!(buffer.len(), 5);
        assert!(buffer.is_full());
        assert_eq!(buffer.total_added(), 7);
        let all = buffer.slice(0, 5);
        assert_eq!(times(&all), vec![0.2, 0.3, 0.4, 0.5, 0.6]);
        assert!((buffer.latest().map(|s| s.timestamp).unwrap_or(0.0) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn recent_by_duration_walks_back_from_newest() {
        let buffer = filled(10, 100);
        let recent = buffer.recent_by_duration(0.25);
        assert_eq!(times(&recent), vec![0.7, 0.8, 0.9]);
        assert!(GazeDataBuffer::default().recent_by_duration(1.0).is_empty());
    }

    #[test]
    fn zero_duration_is_empty() {
        let buffer = filled(10, 100);
        assert!(buffer.recent_by_duration(0.0).is_empty());
    }

    #[test]
    fn slice_supports_negative_indices() {
        let buffer = filled(6, 100);
        assert_eq!(times(&buffer.slice(-2, -1)), vec![0.4]);
        assert_eq!(times(&buffer.slice(-3, -1)), vec![0.3, 0.4]);
        assert_eq!(times(&buffer.slice(-100, 2)), vec![0.0, 0.1]);
        assert_eq!(buffer.slice(3, 100).len(), 3);
        assert!(buffer.slice(4, 2).is_empty());
        assert!(GazeDataBuffer::default().slice(-2, -1).is_empty());
    }

    #[test]
    fn slice_after_wrap_is_chronological() {
        let buffer = filled(13, 4);
        assert_eq!(times(&buffer.slice(-3, -1)), vec![1.0, 1.1]);
        assert_eq!(times(&buffer.recent_by_count(2)), vec![1.1, 1.2]);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut buffer = filled(3, 10);
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_added(), 0);
    }
}
