use crate::error::TrackerError;
use crate::signal::GazeSample;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Per-eye tracker output for one instant; `None` marks an invalid eye.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinocularFrame {
    pub timestamp: f64,
    pub left: Option<(f64, f64)>,
    pub right: Option<(f64, f64)>,
}

impl BinocularFrame {
    /// Both eyes average at confidence 1.0, a single eye passes through at 0.7.
    /// With no valid eye the sample carries both flags false and confidence 0.
    pub fn fuse(&self) -> GazeSample {
        let (x, y, confidence) = match (self.left, self.right) {
            (Some((lx, ly)), Some((rx, ry))) => ((lx + rx) / 2.0, (ly + ry) / 2.0, 1.0),
            (Some((x, y)), None) | (None, Some((x, y))) => (x, y, 0.7),
            (None, None) => (0.0, 0.0, 0.0),
        };
        GazeSample {
            x,
            y,
            timestamp: self.timestamp,
            valid_left: self.left.is_some(),
            valid_right: self.right.is_some(),
            confidence,
        }
    }
}

impl From<GazeSample> for BinocularFrame {
    fn from(sample: GazeSample) -> Self {
        let point = Some((sample.x, sample.y));
        Self {
            timestamp: sample.timestamp,
            left: point.filter(|_| sample.valid_left),
            right: point.filter(|_| sample.valid_right),
        }
    }
}

/// Source of gaze frames, polled by the processor.
pub trait GazeTracker: Send {
    fn start_streaming(&mut self) -> Result<(), TrackerError>;
    fn stop_streaming(&mut self);
    fn is_streaming(&self) -> bool;
    /// `Ok(None)` when no frame is ready.
    fn poll_sample(&mut self) -> Result<Option<BinocularFrame>, TrackerError>;
}

/// Replays recorded samples as tracker frames.
#[derive(Debug, Clone, Default)]
pub struct ReplayTracker {
    frames: VecDeque<BinocularFrame>,
    streaming: bool,
    disconnect_after: Option<usize>,
    delivered: usize,
}

impl ReplayTracker {
    pub fn new(samples: impl IntoIterator<Item = GazeSample>) -> Self {
        Self {
            frames: samples.into_iter().map(BinocularFrame::from).collect(),
            ..Self::default()
        }
    }

    /// Fail with `Disconnected` once `frames` have been delivered.
    pub fn disconnect_after(mut self, frames: usize) -> Self {
        self.disconnect_after = Some(frames);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl GazeTracker for ReplayTracker {
    fn start_streaming(&mut self) -> Result<(), TrackerError> {
        if self.disconnect_after == Some(0) {
            return Err(TrackerError::Disconnected);
        }
        info!("replay tracker streaming {} frames", self.frames.len());
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) {
        if self.streaming {
            debug!("replay tracker stopped with {} frames left", self.frames.len());
        }
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn poll_sample(&mut self) -> Result<Option<BinocularFrame>, TrackerError> {
        if !self.streaming {
            return Ok(None);
        }
        if self.disconnect_after.is_some_and(|limit| self.delivered >= limit) {
            self.streaming = false;
            return Err(TrackerError::Disconnected);
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.delivered += 1;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_confidence_by_eye_count() {
        let both = BinocularFrame {
            timestamp: 1.0,
            left: Some((0.4, 0.5)),
            right: Some((0.6, 0.7)),
        }
        .fuse();
        assert!((both.x - 0.5).abs() < 1e-12 && (both.y - 0.6).abs() < 1e-12);
        assert_eq!(both.confidence, 1.0);

        let right = BinocularFrame {
            timestamp: 1.0,
            left: None,
            right: Some((0.6, 0.7)),
        }
        .fuse();
        assert_eq!((right.x, right.y, right.confidence), (0.6, 0.7, 0.7));
        assert!(!right.valid_left && right.valid_right);

        let none = BinocularFrame {
            timestamp: 1.0,
            left: None,
            right: None,
        }
        .fuse();
        assert!(!none.has_valid_eye());
    }

    #[test]
    fn replay_stops_on_disconnect() {
        let samples = (0..5).map(|i| GazeSample::new(0.5, 0.5, i as f64 * 0.1, 1.0));
        let mut tracker = ReplayTracker::new(samples).disconnect_after(2);
        assert_eq!(tracker.poll_sample(), Ok(None));
        tracker.start_streaming().unwrap();
        assert!(tracker.poll_sample().unwrap().is_some());
        assert!(tracker.poll_sample().unwrap().is_some());
        assert_eq!(tracker.poll_sample(), Err(TrackerError::Disconnected));
        assert!(!tracker.is_streaming());
    }
}
