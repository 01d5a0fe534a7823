use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_pauses: u64,
    /// Seconds
    pub total_pause_duration: f64,
    pub annotations_created: u64,
    pub windows_reviewed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressReport {
    pub completion_percentage: f64,
    pub current_time: f64,
    pub total_duration: f64,
    pub windows_completed: u64,
    pub total_windows: u64,
    pub annotations_created: u64,
    /// Seconds of wall-clock time left; zero until 10% is reviewed
    pub estimated_completion_seconds: f64,
    pub scroll_speed: f64,
    pub session_stats: SessionStats,
}

/// Review progress through one recording. Observes position, never gates
/// state transitions.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    started: Option<Instant>,
    total_duration: f64,
    window_duration: f64,
    overlap_percentage: f64,
    current_time: f64,
    windows_completed: u64,
    total_windows: u64,
    estimated_completion: f64,
    scroll_speed: f64,
    stats: SessionStats,
}

impl ProgressTracker {
    pub fn new(overlap_percentage: f64) -> Self {
        Self {
            started: None,
            total_duration: 0.0,
            window_duration: 10.0,
            overlap_percentage,
            current_time: 0.0,
            windows_completed: 0,
            total_windows: 0,
            estimated_completion: 0.0,
            scroll_speed: 0.0,
            stats: SessionStats::default(),
        }
    }

    fn effective_window(&self) -> f64 {
        self.window_duration * (1.0 - self.overlap_percentage / 100.0)
    }

    pub fn start_session(&mut self, total_duration: f64, window_duration: f64, now: Instant) {
        *self = Self {
            started: Some(now),
            total_duration,
            window_duration,
            ..Self::new(self.overlap_percentage)
        };
        let step = self.effective_window();
        self.total_windows = if step > 0.0 {
            (total_duration / step).ceil() as u64
        } else {
            0
        };
        log::info!(
            "scroll session started: {:.1}s of data, {} windows",
            total_duration,
            self.total_windows
        );
    }

    pub fn set_scroll_speed(&mut self, speed: f64) {
        self.scroll_speed = speed;
    }

    pub fn update_progress(&mut self, position: f64, now: Instant) {
        self.current_time = position;
        let step = self.effective_window();
        if step > 0.0 {
            self.windows_completed = (position.max(0.0) / step) as u64;
        }
        let ratio = self.completion_ratio();
        if let Some(started) = self.started.filter(|_| ratio > 0.1) {
            let elapsed = now.saturating_duration_since(started).as_secs_f64();
            self.estimated_completion = elapsed / ratio - elapsed;
        }
        self.stats.windows_reviewed = self.windows_completed;
    }

    pub fn add_pause(&mut self, duration: f64) {
        self.stats.total_pauses += 1;
        self.stats.total_pause_duration += duration;
    }

    pub fn add_annotation(&mut self) {
        self.stats.annotations_created += 1;
    }

    fn completion_ratio(&self) -> f64 {
        if self.total_duration > 0.0 {
            self.current_time / self.total_duration
        } else {
            0.0
        }
    }

    /// Within half a window of the end.
    pub fn is_complete(&self) -> bool {
        self.current_time + 1e-9 >= self.total_duration - self.window_duration / 2.0
    }

    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            completion_percentage: self.completion_ratio() * 100.0,
            current_time: self.current_time,
            total_duration: self.total_duration,
            windows_completed: self.windows_completed,
            total_windows: self.total_windows,
            annotations_created: self.stats.annotations_created,
            estimated_completion_seconds: self.estimated_completion,
            scroll_speed: self.scroll_speed,
            session_stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn windows_and_eta() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(10.0);
        tracker.start_session(90.0, 10.0, t0);
        assert_eq!(tracker.report().total_windows, 10);

        tracker.update_progress(6.0, t0 + Duration::from_secs(10));
        // 6.7% reviewed, no estimate yet
        assert_eq!(tracker.report().estimated_completion_seconds, 0.0);

        tracker.update_progress(45.0, t0 + Duration::from_secs(30));
        let report = tracker.report();
        assert_eq!(report.windows_completed, 5);
        assert!((report.completion_percentage - 50.0).abs() < 1e-9);
        assert!((report.estimated_completion_seconds - 30.0).abs() < 1e-6);
        assert!(!tracker.is_complete());

        tracker.update_progress(85.0, t0 + Duration::from_secs(60));
        assert!(tracker.is_complete());
    }

    #[test]
    fn pauses_and_annotations_accumulate() {
        let mut tracker = ProgressTracker::new(0.0);
        tracker.start_session(60.0, 10.0, Instant::now());
        tracker.add_pause(2.0);
        tracker.add_pause(1.5);
        tracker.add_annotation();
        let stats = tracker.report().session_stats;
        assert_eq!(stats.total_pauses, 2);
        assert_eq!(stats.total_pause_duration, 3.5);
        assert_eq!(stats.annotations_created, 1);
    }
}
