use crate::clock::Clock;
use crate::detectors::fixation::Fixation;
use crate::error::{GazeError, ScrollError};
use crate::scroll::behavior::{PauseLogic, PauseReason, ScrollBehavior, SpeedContext};
use crate::scroll::progress::{ProgressReport, ProgressTracker};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    #[serde(alias = "scroll_behavior")]
    pub behavior: ScrollBehavior,
    /// Seconds per window when adaptive speed is off
    #[serde(alias = "speed")]
    pub base_scroll_speed: f64,
    pub adaptive_speed: bool,
    pub pause_on_fixation: bool,
    /// Minimum fixation duration before sensitivity scaling
    pub fixation_pause_threshold: f64,
    /// Resume delay after a manual pause
    #[serde(alias = "pause_duration")]
    pub auto_resume_delay: f64,
    /// Added to the resume timer when an annotation lands during a pause
    pub annotation_pause_duration: f64,
    pub overlap_percentage: f64,
    pub progress_feedback: bool,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            behavior: ScrollBehavior::Normal,
            base_scroll_speed: 2.5,
            adaptive_speed: true,
            pause_on_fixation: true,
            fixation_pause_threshold: 0.5,
            auto_resume_delay: 2.0,
            annotation_pause_duration: 1.0,
            overlap_percentage: 10.0,
            progress_feedback: true,
        }
    }
}

impl ScrollConfig {
    pub fn validate(&self) -> Result<(), GazeError> {
        let positive = [
            ("base_scroll_speed", self.base_scroll_speed),
            ("auto_resume_delay", self.auto_resume_delay),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(GazeError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(0.0..100.0).contains(&self.overlap_percentage) {
            return Err(GazeError::InvalidConfig(format!(
                "overlap_percentage must be in [0, 100), got {}",
                self.overlap_percentage
            )));
        }
        let pauses = [
            ("annotation_pause_duration", self.annotation_pause_duration),
            ("fixation_pause_threshold", self.fixation_pause_threshold),
        ];
        for (name, value) in pauses {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(GazeError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Timer offset from `now`; a delay that does not fit an `Instant` fires at once.
fn deadline(now: Instant, secs: f64) -> Instant {
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) => now.checked_add(delay).unwrap_or(now),
        Err(err) => {
            warn!("ignoring unusable delay {secs}: {err}");
            now
        }
    }
}

/// Host-side automatic window advance, toggled by the controller.
pub trait ScrollDriver: Send {
    fn set_auto_move(&mut self, active: bool);
    fn is_auto_moving(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollState {
    Stopped,
    Scrolling,
    PausedForFixation,
    PausedForAnnotation,
    WaitingResume,
    Completed,
}

impl ScrollState {
    pub fn is_paused(&self) -> bool {
        matches!(
            self,
            ScrollState::PausedForFixation
                | ScrollState::PausedForAnnotation
                | ScrollState::WaitingResume
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScrollEvent {
    Started(ProgressReport),
    Paused { reason: PauseReason, resume_in: f64 },
    Resumed,
    Progress(ProgressReport),
    Completed,
    SessionEnded(ProgressReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollStatistics {
    pub state: ScrollState,
    pub behavior: ScrollBehavior,
    pub base_scroll_speed: f64,
    pub pause_on_fixation: bool,
    pub auto_resume_delay: f64,
    pub pause_seconds: Option<f64>,
    pub progress: ProgressReport,
}

/// Gaze-aware auto-scroll: pauses on worthwhile fixations and resumes on a
/// deadline checked by [`AutoScrollController::tick`].
pub struct AutoScrollController {
    config: ScrollConfig,
    pause_logic: PauseLogic,
    progress: ProgressTracker,
    state: ScrollState,
    driver: Option<Box<dyn ScrollDriver>>,
    clock: Arc<dyn Clock>,
    pause_started: Option<Instant>,
    resume_at: Option<Instant>,
    speed_context: Option<SpeedContext>,
    events: Vec<ScrollEvent>,
}

impl AutoScrollController {
    pub fn new(config: ScrollConfig, clock: Arc<dyn Clock>) -> Self {
        let progress = ProgressTracker::new(config.overlap_percentage);
        Self {
            config,
            pause_logic: PauseLogic::default(),
            progress,
            state: ScrollState::Stopped,
            driver: None,
            clock,
            pause_started: None,
            resume_at: None,
            speed_context: None,
            events: Vec::new(),
        }
    }

    pub fn attach_driver(&mut self, driver: Box<dyn ScrollDriver>) {
        debug!("scroll driver attached");
        self.driver = Some(driver);
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    /// Overlap changes apply from the next session.
    pub fn configure(&mut self, config: ScrollConfig) -> Result<(), GazeError> {
        config.validate()?;
        info!("auto-scroll configured: behavior {}", config.behavior);
        self.config = config;
        Ok(())
    }

    pub fn set_behavior(&mut self, behavior: ScrollBehavior) {
        info!("scroll behavior set to {}", behavior);
        self.config.behavior = behavior;
        self.progress.set_scroll_speed(self.scroll_speed());
    }

    pub fn set_speed_context(&mut self, context: Option<SpeedContext>) {
        self.speed_context = context;
        self.progress.set_scroll_speed(self.scroll_speed());
    }

    /// Seconds per window.
    pub fn scroll_speed(&self) -> f64 {
        if self.config.adaptive_speed {
            self.config.behavior.scroll_speed(self.speed_context.as_ref())
        } else {
            self.config.base_scroll_speed
        }
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    pub fn resume_remaining(&self) -> Option<Duration> {
        self.resume_at
            .map(|at| at.saturating_duration_since(self.clock.now()))
    }

    pub fn start_enhanced_scroll(
        &mut self,
        total_duration: f64,
        window_duration: f64,
    ) -> Result<(), ScrollError> {
        if self.state != ScrollState::Stopped {
            warn!("cannot start scroll: already active");
            return Err(ScrollError::AlreadyRunning);
        }
        let valid_range = total_duration > 0.0 && window_duration > 0.0;
        if !valid_range {
            return Err(ScrollError::InvalidRange {
                total: total_duration,
                window: window_duration,
            });
        }
        let Some(driver) = self.driver.as_mut() else {
            warn!("cannot start scroll: no driver attached");
            return Err(ScrollError::NoDriver);
        };
        if !driver.is_auto_moving() {
            driver.set_auto_move(true);
        }
        self.progress = ProgressTracker::new(self.config.overlap_percentage);
        self.progress
            .start_session(total_duration, window_duration, self.clock.now());
        self.progress.set_scroll_speed(self.scroll_speed());
        self.pause_logic.clear();
        self.state = ScrollState::Scrolling;
        self.events.push(ScrollEvent::Started(self.progress.report()));
        Ok(())
    }

    /// Returns true if scrolling paused for this fixation.
    pub fn handle_fixation_detected(
        &mut self,
        fixation: &Fixation,
        eeg_interest: Option<f64>,
    ) -> bool {
        if self.state != ScrollState::Scrolling || !self.config.pause_on_fixation {
            return false;
        }
        let now = self.clock.now();
        if self.pause_logic.is_rapid_pausing(now) {
            debug!("pause rejected: rapid pausing");
            return false;
        }
        let worthy = self.pause_logic.is_worth_pausing(fixation, eeg_interest)
            && self
                .config
                .behavior
                .should_pause_for(fixation, self.config.fixation_pause_threshold);
        debug!(
            "pause decision {} (duration={:.2}s confidence={:.2} stability={:.2})",
            worthy, fixation.duration, fixation.confidence, fixation.stability
        );
        if !worthy {
            return false;
        }
        self.pause_logic.record_pause(now);
        let delay = self.pause_logic.pause_duration(fixation);
        self.pause(PauseReason::FixationDetected, delay);
        true
    }

    /// Counts the annotation and, during a fixation pause, extends the timer.
    pub fn handle_annotation_created(&mut self) {
        self.progress.add_annotation();
        if self.state != ScrollState::PausedForFixation {
            return;
        }
        self.state = ScrollState::PausedForAnnotation;
        let now = self.clock.now();
        let from = self.resume_at.unwrap_or(now).max(now);
        self.resume_at = Some(deadline(from, self.config.annotation_pause_duration));
        debug!(
            "pause extended by {:.1}s for annotation",
            self.config.annotation_pause_duration
        );
    }

    pub fn manual_pause(&mut self) {
        if self.state == ScrollState::Scrolling {
            self.pause(PauseReason::ManualPause, self.config.auto_resume_delay);
        }
    }

    pub fn manual_resume(&mut self) {
        if self.state.is_paused() {
            self.resume();
        }
    }

    /// Ends the session; returns the final report unless already stopped.
    pub fn stop_enhanced_scroll(&mut self) -> Option<ProgressReport> {
        if self.state == ScrollState::Stopped {
            return None;
        }
        self.resume_at = None;
        self.pause_started = None;
        if let Some(driver) = self.driver.as_mut() {
            if driver.is_auto_moving() {
                driver.set_auto_move(false);
            }
        }
        self.state = ScrollState::Stopped;
        let report = self.progress.report();
        self.events.push(ScrollEvent::SessionEnded(report.clone()));
        info!(
            "auto-scroll session stopped at {:.1}%",
            report.completion_percentage
        );
        Some(report)
    }

    /// Fire an expired resume timer and observe the viewer position.
    pub fn tick(&mut self, position: f64) {
        if self.state == ScrollState::Stopped {
            return;
        }
        let now = self.clock.now();
        if self.state.is_paused() && self.resume_at.is_some_and(|at| now >= at) {
            self.resume();
        }
        self.progress.update_progress(position, now);
        if self.progress.is_complete() {
            self.state = ScrollState::Completed;
            self.events.push(ScrollEvent::Completed);
            self.stop_enhanced_scroll();
            return;
        }
        if self.config.progress_feedback {
            self.events.push(ScrollEvent::Progress(self.progress.report()));
        }
    }

    pub fn progress_report(&self) -> ProgressReport {
        self.progress.report()
    }

    pub fn statistics(&self) -> ScrollStatistics {
        ScrollStatistics {
            state: self.state,
            behavior: self.config.behavior,
            base_scroll_speed: self.config.base_scroll_speed,
            pause_on_fixation: self.config.pause_on_fixation,
            auto_resume_delay: self.config.auto_resume_delay,
            pause_seconds: self
                .pause_started
                .map(|at| self.clock.now().saturating_duration_since(at).as_secs_f64()),
            progress: self.progress.report(),
        }
    }

    pub fn take_events(&mut self) -> Vec<ScrollEvent> {
        std::mem::take(&mut self.events)
    }

    fn pause(&mut self, reason: PauseReason, delay: f64) {
        if let Some(driver) = self.driver.as_mut() {
            if driver.is_auto_moving() {
                driver.set_auto_move(false);
            }
        }
        self.state = match reason {
            PauseReason::FixationDetected => ScrollState::PausedForFixation,
            PauseReason::AnnotationCreation => ScrollState::PausedForAnnotation,
            PauseReason::UserInteraction | PauseReason::ManualPause => ScrollState::WaitingResume,
        };
        let now = self.clock.now();
        self.pause_started = Some(now);
        self.resume_at = Some(deadline(now, delay));
        self.progress.add_pause(delay);
        self.events.push(ScrollEvent::Paused {
            reason,
            resume_in: delay,
        });
        debug!("scrolling paused ({:?}), resume in {:.1}s", reason, delay);
    }

    fn resume(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            if !driver.is_auto_moving() {
                driver.set_auto_move(true);
            }
        }
        self.state = ScrollState::Scrolling;
        self.pause_started = None;
        self.resume_at = None;
        self.events.push(ScrollEvent::Resumed);
        debug!("scrolling resumed");
    }
}

impl fmt::Debug for AutoScrollController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoScrollController")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("has_driver", &self.driver.is_some())
            .field("resume_at", &self.resume_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Default)]
    struct FlagDriver(Arc<AtomicBool>);

    impl ScrollDriver for FlagDriver {
        fn set_auto_move(&mut self, active: bool) {
            self.0.store(active, Ordering::SeqCst);
        }

        fn is_auto_moving(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn good_fixation() -> Fixation {
        Fixation {
            start_time: 0.0,
            end_time: 1.0,
            x: 0.5,
            y: 0.5,
            duration: 1.0,
            confidence: 0.9,
            member_samples: Vec::new(),
            dispersion: 0.0,
            stability: 0.9,
        }
    }

    fn controller() -> (AutoScrollController, Arc<ManualClock>, FlagDriver) {
        let clock = Arc::new(ManualClock::new());
        let driver = FlagDriver::default();
        let mut ctl = AutoScrollController::new(ScrollConfig::default(), clock.clone());
        ctl.attach_driver(Box::new(driver.clone()));
        (ctl, clock, driver)
    }

    #[test]
    fn start_requires_driver_and_stopped_state() {
        let clock = Arc::new(ManualClock::new());
        let mut bare = AutoScrollController::new(ScrollConfig::default(), clock);
        assert_eq!(bare.start_enhanced_scroll(100.0, 10.0), Err(ScrollError::NoDriver));
        assert_eq!(bare.state(), ScrollState::Stopped);

        let (mut ctl, _, driver) = controller();
        assert!(matches!(
            ctl.start_enhanced_scroll(0.0, 10.0),
            Err(ScrollError::InvalidRange { .. })
        ));
        ctl.start_enhanced_scroll(100.0, 10.0).unwrap();
        assert!(driver.is_auto_moving());
        assert_eq!(ctl.start_enhanced_scroll(100.0, 10.0), Err(ScrollError::AlreadyRunning));
    }

    #[test]
    fn fourth_pause_in_five_seconds_is_rejected() {
        let (mut ctl, clock, _) = controller();
        ctl.start_enhanced_scroll(600.0, 10.0).unwrap();
        for _ in 0..3 {
            assert!(ctl.handle_fixation_detected(&good_fixation(), None));
            ctl.manual_resume();
            clock.advance_secs(1.0);
        }
        assert!(!ctl.handle_fixation_detected(&good_fixation(), Some(1.0)));
        assert_eq!(ctl.state(), ScrollState::Scrolling);

        clock.advance_secs(3.0);
        assert!(ctl.handle_fixation_detected(&good_fixation(), None));
    }

    #[test]
    fn resume_timer_fires_and_annotation_extends_it() {
        let (mut ctl, clock, driver) = controller();
        ctl.start_enhanced_scroll(600.0, 10.0).unwrap();
        assert!(ctl.handle_fixation_detected(&good_fixation(), None));
        assert_eq!(ctl.state(), ScrollState::PausedForFixation);
        assert!(!driver.is_auto_moving());
        // 1 + (0.9 + 0.9) = 2.8s
        clock.advance_secs(2.0);
        ctl.handle_annotation_created();
        assert_eq!(ctl.state(), ScrollState::PausedForAnnotation);

        clock.advance_secs(1.0);
        ctl.tick(10.0);
        assert_eq!(ctl.state(), ScrollState::PausedForAnnotation);

        clock.advance_secs(1.0);
        ctl.tick(10.0);
        assert_eq!(ctl.state(), ScrollState::Scrolling);
        assert!(driver.is_auto_moving());
        assert_eq!(ctl.progress_report().annotations_created, 1);
    }

    #[test]
    fn manual_pause_waits_for_resume() {
        let (mut ctl, clock, _) = controller();
        ctl.start_enhanced_scroll(600.0, 10.0).unwrap();
        ctl.manual_pause();
        assert_eq!(ctl.state(), ScrollState::WaitingResume);
        assert!(!ctl.handle_fixation_detected(&good_fixation(), None));
        clock.advance_secs(2.5);
        ctl.tick(20.0);
        assert_eq!(ctl.state(), ScrollState::Scrolling);
        assert_eq!(ctl.progress_report().session_stats.total_pauses, 1);
    }

    #[test]
    fn reaching_the_end_completes_and_stops() {
        let (mut ctl, _, driver) = controller();
        ctl.start_enhanced_scroll(100.0, 10.0).unwrap();
        ctl.take_events();
        ctl.tick(50.0);
        assert_eq!(ctl.state(), ScrollState::Scrolling);
        ctl.tick(96.0);
        assert_eq!(ctl.state(), ScrollState::Stopped);
        assert!(!driver.is_auto_moving());
        let events = ctl.take_events();
        assert!(matches!(events[0], ScrollEvent::Progress(_)));
        assert_eq!(events[1], ScrollEvent::Completed);
        assert!(matches!(events[2], ScrollEvent::SessionEnded(_)));
        assert_eq!(ctl.stop_enhanced_scroll(), None);
    }

    #[test]
    fn fixations_ignored_when_pausing_disabled() {
        let (mut ctl, _, _) = controller();
        ctl.configure(ScrollConfig {
            pause_on_fixation: false,
            ..ScrollConfig::default()
        })
        .unwrap();
        ctl.start_enhanced_scroll(100.0, 10.0).unwrap();
        assert!(!ctl.handle_fixation_detected(&good_fixation(), None));
    }

    #[test]
    fn non_finite_durations_are_rejected() {
        let (mut ctl, _, _) = controller();
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            let config = ScrollConfig {
                annotation_pause_duration: bad,
                ..ScrollConfig::default()
            };
            assert!(config.validate().is_err());
            assert!(ctl.configure(config).is_err());
        }
        let infinite_delay = ScrollConfig {
            auto_resume_delay: f64::INFINITY,
            ..ScrollConfig::default()
        };
        assert!(infinite_delay.validate().is_err());
        assert_eq!(ctl.config(), &ScrollConfig::default());
    }

    #[test]
    fn annotation_with_unusable_pause_does_not_panic() {
        let clock = Arc::new(ManualClock::new());
        let config = ScrollConfig {
            annotation_pause_duration: f64::NAN,
            ..ScrollConfig::default()
        };
        let mut ctl = AutoScrollController::new(config, clock);
        ctl.attach_driver(Box::new(FlagDriver::default()));
        ctl.start_enhanced_scroll(600.0, 10.0).unwrap();
        assert!(ctl.handle_fixation_detected(&good_fixation(), None));
        ctl.handle_annotation_created();
        assert_eq!(ctl.state(), ScrollState::PausedForAnnotation);
        assert!(ctl.resume_remaining().is_some());
    }
}
