use crate::detectors::fixation::Fixation;
use crate::error::GazeError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Scrolling presets; `speed` is seconds per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    #[default]
    Normal,
    Detailed,
    Quick,
    AnnotationHeavy,
}

impl ScrollBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollBehavior::Normal => "normal",
            ScrollBehavior::Detailed => "detailed",
            ScrollBehavior::Quick => "quick",
            ScrollBehavior::AnnotationHeavy => "annotation_heavy",
        }
    }

    pub fn speed(&self) -> f64 {
        match self {
            ScrollBehavior::Normal => 2.5,
            ScrollBehavior::Detailed => 4.0,
            ScrollBehavior::Quick => 1.5,
            ScrollBehavior::AnnotationHeavy => 3.0,
        }
    }

    /// Higher sensitivity lowers the pause thresholds.
    pub fn sensitivity(&self) -> f64 {
        match self {
            ScrollBehavior::Normal => 0.5,
            ScrollBehavior::Detailed => 0.3,
            ScrollBehavior::Quick => 0.7,
            ScrollBehavior::AnnotationHeavy => 0.4,
        }
    }

    /// Seconds per window, slowed for complex signal or dense annotation.
    pub fn scroll_speed(&self, context: Option<&SpeedContext>) -> f64 {
        let base = self.speed();
        let Some(ctx) = context else {
            return base;
        };
        let adjustment = 1.0 + (ctx.eeg_complexity - 1.0) * 0.5 + ctx.annotation_density * 0.3;
        (base * adjustment).clamp(1.0, 6.0)
    }

    /// Duration and confidence floors scale with `1.1 - sensitivity`;
    /// stability has a fixed floor of 0.5.
    pub fn should_pause_for(&self, fixation: &Fixation, min_duration: f64) -> bool {
        let factor = 1.1 - self.sensitivity();
        fixation.duration >= min_duration * factor
            && fixation.confidence >= 0.6 * factor
            && fixation.stability >= 0.5
    }
}

impl fmt::Display for ScrollBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrollBehavior {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "normal" => Ok(ScrollBehavior::Normal),
            "detailed" => Ok(ScrollBehavior::Detailed),
            "quick" => Ok(ScrollBehavior::Quick),
            "annotation_heavy" => Ok(ScrollBehavior::AnnotationHeavy),
            _ => Err(GazeError::UnknownBehavior(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedContext {
    /// 1.0 is ordinary signal
    pub eeg_complexity: f64,
    /// Annotations per window
    pub annotation_density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    FixationDetected,
    AnnotationCreation,
    UserInteraction,
    ManualPause,
}

/// Pause gating shared across a scroll session: rapid-pause guard, base
/// fixation quality, and resume delay.
#[derive(Debug, Clone)]
pub struct PauseLogic {
    history: VecDeque<Instant>,
    pub min_pause_duration: f64,
    pub max_pause_duration: f64,
    /// Window of the rapid-pause guard
    pub rapid_pause_window: Duration,
    /// Pauses allowed inside the window
    pub rapid_pause_limit: usize,
}

impl Default for PauseLogic {
    fn default() -> Self {
        Self {
            history: VecDeque::new(),
            min_pause_duration: 1.0,
            max_pause_duration: 30.0,
            rapid_pause_window: Duration::from_secs(5),
            rapid_pause_limit: 3,
        }
    }
}

impl PauseLogic {
    /// True when another pause now would exceed the rapid-pause limit.
    pub fn is_rapid_pausing(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) >= self.rapid_pause_window {
                self.history.pop_front();
            } else {
                break;
            }
        }
        self.history.len() >= self.rapid_pause_limit
    }

    pub fn record_pause(&mut self, at: Instant) {
        self.history.push_back(at);
    }

    pub fn recent_pauses(&self) -> usize {
        self.history.len()
    }

    /// High interest always pauses, low interest needs a long fixation.
    pub fn is_worth_pausing(&self, fixation: &Fixation, eeg_interest: Option<f64>) -> bool {
        if fixation.duration < 0.3 || fixation.confidence < 0.5 || fixation.stability < 0.4 {
            return false;
        }
        match eeg_interest {
            Some(interest) if interest < 0.3 => fixation.duration >= 1.0,
            _ => true,
        }
    }

    /// Seconds; 1.0 to 3.0 from fixation quality, clamped to the limits.
    pub fn pause_duration(&self, fixation: &Fixation) -> f64 {
        let quality = (fixation.stability + fixation.confidence) / 2.0;
        (1.0 + quality * 2.0).clamp(self.min_pause_duration, self.max_pause_duration)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixation(duration: f64, confidence: f64, stability: f64) -> Fixation {
        Fixation {
            start_time: 0.0,
            end_time: duration,
            x: 0.5,
            y: 0.5,
            duration,
            confidence,
            member_samples: Vec::new(),
            dispersion: 0.0,
            stability,
        }
    }

    #[test]
    fn sensitivity_scales_thresholds() {
        let short = fixation(0.35, 0.9, 0.9);
        // normal: 0.5 * 0.6 = 0.30
        assert!(ScrollBehavior::Normal.should_pause_for(&short, 0.5));
        // detailed: 0.5 * 0.8 = 0.40
        assert!(!ScrollBehavior::Detailed.should_pause_for(&short, 0.5));
        assert!(!ScrollBehavior::Quick.should_pause_for(&fixation(2.0, 0.9, 0.4), 0.5));
    }

    #[test]
    fn adaptive_speed_is_clamped() {
        let busy = SpeedContext {
            eeg_complexity: 3.0,
            annotation_density: 2.0,
        };
        assert_eq!(ScrollBehavior::Detailed.scroll_speed(Some(&busy)), 6.0);
        assert_eq!(ScrollBehavior::Quick.scroll_speed(None), 1.5);
        let calm = SpeedContext {
            eeg_complexity: 0.0,
            annotation_density: 0.0,
        };
        assert_eq!(ScrollBehavior::Quick.scroll_speed(Some(&calm)), 1.0);
    }

    #[test]
    fn behavior_names() {
        assert_eq!(
            "annotation-heavy".parse::<ScrollBehavior>().unwrap(),
            ScrollBehavior::AnnotationHeavy
        );
        assert!(matches!(
            "turbo".parse::<ScrollBehavior>(),
            Err(GazeError::UnknownBehavior(_))
        ));
    }

    #[test]
    fn rapid_pause_guard_expires() {
        let mut logic = PauseLogic::default();
        let t0 = Instant::now();
        for i in 0..3 {
            let at = t0 + Duration::from_secs(i);
            assert!(!logic.is_rapid_pausing(at));
            logic.record_pause(at);
        }
        assert!(logic.is_rapid_pausing(t0 + Duration::from_millis(3500)));
        assert!(!logic.is_rapid_pausing(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn pause_duration_from_quality() {
        let logic = PauseLogic::default();
        assert!((logic.pause_duration(&fixation(1.0, 1.0, 1.0)) - 3.0).abs() < 1e-12);
        assert!((logic.pause_duration(&fixation(1.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!(!logic.is_worth_pausing(&fixation(0.6, 0.9, 0.9), Some(0.1)));
        assert!(logic.is_worth_pausing(&fixation(0.6, 0.9, 0.9), Some(0.9)));
    }
}
