use serde::{Deserialize, Serialize};

/// Annotation timing after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationWindow {
    pub start_time: f64,
    pub duration: f64,
    pub is_valid: bool,
}

/// Keeps annotations inside the recording and within duration limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowValidator {
    pub data_duration: f64,
    pub min_annotation_duration: f64,
    pub max_annotation_duration: f64,
    pub default_duration: f64,
}

impl Default for TimeWindowValidator {
    fn default() -> Self {
        Self {
            data_duration: 0.0,
            min_annotation_duration: 0.1,
            max_annotation_duration: 10.0,
            default_duration: 1.0,
        }
    }
}

impl TimeWindowValidator {
    pub fn new(data_duration: f64) -> Self {
        Self {
            data_duration,
            ..Self::default()
        }
    }

    pub fn set_data_bounds(&mut self, data_duration: f64) {
        log::debug!("annotation data bounds set to {:.1}s", data_duration);
        self.data_duration = data_duration;
    }

    /// Clamp `start_time` and `duration`; the window is invalid when it would
    /// start past the data or end up shorter than the minimum.
    pub fn validate_annotation(&self, start_time: f64, duration: Option<f64>) -> AnnotationWindow {
        let mut duration = duration.unwrap_or(self.default_duration);
        let start_time = start_time.max(0.0);
        if start_time >= self.data_duration {
            return AnnotationWindow {
                start_time,
                duration,
                is_valid: false,
            };
        }
        duration = duration.clamp(self.min_annotation_duration, self.max_annotation_duration);
        if start_time + duration > self.data_duration {
            duration = self.data_duration - start_time;
        }
        AnnotationWindow {
            start_time,
            duration,
            is_valid: duration >= self.min_annotation_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortened_tail_below_minimum_is_invalid() {
        let validator = TimeWindowValidator::new(10.0);
        let window = validator.validate_annotation(9.95, Some(1.0));
        assert!((window.duration - 0.05).abs() < 1e-9);
        assert!(!window.is_valid);
    }

    #[test]
    fn clamps_into_limits() {
        let validator = TimeWindowValidator::new(100.0);
        let long = validator.validate_annotation(-3.0, Some(30.0));
        assert_eq!(long, AnnotationWindow { start_time: 0.0, duration: 10.0, is_valid: true });
        let short = validator.validate_annotation(5.0, Some(0.01));
        assert_eq!(short.duration, 0.1);
        let default = validator.validate_annotation(5.0, None);
        assert_eq!(default.duration, 1.0);
        let tail = validator.validate_annotation(99.5, Some(2.0));
        assert!(tail.is_valid);
        assert!((tail.duration - 0.5).abs() < 1e-9);
    }

    #[test]
    fn start_past_end_is_invalid() {
        let validator = TimeWindowValidator::new(10.0);
        assert!(!validator.validate_annotation(10.0, Some(1.0)).is_valid);
        assert!(!TimeWindowValidator::default().validate_annotation(0.0, None).is_valid);
    }
}
