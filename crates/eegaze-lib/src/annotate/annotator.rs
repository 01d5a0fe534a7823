use crate::annotate::analysis::{
    AnalyzerConfig, AnnotationCategory, FixationAnalysis, FixationAnalyzer, QualityLevel,
};
use crate::annotate::channel::{ChannelMapper, PlotBounds};
use crate::annotate::record::{AnnotationRecord, AnnotationStore};
use crate::annotate::validator::TimeWindowValidator;
use crate::detectors::fixation::{Fixation, ScreenSize};
use crate::error::GazeError;
use crate::metrics::context::EegContextFlags;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Worthiness floor below which no annotation is created.
const MIN_WORTHINESS: f64 = 0.4;
/// EEG context score required when `require_eeg_context` is set.
const MIN_EEG_CONTEXT_SCORE: f64 = 0.6;

/// What turns a detected fixation into an annotation trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    #[default]
    #[serde(rename = "Fixation Only", alias = "fixation_only")]
    FixationOnly,
    #[serde(rename = "Fixation + Blink", alias = "fixation_blink")]
    FixationBlink,
    #[serde(rename = "Manual Confirm", alias = "manual_confirm")]
    ManualConfirm,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::FixationOnly => "Fixation Only",
            TriggerMode::FixationBlink => "Fixation + Blink",
            TriggerMode::ManualConfirm => "Manual Confirm",
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerMode {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "fixationonly" | "fixation" => Ok(TriggerMode::FixationOnly),
            "fixationblink" | "blink" => Ok(TriggerMode::FixationBlink),
            "manualconfirm" | "manual" => Ok(TriggerMode::ManualConfirm),
            _ => Err(GazeError::UnknownTriggerMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub default_category: AnnotationCategory,
    /// Seconds
    pub default_duration: f64,
    pub trigger_mode: TriggerMode,
    /// Describe trigger payloads from duration/confidence tiers instead of
    /// the default category name.
    pub auto_description: bool,
    pub min_quality_threshold: QualityLevel,
    pub require_eeg_context: bool,
    #[serde(alias = "auto_create_annotations")]
    pub auto_create: bool,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            default_category: AnnotationCategory::Review,
            default_duration: 1.0,
            trigger_mode: TriggerMode::FixationOnly,
            auto_description: true,
            min_quality_threshold: QualityLevel::Low,
            require_eeg_context: false,
            auto_create: true,
        }
    }
}

impl AnnotationConfig {
    pub fn validate(&self) -> Result<(), GazeError> {
        if self.default_duration.is_nan() || self.default_duration <= 0.0 {
            return Err(GazeError::InvalidConfig(format!(
                "default_duration must be positive, got {}",
                self.default_duration
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnnotatorStats {
    pub fixations_analyzed: u64,
    pub annotations_created: u64,
    pub annotations_rejected: u64,
    pub quality_distribution: BTreeMap<QualityLevel, u64>,
}

impl AnnotatorStats {
    pub fn creation_rate(&self) -> f64 {
        if self.fixations_analyzed == 0 {
            0.0
        } else {
            self.annotations_created as f64 / self.fixations_analyzed as f64
        }
    }
}

/// Decides whether a fixation becomes an annotation and hands it to the store.
pub struct GazeAnnotator {
    config: AnnotationConfig,
    analyzer: FixationAnalyzer,
    mapper: ChannelMapper,
    validator: TimeWindowValidator,
    screen: ScreenSize,
    store: Box<dyn AnnotationStore + Send>,
    stats: AnnotatorStats,
    last_analysis: Option<FixationAnalysis>,
}

impl GazeAnnotator {
    pub fn new(
        config: AnnotationConfig,
        analyzer: AnalyzerConfig,
        store: Box<dyn AnnotationStore + Send>,
    ) -> Self {
        info!(
            "gaze annotator ready: min quality {}, trigger {}",
            config.min_quality_threshold, config.trigger_mode
        );
        Self {
            config,
            analyzer: FixationAnalyzer::new(analyzer),
            mapper: ChannelMapper::new(),
            validator: TimeWindowValidator::default(),
            screen: ScreenSize::default(),
            store,
            stats: AnnotatorStats::default(),
            last_analysis: None,
        }
    }

    pub fn config(&self) -> &AnnotationConfig {
        &self.config
    }

    pub fn configure(&mut self, config: AnnotationConfig) {
        self.config = config;
    }

    pub fn analyzer(&self) -> &FixationAnalyzer {
        &self.analyzer
    }

    /// Screen geometry used to turn normalized fixation centers into pixels.
    pub fn set_screen(&mut self, screen: ScreenSize) {
        self.screen = screen;
    }

    pub fn set_display_context(
        &mut self,
        channels: Vec<String>,
        time_range: (f64, f64),
        plot_bounds: PlotBounds,
        channel_height: f64,
        data_duration: f64,
    ) {
        self.mapper
            .configure(channels, time_range, plot_bounds, channel_height);
        self.validator.set_data_bounds(data_duration);
    }

    pub fn stats(&self) -> &AnnotatorStats {
        &self.stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = AnnotatorStats::default();
    }

    /// Analysis of the most recently processed fixation.
    pub fn last_analysis(&self) -> Option<&FixationAnalysis> {
        self.last_analysis.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut (dyn AnnotationStore + Send) {
        self.store.as_mut()
    }

    /// Returns true iff an annotation was handed to the store.
    pub fn process_fixation(
        &mut self,
        fixation: &Fixation,
        channel: Option<&str>,
        context: Option<&EegContextFlags>,
    ) -> bool {
        self.stats.fixations_analyzed += 1;
        let analysis = self.analyzer.analyze_fixation(fixation, channel, context);
        *self
            .stats
            .quality_distribution
            .entry(analysis.quality_level)
            .or_insert(0) += 1;
        let created = self.try_create(fixation, &analysis);
        self.last_analysis = Some(analysis);
        if created {
            self.stats.annotations_created += 1;
        } else {
            self.stats.annotations_rejected += 1;
        }
        created
    }

    fn try_create(&mut self, fixation: &Fixation, analysis: &FixationAnalysis) -> bool {
        if let Some(reason) = self.rejection_reason(analysis) {
            debug!("annotation rejected: {}", reason);
            return false;
        }

        let position = self.mapper.map_coordinates(
            fixation.x * self.screen.width,
            fixation.y * self.screen.height,
        );
        if !position.is_valid {
            debug!("annotation rejected: fixation outside the annotation display");
            return false;
        }

        let window = self
            .validator
            .validate_annotation(position.time_seconds, Some(self.config.default_duration));
        if !window.is_valid {
            debug!(
                "annotation rejected: invalid timing at {:.2}s",
                position.time_seconds
            );
            return false;
        }

        let record = AnnotationRecord::from_analysis(
            window.start_time,
            window.duration,
            Some(position.channel.clone()),
            analysis,
        );
        match self.store.add_annotation(record) {
            Ok(()) => {
                info!(
                    "gaze annotation created: {} at {:.1}s on {}",
                    analysis.suggested_category, window.start_time, position.channel
                );
                true
            }
            Err(e) => {
                error!("annotation store failed: {}", e);
                false
            }
        }
    }

    fn rejection_reason(&self, analysis: &FixationAnalysis) -> Option<&'static str> {
        if analysis.quality_level < self.config.min_quality_threshold {
            Some("quality below threshold")
        } else if !self.config.auto_create {
            Some("auto-creation disabled")
        } else if self.config.require_eeg_context
            && analysis.eeg_context_score < MIN_EEG_CONTEXT_SCORE
        {
            Some("insufficient EEG context")
        } else if analysis.annotation_worthiness < MIN_WORTHINESS {
            Some("worthiness too low")
        } else {
            None
        }
    }
}

impl fmt::Debug for GazeAnnotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GazeAnnotator")
            .field("config", &self.config)
            .field("mapper", &self.mapper)
            .field("validator", &self.validator)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::record::SharedAnnotationStore;
    use crate::error::StoreError;
    use crate::signal::GazeSample;

    fn fixation(duration: f64, stability: f64, confidence: f64) -> Fixation {
        let samples: Vec<GazeSample> = (0..4)
            .map(|i| GazeSample::new(0.5, 0.5, i as f64 * duration / 3.0, confidence))
            .collect();
        Fixation {
            start_time: 0.0,
            end_time: duration,
            x: 0.5,
            y: 0.5,
            duration,
            confidence,
            member_samples: samples,
            dispersion: 0.0,
            stability,
        }
    }

    fn annotator(config: AnnotationConfig) -> (GazeAnnotator, SharedAnnotationStore) {
        let store = SharedAnnotationStore::new();
        let mut annotator =
            GazeAnnotator::new(config, AnalyzerConfig::default(), Box::new(store.clone()));
        annotator.set_display_context(
            vec!["Fp1".into(), "Fp2".into(), "C3".into(), "C4".into()],
            (0.0, 10.0),
            PlotBounds {
                x: 0.0,
                y: 0.0,
                width: 1920.0,
                height: 1080.0,
            },
            270.0,
            100.0,
        );
        (annotator, store)
    }

    struct Broken;

    impl AnnotationStore for Broken {
        fn add_annotation(&mut self, _: AnnotationRecord) -> Result<(), StoreError> {
            Err(StoreError::Rejected("disk full".into()))
        }
    }

    #[test]
    fn uncertain_quality_is_rejected_without_touching_store() {
        let (mut annotator, store) = annotator(AnnotationConfig::default());
        let created = annotator.process_fixation(&fixation(0.2, 0.3, 0.55), None, None);
        assert!(!created);
        assert_eq!(annotator.stats().annotations_rejected, 1);
        assert_eq!(annotator.stats().annotations_created, 0);
        assert_eq!(
            annotator.stats().quality_distribution.get(&QualityLevel::Uncertain),
            Some(&1)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn good_fixation_creates_annotation_at_mapped_position() {
        let (mut annotator, store) = annotator(AnnotationConfig::default());
        assert!(annotator.process_fixation(&fixation(1.5, 0.95, 0.9), Some("C3"), None));
        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!((record.start_time - 5.0).abs() < 1e-9);
        assert_eq!(record.duration, 1.0);
        assert_eq!(record.channel.as_deref(), Some("C3"));
        assert_eq!(record.description, "Needs Review (Gaze)");
        assert_eq!(record.metadata.quality_level, QualityLevel::Medium);
        assert_eq!(annotator.stats().creation_rate(), 1.0);
    }

    #[test]
    fn eeg_context_requirement_and_auto_create_gate() {
        let config = AnnotationConfig {
            require_eeg_context: true,
            ..AnnotationConfig::default()
        };
        let (mut annotator, store) = annotator(config);
        let good = fixation(1.5, 0.95, 0.9);
        assert!(!annotator.process_fixation(&good, None, None));
        let flags = EegContextFlags {
            spike_detected: true,
            ..EegContextFlags::default()
        };
        assert!(annotator.process_fixation(&good, None, Some(&flags)));
        assert_eq!(store.snapshot()[0].description, "Spike (Gaze)");

        annotator.configure(AnnotationConfig {
            auto_create: false,
            ..AnnotationConfig::default()
        });
        assert!(!annotator.process_fixation(&good, None, Some(&flags)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fixation_outside_display_is_rejected() {
        let (mut annotator, store) = annotator(AnnotationConfig::default());
        annotator.set_screen(ScreenSize {
            width: 4000.0,
            height: 1080.0,
        });
        assert!(!annotator.process_fixation(&fixation(1.5, 0.95, 0.9), None, None));
        assert!(store.is_empty());
    }

    #[test]
    fn store_failure_is_counted_not_raised() {
        let mut annotator = GazeAnnotator::new(
            AnnotationConfig::default(),
            AnalyzerConfig::default(),
            Box::new(Broken),
        );
        annotator.set_display_context(
            vec!["Cz".into()],
            (0.0, 10.0),
            PlotBounds::default(),
            600.0,
            100.0,
        );
        annotator.set_screen(ScreenSize {
            width: 800.0,
            height: 600.0,
        });
        assert!(!annotator.process_fixation(&fixation(1.5, 0.95, 0.9), None, None));
        assert_eq!(annotator.stats().annotations_rejected, 1);
    }

    #[test]
    fn trigger_mode_names() {
        assert_eq!(
            "Fixation + Blink".parse::<TriggerMode>().unwrap(),
            TriggerMode::FixationBlink
        );
        assert_eq!(
            "manual_confirm".parse::<TriggerMode>().unwrap(),
            TriggerMode::ManualConfirm
        );
        assert!("gesture".parse::<TriggerMode>().is_err());
        let json = serde_json::to_string(&TriggerMode::FixationOnly).unwrap();
        assert_eq!(json, "\"Fixation Only\"");
    }
}
