use crate::detectors::fixation::Fixation;
use crate::error::GazeError;
use crate::metrics::context::EegContextFlags;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard 10-20 scalp positions weighted higher for relevance.
pub const TEN_TWENTY_CHANNELS: [&str; 16] = [
    "Fp1", "Fp2", "F3", "F4", "C3", "C4", "P3", "P4", "O1", "O2", "F7", "F8", "T3", "T4", "T5",
    "T6",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationCategory {
    Spike,
    Artifact,
    #[serde(rename = "Seizure Activity")]
    Seizure,
    #[serde(rename = "Abnormal Activity")]
    Abnormal,
    #[serde(rename = "Normal Variant")]
    Normal,
    #[serde(rename = "Needs Review")]
    Review,
    Custom,
}

impl AnnotationCategory {
    pub const ALL: [AnnotationCategory; 7] = [
        AnnotationCategory::Spike,
        AnnotationCategory::Artifact,
        AnnotationCategory::Seizure,
        AnnotationCategory::Abnormal,
        AnnotationCategory::Normal,
        AnnotationCategory::Review,
        AnnotationCategory::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationCategory::Spike => "Spike",
            AnnotationCategory::Artifact => "Artifact",
            AnnotationCategory::Seizure => "Seizure Activity",
            AnnotationCategory::Abnormal => "Abnormal Activity",
            AnnotationCategory::Normal => "Normal Variant",
            AnnotationCategory::Review => "Needs Review",
            AnnotationCategory::Custom => "Custom",
        }
    }

    /// Display color as `#RRGGBB`.
    pub fn color(&self) -> &'static str {
        match self {
            AnnotationCategory::Spike => "#FF4444",
            AnnotationCategory::Seizure => "#FF0000",
            AnnotationCategory::Artifact => "#FFAA00",
            AnnotationCategory::Abnormal => "#FF6600",
            AnnotationCategory::Normal => "#00AA00",
            AnnotationCategory::Review => "#FFFF00",
            AnnotationCategory::Custom => "#AA00AA",
        }
    }
}

impl fmt::Display for AnnotationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationCategory {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AnnotationCategory::ALL
            .into_iter()
            .find(|c| {
                c.as_str().eq_ignore_ascii_case(wanted)
                    || format!("{:?}", c).eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| GazeError::UnknownCategory(s.to_string()))
    }
}

/// Ordered so that `Uncertain < Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum QualityLevel {
    #[default]
    Uncertain,
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Uncertain => "Uncertain",
            QualityLevel::Low => "Low",
            QualityLevel::Medium => "Medium",
            QualityLevel::High => "High",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uncertain" => Ok(QualityLevel::Uncertain),
            "low" => Ok(QualityLevel::Low),
            "medium" => Ok(QualityLevel::Medium),
            "high" => Ok(QualityLevel::High),
            _ => Err(GazeError::UnknownQuality(s.to_string())),
        }
    }
}

/// Worthiness weights and the floor of the LOW quality tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub duration_weight: f64,
    pub stability_weight: f64,
    pub confidence_weight: f64,
    pub eeg_weight: f64,
    pub min_fixation_duration: f64,
    pub min_stability: f64,
    pub min_confidence: f64,
    /// Channels scored as high value; defaults to the 10-20 montage
    pub high_value_channels: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            duration_weight: 0.25,
            stability_weight: 0.30,
            confidence_weight: 0.25,
            eeg_weight: 0.20,
            min_fixation_duration: 0.3,
            min_stability: 0.7,
            min_confidence: 0.5,
            high_value_channels: TEN_TWENTY_CHANNELS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixationAnalysis {
    pub duration: f64,
    pub stability: f64,
    pub confidence: f64,
    pub eeg_context_score: f64,
    pub channel_relevance: f64,
    pub annotation_worthiness: f64,
    pub suggested_category: AnnotationCategory,
    pub quality_level: QualityLevel,
}

/// Scores how worth annotating a fixation is.
#[derive(Debug, Clone, Default)]
pub struct FixationAnalyzer {
    config: AnalyzerConfig,
}

impl FixationAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn analyze_fixation(
        &self,
        fixation: &Fixation,
        channel: Option<&str>,
        context: Option<&EegContextFlags>,
    ) -> FixationAnalysis {
        let eeg_context_score = context.map(eeg_context_score).unwrap_or(0.5);
        let channel_relevance = self.channel_relevance(channel, context);
        let annotation_worthiness = self.worthiness(fixation, eeg_context_score);
        let suggested_category = suggest_category(context, annotation_worthiness);
        let quality_level = self.quality(fixation, annotation_worthiness);
        debug!(
            "fixation analysis: worthiness={:.2} quality={}",
            annotation_worthiness, quality_level
        );
        FixationAnalysis {
            duration: fixation.duration,
            stability: fixation.stability,
            confidence: fixation.confidence,
            eeg_context_score,
            channel_relevance,
            annotation_worthiness,
            suggested_category,
            quality_level,
        }
    }

    fn worthiness(&self, fixation: &Fixation, eeg_score: f64) -> f64 {
        let c = &self.config;
        let duration_score = (fixation.duration / 3.0).min(1.0);
        c.duration_weight * duration_score
            + c.stability_weight * fixation.stability
            + c.confidence_weight * fixation.confidence
            + c.eeg_weight * eeg_score
    }

    fn channel_relevance(&self, channel: Option<&str>, context: Option<&EegContextFlags>) -> f64 {
        let Some(channel) = channel.filter(|c| !c.is_empty()) else {
            return 0.5;
        };
        let mut score: f64 = if self.config.high_value_channels.iter().any(|c| c == channel) {
            0.8
        } else {
            0.6
        };
        if context.map_or(false, |ctx| ctx.active_channels.iter().any(|c| c == channel)) {
            score += 0.2;
        }
        score.min(1.0)
    }

    fn quality(&self, fixation: &Fixation, worthiness: f64) -> QualityLevel {
        let (d, s, c) = (fixation.duration, fixation.stability, fixation.confidence);
        if d >= 1.0 && s >= 0.8 && c >= 0.8 && worthiness >= 0.8 {
            QualityLevel::High
        } else if d >= 0.5 && s >= 0.6 && c >= 0.6 && worthiness >= 0.6 {
            QualityLevel::Medium
        } else if d >= self.config.min_fixation_duration
            && s >= self.config.min_stability
            && c >= self.config.min_confidence
        {
            QualityLevel::Low
        } else {
            QualityLevel::Uncertain
        }
    }
}

fn eeg_context_score(ctx: &EegContextFlags) -> f64 {
    let mut score: f64 = 0.5;
    if ctx.spike_detected {
        score += 0.3;
    }
    if ctx.amplitude_z_score.abs() > 2.0 {
        score += 0.2;
    }
    if ctx.frequency_anomaly {
        score += 0.2;
    }
    if ctx.artifact_present {
        score += 0.1;
    }
    score.min(1.0)
}

/// Explicit signal flags win; otherwise amplitude, then worthiness buckets.
fn suggest_category(context: Option<&EegContextFlags>, worthiness: f64) -> AnnotationCategory {
    if let Some(ctx) = context {
        if ctx.spike_detected {
            return AnnotationCategory::Spike;
        }
        if ctx.seizure_activity {
            return AnnotationCategory::Seizure;
        }
        if ctx.artifact_present {
            return AnnotationCategory::Artifact;
        }
        let z = ctx.amplitude_z_score.abs();
        if z > 2.5 {
            return AnnotationCategory::Abnormal;
        }
        if z > 1.5 {
            return AnnotationCategory::Normal;
        }
    }
    if worthiness > 0.8 {
        AnnotationCategory::Abnormal
    } else if worthiness > 0.6 {
        AnnotationCategory::Review
    } else {
        AnnotationCategory::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::GazeSample;

    fn fixation(duration: f64, jitter: f64, confidence: f64) -> Fixation {
        let n = 20;
        let samples: Vec<GazeSample> = (0..n)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                GazeSample::new(
                    0.5 + sign * jitter,
                    0.5,
                    duration * i as f64 / (n - 1) as f64,
                    confidence,
                )
            })
            .collect();
        Fixation::from_samples(&samples).unwrap()
    }

    #[test]
    fn worthiness_is_weighted_sum() {
        let analyzer = FixationAnalyzer::default();
        let fix = fixation(1.5, 0.0, 0.9);
        let analysis = analyzer.analyze_fixation(&fix, None, None);
        let expected = 0.25 * 0.5 + 0.30 * 1.0 + 0.25 * 0.9 + 0.20 * 0.5;
        assert!((analysis.annotation_worthiness - expected).abs() < 1e-9);
        assert_eq!(analysis.eeg_context_score, 0.5);
        assert_eq!(analysis.channel_relevance, 0.5);
        assert_eq!(analysis.suggested_category, AnnotationCategory::Review);
        assert_eq!(analysis.quality_level, QualityLevel::Medium);
    }

    #[test]
    fn spike_flag_wins_category() {
        let analyzer = FixationAnalyzer::default();
        let ctx = EegContextFlags {
            spike_detected: true,
            artifact_present: true,
            amplitude_z_score: 4.0,
            active_channels: vec!["C3".into()],
            ..EegContextFlags::default()
        };
        let analysis = analyzer.analyze_fixation(&fixation(2.0, 0.0, 0.95), Some("C3"), Some(&ctx));
        assert_eq!(analysis.suggested_category, AnnotationCategory::Spike);
        assert_eq!(analysis.eeg_context_score, 1.0);
        assert_eq!(analysis.channel_relevance, 1.0);
    }

    #[test]
    fn amplitude_buckets_before_worthiness() {
        let analyzer = FixationAnalyzer::default();
        let fix = fixation(3.0, 0.0, 1.0);
        let abnormal = EegContextFlags {
            amplitude_z_score: -2.6,
            ..EegContextFlags::default()
        };
        let mild = EegContextFlags {
            amplitude_z_score: 1.6,
            ..EegContextFlags::default()
        };
        let quiet = EegContextFlags::default();
        let cat = |ctx: &EegContextFlags| analyzer.analyze_fixation(&fix, None, Some(ctx)).suggested_category;
        assert_eq!(cat(&abnormal), AnnotationCategory::Abnormal);
        assert_eq!(cat(&mild), AnnotationCategory::Normal);
        // 0.25 + 0.30 + 0.25 + 0.10 = 0.90
        assert_eq!(cat(&quiet), AnnotationCategory::Abnormal);
    }

    #[test]
    fn channel_relevance_uses_configured_set() {
        let analyzer = FixationAnalyzer::default();
        let fix = fixation(1.0, 0.0, 0.9);
        assert_eq!(analyzer.analyze_fixation(&fix, Some("Cz"), None).channel_relevance, 0.6);
        assert_eq!(analyzer.analyze_fixation(&fix, Some("O1"), None).channel_relevance, 0.8);
        let custom = FixationAnalyzer::new(AnalyzerConfig {
            high_value_channels: vec!["Cz".into()],
            ..AnalyzerConfig::default()
        });
        assert_eq!(custom.analyze_fixation(&fix, Some("Cz"), None).channel_relevance, 0.8);

        let flags = EegContextFlags {
            active_channels: vec!["O1".into(), "Cz".into()],
            ..EegContextFlags::default()
        };
        let boosted = analyzer.analyze_fixation(&fix, Some("O1"), Some(&flags));
        assert_eq!(boosted.channel_relevance, 1.0);
        let active = analyzer.analyze_fixation(&fix, Some("Cz"), Some(&flags));
        assert!((active.channel_relevance - 0.8).abs() < 1e-12);
    }

    #[test]
    fn quality_tiers() {
        let analyzer = FixationAnalyzer::default();
        let high = analyzer.analyze_fixation(&fixation(3.0, 0.0, 1.0), None, None);
        assert_eq!(high.quality_level, QualityLevel::High);
        let low = analyzer.analyze_fixation(&fixation(0.4, 0.0, 0.55), None, None);
        assert_eq!(low.quality_level, QualityLevel::Low);
        let uncertain = analyzer.analyze_fixation(&fixation(0.2, 0.02, 0.6), None, None);
        assert_eq!(uncertain.quality_level, QualityLevel::Uncertain);
        assert!(QualityLevel::Uncertain < QualityLevel::Low);
        assert!(QualityLevel::Medium < QualityLevel::High);
    }

    #[test]
    fn category_names_parse() {
        assert_eq!(
            "needs review".parse::<AnnotationCategory>(),
            Ok(AnnotationCategory::Review)
        );
        assert_eq!("seizure".parse::<AnnotationCategory>(), Ok(AnnotationCategory::Seizure));
        assert!("bogus".parse::<AnnotationCategory>().is_err());
        assert_eq!("HIGH".parse::<QualityLevel>(), Ok(QualityLevel::High));
    }
}
