use crate::detectors::fixation::Fixation;
use crate::metrics::context::{EegContextAnalysis, PatternType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const HISTORY_LIMIT: usize = 100;

/// Named clinical patterns found in one context analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    pub patterns_detected: Vec<String>,
    pub confidence_scores: Vec<f64>,
    pub max_confidence: f64,
    /// Confidence-weighted relevance of the detected patterns
    pub clinical_relevance: f64,
}

impl PatternReport {
    pub fn pattern_count(&self) -> usize {
        self.patterns_detected.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub time_window: (f64, f64),
    pub channel: String,
    pub patterns: Vec<String>,
    pub significance: f64,
}

/// Maps context analyses onto clinically named patterns and keeps a short history.
#[derive(Debug, Clone, Default)]
pub struct PatternRecognizer {
    history: VecDeque<DetectionRecord>,
}

impl PatternRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recognize_patterns(&mut self, context: &EegContextAnalysis) -> PatternReport {
        let mut patterns = Vec::new();
        let mut scores = Vec::new();
        match context.pattern_type {
            PatternType::Spike if context.confidence > 0.7 => {
                patterns.push("Epileptiform spike".to_string());
                scores.push(context.confidence);
            }
            PatternType::SeizureActivity => {
                patterns.push("Ictal activity".to_string());
                scores.push(context.confidence);
            }
            PatternType::Artifact => {
                patterns.push(format!("Artifact: {}", classify_artifact(context)));
                scores.push(context.confidence * 0.8);
            }
            _ => {}
        }

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(DetectionRecord {
            time_window: context.time_window,
            channel: context.channel.clone(),
            patterns: patterns.clone(),
            significance: context.clinical_significance,
        });

        PatternReport {
            max_confidence: scores.iter().copied().fold(0.0, f64::max),
            clinical_relevance: clinical_relevance(&patterns, &scores),
            patterns_detected: patterns,
            confidence_scores: scores,
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.history.iter()
    }
}

fn classify_artifact(context: &EegContextAnalysis) -> &'static str {
    let bands = &context.frequency_band_powers;
    if bands.beta > 0.4 || bands.gamma > 0.1 {
        "High frequency (muscle/EMG)"
    } else if bands.delta > 0.6 {
        "Low frequency (movement/eye)"
    } else if context.amplitude_stats.z_score_max > 5.0 {
        "High amplitude (electrode)"
    } else {
        "Unspecified"
    }
}

fn clinical_relevance(patterns: &[String], confidences: &[f64]) -> f64 {
    if patterns.is_empty() {
        return 0.0;
    }
    const WEIGHTS: [(&str, f64); 5] = [
        ("spike", 0.9),
        ("seizure", 0.95),
        ("ictal", 0.95),
        ("artifact", 0.2),
        ("normal", 0.1),
    ];
    let mut relevance = 0.0;
    let mut total = 0.0;
    for (pattern, confidence) in patterns.iter().zip(confidences) {
        let lower = pattern.to_lowercase();
        let weight = WEIGHTS
            .iter()
            .find(|(key, _)| lower.contains(key))
            .map(|(_, w)| *w)
            .unwrap_or(0.5);
        relevance += weight * confidence;
        total += confidence;
    }
    relevance / (total + 1e-10)
}

/// Relative weights of the overall confidence components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub fixation_quality: f64,
    pub eeg_significance: f64,
    pub pattern_confidence: f64,
    pub morphology_score: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            fixation_quality: 0.3,
            eeg_significance: 0.4,
            pattern_confidence: 0.2,
            morphology_score: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub overall_confidence: f64,
    pub fixation_quality: f64,
    pub eeg_significance: f64,
    pub pattern_confidence: f64,
    pub morphology_score: f64,
    /// Letter grade A..F
    pub confidence_grade: char,
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    pub fn calculate_confidence(
        &self,
        fixation: &Fixation,
        context: &EegContextAnalysis,
        patterns: &PatternReport,
    ) -> ConfidenceReport {
        let fixation_quality = fixation_quality(fixation);
        let w = &self.weights;
        let overall = w.fixation_quality * fixation_quality
            + w.eeg_significance * context.clinical_significance
            + w.pattern_confidence * patterns.max_confidence
            + w.morphology_score * context.morphology_score;
        ConfidenceReport {
            overall_confidence: overall,
            fixation_quality,
            eeg_significance: context.clinical_significance,
            pattern_confidence: patterns.max_confidence,
            morphology_score: context.morphology_score,
            confidence_grade: grade(overall),
        }
    }
}

fn fixation_quality(fixation: &Fixation) -> f64 {
    let duration_score = (fixation.duration / 3.0).min(1.0);
    (0.4 * duration_score + 0.3 * fixation.stability + 0.3 * fixation.confidence).clamp(0.0, 1.0)
}

fn grade(confidence: f64) -> char {
    match confidence {
        c if c >= 0.9 => 'A',
        c if c >= 0.8 => 'B',
        c if c >= 0.7 => 'C',
        c if c >= 0.6 => 'D',
        _ => 'F',
    }
}
