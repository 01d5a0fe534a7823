use crate::annotate::analysis::{AnnotationCategory, FixationAnalysis, QualityLevel};
use crate::error::StoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex};

pub const PROCESSING_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMetadata {
    pub gaze_generated: bool,
    pub fixation_duration: f64,
    pub fixation_stability: f64,
    pub confidence_score: f64,
    pub eeg_context_score: f64,
    pub quality_level: QualityLevel,
    /// RFC 3339 wall-clock time of the analysis
    pub analysis_timestamp: String,
    pub processing_version: String,
}

/// Annotation handed to the external annotation manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub start_time: f64,
    pub duration: f64,
    pub description: String,
    /// `#RRGGBB`
    pub color: String,
    pub timestamp: String,
    pub channel: Option<String>,
    pub notes: String,
    pub metadata: AnnotationMetadata,
}

impl AnnotationRecord {
    /// Build a record carrying the full analysis in its metadata.
    pub fn from_analysis(
        start_time: f64,
        duration: f64,
        channel: Option<String>,
        analysis: &FixationAnalysis,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        let category = analysis.suggested_category;
        Self {
            start_time,
            duration,
            description: format!("{} (Gaze)", category),
            color: category.color().to_string(),
            timestamp: now.clone(),
            channel,
            notes: format!(
                "Quality: {}, Confidence: {:.2}, Worthiness: {:.2}",
                analysis.quality_level, analysis.confidence, analysis.annotation_worthiness
            ),
            metadata: AnnotationMetadata {
                gaze_generated: true,
                fixation_duration: analysis.duration,
                fixation_stability: analysis.stability,
                confidence_score: analysis.confidence,
                eeg_context_score: analysis.eeg_context_score,
                quality_level: analysis.quality_level,
                analysis_timestamp: now,
                processing_version: PROCESSING_VERSION.to_string(),
            },
        }
    }

    pub fn category(&self) -> Option<AnnotationCategory> {
        self.description
            .strip_suffix(" (Gaze)")
            .and_then(|name| name.parse().ok())
    }
}

/// Sink for created annotations.
///
/// Stores that only expose a raw list implement [`AnnotationStore::annotations`]
/// and inherit the append fallback; stores implementing neither fail closed.
pub trait AnnotationStore {
    fn add_annotation(&mut self, record: AnnotationRecord) -> Result<(), StoreError> {
        match self.annotations() {
            Some(list) => {
                list.push(record);
                Ok(())
            }
            None => Err(StoreError::Unsupported),
        }
    }

    fn annotations(&mut self) -> Option<&mut Vec<AnnotationRecord>> {
        None
    }
}

impl AnnotationStore for Vec<AnnotationRecord> {
    fn annotations(&mut self) -> Option<&mut Vec<AnnotationRecord>> {
        Some(self)
    }
}

impl<T: AnnotationStore + ?Sized> AnnotationStore for Box<T> {
    fn add_annotation(&mut self, record: AnnotationRecord) -> Result<(), StoreError> {
        (**self).add_annotation(record)
    }

    fn annotations(&mut self) -> Option<&mut Vec<AnnotationRecord>> {
        (**self).annotations()
    }
}

/// Clonable handle onto one annotation list, readable while the pipeline owns a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedAnnotationStore {
    inner: Arc<Mutex<Vec<AnnotationRecord>>>,
}

impl SharedAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<AnnotationRecord> {
        match self.inner.lock() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnnotationStore for SharedAnnotationStore {
    fn add_annotation(&mut self, record: AnnotationRecord) -> Result<(), StoreError> {
        let mut list = self
            .inner
            .lock()
            .map_err(|_| StoreError::Rejected("annotation list poisoned".into()))?;
        list.push(record);
        Ok(())
    }
}

/// Writes each annotation as one JSON line.
#[derive(Debug)]
pub struct JsonLinesStore<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesStore<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AnnotationStore for JsonLinesStore<W> {
    fn add_annotation(&mut self, record: AnnotationRecord) -> Result<(), StoreError> {
        let line =
            serde_json::to_string(&record).map_err(|e| StoreError::Rejected(e.to_string()))?;
        writeln!(self.writer, "{}", line).map_err(|e| StoreError::Rejected(e.to_string()))?;
        self.written += 1;
        Ok(())
    }
}
