use crate::buffer::{GazeDataBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::error::{GazeError, GazeResult};
use crate::signal::GazeSample;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Timestamps closer than this are treated as equal in window bounds.
const TIME_EPSILON: f64 = 1e-9;

/// Interchangeable fixation detection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FixationAlgorithm {
    /// Velocity threshold
    #[default]
    #[serde(rename = "I-VT", alias = "ivt")]
    Ivt,
    /// Dispersion threshold
    #[serde(rename = "I-DT", alias = "idt")]
    Idt,
    /// Simplified minimum spanning tree
    #[serde(rename = "I-MST", alias = "imst")]
    Imst,
}

impl FixationAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixationAlgorithm::Ivt => "I-VT",
            FixationAlgorithm::Idt => "I-DT",
            FixationAlgorithm::Imst => "I-MST",
        }
    }

    /// I-DT and I-MST report a whole qualifying window per detection.
    pub fn is_windowed(&self) -> bool {
        matches!(self, FixationAlgorithm::Idt | FixationAlgorithm::Imst)
    }

    fn detect(
        &self,
        buffer: &GazeDataBuffer,
        run: &mut CandidateRun,
        sample: GazeSample,
        config: &DetectionConfig,
    ) -> Option<Fixation> {
        match self {
            FixationAlgorithm::Ivt => detect_ivt(buffer, run, sample, config),
            FixationAlgorithm::Idt => detect_idt(buffer, config),
            FixationAlgorithm::Imst => detect_imst(buffer, sample, config),
        }
    }
}

impl fmt::Display for FixationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixationAlgorithm {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "I-VT" | "IVT" => Ok(FixationAlgorithm::Ivt),
            "I-DT" | "IDT" => Ok(FixationAlgorithm::Idt),
            "I-MST" | "IMST" => Ok(FixationAlgorithm::Imst),
            _ => Err(GazeError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Screen geometry the pixel thresholds are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

impl ScreenSize {
    pub fn shorter_side(&self) -> f64 {
        self.width.min(self.height)
    }
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

/// Fixation detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub algorithm: FixationAlgorithm,
    /// I-VT velocity ceiling (pixels/second).
    #[serde(alias = "spatial_accuracy")]
    pub velocity_threshold: f64,
    /// I-DT bounding-box diagonal ceiling (pixels).
    pub dispersion_threshold: f64,
    /// I-DT lookback window (seconds).
    #[serde(alias = "fixation_duration")]
    pub duration_threshold: f64,
    /// I-MST mean pairwise distance ceiling (pixels).
    pub mst_threshold: f64,
    /// Shortest window span the I-DT and I-MST checks accept (seconds).
    pub min_fixation_duration: f64,
    /// A candidate run reaching this span is closed immediately (seconds).
    pub max_fixation_duration: f64,
    /// Samples below this tracker confidence are not fed to the detector.
    pub confidence_threshold: f64,
    /// Trailing moving-average length used for noise reduction.
    pub smoothing_window: usize,
    #[serde(alias = "enable_smoothing")]
    pub noise_reduction: bool,
    /// Geometry used to convert pixel thresholds into normalized units.
    pub reference_screen: ScreenSize,
    /// Completed fixations older than this are evicted from the log (seconds).
    pub max_fixation_age: f64,
    pub buffer_capacity: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            algorithm: FixationAlgorithm::Ivt,
            velocity_threshold: 30.0,
            dispersion_threshold: 50.0,
            duration_threshold: 0.1,
            mst_threshold: 25.0,
            min_fixation_duration: 0.1,
            max_fixation_duration: 5.0,
            confidence_threshold: 0.7,
            smoothing_window: 3,
            noise_reduction: true,
            reference_screen: ScreenSize::default(),
            max_fixation_age: 300.0,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> GazeResult<()> {
        let positive = [
            ("velocity_threshold", self.velocity_threshold),
            ("dispersion_threshold", self.dispersion_threshold),
            ("duration_threshold", self.duration_threshold),
            ("mst_threshold", self.mst_threshold),
            ("max_fixation_duration", self.max_fixation_duration),
            ("max_fixation_age", self.max_fixation_age),
            ("reference_screen.width", self.reference_screen.width),
            ("reference_screen.height", self.reference_screen.height),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(GazeError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.min_fixation_duration < 0.0 || self.min_fixation_duration > self.max_fixation_duration
        {
            return Err(GazeError::InvalidConfig(format!(
                "min_fixation_duration {} outside [0, {}]",
                self.min_fixation_duration, self.max_fixation_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(GazeError::InvalidConfig(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.smoothing_window == 0 || self.buffer_capacity < 2 {
            return Err(GazeError::InvalidConfig(
                "smoothing_window must be >= 1 and buffer_capacity >= 2".into(),
            ));
        }
        Ok(())
    }
}

/// A completed fixation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub start_time: f64,
    pub end_time: f64,
    /// Mean normalized x of the member samples
    pub x: f64,
    /// Mean normalized y of the member samples
    pub y: f64,
    pub duration: f64,
    /// Mean member confidence
    pub confidence: f64,
    pub member_samples: Vec<GazeSample>,
    /// Bounding-box diagonal in normalized units
    pub dispersion: f64,
    /// 1 / (1 + 1000 * positional variance), in [0, 1]
    pub stability: f64,
}

impl Fixation {
    /// Build a fixation from chronologically ordered samples.
    pub fn from_samples(samples: &[GazeSample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;
        let n = samples.len() as f64;
        let x = samples.iter().map(|s| s.x).sum::<f64>() / n;
        let y = samples.iter().map(|s| s.y).sum::<f64>() / n;
        let confidence = samples.iter().map(|s| s.confidence).sum::<f64>() / n;
        Some(Self {
            start_time: first.timestamp,
            end_time: last.timestamp,
            x,
            y,
            duration: last.timestamp - first.timestamp,
            confidence,
            member_samples: samples.to_vec(),
            dispersion: dispersion(samples),
            stability: stability(samples),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.duration > 0.1 && self.confidence > 0.5 && self.member_samples.len() >= 3
    }

    /// Midpoint between start and end.
    pub fn center_time(&self) -> f64 {
        self.start_time + self.duration / 2.0
    }
}

/// Running detector counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub points_processed: u64,
    pub fixations_detected: u64,
    pub average_fixation_duration: f64,
    pub average_latency_ms: f64,
    pub last_latency_ms: f64,
}

/// Detector snapshot with buffer and log sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStatistics {
    #[serde(flatten)]
    pub counters: DetectorStats,
    pub algorithm: FixationAlgorithm,
    pub buffer_size: usize,
    pub completed_fixations: usize,
    pub current_candidates: usize,
}

/// Working set of the active algorithm.
#[derive(Debug, Clone, Default)]
struct CandidateRun {
    samples: Vec<GazeSample>,
}

impl CandidateRun {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn span(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    fn take(&mut self) -> Vec<GazeSample> {
        std::mem::take(&mut self.samples)
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Stateful fixation detector consuming one sample per call.
#[derive(Debug, Clone)]
pub struct FixationDetector {
    config: DetectionConfig,
    buffer: GazeDataBuffer,
    run: CandidateRun,
    completed: VecDeque<Fixation>,
    /// End of the last reported window fixation; overlapping windows are dropped.
    last_window_end: Option<f64>,
    stats: DetectorStats,
}

impl FixationDetector {
    pub fn new(config: DetectionConfig) -> GazeResult<Self> {
        config.validate()?;
        info!(
            "fixation detector initialized with {} algorithm",
            config.algorithm
        );
        Ok(Self {
            buffer: GazeDataBuffer::new(config.buffer_capacity),
            config,
            run: CandidateRun::default(),
            completed: VecDeque::new(),
            last_window_end: None,
            stats: DetectorStats::default(),
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn buffer(&self) -> &GazeDataBuffer {
        &self.buffer
    }

    /// Replace the configuration wholesale; the candidate run is dropped when the
    /// algorithm changes.
    pub fn update_config(&mut self, config: DetectionConfig) -> GazeResult<()> {
        config.validate()?;
        if config.algorithm != self.config.algorithm {
            self.run.clear();
            self.last_window_end = None;
        }
        if config.buffer_capacity != self.buffer.capacity() {
            let mut buffer = GazeDataBuffer::new(config.buffer_capacity);
            for sample in self.buffer.recent_by_count(config.buffer_capacity) {
                buffer.add(sample);
            }
            self.buffer = buffer;
        }
        info!("detection configuration updated to {}", config.algorithm);
        self.config = config;
        Ok(())
    }

    /// Only the reference geometry changes; the run is kept.
    pub fn set_reference_screen(&mut self, screen: ScreenSize) {
        if screen.width > 0.0 && screen.height > 0.0 {
            self.config.reference_screen = screen;
        }
    }

    /// Feed one sample; returns a fixation when the algorithm closes a valid one.
    pub fn process_gaze_point(&mut self, sample: GazeSample) -> Option<Fixation> {
        let started = Instant::now();
        self.buffer.add(sample);
        self.stats.points_processed += 1;

        let current = if self.config.noise_reduction {
            self.smooth(sample)
        } else {
            sample
        };
        let mut fixation =
            self.config
                .algorithm
                .detect(&self.buffer, &mut self.run, current, &self.config);
        if fixation.is_none() && self.run.span() >= self.config.max_fixation_duration {
            fixation = Fixation::from_samples(&self.run.take());
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let n = self.stats.points_processed as f64;
        self.stats.last_latency_ms = elapsed_ms;
        self.stats.average_latency_ms += (elapsed_ms - self.stats.average_latency_ms) / n;

        let fixation = fixation.filter(Fixation::is_valid)?;
        if self.config.algorithm.is_windowed() {
            if self
                .last_window_end
                .is_some_and(|end| fixation.start_time <= end)
            {
                return None;
            }
            self.last_window_end = Some(fixation.end_time);
        }
        self.record(fixation.clone(), sample.timestamp);
        Some(fixation)
    }

    /// Close the current candidate run, if it forms a valid fixation.
    pub fn flush(&mut self) -> Option<Fixation> {
        let samples = self.run.take();
        let fixation = Fixation::from_samples(&samples).filter(Fixation::is_valid)?;
        let newest = self.buffer.latest().map(|s| s.timestamp).unwrap_or(fixation.end_time);
        self.record(fixation.clone(), newest);
        Some(fixation)
    }

    fn record(&mut self, fixation: Fixation, newest: f64) {
        debug!(
            "fixation detected: duration={:.2}s position=({:.3}, {:.3})",
            fixation.duration, fixation.x, fixation.y
        );
        self.stats.fixations_detected += 1;
        let n = self.stats.fixations_detected as f64;
        self.stats.average_fixation_duration +=
            (fixation.duration - self.stats.average_fixation_duration) / n;
        self.completed.push_back(fixation);
        self.evict_older_than(newest - self.config.max_fixation_age);
    }

    fn smooth(&self, sample: GazeSample) -> GazeSample {
        let window = self.config.smoothing_window;
        if self.buffer.len() < window {
            return sample;
        }
        let mut points = self.buffer.slice(-(window as i64), -1);
        points.push(sample);
        let n = points.len() as f64;
        GazeSample {
            x: points.iter().map(|p| p.x).sum::<f64>() / n,
            y: points.iter().map(|p| p.y).sum::<f64>() / n,
            confidence: points.iter().map(|p| p.confidence).sum::<f64>() / n,
            ..sample
        }
    }

    /// Fixations that ended within `duration` seconds of the newest sample.
    pub fn recent_fixations(&self, duration: f64) -> Vec<Fixation> {
        let Some(newest) = self.buffer.latest() else {
            return Vec::new();
        };
        let cutoff = newest.timestamp - duration;
        self.completed
            .iter()
            .filter(|f| f.end_time >= cutoff)
            .cloned()
            .collect()
    }

    /// Drop completed fixations older than `max_age` relative to the newest sample.
    pub fn clear_old_fixations(&mut self, max_age: f64) {
        if let Some(newest) = self.buffer.latest().map(|s| s.timestamp) {
            self.evict_older_than(newest - max_age);
        }
    }

    fn evict_older_than(&mut self, cutoff: f64) {
        self.completed.retain(|f| f.end_time >= cutoff);
    }

    pub fn completed_fixations(&self) -> impl Iterator<Item = &Fixation> {
        self.completed.iter()
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    pub fn statistics(&self) -> DetectorStatistics {
        DetectorStatistics {
            counters: self.stats.clone(),
            algorithm: self.config.algorithm,
            buffer_size: self.buffer.len(),
            completed_fixations: self.completed.len(),
            current_candidates: self.run.len(),
        }
    }

    /// Drop the candidate run only; buffer, log and counters survive.
    pub fn reset_transient(&mut self) {
        self.run.clear();
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.run.clear();
        self.completed.clear();
        self.last_window_end = None;
        self.stats = DetectorStats::default();
    }
}

fn detect_ivt(
    buffer: &GazeDataBuffer,
    run: &mut CandidateRun,
    sample: GazeSample,
    config: &DetectionConfig,
) -> Option<Fixation> {
    if buffer.len() < 2 {
        return None;
    }
    let previous = *buffer.slice(-2, -1).first()?;
    let dt = sample.timestamp - previous.timestamp;
    if dt.is_nan() || dt <= 0.0 {
        return None;
    }
    let screen = config.reference_screen;
    let dx = (sample.x - previous.x) * screen.width;
    let dy = (sample.y - previous.y) * screen.height;
    let velocity = dx.hypot(dy) / dt;

    if velocity < config.velocity_threshold {
        if run.is_empty() {
            run.samples.push(previous);
        }
        run.samples.push(sample);
        None
    } else if run.len() >= 3 {
        Fixation::from_samples(&run.take())
    } else {
        run.clear();
        None
    }
}

fn detect_idt(buffer: &GazeDataBuffer, config: &DetectionConfig) -> Option<Fixation> {
    let window = buffer.recent_by_duration(config.duration_threshold + TIME_EPSILON);
    let limit = config.dispersion_threshold / config.reference_screen.shorter_side();
    let qualifies = window.len() >= 3 && dispersion(&window) < limit;
    finalize_window(&window, qualifies, config)
}

fn detect_imst(
    buffer: &GazeDataBuffer,
    sample: GazeSample,
    config: &DetectionConfig,
) -> Option<Fixation> {
    let mut window = buffer.slice(-10, -1);
    window.push(sample);
    if window.len() < 5 {
        return None;
    }
    let limit = config.mst_threshold / config.reference_screen.shorter_side();
    let qualifies = mean_pairwise_distance(&window).map_or(false, |d| d < limit);
    finalize_window(&window, qualifies, config)
}

/// A qualifying window long enough to count becomes the fixation itself.
fn finalize_window(
    window: &[GazeSample],
    qualifies: bool,
    config: &DetectionConfig,
) -> Option<Fixation> {
    if qualifies && window_span(window) + TIME_EPSILON >= config.min_fixation_duration {
        Fixation::from_samples(window)
    } else {
        None
    }
}

fn window_span(window: &[GazeSample]) -> f64 {
    match (window.first(), window.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0.0,
    }
}

/// Bounding-box diagonal of the samples in normalized units.
pub fn dispersion(samples: &[GazeSample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for s in samples {
        min_x = min_x.min(s.x);
        max_x = max_x.max(s.x);
        min_y = min_y.min(s.y);
        max_y = max_y.max(s.y);
    }
    (max_x - min_x).hypot(max_y - min_y)
}

fn stability(samples: &[GazeSample]) -> f64 {
    if samples.len() < 3 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mx = samples.iter().map(|s| s.x).sum::<f64>() / n;
    let my = samples.iter().map(|s| s.y).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|s| (s.x - mx).powi(2) + (s.y - my).powi(2))
        .sum::<f64>()
        / n;
    (1.0 / (1.0 + variance * 1000.0)).clamp(0.0, 1.0)
}

fn mean_pairwise_distance(samples: &[GazeSample]) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    for (i, a) in samples.iter().enumerate() {
        for b in &samples[i + 1..] {
            total += (a.x - b.x).hypot(a.y - b.y);
            count += 1;
        }
    }
    (count > 0).then(|| total / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jittered(start: f64, n: usize, cx: f64, cy: f64, amp: f64) -> Vec<GazeSample> {
        (0..n)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                GazeSample::new(cx + sign * amp, cy - sign * amp, start + i as f64 * 0.05, 0.9)
            })
            .collect()
    }

    fn saccade(t: f64) -> GazeSample {
        GazeSample::new(0.95, 0.05, t, 0.9)
    }

    fn ivt_config(velocity_threshold: f64) -> DetectionConfig {
        DetectionConfig {
            velocity_threshold,
            noise_reduction: false,
            ..DetectionConfig::default()
        }
    }

    fn run_all(detector: &mut FixationDetector, samples: &[GazeSample]) -> Vec<Fixation> {
        samples
            .iter()
            .filter_map(|s| detector.process_gaze_point(*s))
            .collect()
    }

    #[test]
    fn ivt_single_dwell_yields_one_fixation() {
        let mut detector = FixationDetector::new(ivt_config(200.0)).unwrap();
        let mut samples = jittered(0.0, 20, 0.5, 0.5, 0.001);
        samples.push(saccade(1.0));
        let fixations = run_all(&mut detector, &samples);
        assert_eq!(fixations.len(), 1);
        let fixation = &fixations[0];
        assert!((fixation.duration - 0.95).abs() < 1e-9);
        assert_eq!(fixation.member_samples.len(), 20);
        assert!((fixation.x - 0.5).abs() < 1e-3);
        assert!((fixation.confidence - 0.9).abs() < 1e-9);
        assert!(fixation.stability > 0.99);
        assert!(fixation.is_valid());
        assert_eq!(detector.stats().fixations_detected, 1);
        assert_eq!(detector.completed_fixations().count(), 1);
    }

    #[test]
    fn ivt_non_positive_dt_leaves_run_untouched() {
        let mut detector = FixationDetector::new(ivt_config(200.0)).unwrap();
        run_all(&mut detector, &jittered(0.0, 4, 0.5, 0.5, 0.0005));
        assert_eq!(detector.statistics().current_candidates, 4);
        let repeat = GazeSample::new(0.9, 0.9, 0.15, 0.9);
        assert!(detector.process_gaze_point(repeat).is_none());
        assert_eq!(detector.statistics().current_candidates, 4);
    }

    #[test]
    fn short_runs_are_discarded() {
        let mut detector = FixationDetector::new(ivt_config(200.0)).unwrap();
        let mut samples = jittered(0.0, 2, 0.5, 0.5, 0.0);
        samples.push(saccade(0.1));
        assert!(run_all(&mut detector, &samples).is_empty());
        assert_eq!(detector.statistics().current_candidates, 0);
    }

    #[test]
    fn low_confidence_runs_are_not_surfaced() {
        let mut detector = FixationDetector::new(ivt_config(200.0)).unwrap();
        let mut samples: Vec<GazeSample> = jittered(0.0, 10, 0.5, 0.5, 0.0)
            .into_iter()
            .map(|s| GazeSample { confidence: 0.4, ..s })
            .collect();
        samples.push(saccade(0.5));
        assert!(run_all(&mut detector, &samples).is_empty());
        assert_eq!(detector.stats().fixations_detected, 0);
    }

    #[test]
    fn looser_velocity_threshold_never_finds_fewer() {
        let mut samples = Vec::new();
        let mut t = 0.0;
        let amps = [0.0002, 0.0006, 0.0012, 0.003];
        for (i, amp) in amps.iter().enumerate() {
            let cx = 0.2 + 0.2 * i as f64;
            let dwell = jittered(t, 12, cx, 0.5, *amp);
            t += 12.0 * 0.05;
            samples.extend(dwell);
            samples.push(GazeSample::new(cx + 0.1, 0.1, t, 0.9));
            t += 0.05;
        }
        let mut previous = 0;
        for threshold in [10.0, 30.0, 60.0, 120.0, 250.0, 500.0] {
            let mut detector = FixationDetector::new(ivt_config(threshold)).unwrap();
            let found = run_all(&mut detector, &samples).len();
            assert!(found >= previous, "threshold {} found {}", threshold, found);
            previous = found;
        }
        assert_eq!(previous, 4);
    }

    #[test]
    fn idt_reports_dwell_while_it_lasts() {
        let config = DetectionConfig {
            algorithm: FixationAlgorithm::Idt,
            duration_threshold: 0.25,
            noise_reduction: false,
            ..DetectionConfig::default()
        };
        let mut detector = FixationDetector::new(config).unwrap();
        let mut samples = jittered(0.0, 16, 0.3, 0.3, 0.002);
        samples.push(saccade(0.8));
        samples.push(GazeSample::new(0.5, 0.9, 0.85, 0.9));

        let emitted: Vec<(usize, Fixation)> = samples
            .iter()
            .enumerate()
            .filter_map(|(i, s)| detector.process_gaze_point(*s).map(|f| (i, f)))
            .collect();
        assert_eq!(emitted.first().map(|(i, _)| *i), Some(3));
        assert!(emitted.len() >= 2);
        assert!(emitted.iter().all(|(i, _)| *i < 16));
        for (_, fixation) in &emitted {
            assert!(fixation.duration <= 0.25 + 1e-9);
            assert!(fixation.dispersion < 50.0 / 1080.0);
            assert!((fixation.x - 0.3).abs() < 0.01);
        }
        for pair in emitted.windows(2) {
            assert!(pair[1].1.start_time > pair[0].1.end_time);
        }
    }

    #[test]
    fn idt_log_matches_reported_fixations() {
        let config = DetectionConfig {
            algorithm: FixationAlgorithm::Idt,
            duration_threshold: 0.2,
            noise_reduction: false,
            ..DetectionConfig::default()
        };
        let mut detector = FixationDetector::new(config).unwrap();
        let fixations = run_all(&mut detector, &jittered(0.0, 16, 0.3, 0.3, 0.002));
        assert!(!fixations.is_empty());
        assert_eq!(detector.completed_fixations().count(), fixations.len());
    }

    #[test]
    fn imst_needs_five_points_and_reports_at_once() {
        let config = DetectionConfig {
            algorithm: FixationAlgorithm::Imst,
            noise_reduction: false,
            ..DetectionConfig::default()
        };
        let mut detector = FixationDetector::new(config).unwrap();
        let dwell = jittered(0.0, 14, 0.6, 0.4, 0.001);
        for s in dwell.iter().take(4) {
            assert!(detector.process_gaze_point(*s).is_none());
            assert_eq!(detector.statistics().current_candidates, 0);
        }
        let fixation = detector.process_gaze_point(dwell[4]).unwrap();
        assert_eq!(fixation.member_samples.len(), 5);
        assert!((fixation.duration - 0.2).abs() < 1e-9);

        let mut rest: Vec<GazeSample> = dwell[5..].to_vec();
        rest.push(saccade(0.7));
        assert!(run_all(&mut detector, &rest).is_empty());
        assert_eq!(detector.completed_fixations().count(), 1);
    }

    #[test]
    fn reset_forgets_last_window() {
        let config = DetectionConfig {
            algorithm: FixationAlgorithm::Imst,
            noise_reduction: false,
            ..DetectionConfig::default()
        };
        let mut detector = FixationDetector::new(config).unwrap();
        let dwell = jittered(0.0, 6, 0.6, 0.4, 0.001);
        assert_eq!(run_all(&mut detector, &dwell).len(), 1);
        detector.reset();
        assert_eq!(run_all(&mut detector, &dwell).len(), 1);
    }

    #[test]
    fn long_runs_close_at_max_duration() {
        let config = DetectionConfig {
            max_fixation_duration: 0.5,
            ..ivt_config(200.0)
        };
        let mut detector = FixationDetector::new(config).unwrap();
        let fixations = run_all(&mut detector, &jittered(0.0, 30, 0.5, 0.5, 0.0));
        assert!(!fixations.is_empty());
        assert!(fixations.iter().all(|f| f.duration < 0.6));
    }

    #[test]
    fn smoothing_averages_trailing_window() {
        let config = DetectionConfig {
            velocity_threshold: 10_000.0,
            ..DetectionConfig::default()
        };
        let mut detector = FixationDetector::new(config).unwrap();
        detector.process_gaze_point(GazeSample::new(0.1, 0.1, 0.0, 0.9));
        detector.process_gaze_point(GazeSample::new(0.2, 0.2, 0.05, 0.9));
        detector.process_gaze_point(GazeSample::new(0.6, 0.6, 0.1, 0.9));
        let smoothed = detector.smooth(GazeSample::new(0.6, 0.6, 0.1, 0.9));
        assert!((smoothed.x - 0.3).abs() < 1e-9);
    }

    #[test]
    fn recent_and_old_fixations_use_sample_time() {
        let mut detector = FixationDetector::new(ivt_config(200.0)).unwrap();
        let mut samples = jittered(0.0, 10, 0.5, 0.5, 0.0);
        samples.push(saccade(0.5));
        samples.extend(jittered(10.0, 10, 0.3, 0.3, 0.0));
        samples.push(saccade(10.5));
        assert_eq!(run_all(&mut detector, &samples).len(), 2);
        assert_eq!(detector.recent_fixations(2.0).len(), 1);
        detector.clear_old_fixations(5.0);
        assert_eq!(detector.completed_fixations().count(), 1);
    }

    #[test]
    fn unknown_algorithm_fails_to_parse() {
        assert_eq!("i-dt".parse::<FixationAlgorithm>(), Ok(FixationAlgorithm::Idt));
        assert!(matches!(
            "I-XX".parse::<FixationAlgorithm>(),
            Err(GazeError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = DetectionConfig {
            velocity_threshold: -1.0,
            ..DetectionConfig::default()
        };
        assert!(FixationDetector::new(config).is_err());
    }

    #[test]
    fn reset_transient_keeps_log() {
        let mut detector = FixationDetector::new(ivt_config(200.0)).unwrap();
        let mut samples = jittered(0.0, 10, 0.5, 0.5, 0.0);
        samples.push(saccade(0.5));
        samples.extend(jittered(1.0, 5, 0.3, 0.3, 0.0));
        run_all(&mut detector, &samples);
        detector.reset_transient();
        assert_eq!(detector.statistics().current_candidates, 0);
        assert_eq!(detector.completed_fixations().count(), 1);
        detector.reset();
        assert_eq!(detector.completed_fixations().count(), 0);
        assert!(detector.buffer().is_empty());
    }
}
