use crate::signal::SignalSource;
use log::{debug, error};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const EPS: f64 = 1e-10;

/// Signal pattern classes assigned to a fixated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Spike,
    SeizureActivity,
    SlowWave,
    Artifact,
    NormalActivity,
    AlphaRhythm,
    BetaActivity,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Spike => "spike",
            PatternType::SeizureActivity => "seizure_activity",
            PatternType::SlowWave => "slow_wave",
            PatternType::Artifact => "artifact",
            PatternType::NormalActivity => "normal_activity",
            PatternType::AlphaRhythm => "alpha_rhythm",
            PatternType::BetaActivity => "beta_activity",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PatternType::Spike => "epileptiform spike",
            PatternType::SeizureActivity => "seizure-like activity",
            PatternType::SlowWave => "slow wave activity",
            PatternType::Artifact => "likely artifact",
            PatternType::NormalActivity => "normal activity",
            PatternType::AlphaRhythm => "alpha rhythm",
            PatternType::BetaActivity => "beta activity",
        }
    }

    fn base_significance(&self) -> f64 {
        match self {
            PatternType::Spike => 0.9,
            PatternType::SeizureActivity => 0.95,
            PatternType::SlowWave => 0.6,
            PatternType::Artifact => 0.2,
            PatternType::NormalActivity => 0.3,
            PatternType::AlphaRhythm => 0.4,
            PatternType::BetaActivity => 0.3,
        }
    }
}

/// Band edges in Hz, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyBands {
    pub delta: [f64; 2],
    pub theta: [f64; 2],
    pub alpha: [f64; 2],
    pub beta: [f64; 2],
    pub gamma: [f64; 2],
}

impl Default for FrequencyBands {
    fn default() -> Self {
        Self {
            delta: [0.5, 4.0],
            theta: [4.0, 8.0],
            alpha: [8.0, 13.0],
            beta: [13.0, 30.0],
            gamma: [30.0, 100.0],
        }
    }
}

/// Context analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Sampling rate assumed for raw arrays (Hz).
    pub sampling_rate: f64,
    /// Width of the window centred on the fixation (seconds).
    pub analysis_window: f64,
    pub bands: FrequencyBands,
    /// z-score above which a large deflection is a spike.
    pub spike_threshold: f64,
    /// z-score above which a deflection is an artifact.
    pub artifact_threshold: f64,
    /// Minimum peak-to-peak amplitude for a spike.
    pub spike_peak_to_peak: f64,
    /// Shorter windows skip spectral analysis.
    pub min_psd_samples: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 256.0,
            analysis_window: 2.0,
            bands: FrequencyBands::default(),
            spike_threshold: 3.0,
            artifact_threshold: 5.0,
            spike_peak_to_peak: 50.0,
            min_psd_samples: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeStats {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub min: f64,
    pub z_score_max: f64,
    pub z_score_min: f64,
    pub peak_to_peak: f64,
}

/// Relative band powers (fractions of total power) plus the spectral peak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub dominant_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EegContextAnalysis {
    pub time_window: (f64, f64),
    pub channel: String,
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub amplitude_stats: AmplitudeStats,
    pub frequency_band_powers: BandPowers,
    pub morphology_score: f64,
    pub clinical_significance: f64,
    pub recommendation: String,
}

impl EegContextAnalysis {
    fn empty(fixation_time: f64, channel: &str) -> Self {
        Self {
            time_window: (fixation_time, fixation_time),
            channel: channel.to_string(),
            pattern_type: PatternType::NormalActivity,
            confidence: 0.0,
            amplitude_stats: AmplitudeStats::default(),
            frequency_band_powers: BandPowers::default(),
            morphology_score: 0.0,
            clinical_significance: 0.0,
            recommendation: "Insufficient data for analysis".into(),
        }
    }
}

/// Signal-derived flags consumed by annotation scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EegContextFlags {
    pub spike_detected: bool,
    pub seizure_activity: bool,
    pub artifact_present: bool,
    /// Largest absolute extreme z-score
    pub amplitude_z_score: f64,
    pub frequency_anomaly: bool,
    pub active_channels: Vec<String>,
}

impl From<&EegContextAnalysis> for EegContextFlags {
    fn from(analysis: &EegContextAnalysis) -> Self {
        let amp = &analysis.amplitude_stats;
        let bands = &analysis.frequency_band_powers;
        let active_channels = if analysis.clinical_significance > 0.6 {
            vec![analysis.channel.clone()]
        } else {
            Vec::new()
        };
        Self {
            spike_detected: analysis.pattern_type == PatternType::Spike,
            seizure_activity: analysis.pattern_type == PatternType::SeizureActivity,
            artifact_present: analysis.pattern_type == PatternType::Artifact,
            amplitude_z_score: amp.z_score_max.abs().max(amp.z_score_min.abs()),
            frequency_anomaly: bands.delta > 0.5 || bands.beta > 0.3 || bands.gamma > 0.2,
            active_channels,
        }
    }
}

/// Characterizes the signal under a fixation.
#[derive(Debug, Clone, Default)]
pub struct ContextAnalyzer {
    config: ContextConfig,
}

impl ContextAnalyzer {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Analyze `data` (channels x samples, starting at t = 0) around `fixation_time`.
    pub fn analyze_fixation_context(
        &self,
        data: &[Vec<f64>],
        fixation_time: f64,
        channel_idx: usize,
        channel_name: &str,
    ) -> EegContextAnalysis {
        let fs = self.config.sampling_rate;
        let samples = data.first().map(Vec::len).unwrap_or(0);
        let Some((start, end, window)) = self.sample_range(samples, fs, fixation_time) else {
            return EegContextAnalysis::empty(fixation_time, channel_name);
        };
        match data.get(channel_idx) {
            Some(channel) if end <= channel.len() => {
                self.analyze_samples(&channel[start..end], fs, window, channel_name)
            }
            _ => EegContextAnalysis::empty(fixation_time, channel_name),
        }
    }

    /// Pull the window from `source` and analyze it.
    pub fn analyze_source(
        &self,
        source: &dyn SignalSource,
        fixation_time: f64,
        channel_idx: usize,
        channel_name: &str,
    ) -> EegContextAnalysis {
        let fs = source.sampling_rate();
        let samples = (source.total_duration() * fs).round() as usize;
        let Some((start, end, window)) = self.sample_range(samples, fs, fixation_time) else {
            return EegContextAnalysis::empty(fixation_time, channel_name);
        };
        if channel_idx >= source.channel_count() {
            return EegContextAnalysis::empty(fixation_time, channel_name);
        }
        match source.get_signal_window(&[channel_idx], start, end) {
            Ok((rows, _)) => match rows.first() {
                Some(row) if !row.is_empty() => self.analyze_samples(row, fs, window, channel_name),
                _ => EegContextAnalysis::empty(fixation_time, channel_name),
            },
            Err(err) => {
                error!("signal window unavailable: {}", err);
                EegContextAnalysis::empty(fixation_time, channel_name)
            }
        }
    }

    fn sample_range(
        &self,
        samples: usize,
        fs: f64,
        fixation_time: f64,
    ) -> Option<(usize, usize, (f64, f64))> {
        if fs <= 0.0 || samples == 0 {
            return None;
        }
        let half = self.config.analysis_window / 2.0;
        let window_start = (fixation_time - half).max(0.0);
        let window_end = (samples as f64 / fs).min(fixation_time + half);
        if window_end <= window_start {
            return None;
        }
        let start = (window_start * fs) as usize;
        let end = ((window_end * fs) as usize).min(samples);
        (start < end).then_some((start, end, (window_start, window_end)))
    }

    fn analyze_samples(
        &self,
        samples: &[f64],
        fs: f64,
        time_window: (f64, f64),
        channel_name: &str,
    ) -> EegContextAnalysis {
        let amplitude_stats = amplitude_stats(samples);
        let bands = self.band_powers(samples, fs);
        let (pattern_type, confidence) = self.classify(&amplitude_stats, &bands);
        let morphology_score = morphology_score(samples, pattern_type);
        let clinical_significance =
            clinical_significance(pattern_type, &amplitude_stats, morphology_score);
        let recommendation = recommendation(pattern_type, confidence, clinical_significance);
        debug!(
            "context analysis on {}: {} (confidence={:.2}, significance={:.2})",
            channel_name,
            pattern_type.as_str(),
            confidence,
            clinical_significance
        );
        EegContextAnalysis {
            time_window,
            channel: channel_name.to_string(),
            pattern_type,
            confidence,
            amplitude_stats,
            frequency_band_powers: bands,
            morphology_score,
            clinical_significance,
            recommendation,
        }
    }

    fn band_powers(&self, samples: &[f64], fs: f64) -> BandPowers {
        if samples.len() < self.config.min_psd_samples {
            return BandPowers::default();
        }
        let Some((freqs, psd)) = welch_psd(samples, fs, samples.len().min(256)) else {
            return BandPowers::default();
        };
        let total: f64 = psd.iter().sum();
        let band = |[low, high]: [f64; 2]| {
            let power: f64 = freqs
                .iter()
                .zip(&psd)
                .filter(|(f, _)| **f >= low && **f <= high)
                .map(|(_, p)| p)
                .sum();
            power / (total + EPS)
        };
        let dominant = psd
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (k, p)| {
                if *p > best.1 {
                    (k, *p)
                } else {
                    best
                }
            })
            .0;
        let bands = &self.config.bands;
        BandPowers {
            delta: band(bands.delta),
            theta: band(bands.theta),
            alpha: band(bands.alpha),
            beta: band(bands.beta),
            gamma: band(bands.gamma),
            dominant_frequency: freqs.get(dominant).copied().unwrap_or(0.0),
        }
    }

    /// First matching rule wins.
    fn classify(&self, amp: &AmplitudeStats, bands: &BandPowers) -> (PatternType, f64) {
        let base = 0.5;
        if amp.z_score_max > self.config.spike_threshold
            && amp.peak_to_peak > self.config.spike_peak_to_peak
        {
            return (PatternType::Spike, 0.9);
        }
        if amp.z_score_max > self.config.artifact_threshold {
            return (PatternType::Artifact, base + 0.3);
        }
        if bands.beta > 0.3 && amp.z_score_max > 2.0 {
            return (PatternType::SeizureActivity, base + 0.3);
        }
        if bands.delta > 0.5 {
            return (PatternType::SlowWave, base + 0.2);
        }
        if bands.alpha > 0.4 {
            return (PatternType::AlphaRhythm, base + 0.1);
        }
        if bands.beta > 0.3 {
            return (PatternType::BetaActivity, base + 0.1);
        }
        (PatternType::NormalActivity, base)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn amplitude_stats(samples: &[f64]) -> AmplitudeStats {
    if samples.is_empty() {
        return AmplitudeStats::default();
    }
    let mean = mean(samples);
    let std = std_dev(samples);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    AmplitudeStats {
        mean,
        std,
        max,
        min,
        z_score_max: (max - mean) / (std + EPS),
        z_score_min: (min - mean) / (std + EPS),
        peak_to_peak: max - min,
    }
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

/// One-sided Welch PSD with a periodic Hann window, 50% overlap and
/// per-segment mean removal.
pub fn welch_psd(samples: &[f64], fs: f64, nperseg: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = samples.len();
    if nperseg < 2 || n < nperseg || fs <= 0.0 {
        return None;
    }
    let step = (nperseg / 2).max(1);
    let window = hann(nperseg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nperseg);
    let mut spectrum = r2c.make_output_vec();
    let freqs: Vec<f64> = (0..spectrum.len())
        .map(|k| k as f64 * fs / nperseg as f64)
        .collect();
    let mut powers = vec![0.0; spectrum.len()];
    let scale = 1.0 / (fs * window_power);
    let mut segments = 0usize;
    let mut pos = 0;
    while pos + nperseg <= n {
        let slice = &samples[pos..pos + nperseg];
        let offset = mean(slice);
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(&window)
            .map(|(x, w)| (x - offset) * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum).ok()?;
        for (k, val) in spectrum.iter().enumerate() {
            let one_sided = if k == 0 || (nperseg % 2 == 0 && k == nperseg / 2) {
                1.0
            } else {
                2.0
            };
            powers[k] += one_sided * val.norm_sqr() * scale;
        }
        segments += 1;
        pos += step;
    }
    for p in powers.iter_mut() {
        *p /= segments as f64;
    }
    Some((freqs, powers))
}

/// Shape score in [0, 1]; flat or very short windows are neutral.
fn morphology_score(samples: &[f64], pattern: PatternType) -> f64 {
    if samples.len() < 10 || std_dev(samples) < EPS {
        return 0.5;
    }
    let smoothness = smoothness(samples);
    let symmetry = symmetry(samples);
    let sharpness = sharpness(samples);
    let score = match pattern {
        PatternType::Spike => 0.5 * sharpness + 0.3 * (1.0 - symmetry) + 0.2 * smoothness,
        PatternType::Artifact => 0.3,
        _ => 0.4 * smoothness + 0.4 * symmetry + 0.2 * sharpness,
    };
    score.clamp(0.0, 1.0)
}

fn smoothness(samples: &[f64]) -> f64 {
    if samples.len() < 3 {
        return 0.5;
    }
    let second: Vec<f64> = samples
        .windows(3)
        .map(|w| w[2] - 2.0 * w[1] + w[0])
        .collect();
    (1.0 / (1.0 + std_dev(&second))).min(1.0)
}

/// Correlation of the mirrored halves around the largest deflection.
fn symmetry(samples: &[f64]) -> f64 {
    if samples.len() < 5 {
        return 0.5;
    }
    let peak = samples
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v.abs() > best.1 {
                (i, v.abs())
            } else {
                best
            }
        })
        .0;
    let left = &samples[..peak];
    let right = &samples[(peak + 1).min(samples.len())..];
    let len = left.len().min(right.len());
    if len < 2 {
        return 0.5;
    }
    let left_seg = &left[left.len() - len..];
    let right_rev: Vec<f64> = right[..len].iter().rev().copied().collect();
    match correlation(left_seg, &right_rev) {
        Some(r) => ((r + 1.0) / 2.0).clamp(0.0, 1.0),
        None => 0.5,
    }
}

fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let denom = (va * vb).sqrt();
    (denom > EPS).then(|| cov / denom)
}

/// Mean curvature at peaks of |x| reaching one std, relative to the std.
fn sharpness(samples: &[f64]) -> f64 {
    if samples.len() < 3 {
        return 0.5;
    }
    let std = std_dev(samples);
    let magnitude: Vec<f64> = samples.iter().map(|v| v.abs()).collect();
    let curvatures: Vec<f64> = (1..samples.len() - 1)
        .filter(|&i| {
            magnitude[i] > magnitude[i - 1]
                && magnitude[i] >= magnitude[i + 1]
                && magnitude[i] >= std
        })
        .map(|i| {
            let left_slope = samples[i] - samples[i - 1];
            let right_slope = samples[i + 1] - samples[i];
            (left_slope - right_slope).abs()
        })
        .collect();
    if curvatures.is_empty() {
        return 0.3;
    }
    (mean(&curvatures) / (std + EPS) / 5.0).clamp(0.0, 1.0)
}

fn clinical_significance(pattern: PatternType, amp: &AmplitudeStats, morphology: f64) -> f64 {
    let mut significance = pattern.base_significance();
    if amp.z_score_max > 3.0 {
        significance += 0.1;
    } else if amp.z_score_max > 2.0 {
        significance += 0.05;
    }
    significance += (morphology - 0.5) * 0.2;
    significance.clamp(0.0, 1.0)
}

fn recommendation(pattern: PatternType, confidence: f64, significance: f64) -> String {
    let urgency = if significance > 0.8 {
        "High priority"
    } else if significance > 0.6 {
        "Medium priority"
    } else {
        "Low priority"
    };
    let confidence_text = if confidence < 0.5 {
        "uncertain"
    } else if confidence < 0.7 {
        "moderate confidence"
    } else {
        "high confidence"
    };
    format!(
        "{}: {} detected with {} (significance: {:.1})",
        urgency,
        pattern.description(),
        confidence_text,
        significance
    )
}
