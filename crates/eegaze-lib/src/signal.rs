use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};

/// One raw tracker sample in normalized screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Horizontal position in [0, 1]
    pub x: f64,
    /// Vertical position in [0, 1]
    pub y: f64,
    /// Monotonic timestamp in seconds
    pub timestamp: f64,
    pub valid_left: bool,
    pub valid_right: bool,
    /// Tracker confidence in [0, 1]
    pub confidence: f64,
}

impl GazeSample {
    pub fn new(x: f64, y: f64, timestamp: f64, confidence: f64) -> Self {
        Self {
            x,
            y,
            timestamp,
            valid_left: true,
            valid_right: true,
            confidence,
        }
    }

    /// True when at least one eye reported data.
    pub fn has_valid_eye(&self) -> bool {
        self.valid_left || self.valid_right
    }
}

/// Pull interface onto recorded signal data.
pub trait SignalSource {
    fn sampling_rate(&self) -> f64;
    fn channel_count(&self) -> usize;
    fn channel_names(&self) -> Vec<String>;
    /// Recording length in seconds.
    fn total_duration(&self) -> f64;

    /// Amplitudes for `channel_indices` over `[start_sample, stop_sample)` plus their times.
    fn get_signal_window(
        &self,
        channel_indices: &[usize],
        start_sample: usize,
        stop_sample: usize,
    ) -> GazeResult<(Vec<Vec<f64>>, Vec<f64>)>;
}

/// Fully loaded recording held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSource {
    pub fs: f64,
    pub names: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl RecordingSource {
    pub fn new(fs: f64, names: Vec<String>, data: Vec<Vec<f64>>) -> GazeResult<Self> {
        if fs.is_nan() || fs <= 0.0 {
            return Err(GazeError::Signal(format!("invalid sampling rate {}", fs)));
        }
        if names.len() != data.len() {
            return Err(GazeError::Signal(format!(
                "{} channel names for {} channels",
                names.len(),
                data.len()
            )));
        }
        Ok(Self { fs, names, data })
    }

    fn samples(&self) -> usize {
        self.data.iter().map(Vec::len).min().unwrap_or(0)
    }
}

impl SignalSource for RecordingSource {
    fn sampling_rate(&self) -> f64 {
        self.fs
    }

    fn channel_count(&self) -> usize {
        self.data.len()
    }

    fn channel_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn total_duration(&self) -> f64 {
        self.samples() as f64 / self.fs
    }

    fn get_signal_window(
        &self,
        channel_indices: &[usize],
        start_sample: usize,
        stop_sample: usize,
    ) -> GazeResult<(Vec<Vec<f64>>, Vec<f64>)> {
        let stop = stop_sample.min(self.samples());
        let start = start_sample.min(stop);
        let mut rows = Vec::with_capacity(channel_indices.len());
        for &idx in channel_indices {
            let channel = self.data.get(idx).ok_or_else(|| {
                GazeError::Signal(format!(
                    "channel {} out of range ({} channels)",
                    idx,
                    self.data.len()
                ))
            })?;
            rows.push(channel[start..stop].to_vec());
        }
        let times = (start..stop).map(|i| i as f64 / self.fs).collect();
        Ok((rows, times))
    }
}
