use crate::annotate::{AnalyzerConfig, AnnotationConfig};
use crate::detectors::fixation::{DetectionConfig, ScreenSize};
use crate::error::{GazeError, GazeResult};
use crate::mapping::{EdfViewContext, ViewportBounds};
use crate::metrics::context::ContextConfig;
use crate::scroll::ScrollConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Viewer geometry and scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Seconds of signal per view
    pub time_scale: f64,
    /// Channels visible at once
    pub channel_count: usize,
    /// Amplitude scale in µV per division
    pub sensitivity: f64,
    pub screen_width: f64,
    pub screen_height: f64,
    /// Empty means `Ch1..ChN`
    pub channel_names: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time_scale: 10.0,
            channel_count: 10,
            sensitivity: 50.0,
            screen_width: 1920.0,
            screen_height: 1080.0,
            channel_names: Vec::new(),
        }
    }
}

impl DisplayConfig {
    pub fn screen(&self) -> ScreenSize {
        ScreenSize {
            width: self.screen_width,
            height: self.screen_height,
        }
    }

    /// Plot covering the whole screen.
    pub fn viewport(&self) -> ViewportBounds {
        ViewportBounds::full_screen(self.screen_width, self.screen_height)
    }

    pub fn view_context(&self) -> EdfViewContext {
        let channel_names = if self.channel_names.is_empty() {
            (1..=self.channel_count).map(|i| format!("Ch{}", i)).collect()
        } else {
            self.channel_names.clone()
        };
        EdfViewContext {
            channel_names,
            view_start_time: 0.0,
            view_duration: self.time_scale,
            visible_channel_count: self.channel_count,
            channel_scroll_offset: 0,
        }
    }

    pub fn validate(&self) -> GazeResult<()> {
        if self.time_scale.is_nan() || self.time_scale <= 0.0 || self.channel_count == 0 {
            return Err(GazeError::InvalidConfig(format!(
                "display needs a positive time scale and channel count (got {}s, {})",
                self.time_scale, self.channel_count
            )));
        }
        if self.screen_width < 1.0 || self.screen_height < 1.0 {
            return Err(GazeError::InvalidConfig(format!(
                "screen {}x{} is too small",
                self.screen_width, self.screen_height
            )));
        }
        Ok(())
    }
}

/// Eye-closure gap that confirms a `Fixation + Blink` trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Seconds
    pub min_duration: f64,
    pub max_duration: f64,
    /// A blink must end this long after the fixation at most
    pub confirm_window: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            min_duration: 0.05,
            max_duration: 0.5,
            confirm_window: 1.0,
        }
    }
}

/// All pipeline settings, one table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(alias = "gaze_detection")]
    pub detection: DetectionConfig,
    pub display: DisplayConfig,
    #[serde(alias = "auto_scroll")]
    pub scroll: ScrollConfig,
    #[serde(alias = "annotations")]
    pub annotation: AnnotationConfig,
    pub context: ContextConfig,
    pub analyzer: AnalyzerConfig,
    pub blink: BlinkConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(contents: &str) -> GazeResult<Self> {
        let config: PipelineConfig =
            toml::from_str(contents).map_err(|e| GazeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GazeResult<()> {
        self.detection.validate()?;
        self.display.validate()?;
        self.scroll.validate()?;
        self.annotation.validate()?;
        if self.context.sampling_rate.is_nan() || self.context.sampling_rate <= 0.0 {
            return Err(GazeError::InvalidConfig(format!(
                "context sampling_rate must be positive, got {}",
                self.context.sampling_rate
            )));
        }
        if self.blink.min_duration > self.blink.max_duration {
            return Err(GazeError::InvalidConfig(format!(
                "blink min_duration {} exceeds max_duration {}",
                self.blink.min_duration, self.blink.max_duration
            )));
        }
        Ok(())
    }
}

pub fn read_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = PipelineConfig::from_toml_str(&contents)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}
