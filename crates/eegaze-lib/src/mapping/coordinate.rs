use crate::error::{GazeError, GazeResult};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Tracker calibration correction applied in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationData {
    /// Pixel offset added after normalization
    pub offset_x: f64,
    pub offset_y: f64,
    /// Scale applied after the offset, valid in [0.5, 2.0]
    pub scale_x: f64,
    pub scale_y: f64,
    /// Degrees; recorded with the calibration but not applied
    pub rotation: f64,
    pub timestamp: f64,
}

impl Default for CalibrationData {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            timestamp: 0.0,
        }
    }
}

impl CalibrationData {
    pub fn is_valid(&self) -> bool {
        self.offset_x.abs() < 1000.0
            && self.offset_y.abs() < 1000.0
            && (0.5..=2.0).contains(&self.scale_x)
            && (0.5..=2.0).contains(&self.scale_y)
    }
}

/// Screen size plus the plot widget's placement on it, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    pub screen_w: f64,
    pub screen_h: f64,
    pub widget_x: f64,
    pub widget_y: f64,
    pub widget_w: f64,
    pub widget_h: f64,
}

impl ViewportBounds {
    /// Widget covering the whole screen.
    pub fn full_screen(width: f64, height: f64) -> Self {
        Self {
            screen_w: width,
            screen_h: height,
            widget_x: 0.0,
            widget_y: 0.0,
            widget_w: width,
            widget_h: height,
        }
    }

    pub fn contains_widget_point(&self, widget_x: f64, widget_y: f64) -> bool {
        (0.0..self.widget_w).contains(&widget_x) && (0.0..self.widget_h).contains(&widget_y)
    }

    fn validate(&self) -> GazeResult<()> {
        if self.screen_w <= 0.0 || self.screen_h <= 0.0 || self.widget_w <= 0.0 || self.widget_h <= 0.0
        {
            return Err(GazeError::InvalidConfig(format!(
                "viewport dimensions must be positive: screen {}x{}, widget {}x{}",
                self.screen_w, self.screen_h, self.widget_w, self.widget_h
            )));
        }
        Ok(())
    }
}

/// What part of the recording the viewer currently shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdfViewContext {
    pub channel_names: Vec<String>,
    pub view_start_time: f64,
    pub view_duration: f64,
    pub visible_channel_count: usize,
    pub channel_scroll_offset: usize,
}

impl Default for EdfViewContext {
    fn default() -> Self {
        Self {
            channel_names: Vec::new(),
            view_start_time: 0.0,
            view_duration: 10.0,
            visible_channel_count: 10,
            channel_scroll_offset: 0,
        }
    }
}

impl EdfViewContext {
    pub fn view_end_time(&self) -> f64 {
        self.view_start_time + self.view_duration
    }

    pub fn contains_time(&self, time: f64) -> bool {
        time >= self.view_start_time && time <= self.view_end_time()
    }

    fn validate(&self) -> GazeResult<()> {
        if self.view_duration <= 0.0 || self.visible_channel_count == 0 {
            return Err(GazeError::InvalidConfig(format!(
                "view context needs a positive duration and channel count (got {}s, {} channels)",
                self.view_duration, self.visible_channel_count
            )));
        }
        Ok(())
    }
}

/// Result of mapping a gaze point into recording space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdfCoordinates {
    pub time_seconds: f64,
    /// `None` when the channel is off the list
    pub channel_index: Option<usize>,
    /// Empty when the channel is off the list
    pub channel_name: String,
    pub is_valid: bool,
    pub widget_x: f64,
    pub widget_y: f64,
}

impl EdfCoordinates {
    fn invalid(widget_x: f64, widget_y: f64) -> Self {
        Self {
            time_seconds: 0.0,
            channel_index: None,
            channel_name: String::new(),
            is_valid: false,
            widget_x,
            widget_y,
        }
    }
}

/// Diagnostic report from [`CoordinateMapper::validate_coordinates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateDiagnostics {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub time_in_view: bool,
    pub channel_visible: bool,
    pub viewport: Option<ViewportBounds>,
    pub calibration_applied: bool,
}

/// Normalized gaze → screen → widget → recording time/channel.
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    calibration: CalibrationData,
    viewport: Option<ViewportBounds>,
    context: EdfViewContext,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_viewport(viewport: ViewportBounds, context: EdfViewContext) -> GazeResult<Self> {
        let mut mapper = Self::new();
        mapper.set_viewport(viewport)?;
        mapper.set_view_context(context)?;
        Ok(mapper)
    }

    pub fn calibration(&self) -> &CalibrationData {
        &self.calibration
    }

    pub fn viewport(&self) -> Option<&ViewportBounds> {
        self.viewport.as_ref()
    }

    pub fn view_context(&self) -> &EdfViewContext {
        &self.context
    }

    /// Replace the calibration; an invalid one is rejected and the previous kept.
    pub fn set_calibration(&mut self, calibration: CalibrationData) -> GazeResult<()> {
        if !calibration.is_valid() {
            warn!("invalid calibration rejected: {:?}", calibration);
            return Err(GazeError::InvalidCalibration(format!(
                "offset ({}, {}) scale ({}, {})",
                calibration.offset_x, calibration.offset_y, calibration.scale_x, calibration.scale_y
            )));
        }
        self.calibration = calibration;
        info!("calibration updated");
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: ViewportBounds) -> GazeResult<()> {
        viewport.validate()?;
        debug!(
            "viewport updated: screen {}x{}, widget {}x{} at ({}, {})",
            viewport.screen_w,
            viewport.screen_h,
            viewport.widget_w,
            viewport.widget_h,
            viewport.widget_x,
            viewport.widget_y
        );
        self.viewport = Some(viewport);
        Ok(())
    }

    pub fn set_view_context(&mut self, context: EdfViewContext) -> GazeResult<()> {
        context.validate()?;
        debug!(
            "view context updated: {} channels, view {:.1}-{:.1}s",
            context.channel_names.len(),
            context.view_start_time,
            context.view_end_time()
        );
        self.context = context;
        Ok(())
    }

    /// Normalized gaze to screen pixels, clamped onto the screen.
    pub fn map_gaze_to_screen(&self, gaze_x: f64, gaze_y: f64) -> (f64, f64) {
        let Some(bounds) = self.viewport else {
            return (0.0, 0.0);
        };
        let cal = &self.calibration;
        let x = (gaze_x * bounds.screen_w + cal.offset_x) * cal.scale_x;
        let y = (gaze_y * bounds.screen_h + cal.offset_y) * cal.scale_y;
        (
            x.clamp(0.0, bounds.screen_w - 1.0),
            y.clamp(0.0, bounds.screen_h - 1.0),
        )
    }

    pub fn map_screen_to_widget(&self, screen_x: f64, screen_y: f64) -> (f64, f64) {
        match self.viewport {
            Some(bounds) => (screen_x - bounds.widget_x, screen_y - bounds.widget_y),
            None => (0.0, 0.0),
        }
    }

    /// Widget pixels to recording time and channel.
    ///
    /// Points outside the widget are invalid but still carry the computed time
    /// and channel for diagnostics.
    pub fn map_widget_to_edf(&self, widget_x: f64, widget_y: f64) -> EdfCoordinates {
        let Some(bounds) = self.viewport else {
            return EdfCoordinates::invalid(widget_x, widget_y);
        };
        let ctx = &self.context;
        let time_ratio = widget_x / bounds.widget_w;
        let time_seconds = ctx.view_start_time + time_ratio * ctx.view_duration;

        let channel_float = widget_y / bounds.widget_h * ctx.visible_channel_count as f64;
        let row = channel_float.floor();
        let channel_index = if row.is_finite() && row >= 0.0 {
            Some(row as usize + ctx.channel_scroll_offset)
        } else {
            None
        };
        let channel_name = channel_index.and_then(|idx| ctx.channel_names.get(idx));

        let in_bounds = bounds.contains_widget_point(widget_x, widget_y);
        EdfCoordinates {
            time_seconds,
            channel_index: channel_name.and(channel_index),
            channel_name: channel_name.cloned().unwrap_or_default(),
            is_valid: in_bounds && channel_name.is_some(),
            widget_x,
            widget_y,
        }
    }

    pub fn map_gaze_to_edf(&self, gaze_x: f64, gaze_y: f64) -> EdfCoordinates {
        let (screen_x, screen_y) = self.map_gaze_to_screen(gaze_x, gaze_y);
        let (widget_x, widget_y) = self.map_screen_to_widget(screen_x, screen_y);
        let coords = self.map_widget_to_edf(widget_x, widget_y);
        debug!(
            "gaze ({:.3}, {:.3}) -> screen ({:.0}, {:.0}) -> widget ({:.0}, {:.0}) -> t={:.2}s ch={}",
            gaze_x, gaze_y, screen_x, screen_y, widget_x, widget_y, coords.time_seconds, coords.channel_name
        );
        coords
    }

    pub fn is_gaze_in_widget(&self, gaze_x: f64, gaze_y: f64) -> bool {
        let Some(bounds) = self.viewport else {
            return false;
        };
        let (screen_x, screen_y) = self.map_gaze_to_screen(gaze_x, gaze_y);
        let (widget_x, widget_y) = self.map_screen_to_widget(screen_x, screen_y);
        bounds.contains_widget_point(widget_x, widget_y)
    }

    /// Vertical pixel band of a channel row, `None` when the channel is scrolled out.
    pub fn get_channel_y_range(&self, channel_index: usize) -> Option<(f64, f64)> {
        let bounds = self.viewport?;
        let ctx = &self.context;
        let visible = channel_index.checked_sub(ctx.channel_scroll_offset)?;
        if visible >= ctx.visible_channel_count {
            return None;
        }
        let row_height = bounds.widget_h / ctx.visible_channel_count as f64;
        Some((visible as f64 * row_height, (visible + 1) as f64 * row_height))
    }

    /// Widget x for a recording time, `None` outside the current view.
    pub fn get_time_x_position(&self, time_seconds: f64) -> Option<f64> {
        let bounds = self.viewport?;
        let ctx = &self.context;
        if !ctx.contains_time(time_seconds) {
            return None;
        }
        Some((time_seconds - ctx.view_start_time) / ctx.view_duration * bounds.widget_w)
    }

    pub fn validate_coordinates(&self, coords: &EdfCoordinates) -> CoordinateDiagnostics {
        let ctx = &self.context;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        if coords.time_seconds < 0.0 {
            errors.push("negative time coordinate".to_string());
        } else if coords.time_seconds < ctx.view_start_time {
            warnings.push("time before current view".to_string());
        } else if coords.time_seconds > ctx.view_end_time() {
            warnings.push("time after current view".to_string());
        }
        let channel_visible = match coords.channel_index {
            None => {
                errors.push("invalid channel index".to_string());
                false
            }
            Some(idx) if idx >= ctx.channel_names.len() => {
                errors.push("channel index out of range".to_string());
                false
            }
            Some(idx) => {
                idx >= ctx.channel_scroll_offset
                    && idx < ctx.channel_scroll_offset + ctx.visible_channel_count
            }
        };
        CoordinateDiagnostics {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            time_in_view: ctx.contains_time(coords.time_seconds),
            channel_visible,
            viewport: self.viewport,
            calibration_applied: self.calibration.is_valid(),
        }
    }
}
