use serde::{Deserialize, Serialize};

/// Plot area in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for PlotBounds {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 800.0,
            height: 600.0,
        }
    }
}

/// Point mapped into the annotation display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPosition {
    pub time_seconds: f64,
    pub channel: String,
    pub is_valid: bool,
}

impl ChannelPosition {
    fn invalid(time_seconds: f64) -> Self {
        Self {
            time_seconds,
            channel: String::new(),
            is_valid: false,
        }
    }
}

/// Screen-to-(time, channel) mapping for the annotation display, kept apart
/// from the live cursor mapper.
#[derive(Debug, Clone, Default)]
pub struct ChannelMapper {
    channels: Vec<String>,
    time_range: (f64, f64),
    plot_bounds: Option<PlotBounds>,
    channel_height: f64,
}

impl ChannelMapper {
    pub fn new() -> Self {
        Self {
            time_range: (0.0, 1.0),
            channel_height: 50.0,
            ..Self::default()
        }
    }

    pub fn configure(
        &mut self,
        channels: Vec<String>,
        time_range: (f64, f64),
        plot_bounds: PlotBounds,
        channel_height: f64,
    ) {
        log::debug!(
            "channel mapper configured: {} channels, time range {:.1}-{:.1}s",
            channels.len(),
            time_range.0,
            time_range.1
        );
        self.channels = channels;
        self.time_range = time_range;
        self.plot_bounds = Some(plot_bounds);
        self.channel_height = channel_height;
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn channel_height(&self) -> f64 {
        self.channel_height
    }

    /// Map screen pixels onto the displayed time range and channel rows.
    /// Rows are `channel_height` pixels tall from the top of the plot; a
    /// non-positive height splits the plot evenly.
    pub fn map_coordinates(&self, x: f64, y: f64) -> ChannelPosition {
        let Some(bounds) = self.plot_bounds.filter(|_| !self.channels.is_empty()) else {
            return ChannelPosition::invalid(0.0);
        };
        if bounds.width <= 0.0 || bounds.height <= 0.0 {
            return ChannelPosition::invalid(0.0);
        }
        let relative_x = (x - bounds.x) / bounds.width;
        if !(0.0..=1.0).contains(&relative_x) {
            return ChannelPosition::invalid(0.0);
        }
        let (start, end) = self.time_range;
        let time_seconds = start + relative_x * (end - start);

        let rows = self.channels.len();
        let row_height = if self.channel_height > 0.0 {
            self.channel_height
        } else {
            bounds.height / rows as f64
        };
        let offset = y - bounds.y;
        let stacked = (row_height * rows as f64).min(bounds.height);
        if offset < 0.0 || offset > stacked + 1e-9 {
            return ChannelPosition::invalid(time_seconds);
        }
        let row = ((offset / row_height) as usize).min(rows - 1);
        ChannelPosition {
            time_seconds,
            channel: self.channels[row].clone(),
            is_valid: time_seconds >= 0.0 && time_seconds <= end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> ChannelMapper {
        let mut mapper = ChannelMapper::new();
        mapper.configure(
            vec!["Fp1".into(), "Fp2".into(), "C3".into(), "C4".into()],
            (10.0, 20.0),
            PlotBounds {
                x: 100.0,
                y: 50.0,
                width: 1000.0,
                height: 400.0,
            },
            100.0,
        );
        mapper
    }

    #[test]
    fn maps_inside_plot() {
        let pos = mapper().map_coordinates(600.0, 260.0);
        assert!(pos.is_valid);
        assert!((pos.time_seconds - 15.0).abs() < 1e-9);
        assert_eq!(pos.channel, "C3");
    }

    #[test]
    fn bottom_edge_clamps_to_last_row() {
        let pos = mapper().map_coordinates(100.0, 450.0);
        assert!(pos.is_valid);
        assert_eq!(pos.channel, "C4");
    }

    #[test]
    fn rows_follow_channel_height() {
        let mut m = mapper();
        m.configure(
            m.channels().to_vec(),
            (10.0, 20.0),
            PlotBounds {
                x: 100.0,
                y: 50.0,
                width: 1000.0,
                height: 400.0,
            },
            50.0,
        );
        assert_eq!(m.channel_height(), 50.0);
        // 120 px below the top: third row of 50 px
        assert_eq!(m.map_coordinates(600.0, 170.0).channel, "C3");
        assert_eq!(m.map_coordinates(600.0, 240.0).channel, "C4");
        // below the stacked rows but still inside the plot
        assert!(!m.map_coordinates(600.0, 350.0).is_valid);
    }

    #[test]
    fn zero_height_splits_plot_evenly() {
        let mut m = mapper();
        m.configure(
            m.channels().to_vec(),
            (10.0, 20.0),
            PlotBounds {
                x: 100.0,
                y: 50.0,
                width: 1000.0,
                height: 400.0,
            },
            0.0,
        );
        assert_eq!(m.map_coordinates(600.0, 260.0).channel, "C3");
        assert_eq!(m.map_coordinates(600.0, 450.0).channel, "C4");
    }

    #[test]
    fn outside_plot_is_invalid() {
        let m = mapper();
        assert!(!m.map_coordinates(50.0, 100.0).is_valid);
        let below = m.map_coordinates(600.0, 600.0);
        assert!(!below.is_valid);
        assert!((below.time_seconds - 15.0).abs() < 1e-9);
        assert!(!ChannelMapper::new().map_coordinates(1.0, 1.0).is_valid);
    }
}
