use thiserror::Error;

/// Failures surfaced by the gaze pipeline at configuration time or at its sinks.
///
/// Per-sample processing never returns these; it degrades to `None` or an
/// invalid flag instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GazeError {
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("unknown fixation algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("unknown trigger mode '{0}'")]
    UnknownTriggerMode(String),
    #[error("unknown scroll behavior '{0}'")]
    UnknownBehavior(String),
    #[error("unknown annotation category '{0}'")]
    UnknownCategory(String),
    #[error("unknown quality level '{0}'")]
    UnknownQuality(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("signal accessor error: {0}")]
    Signal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Scroll(#[from] ScrollError),
}

/// Annotation sink failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("annotation store does not accept annotations")]
    Unsupported,
    #[error("annotation store rejected record: {0}")]
    Rejected(String),
}

/// Tracker stream failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    #[error("tracker disconnected")]
    Disconnected,
    #[error("tracker stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScrollError {
    #[error("no scroll driver attached")]
    NoDriver,
    #[error("scroll already running")]
    AlreadyRunning,
    #[error("invalid scroll range: total {total}s, window {window}s")]
    InvalidRange { total: f64, window: f64 },
}

pub type GazeResult<T> = Result<T, GazeError>;
