pub mod annotate;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod mapping;
pub mod metrics;
pub mod pipeline;
pub mod scroll;
pub mod signal;

pub use detectors::*;
pub use error::*;
pub use mapping::*;
pub use signal::*;
