pub mod eeg;
pub mod eye;

pub use eeg::*;
pub use eye::*;
