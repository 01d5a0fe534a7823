pub mod processor;
pub mod tracker;

pub use processor::*;
pub use tracker::*;
