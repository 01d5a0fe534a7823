pub mod fixation;

pub use fixation::*;
