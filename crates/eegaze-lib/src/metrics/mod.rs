pub mod context;
pub mod patterns;

pub use context::*;
pub use patterns::*;
