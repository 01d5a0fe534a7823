pub mod behavior;
pub mod controller;
pub mod progress;

pub use behavior::*;
pub use controller::*;
pub use progress::*;
