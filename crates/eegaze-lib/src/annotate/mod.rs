pub mod analysis;
pub mod annotator;
pub mod channel;
pub mod record;
pub mod validator;

pub use analysis::*;
pub use annotator::*;
pub use channel::*;
pub use record::*;
pub use validator::*;
