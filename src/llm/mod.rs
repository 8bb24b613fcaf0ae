mod format_validator;
mod message;

pub use format_validator::*;
pub use message::*;
