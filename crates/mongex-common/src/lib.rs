pub mod error;
pub mod time;

pub use error::{MongexError, Result};
