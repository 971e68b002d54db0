pub mod config;
pub mod error;
pub mod media;
pub mod utils;

pub use error::{Error, Result};
