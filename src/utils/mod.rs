//! Shared helpers

pub mod error;
pub mod rotating_file;
pub mod text;

pub use error::{AppError, AppResult};
