//! Data models

mod channel;
mod rag;
mod telegram;
mod user;

pub use channel::*;
pub use rag::*;
pub use telegram::*;
pub use user::*;
