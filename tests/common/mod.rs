//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Test fixtures (configuration, Telegram updates)
//! - Mock Bot API, channel feed and chat model
//! - API test client and a fully wired bot harness

pub mod fixtures;
pub mod test_app;

pub use fixtures::*;
pub use mocks::*;
pub use test_app::*;
