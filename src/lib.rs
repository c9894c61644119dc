//! Whisparr bridge - Stash hook that mirrors scenes into Whisparr
//!
//! This library crate exposes the core functionality for integration testing.

pub mod arr;
pub mod bridge;
pub mod config;
pub mod error;
pub mod hook;
pub mod logging;
pub mod stash;

pub use error::{BridgeError, Result};
