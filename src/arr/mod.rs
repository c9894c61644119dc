//! Whisparr, the download manager the bridge feeds.

mod client;
pub mod http;
mod types;

pub use client::{WhisparrApi, WhisparrClient};
pub use http::{Decoded, RetryPolicy};
pub use types::*;
