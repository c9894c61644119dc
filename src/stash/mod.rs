//! Stash: the media library that fires the hook.

mod client;
mod types;

pub use client::{MediaLibrary, StashClient};
pub use types::*;
