//! Watchlist monitoring engine.
//!
//! This crate contains the per-cycle logic: reaping lapsed trials,
//! detecting new transactions for each watched wallet, materializing alerts
//! and advancing cursors, with bounded concurrency per provider.

pub mod detector;
pub mod materializer;
pub mod orchestrator;
pub mod reaper;

pub use detector::*;
pub use materializer::*;
pub use orchestrator::*;
pub use reaper::*;

#[cfg(test)]
mod fixtures;
