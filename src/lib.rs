//! `rusty-splat` library crate.
//!
//! The numerical core behind the viewer binary: spectrum model and range
//! extraction, profile and polynomial fitting, the filter bank, and region
//! statistics. Everything here is independent of the UI so it can be tested
//! and scripted directly.

pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod fit;
pub mod stats;

pub use error::{Result, SplatError};
