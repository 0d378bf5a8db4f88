//! Opus Quant Dashboard: live view of model-generated predictions.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod store;
pub mod engine;
pub mod view;
pub mod dashboard;
