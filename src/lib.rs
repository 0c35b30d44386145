//! Perp-Pilot — multi-source decision pipeline for crypto perpetual futures.
//!
//! The pipeline fans out independent market-data adapters, fuses whatever
//! arrived into a fixed-layout feature vector, scores the vector through a
//! safety-gated weighted decision engine, and turns a non-HOLD decision into
//! an executable position plan (stop loss + three tiered take profits).
//! The same engine drives the historical backtester, the one-shot CLI
//! analysis, the continuous monitor loop, and the HTTP service.

pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod export;
pub mod logging;
pub mod server;
pub mod sources;
pub mod types;
