//! FusionBot Library
//!
//! Crypto-futures trading assistant: indicators, news sentiment and AI
//! advisory text fused into LONG/SHORT/HOLD decisions with TP/SL levels.

pub mod advisory;
pub mod config;
pub mod errors;
pub mod execution;
pub mod features;
pub mod logging;
pub mod market_data;
pub mod notify;
pub mod persistence;
pub mod runner;
pub mod sentiment;
pub mod strategy;
pub mod types;
