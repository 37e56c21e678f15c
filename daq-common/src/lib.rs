//! # DAQ Common Library
//!
//! Shared code for the DAQ telemetry services including:
//! - Error type used by file-backed state and configuration
//! - Timestamp formatting and lenient parsing
//! - Data folder and config file resolution
//! - Scan event types and the broadcast EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
