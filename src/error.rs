//! Error types for the spectrum display
//!
//! Rendering never surfaces errors to the host: failures on the draw and
//! ingest paths are absorbed and logged. The variants here cover the
//! operations that can legitimately fail at construction time or when
//! talking to storage.

use thiserror::Error;

/// Display error types
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("GPU unavailable: {0}")]
    GpuUnavailable(String),
    #[error("Storage I/O error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DisplayError>;

/// Replace NaN and infinities with zero so they never reach persisted state
/// or GPU uniforms.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
