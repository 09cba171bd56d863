//! Error types for the acquisition core.
//!
//! [`HsiError`] consolidates the failure modes of the streaming pipeline:
//! configuration parsing (`config` crate), semantic configuration errors
//! caught at pipeline setup, calibration-record problems, hardware driver
//! failures, and per-line processing errors. Driver failures carry a
//! structured [`DriverError`] so callers can tell an init failure from a
//! mid-stream fetch failure.
//!
//! Buffer underrun is deliberately *not* an error: `RingBuffer::get` on an
//! empty buffer returns `None`.

use thiserror::Error;

// =============================================================================
// Driver errors
// =============================================================================

/// Phase of the camera lifecycle in which a driver error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Acquisition,
    Shutdown,
    Hardware,
    Timeout,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Acquisition => "acquisition",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
        };
        write!(f, "{}", label)
    }
}

/// Structured error from a camera driver.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the core error type.
pub type HsiResult<T> = std::result::Result<T, HsiError>;

/// Primary error type for the acquisition core.
#[derive(Error, Debug)]
pub enum HsiError {
    /// Settings file parsing failed (syntax, missing field, type mismatch).
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings or stage selection is semantically invalid: values parse but
    /// cannot produce a pipeline (e.g. a selected stage's calibration field
    /// is missing). Raised at setup; no partial pipeline is produced.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Calibration record is malformed (non-monotonic wavelength map,
    /// out-of-range smile shifts, coordinate/array length disagreement).
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// I/O failure while loading settings or calibration records.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Calibration record deserialization failed.
    #[error("Calibration parse error: {0}")]
    CalibrationParse(#[from] serde_json::Error),

    /// Camera driver failure, tagged with the lifecycle phase.
    #[error("{0}")]
    Driver(DriverError),

    /// A per-line stage failed. Aborts only the current line; previously
    /// written cube slots remain valid.
    #[error("Processing error: {0}")]
    Processing(String),

    /// The checked reshape inside fast binning rejected the layout.
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl From<DriverError> for HsiError {
    fn from(err: DriverError) -> Self {
        HsiError::Driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let err = HsiError::Driver(DriverError::new(
            "sim_camera",
            DriverErrorKind::Initialization,
            "failed to open device",
        ));
        assert!(err
            .to_string()
            .contains("Driver 'sim_camera' initialization error"));
    }

    #[test]
    fn configuration_error_display() {
        let err = HsiError::Configuration("slow binning requires a nonlinear wavelength map".into());
        assert!(err.to_string().starts_with("Configuration validation error"));
    }
}
