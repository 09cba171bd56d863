//! Session settings.
//!
//! Settings are loaded once per session through the `config` crate (TOML or
//! JSON source), validated, and then treated as read-only. Calibration
//! workflows replace the file wholesale between sessions; nothing here is
//! mutated at runtime.

use std::path::Path;

use serde::Deserialize;

use crate::error::{HsiError, HsiResult};
use crate::stage::ProcessingLevel;

fn default_fwhm_nm() -> f64 {
    4.0
}
fn default_exposure_ms() -> f64 {
    10.0
}
fn default_luminance() -> f64 {
    100.0
}
fn default_processing_level() -> ProcessingLevel {
    ProcessingLevel::new(2)
}
fn default_sensor_constant() -> f64 {
    53_880.0
}

/// Immutable capture settings for one acquisition session.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    /// Sensor readout shape: (cross-track rows, raw spectral columns).
    pub resolution: (usize, usize),

    /// Illuminated row range `[min, max)`; rows outside are cropped.
    pub row_bounds: (usize, usize),

    /// Target spectral resolution in nanometers; governs how many raw
    /// columns are combined per output band.
    #[serde(default = "default_fwhm_nm")]
    pub fwhm_nm: f64,

    /// Exposure time in milliseconds. Selects the nearest radiometric
    /// reference slice at pipeline setup.
    #[serde(default = "default_exposure_ms")]
    pub exposure_ms: f64,

    /// Target luminance of the radiometric reference, in the reference
    /// cube's luminance units.
    #[serde(default = "default_luminance")]
    pub luminance: f64,

    /// Processing level selecting the stage chain (0-8).
    #[serde(default = "default_processing_level")]
    pub processing_level: ProcessingLevel,

    /// Sensor-specific radiometric scale divisor.
    #[serde(default = "default_sensor_constant")]
    pub sensor_constant: f64,
}

impl CaptureSettings {
    /// Load and validate settings from a TOML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> HsiResult<Self> {
        let settings: CaptureSettings = config::Config::builder()
            .add_source(config::File::from(path.as_ref().to_path_buf()))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation, run after parsing.
    pub fn validate(&self) -> HsiResult<()> {
        let (rows, cols) = self.resolution;
        if rows == 0 || cols == 0 {
            return Err(HsiError::Configuration(
                "resolution must be non-zero in both axes".into(),
            ));
        }
        let (lo, hi) = self.row_bounds;
        if lo >= hi || hi > rows {
            return Err(HsiError::Configuration(format!(
                "row_bounds ({lo}, {hi}) must satisfy lo < hi <= {rows}"
            )));
        }
        if self.fwhm_nm <= 0.0 {
            return Err(HsiError::Configuration("fwhm_nm must be positive".into()));
        }
        if self.exposure_ms <= 0.0 {
            return Err(HsiError::Configuration(
                "exposure_ms must be positive".into(),
            ));
        }
        if self.sensor_constant <= 0.0 {
            return Err(HsiError::Configuration(
                "sensor_constant must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Cropped cross-track height, `row_bounds.1 - row_bounds.0`.
    pub fn cropped_rows(&self) -> usize {
        self.row_bounds.1 - self.row_bounds.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_from_toml_with_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "resolution = [100, 256]\nrow_bounds = [10, 90]\nexposure_ms = 15.0"
        )
        .unwrap();

        let settings = CaptureSettings::load(file.path()).unwrap();
        assert_eq!(settings.resolution, (100, 256));
        assert_eq!(settings.cropped_rows(), 80);
        assert_eq!(settings.exposure_ms, 15.0);
        // Defaulted fields
        assert_eq!(settings.fwhm_nm, 4.0);
        assert_eq!(settings.processing_level, ProcessingLevel::new(2));
        assert_eq!(settings.sensor_constant, 53_880.0);
    }

    #[test]
    fn rejects_inverted_row_bounds() {
        let settings = CaptureSettings {
            resolution: (100, 256),
            row_bounds: (90, 10),
            fwhm_nm: 4.0,
            exposure_ms: 10.0,
            luminance: 100.0,
            processing_level: ProcessingLevel::new(2),
            sensor_constant: 53_880.0,
        };
        assert!(matches!(
            settings.validate(),
            Err(HsiError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_row_bounds_outside_frame() {
        let settings = CaptureSettings {
            resolution: (100, 256),
            row_bounds: (10, 120),
            fwhm_nm: 4.0,
            exposure_ms: 10.0,
            luminance: 100.0,
            processing_level: ProcessingLevel::new(2),
            sensor_constant: 53_880.0,
        };
        assert!(settings.validate().is_err());
    }
}
