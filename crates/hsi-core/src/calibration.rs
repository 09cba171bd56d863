//! Calibration model: the immutable bundle of geometric and radiometric
//! lookup tables a session is calibrated against.
//!
//! The record is produced by an offline calibration-fitting workflow and
//! persisted as JSON; this crate only loads and reads it. Each field is
//! optional: a pipeline setup fails with a configuration error if a
//! selected stage needs a field that is absent.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{Array1, Array4};
use serde::Deserialize;

use crate::error::{HsiError, HsiResult};

/// A continuous wavelength -> value curve, stored as samples and evaluated
/// by clamped linear interpolation.
///
/// Stands in for the offline fit objects (spectral irradiance fit,
/// at-sensor radiance fit from the atmospheric model); sample spacing is
/// whatever the fitting workflow produced.
#[derive(Debug, Clone, Deserialize)]
pub struct SampledFit {
    pub wavelengths_nm: Vec<f64>,
    pub values: Vec<f64>,
}

impl SampledFit {
    pub fn new(wavelengths_nm: Vec<f64>, values: Vec<f64>) -> HsiResult<Self> {
        let fit = Self {
            wavelengths_nm,
            values,
        };
        fit.validate()?;
        Ok(fit)
    }

    fn validate(&self) -> HsiResult<()> {
        if self.wavelengths_nm.len() != self.values.len() {
            return Err(HsiError::Calibration(
                "sampled fit wavelength/value lengths disagree".into(),
            ));
        }
        if self.wavelengths_nm.is_empty() {
            return Err(HsiError::Calibration("sampled fit is empty".into()));
        }
        if !is_strictly_increasing(&self.wavelengths_nm) {
            return Err(HsiError::Calibration(
                "sampled fit wavelengths must be strictly increasing".into(),
            ));
        }
        Ok(())
    }

    /// Evaluate the curve at `nm`, clamping outside the sampled range.
    pub fn eval(&self, nm: f64) -> f64 {
        let ws = &self.wavelengths_nm;
        let vs = &self.values;
        let i = ws.partition_point(|&w| w < nm);
        if i == 0 {
            return vs[0];
        }
        if i == ws.len() {
            return vs[vs.len() - 1];
        }
        let t = (nm - ws[i - 1]) / (ws[i] - ws[i - 1]);
        vs[i - 1] + t * (vs[i] - vs[i - 1])
    }

    /// Evaluate at every wavelength of `nms`.
    pub fn eval_all(&self, nms: &Array1<f64>) -> Array1<f64> {
        nms.mapv(|nm| self.eval(nm))
    }
}

/// Radiometric reference captures: integrating-sphere counts indexed by
/// (cross-track row, raw spectral column, exposure setting, luminance
/// setting), with explicit coordinate vectors for the last two axes.
#[derive(Debug, Clone, Deserialize)]
pub struct RadiometricReference {
    pub counts: Array4<f64>,
    pub exposures_ms: Vec<f64>,
    pub luminances: Vec<f64>,
}

impl RadiometricReference {
    fn validate(&self) -> HsiResult<()> {
        let shape = self.counts.shape();
        if shape[2] != self.exposures_ms.len() || shape[3] != self.luminances.len() {
            return Err(HsiError::Calibration(format!(
                "radiometric reference shape {:?} disagrees with {} exposures / {} luminances",
                shape,
                self.exposures_ms.len(),
                self.luminances.len()
            )));
        }
        if self.exposures_ms.is_empty() || self.luminances.is_empty() {
            return Err(HsiError::Calibration(
                "radiometric reference needs at least one exposure and luminance".into(),
            ));
        }
        Ok(())
    }

    /// Index of the reference exposure nearest `exposure_ms`.
    pub fn nearest_exposure_index(&self, exposure_ms: f64) -> usize {
        nearest_index(&self.exposures_ms, exposure_ms)
    }

    /// Index of the reference luminance nearest `luminance`.
    pub fn nearest_luminance_index(&self, luminance: f64) -> usize {
        nearest_index(&self.luminances, luminance)
    }
}

/// The calibration record. Loaded once per session and read-only after.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Calibration {
    /// Per-row spectral offset from smile distortion, normalized so the
    /// minimum shift is zero (guarantees in-bounds shifted reads).
    #[serde(default)]
    pub smile_shifts: Option<Vec<usize>>,

    /// Column -> nanometer map including dispersion nonlinearity.
    #[serde(default)]
    pub wavelengths: Option<Array1<f64>>,

    /// Linearized column -> nanometer map used by fast binning.
    #[serde(default)]
    pub wavelengths_linear: Option<Array1<f64>>,

    #[serde(default)]
    pub radiometric_reference: Option<RadiometricReference>,

    /// Spectral irradiance fit from the calibration lamp.
    #[serde(default)]
    pub spectral_irradiance: Option<SampledFit>,

    /// At-sensor radiance reference from the external atmospheric model.
    #[serde(default)]
    pub at_sensor_radiance: Option<SampledFit>,
}

impl Calibration {
    /// Load a calibration record from JSON and validate it against the
    /// session resolution.
    pub fn load(path: impl AsRef<Path>, resolution: (usize, usize)) -> HsiResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let calibration: Calibration = serde_json::from_reader(reader)?;
        calibration.validate(resolution)?;
        Ok(calibration)
    }

    /// Semantic checks tying the record to the sensor resolution.
    pub fn validate(&self, resolution: (usize, usize)) -> HsiResult<()> {
        let (rows, cols) = resolution;

        if let Some(shifts) = &self.smile_shifts {
            if shifts.len() != rows {
                return Err(HsiError::Calibration(format!(
                    "smile_shifts has {} entries for {} sensor rows",
                    shifts.len(),
                    rows
                )));
            }
            let max = shifts.iter().copied().max().unwrap_or(0);
            let min = shifts.iter().copied().min().unwrap_or(0);
            if min != 0 {
                return Err(HsiError::Calibration(
                    "smile_shifts must be normalized so the minimum shift is zero".into(),
                ));
            }
            if max >= cols {
                return Err(HsiError::Calibration(format!(
                    "maximum smile shift {max} does not leave any spectral column"
                )));
            }
        }

        for (name, map) in [
            ("wavelengths", &self.wavelengths),
            ("wavelengths_linear", &self.wavelengths_linear),
        ] {
            if let Some(map) = map {
                if map.len() != cols {
                    return Err(HsiError::Calibration(format!(
                        "{name} has {} entries for {} spectral columns",
                        map.len(),
                        cols
                    )));
                }
                if !is_strictly_increasing(map.as_slice().unwrap_or(&[])) {
                    return Err(HsiError::Calibration(format!(
                        "{name} must be strictly increasing"
                    )));
                }
            }
        }

        if let Some(reference) = &self.radiometric_reference {
            reference.validate()?;
        }
        if let Some(fit) = &self.spectral_irradiance {
            fit.validate()?;
        }
        if let Some(fit) = &self.at_sensor_radiance {
            fit.validate()?;
        }
        Ok(())
    }
}

fn is_strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

fn nearest_index(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &v) in values.iter().enumerate() {
        let dist = (v - target).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}
