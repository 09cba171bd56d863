//! The per-line processing pipeline.
//!
//! A [`Pipeline`] is built once per (settings, calibration, level) and is
//! sealed after construction: every size, lookup table and reference array a
//! stage needs is derived up front, so the per-line path is pure array work.
//! Rebuild the pipeline when the level or element type changes.
//!
//! Element type: levels that convert to physical units run in `f32` end to
//! end, everything else stays in `i32` counts. The split is carried by the
//! [`Pipeline`] enum so a cube's element type is fixed for its lifetime.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use tracing::{debug, warn};

use crate::calibration::{Calibration, SampledFit};
use crate::capabilities::RawFrame;
use crate::error::{HsiError, HsiResult};
use crate::settings::CaptureSettings;
use crate::stage::{CubeUnits, ProcessingLevel, StageKind};

/// Numeric element a line pipeline can run on.
///
/// `i32` for digital-number chains, `f32` for radiometric chains. Generic
/// code converts through `f64` for the radiometric arithmetic.
pub trait Element:
    Copy
    + PartialOrd
    + std::fmt::Debug
    + Send
    + Sync
    + 'static
    + Num
    + NumAssign
    + FromPrimitive
    + ToPrimitive
{
}

impl<T> Element for T where
    T: Copy
        + PartialOrd
        + std::fmt::Debug
        + Send
        + Sync
        + 'static
        + Num
        + NumAssign
        + FromPrimitive
        + ToPrimitive
{
}

/// One entry of a sealed stage chain: a builtin stage kind or a caller
/// supplied transform.
#[derive(Debug, Clone, Copy)]
pub enum Stage<A: Element> {
    Kind(StageKind),
    /// Custom per-line transform. Planned output shape is probed at build
    /// time by running the chain on a zero frame.
    Custom(fn(ArrayView2<'_, A>) -> Array2<A>),
}

/// Sizes and lookup tables derived once at setup; never mutated after
/// build.
#[derive(Debug, Clone)]
struct PipelinePlan {
    row_min: usize,
    row_max: usize,

    /// Full-resolution per-row smile offsets (empty when unused).
    smile_shifts: Vec<usize>,
    /// Row-table offset applied when crop precedes smile correction.
    smile_offset: usize,
    /// Columns every row yields post-shift: raw width - max(shift).
    smile_width: usize,

    /// Raw columns summed per fast band.
    bin_width: usize,
    /// Centers of fast bands: per-band mean of the linear wavelength map.
    fast_wavelengths: Array1<f64>,

    /// Column boundaries of the variable-width slow bins.
    slow_bounds: Vec<usize>,
    /// Centers of slow bands (fwhm step + fwhm/2).
    slow_wavelengths: Array1<f64>,

    luminance: f64,
    sensor_constant: f64,
}

/// Radiometric working set. Unlike the plan this is mutable: on a width
/// disagreement with the processed line the arrays are resampled in place
/// (the documented degraded-accuracy path).
#[derive(Debug, Clone)]
struct RadState {
    dark_current: Array2<f64>,
    ref_luminance: Array2<f64>,
    /// Spectral irradiance evaluated at the current output wavelengths.
    spec_rad: Array1<f64>,
    irradiance_fit: SampledFit,
    /// Full-resolution nonlinear wavelength map, kept for re-evaluation.
    wavelengths: Array1<f64>,
}

#[derive(Debug, Clone)]
struct ReflState {
    rad_reference: Array1<f64>,
    fit: SampledFit,
}

/// An ordered, sealed chain of per-line transforms for one element type.
#[derive(Debug, Clone)]
pub struct LinePipeline<A: Element> {
    stages: Vec<Stage<A>>,
    kinds: Vec<StageKind>,
    plan: PipelinePlan,
    rad: Option<RadState>,
    refl: Option<ReflState>,
    output_shape: (usize, usize),
    shape_warnings: u32,
}

impl<A: Element> LinePipeline<A> {
    /// Build a pipeline for an explicit stage-kind chain.
    pub fn new(
        settings: &CaptureSettings,
        calibration: &Calibration,
        kinds: &[StageKind],
    ) -> HsiResult<Self> {
        let stages = kinds.iter().copied().map(Stage::Kind).collect();
        Self::build(settings, calibration, stages)
    }

    /// Build a pipeline from a fully custom stage list, overriding any
    /// level-derived chain.
    pub fn with_custom_stages(
        settings: &CaptureSettings,
        calibration: &Calibration,
        stages: Vec<Stage<A>>,
    ) -> HsiResult<Self> {
        Self::build(settings, calibration, stages)
    }

    fn build(
        settings: &CaptureSettings,
        calibration: &Calibration,
        stages: Vec<Stage<A>>,
    ) -> HsiResult<Self> {
        settings.validate()?;
        calibration.validate(settings.resolution)?;

        let kinds: Vec<StageKind> = stages
            .iter()
            .filter_map(|s| match s {
                Stage::Kind(k) => Some(*k),
                Stage::Custom(_) => None,
            })
            .collect();
        let has_custom = kinds.len() != stages.len();

        let (raw_rows, raw_cols) = settings.resolution;
        let (row_min, row_max) = settings.row_bounds;

        // --- smile correction ---
        let (smile_shifts, smile_width, smile_offset) =
            if kinds.contains(&StageKind::SmileCorrect) {
                let shifts = calibration.smile_shifts.clone().ok_or_else(|| {
                    HsiError::Configuration(
                        "smile correction requires calibration.smile_shifts".into(),
                    )
                })?;
                let max = shifts.iter().copied().max().unwrap_or(0);
                // Crop before smile means the shift table is indexed from the
                // cropped band's first row.
                let crop_first = kinds.iter().position(|k| *k == StageKind::Crop);
                let smile_at = kinds.iter().position(|k| *k == StageKind::SmileCorrect);
                let offset = match (crop_first, smile_at) {
                    (Some(c), Some(s)) if c < s => row_min,
                    _ => 0,
                };
                (shifts, raw_cols - max, offset)
            } else {
                (Vec::new(), raw_cols, 0)
            };

        // --- fast binning ---
        let (bin_width, linear_map) = if kinds.contains(&StageKind::FastBin) {
            let map = calibration.wavelengths_linear.as_ref().ok_or_else(|| {
                HsiError::Configuration(
                    "fast binning requires calibration.wavelengths_linear".into(),
                )
            })?;
            let span = map[map.len() - 1] - map[0];
            let width = (settings.fwhm_nm * raw_cols as f64 / span).round() as usize;
            if width == 0 {
                return Err(HsiError::Configuration(format!(
                    "fwhm_nm {} is below the sensor's native resolution",
                    settings.fwhm_nm
                )));
            }
            (width, Some(map.clone()))
        } else {
            (0, None)
        };

        // --- slow binning ---
        let (slow_bounds, slow_wavelengths) = if kinds.contains(&StageKind::SlowBin) {
            let map = calibration.wavelengths.as_ref().ok_or_else(|| {
                HsiError::Configuration(
                    "slow binning requires calibration.wavelengths (nonlinear map)".into(),
                )
            })?;
            let span = map[map.len() - 1] - map[0];
            let n_steps = (span / settings.fwhm_nm).floor() as usize;
            if n_steps == 0 {
                return Err(HsiError::Configuration(format!(
                    "fwhm_nm {} exceeds the {span} nm spectral span",
                    settings.fwhm_nm
                )));
            }
            let mut bounds = Vec::with_capacity(n_steps + 1);
            let mut centers = Vec::with_capacity(n_steps);
            for i in 0..=n_steps {
                let nm = map[0] + i as f64 * settings.fwhm_nm;
                bounds.push(nearest_column(map, nm));
                if i < n_steps {
                    centers.push(nm + settings.fwhm_nm / 2.0);
                }
            }
            (bounds, Array1::from_vec(centers))
        } else {
            (Vec::new(), Array1::zeros(0))
        };

        // --- radiometric references ---
        let rad = if kinds.contains(&StageKind::Dn2Rad) {
            let reference = calibration.radiometric_reference.as_ref().ok_or_else(|| {
                HsiError::Configuration(
                    "dn2rad requires calibration.radiometric_reference".into(),
                )
            })?;
            let fit = calibration.spectral_irradiance.clone().ok_or_else(|| {
                HsiError::Configuration(
                    "dn2rad requires calibration.spectral_irradiance".into(),
                )
            })?;
            let wavelengths = calibration.wavelengths.clone().ok_or_else(|| {
                HsiError::Configuration("dn2rad requires calibration.wavelengths".into())
            })?;

            let e = reference.nearest_exposure_index(settings.exposure_ms);
            let scale = settings.exposure_ms / reference.exposures_ms[e];
            let l_dark = reference.nearest_luminance_index(0.0);
            let l_ref = reference.nearest_luminance_index(settings.luminance);
            debug!(
                exposure_ms = settings.exposure_ms,
                nearest_exposure_ms = reference.exposures_ms[e],
                "selected radiometric reference slice"
            );

            let dark_current = reference.counts.slice(s![.., .., e, l_dark]).mapv(|v| v * scale);
            let ref_luminance =
                &reference.counts.slice(s![.., .., e, l_ref]).mapv(|v| v * scale) - &dark_current;
            let spec_rad = fit.eval_all(&wavelengths);

            Some(RadState {
                dark_current,
                ref_luminance,
                spec_rad,
                irradiance_fit: fit,
                wavelengths,
            })
        } else {
            None
        };

        // --- reflectance reference ---
        let refl = if kinds.contains(&StageKind::Rad2Ref) {
            let fit = calibration.at_sensor_radiance.clone().ok_or_else(|| {
                HsiError::Configuration(
                    "rad2ref requires calibration.at_sensor_radiance".into(),
                )
            })?;
            let wavelengths = calibration.wavelengths.as_ref().ok_or_else(|| {
                HsiError::Configuration("rad2ref requires calibration.wavelengths".into())
            })?;
            let rad_reference = fit.eval_all(wavelengths);
            Some(ReflState { rad_reference, fit })
        } else {
            None
        };

        // Analytic shape walk over the builtin stages, which also sizes the
        // fast-band wavelength table at the point fast binning runs.
        let mut fast_wavelengths = Array1::zeros(0);
        let mut cur = (raw_rows, raw_cols);
        for kind in &kinds {
            cur = match kind {
                StageKind::Crop => (row_max - row_min, cur.1),
                StageKind::SmileCorrect => (cur.0, smile_width),
                StageKind::FastBin => {
                    let bands = cur.1 / bin_width;
                    if bands == 0 {
                        return Err(HsiError::Configuration(format!(
                            "fast bin width {bin_width} exceeds the {} available columns",
                            cur.1
                        )));
                    }
                    let map = linear_map.as_ref().ok_or_else(|| {
                        HsiError::Configuration("fast binning lost its wavelength map".into())
                    })?;
                    fast_wavelengths = band_centers(map, bands, bin_width);
                    (cur.0, bands)
                }
                StageKind::SlowBin => (cur.0, slow_wavelengths.len()),
                StageKind::Dn2Rad | StageKind::Rad2Ref => cur,
            };
        }

        let plan = PipelinePlan {
            row_min,
            row_max,
            smile_shifts,
            smile_offset,
            smile_width,
            bin_width,
            fast_wavelengths,
            slow_bounds,
            slow_wavelengths,
            luminance: settings.luminance,
            sensor_constant: settings.sensor_constant,
        };

        let mut pipeline = Self {
            stages,
            kinds,
            plan,
            rad,
            refl,
            output_shape: cur,
            shape_warnings: 0,
        };

        // Custom stages have no analytic shape; probe the chain once with a
        // zero frame, exactly what a flat-field probe would do.
        if has_custom {
            let probe = pipeline.apply_raw(&RawFrame::zeros((raw_rows, raw_cols)))?;
            pipeline.output_shape = probe.dim();
        }

        Ok(pipeline)
    }

    /// Convert a raw frame to the pipeline's element type and run the chain.
    pub fn apply_raw(&mut self, raw: &RawFrame) -> HsiResult<Array2<A>> {
        let x = raw.mapv(|v| A::from_u16(v).unwrap_or_else(A::zero));
        self.apply(x)
    }

    /// Run the sealed stage chain over one line.
    pub fn apply(&mut self, mut x: Array2<A>) -> HsiResult<Array2<A>> {
        for i in 0..self.stages.len() {
            x = match self.stages[i] {
                Stage::Kind(StageKind::Crop) => self.crop(x)?,
                Stage::Kind(StageKind::SmileCorrect) => self.smile_correct(&x)?,
                Stage::Kind(StageKind::FastBin) => self.fast_bin(&x)?,
                Stage::Kind(StageKind::SlowBin) => self.slow_bin(&x)?,
                Stage::Kind(StageKind::Dn2Rad) => self.dn2rad(x)?,
                Stage::Kind(StageKind::Rad2Ref) => self.rad2ref(x)?,
                Stage::Custom(f) => f(x.view()),
            };
        }
        Ok(x)
    }

    /// Final per-line shape (rows, spectral bands).
    pub fn output_shape(&self) -> (usize, usize) {
        self.output_shape
    }

    /// Units implied by the stage chain.
    pub fn units(&self) -> CubeUnits {
        CubeUnits::for_stages(&self.kinds)
    }

    /// Wavelength centers of the output bands, when a binning stage defines
    /// them.
    pub fn output_wavelengths(&self) -> Option<Array1<f64>> {
        if self.kinds.contains(&StageKind::FastBin) {
            Some(self.plan.fast_wavelengths.clone())
        } else if self.kinds.contains(&StageKind::SlowBin) {
            Some(self.plan.slow_wavelengths.clone())
        } else {
            None
        }
    }

    /// How many times a radiometric reference had to be resampled to match
    /// the processed line width (degraded-accuracy events).
    pub fn shape_warnings(&self) -> u32 {
        self.shape_warnings
    }

    // --- stage functions ---

    fn crop(&self, x: Array2<A>) -> HsiResult<Array2<A>> {
        if self.plan.row_max > x.nrows() {
            return Err(HsiError::Processing(format!(
                "crop bound {} exceeds the {} input rows",
                self.plan.row_max,
                x.nrows()
            )));
        }
        // Zero-copy: keeps the same storage, narrowed to the illuminated rows.
        Ok(x.slice_move(s![self.plan.row_min..self.plan.row_max, ..]))
    }

    fn smile_correct(&self, x: &Array2<A>) -> HsiResult<Array2<A>> {
        let rows = x.nrows();
        let width = self.plan.smile_width;
        let shifts = &self.plan.smile_shifts;
        if self.plan.smile_offset + rows > shifts.len() {
            return Err(HsiError::Processing(format!(
                "smile shift table covers {} rows, line has {} (offset {})",
                shifts.len(),
                rows,
                self.plan.smile_offset
            )));
        }
        let used = &shifts[self.plan.smile_offset..self.plan.smile_offset + rows];
        let max_shift = used.iter().copied().max().unwrap_or(0);
        if max_shift + width > x.ncols() {
            return Err(HsiError::Processing(format!(
                "smile correction needs {} columns, line has {}",
                max_shift + width,
                x.ncols()
            )));
        }
        let mut out = Array2::zeros((rows, width));
        for i in 0..rows {
            let shift = shifts[self.plan.smile_offset + i];
            out.row_mut(i).assign(&x.slice(s![i, shift..shift + width]));
        }
        Ok(out)
    }

    fn fast_bin(&self, x: &Array2<A>) -> HsiResult<Array2<A>> {
        let (rows, cols) = x.dim();
        let width = self.plan.bin_width;
        if width == 0 {
            return Err(HsiError::Processing(
                "fast binning invoked without a configured band width".into(),
            ));
        }
        let bands = cols / width;
        if bands == 0 {
            return Err(HsiError::Processing(format!(
                "fast bin width {width} exceeds the {cols} input columns"
            )));
        }
        // Checked reshape-and-reduce: group the trailing axis as
        // (bands, width) and sum within each group. Remainder columns that
        // do not fill a band are truncated.
        let tight = x.slice(s![.., ..bands * width]).to_owned();
        let grouped = tight.into_shape_with_order((rows, bands, width))?;
        Ok(grouped.sum_axis(Axis(2)))
    }

    fn slow_bin(&self, x: &Array2<A>) -> HsiResult<Array2<A>> {
        let bounds = &self.plan.slow_bounds;
        if bounds.len() < 2 {
            return Err(HsiError::Processing(
                "slow binning invoked without bin boundaries".into(),
            ));
        }
        let last = bounds[bounds.len() - 1];
        if last > x.ncols() {
            return Err(HsiError::Processing(format!(
                "slow bin boundary {last} exceeds the {} input columns",
                x.ncols()
            )));
        }
        let rows = x.nrows();
        let n_bands = bounds.len() - 1;
        let mut out = Array2::zeros((rows, n_bands));
        for b in 0..n_bands {
            let (lo, hi) = (bounds[b], bounds[b + 1]);
            let sums = x.slice(s![.., lo..hi]).sum_axis(Axis(1));
            out.column_mut(b).assign(&sums);
        }
        Ok(out)
    }

    fn dn2rad(&mut self, mut x: Array2<A>) -> HsiResult<Array2<A>> {
        self.align_rad_references(x.dim())?;
        let rad = self.rad.as_ref().ok_or_else(|| {
            HsiError::Processing("dn2rad invoked without radiometric references".into())
        })?;
        let luminance = self.plan.luminance;
        let k = self.plan.sensor_constant;
        for ((i, j), v) in x.indexed_iter_mut() {
            let dn = v.to_f64().unwrap_or(0.0);
            let response = rad.ref_luminance[[i, j]];
            let value = if response == 0.0 {
                0.0
            } else {
                (dn - rad.dark_current[[i, j]]) * luminance / response * rad.spec_rad[j] / k
            };
            *v = A::from_f64(value).unwrap_or_else(A::zero);
        }
        Ok(x)
    }

    fn rad2ref(&mut self, mut x: Array2<A>) -> HsiResult<Array2<A>> {
        self.align_refl_reference(x.ncols())?;
        let refl = self.refl.as_ref().ok_or_else(|| {
            HsiError::Processing("rad2ref invoked without an at-sensor reference".into())
        })?;
        for ((_, j), v) in x.indexed_iter_mut() {
            let reference = refl.rad_reference[j];
            let value = if reference == 0.0 {
                0.0
            } else {
                v.to_f64().unwrap_or(0.0) / reference
            };
            *v = A::from_f64(value).unwrap_or_else(A::zero);
        }
        Ok(x)
    }

    // --- shape-mismatch resampling (degraded-accuracy path) ---

    fn align_rad_references(&mut self, shape: (usize, usize)) -> HsiResult<()> {
        let Some(rad) = self.rad.as_mut() else {
            return Ok(());
        };
        if rad.dark_current.dim() == shape && rad.spec_rad.len() == shape.1 {
            return Ok(());
        }

        warn!(
            line_rows = shape.0,
            line_cols = shape.1,
            reference_rows = rad.dark_current.nrows(),
            reference_cols = rad.dark_current.ncols(),
            "radiometric reference shape disagrees with processed line; \
             resampling references (accuracy degraded)"
        );
        self.shape_warnings += 1;

        if rad.spec_rad.len() != shape.1 {
            let nms = if self.plan.fast_wavelengths.len() == shape.1 {
                self.plan.fast_wavelengths.clone()
            } else if self.plan.slow_wavelengths.len() == shape.1 {
                self.plan.slow_wavelengths.clone()
            } else {
                Array1::from_shape_fn(shape.1, |j| rad.wavelengths[j % rad.wavelengths.len()])
            };
            rad.spec_rad = rad.irradiance_fit.eval_all(&nms);
        }

        rad.dark_current = resample_reference(&rad.dark_current, shape);
        rad.ref_luminance = resample_reference(&rad.ref_luminance, shape);
        Ok(())
    }

    fn align_refl_reference(&mut self, width: usize) -> HsiResult<()> {
        let Some(refl) = self.refl.as_mut() else {
            return Ok(());
        };
        if refl.rad_reference.len() == width {
            return Ok(());
        }
        warn!(
            line_cols = width,
            reference_cols = refl.rad_reference.len(),
            "at-sensor reference resampled to line width (accuracy degraded)"
        );
        self.shape_warnings += 1;
        let nms = if self.plan.fast_wavelengths.len() == width {
            self.plan.fast_wavelengths.clone()
        } else if self.plan.slow_wavelengths.len() == width {
            self.plan.slow_wavelengths.clone()
        } else if let Some(rad) = self.rad.as_ref() {
            Array1::from_shape_fn(width, |j| rad.wavelengths[j % rad.wavelengths.len()])
        } else {
            // No full map available in a chain without dn2rad; wrap the
            // fit's own sample grid.
            let samples = &refl.fit.wavelengths_nm;
            Array1::from_shape_fn(width, |j| samples[j % samples.len()])
        };
        refl.rad_reference = refl.fit.eval_all(&nms);
        Ok(())
    }
}

/// The session pipeline: integer counts for levels 0-3, floating point for
/// the radiometric levels 4-8.
#[derive(Debug, Clone)]
pub enum Pipeline {
    Counts(LinePipeline<i32>),
    Radiometric(LinePipeline<f32>),
}

impl Pipeline {
    /// Build the stage chain a processing level selects. An unrecognized
    /// level yields an empty identity pipeline (integer, raw shape).
    pub fn for_level(
        settings: &CaptureSettings,
        calibration: &Calibration,
        level: ProcessingLevel,
    ) -> HsiResult<Self> {
        let kinds = level.stages();
        if level.is_radiometric() {
            Ok(Pipeline::Radiometric(LinePipeline::new(
                settings,
                calibration,
                &kinds,
            )?))
        } else {
            Ok(Pipeline::Counts(LinePipeline::new(
                settings,
                calibration,
                &kinds,
            )?))
        }
    }

    pub fn output_shape(&self) -> (usize, usize) {
        match self {
            Pipeline::Counts(p) => p.output_shape(),
            Pipeline::Radiometric(p) => p.output_shape(),
        }
    }

    pub fn units(&self) -> CubeUnits {
        match self {
            Pipeline::Counts(p) => p.units(),
            Pipeline::Radiometric(p) => p.units(),
        }
    }

    pub fn output_wavelengths(&self) -> Option<Array1<f64>> {
        match self {
            Pipeline::Counts(p) => p.output_wavelengths(),
            Pipeline::Radiometric(p) => p.output_wavelengths(),
        }
    }

    pub fn shape_warnings(&self) -> u32 {
        match self {
            Pipeline::Counts(p) => p.shape_warnings(),
            Pipeline::Radiometric(p) => p.shape_warnings(),
        }
    }
}

impl From<LinePipeline<i32>> for Pipeline {
    fn from(p: LinePipeline<i32>) -> Self {
        Pipeline::Counts(p)
    }
}

impl From<LinePipeline<f32>> for Pipeline {
    fn from(p: LinePipeline<f32>) -> Self {
        Pipeline::Radiometric(p)
    }
}

/// Per-band mean of the first `bands * width` entries of the linear map.
fn band_centers(map: &Array1<f64>, bands: usize, width: usize) -> Array1<f64> {
    Array1::from_shape_fn(bands, |b| {
        map.slice(s![b * width..(b + 1) * width]).mean().unwrap_or(0.0)
    })
}

/// Nearest column index of `nm` in a monotonically increasing map.
fn nearest_column(map: &Array1<f64>, nm: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &w) in map.iter().enumerate() {
        let dist = (w - nm).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Best-effort reference resampling: block-sum to downsample columns (the
/// same operation binning applies to the data), nearest-wrap replication to
/// upsample, row replication across the cross-track axis.
fn resample_reference(src: &Array2<f64>, shape: (usize, usize)) -> Array2<f64> {
    let (rows, cols) = shape;
    let (src_rows, src_cols) = src.dim();

    let widened: Array2<f64> = if cols < src_cols {
        let factor = src_cols / cols;
        Array2::from_shape_fn((src_rows, cols), |(i, j)| {
            (0..factor).map(|k| src[[i, j * factor + k]]).sum()
        })
    } else if cols > src_cols {
        Array2::from_shape_fn((src_rows, cols), |(i, j)| src[[i, j % src_cols]])
    } else {
        src.clone()
    };

    if rows == src_rows {
        widened
    } else {
        Array2::from_shape_fn((rows, cols), |(i, j)| widened[[i % src_rows, j]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::RadiometricReference;
    use ndarray::{Array2, Array4};
    use StageKind::*;

    fn test_settings() -> CaptureSettings {
        CaptureSettings {
            resolution: (100, 256),
            row_bounds: (10, 90),
            fwhm_nm: 4.0,
            exposure_ms: 10.0,
            luminance: 100.0,
            processing_level: ProcessingLevel::new(2),
            sensor_constant: 53_880.0,
        }
    }

    /// Calibration with a perfectly linear 1 nm/column map from 400 nm,
    /// zero smile, and a flat radiometric reference.
    fn test_calibration() -> Calibration {
        let map = Array1::from_shape_fn(256, |i| 400.0 + i as f64);
        let mut counts = Array4::zeros((80, 256, 1, 2));
        counts.slice_mut(s![.., .., 0, 0]).fill(100.0); // dark
        counts.slice_mut(s![.., .., 0, 1]).fill(600.0); // lit
        Calibration {
            smile_shifts: Some(vec![0; 100]),
            wavelengths: Some(map.clone()),
            wavelengths_linear: Some(map),
            radiometric_reference: Some(RadiometricReference {
                counts,
                exposures_ms: vec![10.0],
                luminances: vec![0.0, 100.0],
            }),
            spectral_irradiance: Some(
                SampledFit::new(vec![300.0, 800.0], vec![2.0, 2.0]).unwrap(),
            ),
            at_sensor_radiance: Some(
                SampledFit::new(vec![300.0, 800.0], vec![4.0, 4.0]).unwrap(),
            ),
        }
    }

    fn ramp_frame(rows: usize, cols: usize) -> RawFrame {
        RawFrame::from_shape_fn((rows, cols), |(i, j)| (i * 7 + j) as u16 % 512)
    }

    #[test]
    fn level0_equals_crop() {
        let settings = test_settings();
        let calibration = test_calibration();
        let mut pipe: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &ProcessingLevel::new(0).stages())
                .unwrap();
        let raw = ramp_frame(100, 256);
        let out = pipe.apply_raw(&raw).unwrap();
        assert_eq!(out.dim(), (80, 256));
        for i in 0..80 {
            for j in 0..256 {
                assert_eq!(out[[i, j]], raw[[i + 10, j]] as i32);
            }
        }
    }

    #[test]
    fn smile_correction_realigns_shifted_rows() {
        let mut settings = test_settings();
        settings.resolution = (4, 32);
        settings.row_bounds = (0, 4);
        let shifts = vec![0usize, 1, 2, 3];
        let calibration = Calibration {
            smile_shifts: Some(shifts.clone()),
            ..Default::default()
        };

        // Row i equals row 0 shifted right by shifts[i].
        let base: Vec<i32> = (0..32).map(|j| (j * j + 3) % 97).collect();
        let x = Array2::from_shape_fn((4, 32), |(i, j)| {
            if j >= shifts[i] {
                base[j - shifts[i]]
            } else {
                0
            }
        });

        let mut pipe: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &[SmileCorrect]).unwrap();
        let out = pipe.apply(x).unwrap();
        assert_eq!(out.dim(), (4, 29));
        let first = out.row(0).to_owned();
        for i in 1..4 {
            assert_eq!(out.row(i), first.view(), "row {i} not realigned");
        }
    }

    #[test]
    fn fast_and_slow_binning_agree_on_a_linear_map() {
        let settings = test_settings();
        let calibration = test_calibration();
        let raw = ramp_frame(100, 256);

        let mut fast: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &[Crop, SmileCorrect, FastBin]).unwrap();
        let mut slow: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &[Crop, SmileCorrect, SlowBin]).unwrap();

        let out_fast = fast.apply_raw(&raw).unwrap();
        let out_slow = slow.apply_raw(&raw).unwrap();

        // Linear map at 1 nm/column with fwhm 4 nm: fast bins are width 4
        // starting at column 0, slow boundaries land on the same columns.
        assert_eq!(out_fast.dim(), (80, 64));
        assert_eq!(out_slow.dim(), (80, 63));
        for i in 0..80 {
            for b in 0..63 {
                assert_eq!(out_fast[[i, b]], out_slow[[i, b]], "bin {b} row {i}");
            }
        }
    }

    #[test]
    fn dn2rad_maps_dark_input_to_zero() {
        let settings = test_settings();
        let calibration = test_calibration();
        // All-dark synthetic line: every pixel equals the dark current.
        let raw = RawFrame::from_elem((100, 256), 100);
        let mut pipe: LinePipeline<f32> =
            LinePipeline::new(&settings, &calibration, &[Crop, Dn2Rad]).unwrap();
        let out = pipe.apply_raw(&raw).unwrap();
        assert_eq!(out.dim(), (80, 256));
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(pipe.shape_warnings(), 0);
    }

    #[test]
    fn level2_matches_manual_chain() {
        let settings = test_settings();
        let calibration = test_calibration();
        let raw = ramp_frame(100, 256);

        let mut level2: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &ProcessingLevel::new(2).stages())
                .unwrap();
        let mut manual: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &[Crop, SmileCorrect, FastBin]).unwrap();

        assert_eq!(
            level2.apply_raw(&raw).unwrap(),
            manual.apply_raw(&raw).unwrap()
        );
    }

    #[test]
    fn fast_bin_sums_adjacent_columns() {
        let settings = test_settings();
        let calibration = test_calibration();
        let raw = ramp_frame(100, 256);
        let mut pipe: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &ProcessingLevel::new(2).stages())
                .unwrap();
        let out = pipe.apply_raw(&raw).unwrap();
        assert_eq!(out.dim(), (80, 64));
        for i in 0..80 {
            for b in 0..64 {
                let expected: i32 = (0..4).map(|k| raw[[i + 10, b * 4 + k]] as i32).sum();
                assert_eq!(out[[i, b]], expected);
            }
        }
    }

    #[test]
    fn radiometric_level_resamples_mismatched_references() {
        let settings = test_settings();
        let calibration = test_calibration();
        // Level 4 bins to 64 bands while the reference cube is full width;
        // dn2rad must resample and flag it rather than fail.
        let mut pipe: LinePipeline<f32> =
            LinePipeline::new(&settings, &calibration, &ProcessingLevel::new(4).stages())
                .unwrap();
        let raw = RawFrame::from_elem((100, 256), 100);
        let out = pipe.apply_raw(&raw).unwrap();
        assert_eq!(out.dim(), (80, 64));
        assert_eq!(pipe.shape_warnings(), 1);
        // Binned dark input still converts to zero radiance: each band sums
        // four dark-current pixels and the resampled dark does the same.
        assert!(out.iter().all(|&v| v.abs() < 1e-4), "max {:?}", out.iter().cloned().fold(0.0f32, f32::max));
        // Second line does not warn again; references now match.
        let _ = pipe.apply_raw(&raw).unwrap();
        assert_eq!(pipe.shape_warnings(), 1);
    }

    #[test]
    fn smile_after_binning_reports_missing_columns() {
        let settings = test_settings();
        let calibration = test_calibration();
        // A custom chain may bin before smile-correcting; the narrowed line
        // no longer covers shift + width and must error, not panic.
        let mut pipe: LinePipeline<i32> =
            LinePipeline::new(&settings, &calibration, &[FastBin, SmileCorrect]).unwrap();
        let err = pipe.apply_raw(&ramp_frame(100, 256)).unwrap_err();
        assert!(matches!(err, HsiError::Processing(_)), "got {err}");
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn reflectance_reference_follows_binned_width_without_dn2rad() {
        let settings = test_settings();
        let calibration = test_calibration();
        let mut pipe: LinePipeline<f32> = LinePipeline::new(
            &settings,
            &calibration,
            &[Crop, SmileCorrect, FastBin, Rad2Ref],
        )
        .unwrap();
        let raw = RawFrame::from_elem((100, 256), 100);
        let out = pipe.apply_raw(&raw).unwrap();
        assert_eq!(out.dim(), (80, 64));
        assert_eq!(pipe.shape_warnings(), 1);
        // Binned value 400 over the flat 4.0 at-sensor reference.
        assert!(out.iter().all(|&v| (v - 100.0).abs() < 1e-4));
    }

    #[test]
    fn missing_calibration_field_fails_setup() {
        let settings = test_settings();
        let calibration = Calibration {
            smile_shifts: Some(vec![0; 100]),
            ..Default::default()
        };
        let err = LinePipeline::<i32>::new(
            &settings,
            &calibration,
            &ProcessingLevel::new(3).stages(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("slow binning requires"));
    }

    #[test]
    fn unrecognized_level_is_identity() {
        let settings = test_settings();
        let calibration = test_calibration();
        let pipe =
            Pipeline::for_level(&settings, &calibration, ProcessingLevel::new(99)).unwrap();
        assert_eq!(pipe.output_shape(), (100, 256));
        assert_eq!(pipe.units(), CubeUnits::DigitalNumber);
        let Pipeline::Counts(mut inner) = pipe else {
            panic!("identity pipeline should stay in counts");
        };
        let raw = ramp_frame(100, 256);
        let out = inner.apply_raw(&raw).unwrap();
        assert_eq!(out.mapv(|v| v as u16), raw);
    }

    #[test]
    fn custom_stage_overrides_and_probes_shape() {
        let settings = test_settings();
        let calibration = test_calibration();
        fn halve_rows(x: ArrayView2<'_, i32>) -> Array2<i32> {
            x.slice(s![..x.nrows() / 2, ..]).to_owned()
        }
        let mut pipe = LinePipeline::with_custom_stages(
            &settings,
            &calibration,
            vec![Stage::Kind(Crop), Stage::Custom(halve_rows)],
        )
        .unwrap();
        assert_eq!(pipe.output_shape(), (40, 256));
        let out = pipe.apply_raw(&ramp_frame(100, 256)).unwrap();
        assert_eq!(out.dim(), (40, 256));
    }

    #[test]
    fn reflectance_is_radiance_over_reference() {
        let settings = test_settings();
        let calibration = test_calibration();
        let mut with_ref: LinePipeline<f32> =
            LinePipeline::new(&settings, &calibration, &ProcessingLevel::new(6).stages())
                .unwrap();
        let mut without: LinePipeline<f32> =
            LinePipeline::new(&settings, &calibration, &ProcessingLevel::new(4).stages())
                .unwrap();

        let raw = RawFrame::from_elem((100, 256), 350);
        let reflectance = with_ref.apply_raw(&raw).unwrap();
        let radiance = without.apply_raw(&raw).unwrap();
        // Flat at-sensor reference of 4.0 across the band.
        for (r, l) in reflectance.iter().zip(radiance.iter()) {
            assert!((r - l / 4.0).abs() < 1e-5);
        }
    }
}
