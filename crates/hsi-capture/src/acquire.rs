//! The blocking acquisition loop.
//!
//! One logical thread: fetch a frame, push it through the cube's pipeline,
//! repeat. The camera is stopped exactly once on every exit path, and a
//! mid-scan failure propagates in preference to any error the stop itself
//! raises.

use ndarray::{Array2, ArrayView3, Axis};
use tracing::{info, warn};

use hsi_core::{
    Calibration, CaptureSettings, DriverError, DriverErrorKind, FrameSource, HsiError, HsiResult,
    ProcessingLevel, RawFrame,
};

use crate::cube::DataCube;

fn driver_error(kind: DriverErrorKind, source: anyhow::Error) -> HsiError {
    HsiError::Driver(DriverError::new("camera", kind, format!("{source:#}")))
}

/// Acquire `n_lines` frames into `cube`.
///
/// Starts the camera, runs the fetch/process loop, and stops the camera
/// before returning regardless of how the loop ended. Partial data stays in
/// the cube when the scan fails part way.
pub fn collect(
    camera: &mut dyn FrameSource,
    cube: &mut DataCube,
    n_lines: usize,
) -> HsiResult<()> {
    if let Err(e) = camera.start() {
        // The driver may have partially initialized; release it anyway.
        if let Err(stop_err) = camera.stop() {
            warn!(error = %stop_err, "stop after failed start also failed");
        }
        return Err(driver_error(DriverErrorKind::Initialization, e));
    }

    let result = run_scan(camera, cube, n_lines);
    let stopped = camera.stop();

    match (result, stopped) {
        (Err(e), stop) => {
            if let Err(stop_err) = stop {
                warn!(error = %stop_err, "stop after failed scan also failed");
            }
            Err(e)
        }
        (Ok(()), Err(e)) => Err(driver_error(DriverErrorKind::Shutdown, e)),
        (Ok(()), Ok(())) => {
            info!(lines = n_lines, "scan complete");
            Ok(())
        }
    }
}

fn run_scan(camera: &mut dyn FrameSource, cube: &mut DataCube, n_lines: usize) -> HsiResult<()> {
    for line in 0..n_lines {
        let frame = camera
            .fetch_frame()
            .map_err(|e| driver_error(DriverErrorKind::Acquisition, e))?;
        cube.put(&frame)?;
        if let Some(celsius) = camera.temperature() {
            cube.record_temperature(celsius);
        }
        if line == 0 {
            info!(
                shape = ?cube.shape(),
                units = cube.units().label(),
                "first line processed"
            );
        }
    }
    Ok(())
}

/// Fetch `n` frames and return their per-pixel mean, with the same
/// start/stop discipline as [`collect`]. Used for dark-frame and flat-field
/// captures.
pub fn average_frames(camera: &mut dyn FrameSource, n: usize) -> HsiResult<Array2<f64>> {
    if n == 0 {
        return Err(HsiError::Configuration(
            "averaging needs at least one frame".into(),
        ));
    }
    if let Err(e) = camera.start() {
        if let Err(stop_err) = camera.stop() {
            warn!(error = %stop_err, "stop after failed start also failed");
        }
        return Err(driver_error(DriverErrorKind::Initialization, e));
    }

    let result = (|| -> HsiResult<Array2<f64>> {
        let (rows, cols) = camera.resolution();
        let mut sum = Array2::<f64>::zeros((rows, cols));
        for _ in 0..n {
            let frame = camera
                .fetch_frame()
                .map_err(|e| driver_error(DriverErrorKind::Acquisition, e))?;
            if frame.dim() != (rows, cols) {
                return Err(HsiError::Processing(format!(
                    "frame shape {:?} does not match the advertised {:?} resolution",
                    frame.dim(),
                    (rows, cols)
                )));
            }
            sum.zip_mut_with(&frame, |acc, &v| *acc += f64::from(v));
        }
        sum /= n as f64;
        Ok(sum)
    })();

    let stopped = camera.stop();
    match (result, stopped) {
        (Err(e), stop) => {
            if let Err(stop_err) = stop {
                warn!(error = %stop_err, "stop after failed capture also failed");
            }
            Err(e)
        }
        (Ok(_), Err(e)) => Err(driver_error(DriverErrorKind::Shutdown, e)),
        (Ok(mean), Ok(())) => Ok(mean),
    }
}

/// Re-run stored unprocessed frames through a different processing level.
///
/// `raw_lines` must hold sensor-resolution frames stacked along `Axis(1)`,
/// i.e. a cube captured at an identity level. Values outside the `u16`
/// range are clamped.
pub fn reprocess(
    raw_lines: ArrayView3<'_, i32>,
    settings: &CaptureSettings,
    calibration: &Calibration,
    level: ProcessingLevel,
) -> HsiResult<DataCube> {
    let n_lines = raw_lines.len_of(Axis(1));
    if n_lines == 0 {
        return Err(HsiError::Processing("no stored lines to reprocess".into()));
    }
    let mut settings = settings.clone();
    settings.processing_level = level;
    let mut cube = DataCube::new(&settings, calibration, n_lines)?;
    for t in 0..n_lines {
        let frame: RawFrame = raw_lines
            .index_axis(Axis(1), t)
            .mapv(|v| v.clamp(0, i32::from(u16::MAX)) as u16);
        cube.put(&frame)?;
    }
    Ok(cube)
}
