//! Scan the simulated camera and print a summary of the resulting cube.
//!
//! ```sh
//! RUST_LOG=info cargo run -p hsi-capture --example scan
//! ```

use hsi_capture::{collect, DataCube};
use hsi_core::calibration::Calibration;
use hsi_core::{CaptureSettings, ProcessingLevel};
use hsi_driver_sim::{FaultPlan, SimCamera, SimCameraConfig};
use ndarray::Array1;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = CaptureSettings {
        resolution: (100, 256),
        row_bounds: (10, 90),
        fwhm_nm: 4.0,
        exposure_ms: 10.0,
        luminance: 100.0,
        processing_level: ProcessingLevel::new(2),
        sensor_constant: 53_880.0,
    };
    let calibration = Calibration {
        smile_shifts: Some(vec![0; 100]),
        wavelengths: Some(Array1::from_shape_fn(256, |i| 400.0 + i as f64)),
        wavelengths_linear: Some(Array1::from_shape_fn(256, |i| 400.0 + i as f64)),
        ..Default::default()
    };

    let mut camera = SimCamera::new(SimCameraConfig {
        resolution: settings.resolution,
        seed: 1,
        fault: FaultPlan::None,
        ..Default::default()
    });

    let mut cube = DataCube::new(&settings, &calibration, 64)?;
    collect(&mut camera, &mut cube, 64)?;

    let (cross, along, bands) = cube.shape();
    println!("cube: {cross} x {along} x {bands} [{}]", cube.units().label());
    if let Some(nms) = cube.wavelengths() {
        println!(
            "bands span {:.1} - {:.1} nm",
            nms[0],
            nms[nms.len() - 1]
        );
    }
    if let Some(latest) = cube.timestamps().latest() {
        println!("last line at {latest}");
    }
    Ok(())
}
