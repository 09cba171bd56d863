//! Simulated push-broom camera.
//!
//! Serves deterministic mercury-argon lamp frames with shot-noise jitter, a
//! slow sensor temperature drift, and an optional fault plan for exercising
//! error paths in acquisition code. No hardware, no I/O; a seeded camera
//! replays the same scan every run.

mod pattern;

use anyhow::{bail, Result};
use hsi_core::{ExposureControl, FrameSource, RawFrame};
use tracing::{debug, info};

pub use pattern::{emission_spectrum, Lcg, HG_AR_LINES_NM};

/// 12-bit sensor full scale.
const FULL_SCALE: f64 = 4095.0;

/// Where the simulated camera fails, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPlan {
    #[default]
    None,
    /// `start` fails; no frame is ever served.
    FailStart,
    /// The first `n` fetches succeed, the next one fails.
    FailFetchAt(u32),
}

#[derive(Debug, Clone)]
pub struct SimCameraConfig {
    /// (cross-track rows, spectral columns).
    pub resolution: (usize, usize),
    pub exposure_ms: f64,
    /// Spectral window rendered across the columns.
    pub window_nm: (f64, f64),
    pub seed: u64,
    pub fault: FaultPlan,
}

impl Default for SimCameraConfig {
    fn default() -> Self {
        Self {
            resolution: (100, 256),
            exposure_ms: 10.0,
            window_nm: (250.0, 950.0),
            seed: 0,
            fault: FaultPlan::None,
        }
    }
}

/// Simulated camera implementing the standard capability traits.
#[derive(Debug)]
pub struct SimCamera {
    config: SimCameraConfig,
    /// Per-column lamp spectrum, fraction of full scale.
    spectrum: Vec<f64>,
    prng: Lcg,
    running: bool,
    frames_served: u32,
    start_count: u32,
    stop_count: u32,
    temperature_c: f32,
}

impl SimCamera {
    pub fn new(config: SimCameraConfig) -> Self {
        let (start_nm, end_nm) = config.window_nm;
        let spectrum = emission_spectrum(config.resolution.1, start_nm, end_nm);
        let prng = Lcg::new(config.seed);
        Self {
            config,
            spectrum,
            prng,
            running: false,
            frames_served: 0,
            start_count: 0,
            stop_count: 0,
            temperature_c: 21.0,
        }
    }

    pub fn with_fault(mut self, fault: FaultPlan) -> Self {
        self.config.fault = fault;
        self
    }

    pub fn frames_served(&self) -> u32 {
        self.frames_served
    }

    /// How many times `start` succeeded.
    pub fn start_count(&self) -> u32 {
        self.start_count
    }

    /// How many times `stop` was called. Acquisition code must bring this to
    /// exactly one per session, on every exit path.
    pub fn stop_count(&self) -> u32 {
        self.stop_count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn render_frame(&mut self) -> RawFrame {
        let (rows, cols) = self.config.resolution;
        // Exposure scales signal linearly; a 10 ms exposure reaches roughly
        // half of full scale at the strongest line.
        let gain = FULL_SCALE * 0.5 * self.config.exposure_ms / 10.0;
        let mut frame = RawFrame::zeros((rows, cols));
        for i in 0..rows {
            // Weak cross-track vignetting toward the sensor edges.
            let falloff = 1.0 - 0.2 * ((i as f64 / rows as f64) - 0.5).abs();
            for j in 0..cols {
                let signal = self.spectrum[j] * gain * falloff;
                let noise = (self.prng.next_f64() - 0.5) * 8.0;
                frame[[i, j]] = (signal + noise).clamp(0.0, FULL_SCALE) as u16;
            }
        }
        frame
    }
}

impl FrameSource for SimCamera {
    fn start(&mut self) -> Result<()> {
        if self.config.fault == FaultPlan::FailStart {
            bail!("simulated start failure");
        }
        self.running = true;
        self.start_count += 1;
        info!(
            rows = self.config.resolution.0,
            cols = self.config.resolution.1,
            seed = self.config.seed,
            "simulated camera started"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        self.stop_count += 1;
        debug!(frames = self.frames_served, "simulated camera stopped");
        Ok(())
    }

    fn fetch_frame(&mut self) -> Result<RawFrame> {
        if !self.running {
            bail!("fetch_frame on a camera that is not acquiring");
        }
        if let FaultPlan::FailFetchAt(n) = self.config.fault {
            if self.frames_served >= n {
                bail!("simulated readout failure on frame {}", self.frames_served);
            }
        }
        let frame = self.render_frame();
        self.frames_served += 1;
        // Sensor warms slowly while acquiring, with readout jitter.
        self.temperature_c += 0.01 + (self.prng.next_f64() as f32 - 0.5) * 0.002;
        Ok(frame)
    }

    fn resolution(&self) -> (usize, usize) {
        self.config.resolution
    }

    fn temperature(&mut self) -> Option<f32> {
        Some(self.temperature_c)
    }
}

impl ExposureControl for SimCamera {
    fn set_exposure(&mut self, exposure_ms: f64) -> Result<()> {
        if exposure_ms.is_nan() || exposure_ms <= 0.0 {
            bail!("exposure must be positive, got {exposure_ms} ms");
        }
        self.config.exposure_ms = exposure_ms;
        Ok(())
    }

    fn exposure(&self) -> f64 {
        self.config.exposure_ms
    }
}
