//! Camera capability traits.
//!
//! Physical camera drivers live outside this core; they plug in through the
//! small capability traits below. The contract is deliberately synchronous:
//! acquisition is one logical thread where `fetch_frame` is the only
//! blocking point, so the camera is never asked for a new frame before the
//! previous one has fully traversed the pipeline.
//!
//! # Contract
//! - `start` begins hardware streaming; `stop` ends it and is safe to call
//!   at any time, including after a failed `start`.
//! - `fetch_frame` blocks until a frame is available; its shape must equal
//!   `resolution()`.
//! - `temperature` defaults to `None`; a driver that cannot read a sensor
//!   temperature simply leaves it, and no temperature is recorded.

use anyhow::Result;
use ndarray::Array2;

/// One raw sensor readout: cross-track rows by raw spectral columns, in
/// digital numbers.
pub type RawFrame = Array2<u16>;

/// Capability: push-broom frame production.
pub trait FrameSource: Send {
    /// Begin hardware streaming.
    fn start(&mut self) -> Result<()>;

    /// End streaming. Safe to call any time, including after a failed
    /// `start`; hardware must release on all exits.
    fn stop(&mut self) -> Result<()>;

    /// Block until the next frame is available and return it.
    fn fetch_frame(&mut self) -> Result<RawFrame>;

    /// Fixed readout shape: (cross-track rows, raw spectral columns).
    fn resolution(&self) -> (usize, usize);

    /// Sensor temperature in degrees Celsius, if the hardware exposes one.
    fn temperature(&mut self) -> Option<f32> {
        None
    }
}

/// Capability: configurable integration time.
///
/// Changing the exposure affects which radiometric reference slice is
/// nearest at the next pipeline setup; it does not rebuild an active
/// pipeline.
pub trait ExposureControl {
    /// Set exposure time in milliseconds.
    fn set_exposure(&mut self, exposure_ms: f64) -> Result<()>;

    /// Current exposure time in milliseconds.
    fn exposure(&self) -> f64;
}
