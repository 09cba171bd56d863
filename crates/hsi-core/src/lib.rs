//! Core types and traits for streaming hyperspectral line-scan acquisition.
//!
//! A push-broom hyperspectral sensor delivers one 2D frame per exposure:
//! cross-track rows by raw spectral columns. This crate turns those frames
//! into calibrated spectral lines under a fixed memory budget:
//!
//! - [`buffer::RingBuffer`]: fixed-capacity circular buffer over one axis of
//!   an n-dimensional array, with overwrite-when-full FIFO semantics.
//! - [`settings::CaptureSettings`] / [`calibration::Calibration`]: immutable
//!   per-session configuration and calibration records.
//! - [`stage`]: the closed set of per-line transforms (crop, smile
//!   correction, spectral binning, radiometric conversion) and the
//!   processing-level table that orders them.
//! - [`pipeline::Pipeline`]: a sealed stage chain with all lookups
//!   precomputed at setup, applied once per acquired line.
//! - [`capabilities`]: the camera-facing capability traits implemented by
//!   driver crates.
//!
//! Everything here runs on a single logical thread: one blocking frame fetch,
//! one synchronous pipeline pass, then the next fetch. No locking is needed
//! and no buffer grows after construction.

pub mod buffer;
pub mod calibration;
pub mod capabilities;
pub mod error;
pub mod pipeline;
pub mod settings;
pub mod stage;

pub use buffer::RingBuffer;
pub use calibration::{Calibration, RadiometricReference, SampledFit};
pub use capabilities::{ExposureControl, FrameSource, RawFrame};
pub use error::{DriverError, DriverErrorKind, HsiError, HsiResult};
pub use pipeline::{Element, LinePipeline, Pipeline, Stage};
pub use settings::CaptureSettings;
pub use stage::{CubeUnits, ProcessingLevel, StageKind};
