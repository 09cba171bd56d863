//! Data-cube assembly and the blocking acquisition loop.
//!
//! This crate sits between a driver implementing
//! [`hsi_core::FrameSource`] and downstream consumers of processed
//! spectral cubes:
//!
//! - [`cube::DataCube`]: pipeline plus preallocated along-track ring
//!   storage, with per-line timestamps and optional sensor temperatures.
//! - [`acquire::collect`]: the fetch/process loop, with the camera stopped
//!   exactly once on every exit path.
//! - [`acquire::reprocess`]: re-run a stored unprocessed cube at a
//!   different processing level.

pub mod acquire;
pub mod cube;

pub use acquire::{average_frames, collect, reprocess};
pub use cube::{DataCube, TimestampBuffer};
