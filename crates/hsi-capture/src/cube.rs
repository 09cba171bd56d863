//! Data-cube assembly: processed lines stacked along the along-track axis.
//!
//! A [`DataCube`] owns the session pipeline and a preallocated ring of
//! processed lines laid out as (cross-track, along-track, spectral band),
//! with along-track as the ring axis. Once the scan exceeds capacity the
//! oldest lines are overwritten, so a cube always holds the most recent
//! window of the scan.

use chrono::{DateTime, Utc};
use ndarray::{aview0, Array1, ArrayView3, Axis, Ix1, Ix3};

use hsi_core::pipeline::LinePipeline;
use hsi_core::{
    Calibration, CaptureSettings, CubeUnits, HsiError, HsiResult, Pipeline, RawFrame, RingBuffer,
};

/// Fixed-capacity ring of acquisition timestamps, one per stored line.
///
/// Kept separate from the sample rings: timestamps are not array elements
/// and a failed pipeline pass must still leave a record of the attempt.
#[derive(Debug, Clone)]
pub struct TimestampBuffer {
    slots: Vec<DateTime<Utc>>,
    capacity: usize,
    write_pos: usize,
    len: usize,
}

impl TimestampBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "timestamp buffer needs capacity");
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    /// Record `when` in the next slot, overwriting the oldest once full.
    pub fn update(&mut self, when: DateTime<Utc>) {
        if self.slots.len() < self.capacity {
            self.slots.push(when);
        } else {
            self.slots[self.write_pos] = when;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        if self.len == 0 {
            None
        } else {
            let i = (self.write_pos + self.capacity - 1) % self.capacity;
            Some(self.slots[i])
        }
    }

    /// Stored timestamps in arrival order, oldest first.
    pub fn ordered(&self) -> Vec<DateTime<Utc>> {
        if self.slots.len() < self.capacity {
            return self.slots.clone();
        }
        let mut out = Vec::with_capacity(self.len);
        for k in 0..self.len {
            out.push(self.slots[(self.write_pos + k) % self.capacity]);
        }
        out
    }
}

/// The sample storage, typed by the pipeline's element kind.
#[derive(Debug)]
enum CubeStore {
    Counts {
        pipeline: LinePipeline<i32>,
        lines: RingBuffer<i32, Ix3>,
    },
    Radiometric {
        pipeline: LinePipeline<f32>,
        lines: RingBuffer<f32, Ix3>,
    },
}

/// A streaming data cube: pipeline plus preallocated line, timestamp and
/// temperature storage for one acquisition session.
#[derive(Debug)]
pub struct DataCube {
    resolution: (usize, usize),
    store: CubeStore,
    timestamps: TimestampBuffer,
    temperatures: RingBuffer<f32, Ix1>,
}

impl DataCube {
    /// Build the pipeline for the settings' processing level and preallocate
    /// storage for `n_lines` processed lines.
    pub fn new(
        settings: &CaptureSettings,
        calibration: &Calibration,
        n_lines: usize,
    ) -> HsiResult<Self> {
        if n_lines == 0 {
            return Err(HsiError::Configuration(
                "a data cube needs at least one along-track line".into(),
            ));
        }
        let pipeline = Pipeline::for_level(settings, calibration, settings.processing_level)?;
        let (rows, bands) = pipeline.output_shape();
        let store = match pipeline {
            Pipeline::Counts(pipeline) => CubeStore::Counts {
                pipeline,
                lines: RingBuffer::new((rows, n_lines, bands), Axis(1)),
            },
            Pipeline::Radiometric(pipeline) => CubeStore::Radiometric {
                pipeline,
                lines: RingBuffer::new((rows, n_lines, bands), Axis(1)),
            },
        };
        Ok(Self {
            resolution: settings.resolution,
            store,
            timestamps: TimestampBuffer::new(n_lines),
            temperatures: RingBuffer::new(n_lines, Axis(0)),
        })
    }

    /// Process one raw frame and append the result along the track axis.
    ///
    /// The timestamp is taken before processing so it reflects acquisition
    /// time, and it is recorded even when the pipeline pass fails.
    pub fn put(&mut self, frame: &RawFrame) -> HsiResult<()> {
        self.timestamps.update(Utc::now());
        if frame.dim() != self.resolution {
            return Err(HsiError::Processing(format!(
                "frame shape {:?} does not match the configured {:?} resolution",
                frame.dim(),
                self.resolution
            )));
        }
        match &mut self.store {
            CubeStore::Counts { pipeline, lines } => {
                let line = pipeline.apply_raw(frame)?;
                lines.put(line.view());
            }
            CubeStore::Radiometric { pipeline, lines } => {
                let line = pipeline.apply_raw(frame)?;
                lines.put(line.view());
            }
        }
        Ok(())
    }

    /// Record a sensor temperature reading alongside the current line.
    pub fn record_temperature(&mut self, celsius: f32) {
        self.temperatures.put(aview0(&celsius));
    }

    /// Lines currently stored (saturates at capacity).
    pub fn len(&self) -> usize {
        match &self.store {
            CubeStore::Counts { lines, .. } => lines.len(),
            CubeStore::Radiometric { lines, .. } => lines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full storage shape: (cross-track, along-track capacity, bands).
    pub fn shape(&self) -> (usize, usize, usize) {
        let view = match &self.store {
            CubeStore::Counts { lines, .. } => lines.data().dim(),
            CubeStore::Radiometric { lines, .. } => lines.data().dim(),
        };
        view
    }

    pub fn units(&self) -> CubeUnits {
        match &self.store {
            CubeStore::Counts { pipeline, .. } => pipeline.units(),
            CubeStore::Radiometric { pipeline, .. } => pipeline.units(),
        }
    }

    /// Band-center wavelengths, when the stage chain defines them.
    pub fn wavelengths(&self) -> Option<Array1<f64>> {
        match &self.store {
            CubeStore::Counts { pipeline, .. } => pipeline.output_wavelengths(),
            CubeStore::Radiometric { pipeline, .. } => pipeline.output_wavelengths(),
        }
    }

    /// Integer sample storage, `None` for radiometric cubes.
    pub fn counts(&self) -> Option<ArrayView3<'_, i32>> {
        match &self.store {
            CubeStore::Counts { lines, .. } => Some(lines.data()),
            CubeStore::Radiometric { .. } => None,
        }
    }

    /// Floating-point sample storage, `None` for counts cubes.
    pub fn radiometric(&self) -> Option<ArrayView3<'_, f32>> {
        match &self.store {
            CubeStore::Counts { .. } => None,
            CubeStore::Radiometric { lines, .. } => Some(lines.data()),
        }
    }

    pub fn timestamps(&self) -> &TimestampBuffer {
        &self.timestamps
    }

    /// Recorded sensor temperatures, in ring storage order.
    pub fn temperatures(&self) -> ndarray::ArrayView1<'_, f32> {
        self.temperatures.data()
    }

    /// Degraded-accuracy events from radiometric reference resampling.
    pub fn shape_warnings(&self) -> u32 {
        match &self.store {
            CubeStore::Counts { pipeline, .. } => pipeline.shape_warnings(),
            CubeStore::Radiometric { pipeline, .. } => pipeline.shape_warnings(),
        }
    }
}
