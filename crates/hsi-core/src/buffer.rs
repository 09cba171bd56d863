//! Fixed-capacity circular buffer over one axis of an n-dimensional array.
//!
//! The buffer is preallocated at construction and never grows; every `put`
//! and `get` moves one (n-1)-dimensional slice across the designated time
//! axis. This bounds memory for unbounded streaming acquisition on
//! constrained hardware: the hot path performs no allocation at all.

use ndarray::{Array, ArrayView, Axis, Dimension, RemoveAxis, ShapeBuilder};
use num_traits::Zero;

/// Overwrite-when-full circular FIFO on an `ndarray::Array`.
///
/// One axis is designated the time axis; capacity equals the array's length
/// along it. When the buffer is full, `put` silently discards the oldest
/// retained slice instead of erroring. This is a deliberate bounded-lookback
/// choice for streaming sensors: the newest `capacity` slices are always
/// retained. Do not assume it where a lossless queue is wanted.
#[derive(Debug, Clone)]
pub struct RingBuffer<A, D: Dimension> {
    data: Array<A, D>,
    axis: Axis,
    write_pos: usize,
    read_pos: usize,
    slots_left: usize,
}

impl<A, D> RingBuffer<A, D>
where
    A: Clone + Zero,
    D: RemoveAxis,
{
    /// Preallocate a zero-filled buffer of `shape` with `axis` as the time
    /// axis.
    ///
    /// # Panics
    /// Panics if the shape is zero-length along `axis`.
    pub fn new<Sh>(shape: Sh, axis: Axis) -> Self
    where
        Sh: ShapeBuilder<Dim = D>,
    {
        let data = Array::zeros(shape);
        let capacity = data.len_of(axis);
        assert!(capacity > 0, "ring buffer needs a non-empty time axis");
        Self {
            data,
            axis,
            write_pos: 0,
            read_pos: 0,
            slots_left: capacity,
        }
    }

    /// Number of slices the buffer can retain.
    pub fn capacity(&self) -> usize {
        self.data.len_of(self.axis)
    }

    /// True iff no retained slice is available to `get`.
    pub fn is_empty(&self) -> bool {
        self.slots_left == self.capacity()
    }

    /// Number of slices currently retained.
    pub fn len(&self) -> usize {
        self.capacity() - self.slots_left
    }

    fn wrap(&self, idx: usize) -> usize {
        if idx == self.capacity() {
            0
        } else {
            idx
        }
    }

    /// Write one slice at the write cursor and advance it with wraparound.
    ///
    /// If the buffer was already full, the read cursor advances too,
    /// discarding the oldest retained slice. Never an error.
    ///
    /// # Panics
    /// Panics if `slice` does not match the buffer's slice shape.
    pub fn put(&mut self, slice: ArrayView<'_, A, D::Smaller>) {
        self.data
            .index_axis_mut(self.axis, self.write_pos)
            .assign(&slice);
        if self.slots_left == 0 {
            self.read_pos = self.wrap(self.read_pos + 1);
        } else {
            self.slots_left -= 1;
        }
        self.write_pos = self.wrap(self.write_pos + 1);
    }

    /// Read the oldest retained slice, advancing the read cursor.
    ///
    /// Returns `None` when the buffer is empty: underrun is a defined
    /// result callers must check, not an error. Never blocks.
    pub fn get(&mut self) -> Option<ArrayView<'_, A, D::Smaller>> {
        if self.is_empty() {
            return None;
        }
        let idx = self.read_pos;
        self.read_pos = self.wrap(self.read_pos + 1);
        self.slots_left += 1;
        Some(self.data.index_axis(self.axis, idx))
    }

    /// View of the backing array, for persistence collaborators that encode
    /// the whole cube at session end.
    pub fn data(&self) -> ArrayView<'_, A, D> {
        self.data.view()
    }

    /// Consume the buffer and return the backing array.
    pub fn into_inner(self) -> Array<A, D> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2, Axis, Ix2, Ix3};

    fn row(v: [i32; 3]) -> Array1<i32> {
        Array1::from_vec(v.to_vec())
    }

    #[test]
    fn fresh_buffer_is_empty_and_get_returns_none() {
        let mut buf = RingBuffer::<i32, Ix2>::new((4, 3), Axis(0));
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
        assert!(buf.get().is_none());
    }

    #[test]
    fn round_trip_preserves_push_order() {
        let mut buf = RingBuffer::<i32, Ix2>::new((4, 3), Axis(0));
        for i in 0..3 {
            buf.put(row([i, i + 10, i + 20]).view());
        }
        for i in 0..3 {
            let got = buf.get().map(|v| v.to_owned());
            assert_eq!(got, Some(row([i, i + 10, i + 20])));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn capacity_puts_then_capacity_gets_drains() {
        let mut buf = RingBuffer::<i32, Ix2>::new((4, 3), Axis(0));
        for i in 0..4 {
            buf.put(row([i, i, i]).view());
        }
        for _ in 0..4 {
            assert!(buf.get().is_some());
        }
        assert!(buf.is_empty());
        assert!(buf.get().is_none());
    }

    #[test]
    fn overflow_keeps_capacity_most_recent_oldest_first() {
        let mut buf = RingBuffer::<i32, Ix2>::new((4, 3), Axis(0));
        for i in 0..7 {
            buf.put(row([i, i, i]).view());
        }
        assert!(!buf.is_empty());
        // 7 puts into capacity 4: slices 3..7 retained, oldest first.
        for i in 3..7 {
            let got = buf.get().map(|v| v[0]);
            assert_eq!(got, Some(i));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn time_axis_can_be_interior() {
        // Cube layout: cross-track x along-track x spectral, time axis 1.
        let mut buf = RingBuffer::<i32, Ix3>::new((2, 3, 2), Axis(1));
        let line: Array2<i32> = array![[1, 2], [3, 4]];
        buf.put(line.view());
        assert_eq!(buf.len(), 1);
        let got = buf.get().map(|v| v.to_owned());
        assert_eq!(got, Some(line));
    }
}
