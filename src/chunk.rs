//! Pixel buffers exchanged with the native layer
//!
//! The native layer always hands back a banded, masked chunk of `f64`
//! samples; the reader collapses that into a dense 2D array of the caller's
//! output type with no residual mask.

use ndarray::{Array2, Array3};
use num_traits::NumCast;
use std::fmt::Debug;

use crate::raster_spec::Window;

/// Output sample types the reader can produce.
///
/// Implemented for every primitive numeric type via the blanket impl;
/// samples are post-processed in `f64` and cast on the way out.
pub trait Sample: Copy + PartialEq + Debug + NumCast + Send + Sync + 'static {}

impl<T> Sample for T where T: Copy + PartialEq + Debug + NumCast + Send + Sync + 'static {}

/// A banded, masked read result from the native layer.
///
/// `data` has shape `(bands, rows, cols)`; `mask` has the same shape, with
/// `true` marking an invalid sample. Reads are always masked so that scale
/// and offset correction cannot disturb samples that will become fill value.
#[derive(Debug, Clone)]
pub struct MaskedChunk {
    pub data: Array3<f64>,
    pub mask: Array3<bool>,
}

impl MaskedChunk {
    /// Build a chunk from matching data and mask arrays.
    ///
    /// # Panics
    ///
    /// Panics if the two arrays disagree in shape; native-layer adapters
    /// must produce congruent buffers.
    #[must_use]
    pub fn new(data: Array3<f64>, mask: Array3<bool>) -> Self {
        assert_eq!(
            data.dim(),
            mask.dim(),
            "chunk data and mask must have the same shape"
        );
        Self { data, mask }
    }

    /// A one-band chunk of `value` with every sample valid.
    #[must_use]
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: Array3::from_elem((1, rows, cols), value),
            mask: Array3::from_elem((1, rows, cols), false),
        }
    }

    /// A one-band chunk with every sample invalid, as produced by the
    /// synthetic nodata dataset.
    #[must_use]
    pub fn fully_masked(rows: usize, cols: usize) -> Self {
        Self {
            data: Array3::zeros((1, rows, cols)),
            mask: Array3::from_elem((1, rows, cols), true),
        }
    }

    /// Number of bands.
    #[inline]
    #[must_use]
    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    /// Shape as `(rows, cols)`.
    #[inline]
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }
}

/// A dense fill-value buffer shaped to `window`, substituted for windows
/// that could not be read.
#[must_use]
pub fn nodata_for_window<T: Sample>(window: Window, fill_value: T) -> Array2<T> {
    Array2::from_elem(window.shape(), fill_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_chunk_shape() {
        let chunk = MaskedChunk::filled(4, 6, 7.5);
        assert_eq!(chunk.bands(), 1);
        assert_eq!(chunk.shape(), (4, 6));
        assert!(chunk.mask.iter().all(|&m| !m));
        assert!(chunk.data.iter().all(|&v| v == 7.5));
    }

    #[test]
    fn test_fully_masked_chunk() {
        let chunk = MaskedChunk::fully_masked(3, 3);
        assert_eq!(chunk.bands(), 1);
        assert!(chunk.mask.iter().all(|&m| m));
    }

    #[test]
    #[should_panic(expected = "same shape")]
    fn test_mismatched_mask_panics() {
        let _ = MaskedChunk::new(
            Array3::zeros((1, 2, 2)),
            Array3::from_elem((1, 3, 2), false),
        );
    }

    #[test]
    fn test_nodata_for_window() {
        let window = Window::new(0, 0, 10, 10);
        let buf = nodata_for_window(window, -9999i32);
        assert_eq!(buf.dim(), (10, 10));
        assert!(buf.iter().all(|&v| v == -9999));
    }
}
