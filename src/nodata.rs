//! Synthetic empty dataset
//!
//! Stands in for a dataset that could not be opened in a recognized way.
//! Never touches the native library: every read yields a fully-masked chunk
//! shaped to the window, which the reader's post-processing turns into pure
//! fill value.

use crate::chunk::MaskedChunk;
use crate::dataset::ThreadsafeDataset;
use crate::error::DatasetError;
use crate::raster_spec::Window;

/// The degraded-mode delegate. Only the specific reader that failed to open
/// holds one; read-level failures on healthy datasets are substituted per
/// call and never swap this in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodataDataset;

impl NodataDataset {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ThreadsafeDataset for NodataDataset {
    fn read(&self, window: Window) -> Result<MaskedChunk, DatasetError> {
        let (rows, cols) = window.shape();
        Ok(MaskedChunk::fully_masked(rows, cols))
    }

    fn scale_offset(&self) -> (f64, f64) {
        (1.0, 0.0)
    }

    fn close(&self) {}
}
