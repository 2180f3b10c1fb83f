//! Lock-serialized dataset
//!
//! For drivers that are unsafe even across independent handles (hdf5-style
//! libraries that assume a single thread in the whole library), the only
//! correct strategy is one handle with every native call behind a mutex.
//! All readers serialize; slow, but safe.

use std::sync::Mutex;

use crate::chunk::MaskedChunk;
use crate::dataset::{OpenedDataset, RawDataset, ThreadsafeDataset};
use crate::env::EnvOptions;
use crate::error::DatasetError;
use crate::raster_spec::Window;

/// A single handle serialized by a lock.
///
/// The one mutex covers both reads and close, so a close issued while a
/// read is in flight blocks until that read finishes.
pub struct LockedDataset<D: RawDataset> {
    inner: Mutex<OpenedDataset<D>>,
    scale_offset: (f64, f64),
    read_env: EnvOptions,
}

impl<D: RawDataset> LockedDataset<D> {
    pub fn new(dataset: OpenedDataset<D>, read_env: EnvOptions) -> Self {
        let scale_offset = dataset.scale_offset();
        Self {
            inner: Mutex::new(dataset),
            scale_offset,
            read_env,
        }
    }
}

impl<D: RawDataset> ThreadsafeDataset for LockedDataset<D> {
    /// Acquire the lock, then read. Only one thread is ever inside the
    /// native handle.
    fn read(&self, window: Window) -> Result<MaskedChunk, DatasetError> {
        let mut inner = self.inner.lock().unwrap();
        inner.read(window, &self.read_env)
    }

    fn scale_offset(&self) -> (f64, f64) {
        self.scale_offset
    }

    /// Acquire the lock, then close the handle (and its reprojection
    /// wrapper, which owns the base handle). Dropping the struct closes as
    /// a safety net if this is never called.
    fn close(&self) {
        self.inner.lock().unwrap().close();
    }
}
