//! The native-library seam
//!
//! Decoding is delegated to an external raster library reached through two
//! traits: [`DatasetSource`] opens handles and builds reprojection wrappers,
//! [`RawDataset`] is one open handle. Handles are `Send` but not `Sync`:
//! nothing in the native layer tolerates two threads inside one handle, and
//! every concurrency strategy in this crate exists to respect that.
//!
//! [`ThreadsafeDataset`] is the capability the strategies present upward:
//! a windowed read, the cached scale/offset pair, and a close. Exactly one
//! implementation sits behind a reader once it has opened:
//!
//! - [`crate::LockedDataset`] for drivers unsafe even across handles
//! - [`crate::ThreadLocalDataset`] for drivers safe with one private handle
//!   per thread
//! - [`crate::NodataDataset`] when opening failed in a recognized way

use serde::{Deserialize, Serialize};

use crate::chunk::MaskedChunk;
use crate::env::EnvOptions;
use crate::error::DatasetError;
use crate::raster_spec::{Geometry, Window};

/// Resampling mode used when a dataset is reprojected onto the target grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
}

/// Working sample type hint forwarded to the reprojection wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    Int16,
    Int32,
    Float32,
    Float64,
}

/// Everything needed to rebuild a reprojection wrapper around a freshly
/// opened handle in another thread.
///
/// This is a pure value snapshot: the CRS travels in textual form because
/// native CRS objects are not assumed thread-safe, and no field refers back
/// to the handle the parameters were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpParams {
    /// Destination CRS in textual form.
    pub crs: String,
    pub resampling: Resampling,
    /// Error tolerance in source pixels for the approximate transformer.
    pub tolerance: f64,
    /// Source CRS override, set when georeferencing came from ground
    /// control points.
    pub src_crs: Option<String>,
    /// Source transform override, set alongside `src_crs`.
    pub src_transform: Option<[f64; 6]>,
    pub src_nodata: Option<f64>,
    /// Destination nodata value.
    pub nodata: Option<f64>,
    /// Destination transform.
    pub transform: [f64; 6],
    pub width: usize,
    pub height: usize,
    /// Working sample type for the warper, if pinned.
    pub working_type: Option<DataType>,
    /// When true the wrapper synthesizes an alpha band marking valid
    /// samples. Requested whenever the source declares no nodata value,
    /// since implicit zero-masking is unreliable at reprojected edges.
    pub add_alpha: bool,
    /// Driver-specific extra warp options.
    pub extras: EnvOptions,
}

/// Default warp tolerance, in source pixels.
pub const DEFAULT_WARP_TOLERANCE: f64 = 0.125;

/// One open native handle.
///
/// A handle may only ever be used by one thread at a time; it is `Send` so
/// a pool can drop it from a thread other than its opener, but never `Sync`.
/// Reads take `&mut self` to make exclusive use explicit in the type system.
pub trait RawDataset: Send + 'static {
    /// Identity of the decoding backend, e.g. `"GTiff"`. Determines which
    /// concurrency strategy is safe.
    fn driver(&self) -> &str;

    /// Number of bands the dataset exposes.
    fn band_count(&self) -> usize;

    /// Directly declared georeferencing.
    fn geometry(&self) -> Geometry;

    /// Georeferencing derived from ground control points, when present.
    /// Takes precedence over [`RawDataset::geometry`].
    fn gcp_geometry(&self) -> Option<Geometry>;

    /// Declared nodata value, if any.
    fn nodata(&self) -> Option<f64>;

    /// Scale/offset metadata of the first band.
    fn scale_offset(&self) -> (f64, f64);

    /// Decode one window as a masked chunk. `env` holds the read-phase
    /// options in effect for the duration of the call.
    fn read(&mut self, window: Window, env: &EnvOptions) -> Result<MaskedChunk, DatasetError>;

    /// Release the handle. Must tolerate being called at most once; the
    /// crate guarantees it never calls `close` twice.
    fn close(&mut self);
}

/// Factory for native handles.
///
/// Implementations wrap the external decoding library (or a test fake) and
/// must be cheaply shareable across threads, since the per-thread pool
/// re-opens through the same source from every reading thread.
pub trait DatasetSource: Send + Sync + 'static {
    type Dataset: RawDataset;

    /// Open a new handle for `url` with its own private descriptor.
    ///
    /// `driver_hint` is the driver identity recorded at first open, passed
    /// on re-opens so the library can skip driver probing. `env` holds the
    /// open-phase options in effect for the duration of the call.
    fn open(
        &self,
        url: &str,
        driver_hint: Option<&str>,
        env: &EnvOptions,
    ) -> Result<Self::Dataset, DatasetError>;

    /// Wrap `dataset` in a reprojection view described by `params`.
    ///
    /// The returned handle owns the base handle; closing the wrapper must
    /// close both.
    fn warp(
        &self,
        dataset: Self::Dataset,
        params: &WarpParams,
        env: &EnvOptions,
    ) -> Result<Self::Dataset, DatasetError>;
}

/// An owned handle with close-exactly-once semantics and the scale/offset
/// pair cached at open time (re-fetching it per read would need synchronized
/// access to the handle, and it never changes).
#[derive(Debug)]
pub struct OpenedDataset<D: RawDataset> {
    dataset: D,
    scale_offset: (f64, f64),
    closed: bool,
}

impl<D: RawDataset> OpenedDataset<D> {
    pub fn new(dataset: D) -> Self {
        let scale_offset = dataset.scale_offset();
        Self {
            dataset,
            scale_offset,
            closed: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn scale_offset(&self) -> (f64, f64) {
        self.scale_offset
    }

    pub fn read(&mut self, window: Window, env: &EnvOptions) -> Result<MaskedChunk, DatasetError> {
        if self.closed {
            return Err(DatasetError::new("dataset is closed"));
        }
        self.dataset.read(window, env)
    }

    /// Close the underlying handle. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.dataset.close();
            self.closed = true;
        }
    }
}

impl<D: RawDataset> Drop for OpenedDataset<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A dataset that many threads may read from concurrently.
///
/// The reader holds exactly one of these after opening and delegates every
/// read to it. Implementations decide how (or whether) to serialize access
/// to the native handles underneath.
pub trait ThreadsafeDataset: Send + Sync {
    /// Decode one window as a masked chunk.
    fn read(&self, window: Window) -> Result<MaskedChunk, DatasetError>;

    /// Scale/offset pair cached when the dataset was opened.
    fn scale_offset(&self) -> (f64, f64);

    /// Release this component's handles. Idempotent.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FakeSource;

    #[test]
    fn test_opened_dataset_closes_once() {
        let source = FakeSource::builder().build();
        let ds = source
            .open("fake://a", None, &EnvOptions::new())
            .unwrap();
        let mut opened = OpenedDataset::new(ds);
        opened.close();
        opened.close();
        drop(opened);
        assert_eq!(source.close_count(), 1);
    }

    #[test]
    fn test_opened_dataset_closes_on_drop() {
        let source = FakeSource::builder().build();
        {
            let ds = source
                .open("fake://a", None, &EnvOptions::new())
                .unwrap();
            let _opened = OpenedDataset::new(ds);
        }
        assert_eq!(source.close_count(), 1);
    }

    #[test]
    fn test_read_after_close_fails() {
        let source = FakeSource::builder().build();
        let ds = source
            .open("fake://a", None, &EnvOptions::new())
            .unwrap();
        let mut opened = OpenedDataset::new(ds);
        opened.close();
        let err = opened
            .read(Window::new(0, 0, 2, 2), &EnvOptions::new())
            .unwrap_err();
        assert!(err.message().contains("closed"));
    }

    #[test]
    fn test_scale_offset_cached_at_open() {
        let source = FakeSource::builder().scale_offset(2.0, 5.0).build();
        let ds = source
            .open("fake://a", None, &EnvOptions::new())
            .unwrap();
        let opened = OpenedDataset::new(ds);
        assert_eq!(opened.scale_offset(), (2.0, 5.0));
    }
}
