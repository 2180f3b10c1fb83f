//! Strategy-selecting raster reader
//!
//! [`RasterReader`] opens its dataset exactly once, lazily, on first read,
//! then picks the concurrency strategy the dataset's driver supports and
//! delegates every read to it:
//!
//! - driver on the multithreaded allow-list → [`ThreadLocalDataset`]
//!   (full parallelism, one private handle per thread, higher memory)
//! - any other driver → [`LockedDataset`] (all reads serialized)
//! - recognized open failure → [`NodataDataset`] (degraded, fill value only)
//!
//! After the delegate read, the reader normalizes the chunk: an explicit
//! alpha band (when present) becomes the authoritative validity mask, scale
//! and offset are applied, and invalid samples are replaced by the fill
//! value, producing a dense `Array2<T>` with no residual mask.

use ndarray::{Array2, Axis};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::chunk::{nodata_for_window, MaskedChunk, Sample};
use crate::dataset::{
    DatasetSource, OpenedDataset, RawDataset, Resampling, ThreadsafeDataset, WarpParams,
    DEFAULT_WARP_TOLERANCE,
};
use crate::env::{EnvOptions, LayeredEnv};
use crate::error::{error_matches, ErrorPattern, ReaderError};
use crate::nodata::NodataDataset;
use crate::raster_spec::{RasterSpec, Window};
use crate::locked::LockedDataset;
use crate::thread_local::ThreadLocalDataset;
use serde::{Deserialize, Serialize};

/// Drivers verified safe for independent-handle-per-thread access.
///
/// Native datasets are never safe to share across threads, but for these
/// drivers a copy of the dataset per thread (each on its own descriptor) may
/// be read in parallel. Compare hdf5-style drivers, which assume a single
/// thread in the entire library.
#[must_use]
pub fn default_multithreaded_drivers() -> BTreeSet<String> {
    BTreeSet::from(["GTiff".to_string()])
}

/// The full constructor-argument set of a [`RasterReader`], doubling as its
/// serializable snapshot.
///
/// Contains only values, never handles, locks, or thread-bound state, so it
/// can cross a process or worker boundary; a reader rebuilt from it starts
/// unopened and opens independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderOptions<T> {
    pub url: String,
    pub spec: RasterSpec,
    pub resampling: Resampling,
    /// Value substituted for every invalid or unreadable sample.
    pub fill_value: T,
    /// Scale/offset correction applied to valid samples, usually sourced
    /// from catalog metadata.
    pub scale_offset: (f64, f64),
    pub env: LayeredEnv,
    /// Failure classes that degrade to fill value instead of propagating.
    pub errors_as_nodata: Vec<ErrorPattern>,
    /// Per-instance driver allow-list for the per-thread strategy.
    pub multithreaded_drivers: BTreeSet<String>,
}

impl<T: Sample> ReaderOptions<T> {
    pub fn new(url: impl Into<String>, spec: RasterSpec, fill_value: T) -> Self {
        Self {
            url: url.into(),
            spec,
            resampling: Resampling::default(),
            fill_value,
            scale_offset: (1.0, 0.0),
            env: LayeredEnv::gdal_defaults(),
            errors_as_nodata: Vec::new(),
            multithreaded_drivers: default_multithreaded_drivers(),
        }
    }

    #[must_use]
    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    #[must_use]
    pub fn with_scale_offset(mut self, scale: f64, offset: f64) -> Self {
        self.scale_offset = (scale, offset);
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: LayeredEnv) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn with_errors_as_nodata(mut self, patterns: Vec<ErrorPattern>) -> Self {
        self.errors_as_nodata = patterns;
        self
    }

    #[must_use]
    pub fn with_multithreaded_drivers(mut self, drivers: BTreeSet<String>) -> Self {
        self.multithreaded_drivers = drivers;
        self
    }
}

/// Concurrency-safe windowed reader over one single-band asset.
///
/// Many threads may call [`RasterReader::read`] on the same instance; the
/// first read opens the dataset (concurrent first reads block behind one
/// open) and later reads go straight to the chosen delegate.
pub struct RasterReader<T: Sample, S: DatasetSource> {
    options: ReaderOptions<T>,
    source: Arc<S>,
    dataset: Mutex<Option<Arc<dyn ThreadsafeDataset>>>,
}

impl<T: Sample, S: DatasetSource> RasterReader<T, S> {
    pub fn new(source: Arc<S>, options: ReaderOptions<T>) -> Self {
        Self {
            options,
            source,
            dataset: Mutex::new(None),
        }
    }

    /// Rebuild a reader from a snapshot taken with [`RasterReader::snapshot`].
    /// The new instance starts unopened.
    pub fn from_snapshot(options: ReaderOptions<T>, source: Arc<S>) -> Self {
        Self::new(source, options)
    }

    /// The serializable snapshot of this reader's configuration.
    #[must_use]
    pub fn snapshot(&self) -> ReaderOptions<T> {
        self.options.clone()
    }

    /// Whether the dataset has been opened (or degraded) and not yet closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.dataset.lock().unwrap().is_some()
    }

    /// Read one window, post-processed to a dense array.
    ///
    /// Valid samples are corrected by the configured scale and offset
    /// (skipped when they are exactly 1 and 0); invalid samples become the
    /// fill value. Read failures matching the recognized-error patterns
    /// yield a fill-value buffer for this window only, with a warning.
    pub fn read(&self, window: Window) -> Result<Array2<T>, ReaderError> {
        let dataset = self.dataset()?;
        let chunk = match dataset.read(window) {
            Ok(chunk) => chunk,
            Err(e) => {
                if error_matches(&e, &self.options.errors_as_nodata) {
                    warn!(
                        url = %self.options.url,
                        %window,
                        error = %e,
                        "read failed; filling window with nodata"
                    );
                    return Ok(nodata_for_window(window, self.options.fill_value));
                }
                return Err(ReaderError::Read {
                    url: self.options.url.clone(),
                    window,
                    source: e,
                });
            }
        };
        self.postprocess(chunk, window)
    }

    /// Close the current delegate, if any. Idempotent; a later read reopens
    /// from scratch.
    pub fn close(&self) {
        let mut guard = self.dataset.lock().unwrap();
        if let Some(dataset) = guard.take() {
            dataset.close();
        }
    }

    /// The delegate dataset, opening it on first use. Concurrent callers
    /// block here until the one actual open finishes. A fatal open error is
    /// not memoized; the next read attempts the open again.
    fn dataset(&self) -> Result<Arc<dyn ThreadsafeDataset>, ReaderError> {
        let mut guard = self.dataset.lock().unwrap();
        if let Some(dataset) = guard.as_ref() {
            return Ok(Arc::clone(dataset));
        }
        let dataset = self.open_dataset()?;
        *guard = Some(Arc::clone(&dataset));
        Ok(dataset)
    }

    /// Open the dataset, validate it, reproject if needed, and pick the
    /// concurrency strategy from the driver identity.
    fn open_dataset(&self) -> Result<Arc<dyn ThreadsafeDataset>, ReaderError> {
        let env_open = self.options.env.merged_open();
        let mut dataset = match self.source.open(&self.options.url, None, &env_open) {
            Ok(dataset) => dataset,
            Err(e) => {
                if error_matches(&e, &self.options.errors_as_nodata) {
                    warn!(
                        url = %self.options.url,
                        error = %e,
                        "error opening asset; every read will return nodata"
                    );
                    return Ok(Arc::new(NodataDataset::new()));
                }
                return Err(ReaderError::Open {
                    url: self.options.url.clone(),
                    source: e,
                });
            }
        };

        let count = dataset.band_count();
        if count != 1 {
            dataset.close();
            return Err(ReaderError::BandCount {
                url: self.options.url.clone(),
                count,
            });
        }

        let driver = dataset.driver().to_string();
        let warp = self.warp_params(&dataset);
        let dataset = match &warp {
            Some(params) => self
                .source
                .warp(dataset, params, &env_open)
                .map_err(|e| ReaderError::Open {
                    url: self.options.url.clone(),
                    source: e,
                })?,
            None => dataset,
        };
        let opened = OpenedDataset::new(dataset);

        if self.options.multithreaded_drivers.contains(&driver) {
            debug!(url = %self.options.url, %driver, "using per-thread dataset pool");
            Ok(Arc::new(ThreadLocalDataset::new(
                Arc::clone(&self.source),
                self.options.url.clone(),
                driver,
                self.options.env.clone(),
                warp,
                opened,
            )))
        } else {
            debug!(
                url = %self.options.url,
                %driver,
                "driver not verified for multithreading; serializing reads"
            );
            Ok(Arc::new(LockedDataset::new(
                opened,
                self.options.env.merged_read(),
            )))
        }
    }

    /// Decide whether the dataset needs reprojecting onto the target spec,
    /// and capture the replayable parameter snapshot if so.
    ///
    /// Georeferencing derived from ground control points takes precedence
    /// over the directly declared geometry. The comparison is exact value
    /// equality, so a transform re-derived with different rounding will
    /// trigger a (harmless but wasteful) warp.
    fn warp_params(&self, dataset: &S::Dataset) -> Option<WarpParams> {
        let gcp = dataset.gcp_geometry();
        let from_gcps = gcp.is_some();
        let native = gcp.unwrap_or_else(|| dataset.geometry());
        let target = self.options.spec.geometry();
        if native == target {
            return None;
        }
        let nodata = dataset.nodata();
        Some(WarpParams {
            crs: target.crs.clone(),
            resampling: self.options.resampling,
            tolerance: DEFAULT_WARP_TOLERANCE,
            src_crs: from_gcps.then(|| native.crs.clone()),
            src_transform: from_gcps.then_some(native.transform),
            src_nodata: nodata,
            nodata,
            transform: target.transform,
            width: target.width,
            height: target.height,
            working_type: None,
            // Without a declared nodata value, samples outside the source
            // footprint come back as bare zeros after reprojection; an
            // explicit alpha band is the only reliable validity mask.
            add_alpha: nodata.is_none(),
            extras: EnvOptions::new(),
        })
    }

    /// Collapse a banded masked chunk into a dense output array.
    fn postprocess(&self, chunk: MaskedChunk, window: Window) -> Result<Array2<T>, ReaderError> {
        let (rows, cols) = chunk.shape();
        if (rows, cols) != window.shape() {
            return Err(ReaderError::ChunkShape {
                window,
                expected: window.shape(),
                got: (rows, cols),
            });
        }

        let data = chunk.data.index_axis(Axis(0), 0);
        let mask = match chunk.bands() {
            // Data plus explicit alpha: the alpha band is the authoritative
            // validity mask (zero = invalid), replacing any implicit mask.
            2 => chunk.data.index_axis(Axis(0), 1).mapv(|alpha| alpha == 0.0),
            1 => chunk.mask.index_axis(Axis(0), 0).to_owned(),
            count => return Err(ReaderError::UnexpectedBands { count, window }),
        };

        let (scale, offset) = self.options.scale_offset;
        let mut out = Array2::from_elem((rows, cols), self.options.fill_value);
        for r in 0..rows {
            for c in 0..cols {
                if mask[[r, c]] {
                    continue;
                }
                let mut value = data[[r, c]];
                if scale != 1.0 {
                    value *= scale;
                }
                if offset != 0.0 {
                    value += offset;
                }
                out[[r, c]] =
                    num_traits::cast(value).ok_or(ReaderError::OutputCast {
                        value,
                        ty: std::any::type_name::<T>(),
                    })?;
            }
        }
        Ok(out)
    }
}
