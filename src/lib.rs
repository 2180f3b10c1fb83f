//! # rasterpool - Concurrency-Safe Raster Dataset Access
//!
//! A library for reading windowed pixel data from single-band raster assets
//! through native dataset handles that are not thread-safe.
//!
//! ## Features
//!
//! - **Strategy selection**: Per-thread handle pools for drivers that allow
//!   them, lock-serialized access for drivers that don't
//! - **Lazy opening**: Datasets open on first read, once, even under
//!   concurrent first reads
//! - **Graceful degradation**: Caller-selected failure classes turn into
//!   fill-value output instead of errors
//! - **Reprojection**: Datasets whose geometry differs from the target grid
//!   are warped onto it, replayably, in every reading thread
//! - **Masked post-processing**: Alpha-aware masking, scale/offset
//!   correction, and fill substitution produce dense typed output
//! - **Snapshots**: Reader configuration serializes as pure values and
//!   rebuilds in another process, reopening handles locally
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rasterpool::{RasterReader, ReaderOptions, RasterSpec, Window};
//!
//! let spec = RasterSpec::new(
//!     "EPSG:32633",
//!     (500_000.0, 0.0, 600_000.0, 100_000.0),
//!     (10.0, 10.0),
//! );
//! let options = ReaderOptions::new("s3://bucket/asset.tif", spec, f64::NAN);
//! let reader = RasterReader::new(source, options);
//!
//! // Safe to call from many threads at once.
//! let pixels = reader.read(Window::new(0, 0, 512, 512))?;
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`reader`]: The strategy-selecting [`RasterReader`] and its options
//! - [`dataset`]: Native-library seam traits ([`DatasetSource`],
//!   [`RawDataset`], [`ThreadsafeDataset`]) and warp parameter snapshots
//! - [`thread_local`]: Per-thread handle pool for multithread-safe drivers
//! - [`locked`]: Mutex-serialized single handle for everything else
//! - [`nodata`]: Synthetic empty dataset used in degraded mode
//! - [`chunk`]: Masked pixel buffers exchanged with the native layer
//! - [`raster_spec`]: Target grid description and read windows
//! - [`env`]: Phase-layered native-library configuration
//! - [`error`]: Error taxonomy and recognized-error matching

// ============================================================================
// Public modules
// ============================================================================

pub mod chunk;
pub mod dataset;
pub mod env;
pub mod error;
pub mod locked;
pub mod nodata;
pub mod raster_spec;
pub mod reader;
pub mod thread_local;

#[cfg(test)]
pub mod fixtures;

// ============================================================================
// Reader
// ============================================================================

pub use reader::{default_multithreaded_drivers, RasterReader, ReaderOptions};

// ============================================================================
// Dataset Seam
// ============================================================================

pub use dataset::{
    DataType,
    DatasetSource,
    OpenedDataset,
    RawDataset,
    Resampling,
    ThreadsafeDataset,
    WarpParams,
    DEFAULT_WARP_TOLERANCE,
};

// ============================================================================
// Concurrency Strategies
// ============================================================================

pub use locked::LockedDataset;
pub use nodata::NodataDataset;
pub use thread_local::ThreadLocalDataset;

// ============================================================================
// Grid & Buffers
// ============================================================================

pub use chunk::{nodata_for_window, MaskedChunk, Sample};
pub use raster_spec::{Geometry, RasterSpec, Window};

// ============================================================================
// Configuration & Errors
// ============================================================================

pub use env::{EnvOptions, LayeredEnv};
pub use error::{error_matches, DatasetError, ErrorPattern, ReaderError};
