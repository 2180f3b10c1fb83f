//! Instrumented fake dataset source shared across unit tests.
//!
//! `FakeSource` stands in for the native decoding library: it counts opens,
//! warps, reads, and closes, can inject open/read failures, and can delay
//! reads while tracking the concurrency high-water mark so tests can prove
//! reads were (or were not) serialized.

use ndarray::Array3;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::chunk::MaskedChunk;
use crate::dataset::{DatasetSource, RawDataset, WarpParams};
use crate::env::EnvOptions;
use crate::error::DatasetError;
use crate::raster_spec::{Geometry, RasterSpec, Window};

/// A spec whose geometry matches the fake source's default geometry, so
/// tests that don't care about reprojection skip the warp path.
pub fn matching_spec() -> RasterSpec {
    RasterSpec::new("EPSG:32633", (0.0, -1000.0, 1000.0, 0.0), (10.0, 10.0))
}

struct Inner {
    driver: String,
    band_count: usize,
    geometry: Geometry,
    gcp_geometry: Option<Geometry>,
    nodata: Option<f64>,
    scale_offset: (f64, f64),
    /// Constant sample value decoded for every valid cell.
    value: f64,
    /// Absolute `(row, col)` cells reported invalid.
    masked: HashSet<(usize, usize)>,
    /// Band count of decoded chunks (2 simulates a data + alpha read).
    read_bands: usize,
    read_delay: Duration,
    fail_open: Option<String>,
    fail_next_read: Mutex<Option<String>>,
    open_count: AtomicUsize,
    warp_count: AtomicUsize,
    read_count: AtomicUsize,
    close_count: AtomicUsize,
    concurrent_reads: AtomicUsize,
    max_concurrent_reads: AtomicUsize,
    last_warp_params: Mutex<Option<WarpParams>>,
}

#[derive(Clone)]
pub struct FakeSource {
    inner: Arc<Inner>,
}

pub struct FakeSourceBuilder {
    driver: String,
    band_count: usize,
    geometry: Geometry,
    gcp_geometry: Option<Geometry>,
    nodata: Option<f64>,
    scale_offset: (f64, f64),
    value: f64,
    masked: HashSet<(usize, usize)>,
    read_bands: usize,
    read_delay: Duration,
    fail_open: Option<String>,
}

impl FakeSourceBuilder {
    pub fn driver(mut self, driver: &str) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn band_count(mut self, count: usize) -> Self {
        self.band_count = count;
        self
    }

    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn gcp_geometry(mut self, geometry: Geometry) -> Self {
        self.gcp_geometry = Some(geometry);
        self
    }

    pub fn nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn scale_offset(mut self, scale: f64, offset: f64) -> Self {
        self.scale_offset = (scale, offset);
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn masked(mut self, cells: &[(usize, usize)]) -> Self {
        self.masked = cells.iter().copied().collect();
        self
    }

    pub fn read_bands(mut self, bands: usize) -> Self {
        self.read_bands = bands;
        self
    }

    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn fail_open(mut self, message: &str) -> Self {
        self.fail_open = Some(message.into());
        self
    }

    pub fn build(self) -> FakeSource {
        FakeSource {
            inner: Arc::new(Inner {
                driver: self.driver,
                band_count: self.band_count,
                geometry: self.geometry,
                gcp_geometry: self.gcp_geometry,
                nodata: self.nodata,
                scale_offset: self.scale_offset,
                value: self.value,
                masked: self.masked,
                read_bands: self.read_bands,
                read_delay: self.read_delay,
                fail_open: self.fail_open,
                fail_next_read: Mutex::new(None),
                open_count: AtomicUsize::new(0),
                warp_count: AtomicUsize::new(0),
                read_count: AtomicUsize::new(0),
                close_count: AtomicUsize::new(0),
                concurrent_reads: AtomicUsize::new(0),
                max_concurrent_reads: AtomicUsize::new(0),
                last_warp_params: Mutex::new(None),
            }),
        }
    }
}

impl FakeSource {
    pub fn builder() -> FakeSourceBuilder {
        FakeSourceBuilder {
            driver: "GTiff".into(),
            band_count: 1,
            geometry: matching_spec().geometry(),
            gcp_geometry: None,
            nodata: None,
            scale_offset: (1.0, 0.0),
            value: 42.0,
            masked: HashSet::new(),
            read_bands: 1,
            read_delay: Duration::ZERO,
            fail_open: None,
        }
    }

    /// Make the next read (from any handle of this source) fail.
    pub fn fail_next_read(&self, message: &str) {
        *self.inner.fail_next_read.lock().unwrap() = Some(message.into());
    }

    pub fn open_count(&self) -> usize {
        self.inner.open_count.load(Ordering::SeqCst)
    }

    pub fn warp_count(&self) -> usize {
        self.inner.warp_count.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.inner.read_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.inner.close_count.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_reads(&self) -> usize {
        self.inner.max_concurrent_reads.load(Ordering::SeqCst)
    }

    pub fn last_warp_params(&self) -> Option<WarpParams> {
        self.inner.last_warp_params.lock().unwrap().clone()
    }
}

impl DatasetSource for FakeSource {
    type Dataset = FakeDataset;

    fn open(
        &self,
        _url: &str,
        _driver_hint: Option<&str>,
        _env: &EnvOptions,
    ) -> Result<FakeDataset, DatasetError> {
        if let Some(message) = &self.inner.fail_open {
            return Err(DatasetError::new(message.clone()));
        }
        self.inner.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(FakeDataset {
            inner: Arc::clone(&self.inner),
        })
    }

    fn warp(
        &self,
        dataset: FakeDataset,
        params: &WarpParams,
        _env: &EnvOptions,
    ) -> Result<FakeDataset, DatasetError> {
        self.inner.warp_count.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_warp_params.lock().unwrap() = Some(params.clone());
        // The warped view reads the same fake samples; warp math is out of
        // scope here.
        Ok(dataset)
    }
}

pub struct FakeDataset {
    inner: Arc<Inner>,
}

impl RawDataset for FakeDataset {
    fn driver(&self) -> &str {
        &self.inner.driver
    }

    fn band_count(&self) -> usize {
        self.inner.band_count
    }

    fn geometry(&self) -> Geometry {
        self.inner.geometry.clone()
    }

    fn gcp_geometry(&self) -> Option<Geometry> {
        self.inner.gcp_geometry.clone()
    }

    fn nodata(&self) -> Option<f64> {
        self.inner.nodata
    }

    fn scale_offset(&self) -> (f64, f64) {
        self.inner.scale_offset
    }

    fn read(&mut self, window: Window, _env: &EnvOptions) -> Result<MaskedChunk, DatasetError> {
        if let Some(message) = self.inner.fail_next_read.lock().unwrap().take() {
            return Err(DatasetError::new(message));
        }

        let active = self.inner.concurrent_reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .max_concurrent_reads
            .fetch_max(active, Ordering::SeqCst);
        if !self.inner.read_delay.is_zero() {
            std::thread::sleep(self.inner.read_delay);
        }
        self.inner.read_count.fetch_add(1, Ordering::SeqCst);
        self.inner.concurrent_reads.fetch_sub(1, Ordering::SeqCst);

        let (rows, cols) = window.shape();
        let bands = self.inner.read_bands;
        let mut data = Array3::zeros((bands, rows, cols));
        let mut mask = Array3::from_elem((bands, rows, cols), false);
        for r in 0..rows {
            for c in 0..cols {
                let cell = (window.row_off + r, window.col_off + c);
                let invalid = self.inner.masked.contains(&cell);
                data[[0, r, c]] = self.inner.value;
                if bands >= 2 {
                    // Alpha band: zero marks invalid, mask stays clear so
                    // tests prove alpha is treated as authoritative.
                    data[[1, r, c]] = if invalid { 0.0 } else { 255.0 };
                } else {
                    mask[[0, r, c]] = invalid;
                }
            }
        }
        Ok(MaskedChunk::new(data, mask))
    }

    fn close(&mut self) {
        self.inner.close_count.fetch_add(1, Ordering::SeqCst);
    }
}
