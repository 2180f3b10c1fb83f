//! Target grid description and read windows
//!
//! A [`RasterSpec`] describes the grid every asset should be presented in:
//! coordinate reference system, bounds, and resolution. Its derived
//! [`Geometry`] is compared against a dataset's native geometry to decide
//! whether a reprojection wrapper is needed. A [`Window`] names the
//! rectangular sub-region of that grid a single read should decode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Georeferencing of a raster grid: CRS, affine transform, and pixel size.
///
/// The transform is the row-major affine `[a, b, c, d, e, f]` mapping pixel
/// `(col, row)` to world `(x, y)`:
///
/// ```text
/// x = a * col + b * row + c
/// y = d * col + e * row + f
/// ```
///
/// Equality is exact value equality, including the float coefficients.
/// Transforms re-derived through different code paths can differ in the last
/// bits and will then register as "needs reprojection" even when they are
/// effectively identical; tolerant comparison is deliberately not applied
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Coordinate reference system in textual form (e.g. `"EPSG:32633"`).
    pub crs: String,
    /// Affine transform `[a, b, c, d, e, f]`.
    pub transform: [f64; 6],
    /// Grid width in pixels.
    pub width: usize,
    /// Grid height in pixels.
    pub height: usize,
}

/// The target grid for a set of assets.
///
/// Immutable once constructed; `transform`, `shape`, and [`Geometry`] are
/// derived from the bounds and resolution.
///
/// # Example
///
/// ```rust
/// use rasterpool::RasterSpec;
///
/// let spec = RasterSpec::new("EPSG:32633", (500_000.0, 0.0, 600_000.0, 100_000.0), (10.0, 10.0));
/// assert_eq!(spec.shape(), (10_000, 10_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSpec {
    /// Coordinate reference system in textual form.
    pub crs: String,
    /// Bounds as `(min_x, min_y, max_x, max_y)` in CRS units.
    pub bounds: (f64, f64, f64, f64),
    /// Pixel size as `(x_resolution, y_resolution)`, both positive.
    pub resolution: (f64, f64),
}

impl RasterSpec {
    #[must_use]
    pub fn new(
        crs: impl Into<String>,
        bounds: (f64, f64, f64, f64),
        resolution: (f64, f64),
    ) -> Self {
        Self {
            crs: crs.into(),
            bounds,
            resolution,
        }
    }

    /// Affine transform of the target grid (north-up, no rotation).
    #[must_use]
    pub fn transform(&self) -> [f64; 6] {
        let (min_x, _, _, max_y) = self.bounds;
        let (xres, yres) = self.resolution;
        [xres, 0.0, min_x, 0.0, -yres, max_y]
    }

    /// Grid shape as `(height, width)` in pixels.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        let (xres, yres) = self.resolution;
        let width = ((max_x - min_x) / xres).ceil() as usize;
        let height = ((max_y - min_y) / yres).ceil() as usize;
        (height, width)
    }

    /// The derived [`Geometry`], the value a dataset's native geometry is
    /// compared against.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        let (height, width) = self.shape();
        Geometry {
            crs: self.crs.clone(),
            transform: self.transform(),
            width,
            height,
        }
    }
}

/// A rectangular sub-region of a grid: offset plus size, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    #[must_use]
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_off,
            col_off,
            rows,
            cols,
        }
    }

    /// Shape as `(rows, cols)`.
    #[inline]
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window [{}:{}, {}:{}]",
            self.row_off,
            self.row_off + self.rows,
            self.col_off,
            self.col_off + self.cols
        )
    }
}
