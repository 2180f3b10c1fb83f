//! Layered native-library configuration
//!
//! The native raster library is tuned through flat key/value options, but
//! the right values differ by phase: some options should hold for the whole
//! life of a handle, some only while opening, and some only while reading.
//! [`LayeredEnv`] keeps one option set per scope and merges the `always`
//! layer under the phase-specific one at each call site.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered set of native-library configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOptions(BTreeMap<String, String>);

impl EnvOptions {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    #[must_use]
    pub fn merge(&self, other: &EnvOptions) -> EnvOptions {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            merged.insert(k.clone(), v.clone());
        }
        EnvOptions(merged)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Native-library options split by phase.
///
/// `always` applies for the lifetime of a handle; `open` and `read` apply
/// only while the corresponding operation runs. The merged option set for a
/// phase is passed into the native call for that phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredEnv {
    pub always: EnvOptions,
    pub open: EnvOptions,
    pub read: EnvOptions,
}

impl LayeredEnv {
    /// Options in effect while opening a handle.
    #[must_use]
    pub fn merged_open(&self) -> EnvOptions {
        self.always.merge(&self.open)
    }

    /// Options in effect while reading from a handle.
    #[must_use]
    pub fn merged_read(&self) -> EnvOptions {
        self.always.merge(&self.read)
    }

    /// The default GDAL tuning used for remote assets.
    ///
    /// Opens cache HTTP requests (`VSI_CACHE=TRUE`) because the per-thread
    /// pool re-opens the same URL many times; reads disable the cache so
    /// one-shot pixel transfers do not evict the header requests that keep
    /// those re-opens fast. Directory listing on open is suppressed to stop
    /// the library probing for sidecar files.
    #[must_use]
    pub fn gdal_defaults() -> Self {
        Self {
            always: EnvOptions::new()
                .set("GDAL_HTTP_MULTIRANGE", "YES")
                .set("GDAL_HTTP_MERGE_CONSECUTIVE_RANGES", "YES"),
            open: EnvOptions::new()
                .set("GDAL_DISABLE_READDIR_ON_OPEN", "EMPTY_DIR")
                .set("VSI_CACHE", "TRUE"),
            read: EnvOptions::new().set("VSI_CACHE", "FALSE"),
        }
    }
}
