//! Per-thread handle pool
//!
//! Some drivers allow full parallelism with one restriction: every thread
//! must own its own handle, on its own descriptor, and the thread that
//! reads from a handle should be the one that opened it. This pool gives
//! each calling thread a private handle, opened lazily on that thread's
//! first read and reused for every read after it.
//!
//! With many reading threads this can hold a lot of memory; native handles
//! are not lightweight objects.

use dashmap::DashMap;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};
use tracing::debug;

use crate::chunk::MaskedChunk;
use crate::dataset::{DatasetSource, OpenedDataset, ThreadsafeDataset, WarpParams};
use crate::env::LayeredEnv;
use crate::error::DatasetError;
use crate::raster_spec::Window;

type HandleTable<D> = DashMap<ThreadId, Arc<Mutex<OpenedDataset<D>>>>;

/// A dataset re-opened privately for every thread that reads from it.
///
/// The table maps thread identity to that thread's handle. The map itself
/// handles concurrent distinct-key access; the outer `RwLock` exists only so
/// [`ThreadLocalDataset::close`] can atomically swap the whole table for an
/// empty one. Entries are `Arc`ed, so a handle a racing reader still holds
/// survives the swap and is released when its last reference drops.
pub struct ThreadLocalDataset<S: DatasetSource> {
    source: Arc<S>,
    url: String,
    driver: String,
    env: LayeredEnv,
    scale_offset: (f64, f64),
    warp: Option<WarpParams>,
    table: RwLock<Arc<HandleTable<S::Dataset>>>,
    /// Serializes all native opens issued by this pool.
    open_lock: Mutex<()>,
}

impl<S: DatasetSource> ThreadLocalDataset<S> {
    /// Build a pool around an already-open handle, which becomes the
    /// current thread's private handle.
    ///
    /// `warp` must be the value snapshot of the reprojection applied to
    /// `initial` (or `None`); it is replayed verbatim for every other
    /// thread's open.
    pub fn new(
        source: Arc<S>,
        url: impl Into<String>,
        driver: impl Into<String>,
        env: LayeredEnv,
        warp: Option<WarpParams>,
        initial: OpenedDataset<S::Dataset>,
    ) -> Self {
        let scale_offset = initial.scale_offset();
        let table: HandleTable<S::Dataset> = DashMap::new();
        table.insert(thread::current().id(), Arc::new(Mutex::new(initial)));
        Self {
            source,
            url: url.into(),
            driver: driver.into(),
            env,
            scale_offset,
            warp,
            table: RwLock::new(Arc::new(table)),
            open_lock: Mutex::new(()),
        }
    }

    /// Open a fresh handle for the calling thread, replaying the warp
    /// snapshot when one was captured.
    fn open_for_thread(&self) -> Result<OpenedDataset<S::Dataset>, DatasetError> {
        let _guard = self.open_lock.lock().unwrap();
        debug!(url = %self.url, thread = ?thread::current().id(), "opening per-thread handle");
        let env_open = self.env.merged_open();
        let dataset = self
            .source
            .open(&self.url, Some(&self.driver), &env_open)?;
        let dataset = match &self.warp {
            Some(params) => self.source.warp(dataset, params, &env_open)?,
            None => dataset,
        };
        Ok(OpenedDataset::new(dataset))
    }

    /// The calling thread's handle, opening one on first use.
    fn slot(&self) -> Result<Arc<Mutex<OpenedDataset<S::Dataset>>>, DatasetError> {
        let table = Arc::clone(&self.table.read().unwrap());
        let id = thread::current().id();
        if let Some(slot) = table.get(&id) {
            return Ok(Arc::clone(slot.value()));
        }
        // Only this thread inserts under its own id, so the handle count
        // per thread never exceeds one. The open happens under the open
        // lock; the insert and the read do not.
        let opened = self.open_for_thread()?;
        let slot = Arc::new(Mutex::new(opened));
        table.insert(id, Arc::clone(&slot));
        Ok(slot)
    }

    /// Number of threads currently holding a handle. Test and diagnostics
    /// hook; a freshly reconstructed reader should report zero.
    #[must_use]
    pub fn warm_threads(&self) -> usize {
        self.table.read().unwrap().len()
    }
}

impl<S: DatasetSource> ThreadsafeDataset for ThreadLocalDataset<S> {
    /// Read from the calling thread's handle, opening it first if this
    /// thread has never read before.
    fn read(&self, window: Window) -> Result<MaskedChunk, DatasetError> {
        let slot = self.slot()?;
        let mut opened = slot.lock().unwrap();
        opened.read(window, &self.env.merged_read())
    }

    fn scale_offset(&self) -> (f64, f64) {
        self.scale_offset
    }

    /// Drop this pool's reference to every thread's handle by swapping in
    /// an empty table.
    ///
    /// Handles with no other live reference are closed immediately via
    /// their drop; a handle some other reference still points at stays open
    /// until that reference is gone: this method only releases the pool's
    /// own references. After it returns, the next read from any thread
    /// opens a fresh handle. A read racing this call may still insert into
    /// the table being discarded; that thread simply reopens on its next
    /// read, costing one redundant open and nothing else.
    fn close(&self) {
        *self.table.write().unwrap() = Arc::new(DashMap::new());
    }
}

impl<S: DatasetSource> Serialize for ThreadLocalDataset<S> {
    fn serialize<Ser: Serializer>(&self, _serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        Err(ser::Error::custom(
            "ThreadLocalDataset holds thread-bound native handles and cannot be \
             serialized; snapshot the reader's options and reconstruct instead",
        ))
    }
}

impl<'de, S: DatasetSource> Deserialize<'de> for ThreadLocalDataset<S> {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> Result<Self, D::Error> {
        Err(de::Error::custom(
            "ThreadLocalDataset cannot be deserialized; reconstruct it from \
             reader options so handles reopen in their own threads",
        ))
    }
}
