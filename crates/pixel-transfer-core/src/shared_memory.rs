//! Bounds-checked access to externally owned shared memory.
//!
//! Uploads never read through a raw `(pointer, length)` pair supplied by the
//! caller. The transfer thread instead acquires a [`SafeSharedMemoryRegion`]
//! from a [`SafeSharedMemoryPool`]: acquisition validates the declared range
//! against the declared block size, maps the block (or reuses a live mapping
//! of the same block), and the mapping is returned to the pool when the region
//! goes out of scope, whichever way the task exits.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::params::MemoryParams;

/// Stable identity of a shared block. Used as the pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedMemoryId(pub u64);

impl fmt::Display for SharedMemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shm#{}", self.0)
    }
}

/// A block of memory shared with another party, mappable on demand.
///
/// Implemented by embedders on top of their platform shared-memory handles.
/// [`HeapSharedMemory`] is an in-process implementation.
pub trait SharedMemory: Send + Sync {
    fn id(&self) -> SharedMemoryId;

    /// Actual size of the block in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map the first `size` bytes of the block into this process.
    fn map(&self, size: usize) -> anyhow::Result<Box<dyn MappedMemory>>;
}

/// A live mapping. Unmapped when dropped.
pub trait MappedMemory: Send + Sync {
    fn bytes(&self) -> &[u8];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharedMemoryError {
    #[error("shared memory range {offset}+{size} exceeds block size {total}")]
    OutOfBounds {
        offset: usize,
        size: usize,
        total: usize,
    },
    #[error("failed to map {size} bytes of {id}: {reason}")]
    MapFailed {
        id: SharedMemoryId,
        size: usize,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// HeapSharedMemory
// ---------------------------------------------------------------------------

static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

/// Shared memory backed by an immutable heap allocation.
///
/// Mapping hands out another reference to the same bytes; mapping more bytes
/// than the block holds fails like a real `mmap` past the end of a segment.
pub struct HeapSharedMemory {
    id: SharedMemoryId,
    data: Arc<[u8]>,
    maps: AtomicUsize,
}

impl HeapSharedMemory {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: SharedMemoryId(NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed)),
            data: data.into(),
            maps: AtomicUsize::new(0),
        }
    }

    /// Convenience constructor returning the trait object most APIs take.
    pub fn shared(data: impl Into<Arc<[u8]>>) -> Arc<dyn SharedMemory> {
        Arc::new(Self::new(data))
    }

    /// Number of successful [`SharedMemory::map`] calls so far.
    pub fn map_count(&self) -> usize {
        self.maps.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for HeapSharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapSharedMemory")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

struct HeapMapping {
    data: Arc<[u8]>,
    len: usize,
}

impl MappedMemory for HeapMapping {
    fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl SharedMemory for HeapSharedMemory {
    fn id(&self) -> SharedMemoryId {
        self.id
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn map(&self, size: usize) -> anyhow::Result<Box<dyn MappedMemory>> {
        if size > self.data.len() {
            anyhow::bail!(
                "cannot map {size} bytes of a {} byte block",
                self.data.len()
            );
        }
        self.maps.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(HeapMapping {
            data: self.data.clone(),
            len: size,
        }))
    }
}

// ---------------------------------------------------------------------------
// SafeSharedMemoryPool
// ---------------------------------------------------------------------------

struct PoolEntry {
    shared_memory: Arc<dyn SharedMemory>,
    mapping: Arc<dyn MappedMemory>,
    mapped_size: usize,
    refs: usize,
}

/// Refcounted cache of mappings, keyed by block id.
///
/// Cloning yields another handle to the same pool. The pool is meant to be
/// used from the transfer thread; the internal lock is never contended in that
/// configuration.
#[derive(Clone, Default)]
pub struct SafeSharedMemoryPool {
    entries: Arc<Mutex<HashMap<SharedMemoryId, PoolEntry>>>,
}

impl SafeSharedMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently mapped through this pool.
    pub fn mapped_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Map `size` bytes of `memory`, reusing a pooled mapping of the same block
    /// when it already covers `size`.
    fn checkout(
        &self,
        memory: &Arc<dyn SharedMemory>,
        size: usize,
    ) -> Result<(Arc<dyn SharedMemory>, Arc<dyn MappedMemory>), SharedMemoryError> {
        let id = memory.id();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(&id) {
            if entry.mapped_size < size {
                // Regions still holding the smaller mapping keep it alive.
                trace!(%id, old = entry.mapped_size, new = size, "growing pooled mapping");
                entry.mapping = map_block(memory.as_ref(), size)?;
                entry.mapped_size = size;
            }
            entry.refs += 1;
            return Ok((entry.shared_memory.clone(), entry.mapping.clone()));
        }

        let mapping = map_block(memory.as_ref(), size)?;
        debug!(%id, size, "mapped shared memory");
        entries.insert(
            id,
            PoolEntry {
                shared_memory: memory.clone(),
                mapping: mapping.clone(),
                mapped_size: size,
                refs: 1,
            },
        );
        Ok((memory.clone(), mapping))
    }

    fn release(&self, id: SharedMemoryId) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            entries.remove(&id);
            debug!(%id, "released shared memory mapping");
        }
    }
}

fn map_block(
    memory: &dyn SharedMemory,
    size: usize,
) -> Result<Arc<dyn MappedMemory>, SharedMemoryError> {
    let map_failed = |reason: String| SharedMemoryError::MapFailed {
        id: memory.id(),
        size,
        reason,
    };
    let mapping = memory.map(size).map_err(|e| map_failed(format!("{e:#}")))?;
    if mapping.bytes().len() < size {
        return Err(map_failed(format!(
            "mapping is only {} bytes",
            mapping.bytes().len()
        )));
    }
    Ok(Arc::from(mapping))
}

// ---------------------------------------------------------------------------
// SafeSharedMemoryRegion
// ---------------------------------------------------------------------------

/// A validated view of `size` bytes at `offset` inside a mapped block.
///
/// The view cannot outlive its mapping: the region holds the mapping and
/// hands it back to the pool on drop.
pub struct SafeSharedMemoryRegion {
    pool: SafeSharedMemoryPool,
    shared_memory: Arc<dyn SharedMemory>,
    mapping: Arc<dyn MappedMemory>,
    offset: usize,
    size: usize,
    total_size: usize,
}

impl SafeSharedMemoryRegion {
    /// Validate `params` and map the block it refers to.
    ///
    /// Fails with [`SharedMemoryError::OutOfBounds`] when
    /// `shm_data_offset + shm_data_size > shm_size`, and with
    /// [`SharedMemoryError::MapFailed`] when `shm_size` bytes of the block
    /// cannot be mapped.
    pub fn acquire(
        pool: &SafeSharedMemoryPool,
        params: &MemoryParams,
    ) -> Result<Self, SharedMemoryError> {
        let offset = params.shm_data_offset;
        let size = params.shm_data_size;
        let total_size = params.shm_size;

        match offset.checked_add(size) {
            Some(end) if end <= total_size => {}
            _ => {
                return Err(SharedMemoryError::OutOfBounds {
                    offset,
                    size,
                    total: total_size,
                })
            }
        }

        let (shared_memory, mapping) = pool.checkout(&params.shared_memory, total_size)?;

        Ok(Self {
            pool: pool.clone(),
            shared_memory,
            mapping,
            offset,
            size,
            total_size,
        })
    }

    /// The validated bytes.
    pub fn data(&self) -> &[u8] {
        &self.mapping.bytes()[self.offset..self.offset + self.size]
    }

    /// The pool-retained handle of the underlying block.
    pub fn shared_memory(&self) -> &Arc<dyn SharedMemory> {
        &self.shared_memory
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }
}

impl fmt::Debug for SafeSharedMemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeSharedMemoryRegion")
            .field("shared_memory", &self.shared_memory.id())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("total_size", &self.total_size)
            .finish()
    }
}

impl Drop for SafeSharedMemoryRegion {
    fn drop(&mut self) {
        self.pool.release(self.shared_memory.id());
    }
}
