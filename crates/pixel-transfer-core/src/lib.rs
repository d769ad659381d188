//! Shared vocabulary for the asynchronous pixel-transfer pipeline.
//!
//! This crate holds everything both sides of the transfer thread agree on:
//!
//! - [`params`]: texture ids and the upload/memory parameter blocks.
//! - [`shared_memory`]: the [`SharedMemory`] collaborator trait, the
//!   [`SafeSharedMemoryPool`] of reusable mappings and the bounds-checked
//!   [`SafeSharedMemoryRegion`] view that uploads read from.
//! - [`context`]: collaborator traits for creating a GL context that shares
//!   resources with the main context and for performing the raw uploads.
//! - [`stats`]: lock-free upload counters.
//! - [`logging`]: `tracing-subscriber` setup for binaries and tests.
//!
//! The pipeline itself (states, worker thread, coordinator) lives in the
//! `pixel-transfer` crate.

pub mod context;
pub mod logging;
pub mod params;
pub mod shared_memory;
pub mod stats;

pub use context::{ContextFactory, GpuPreference, OffscreenSurface, ShareGroup, TransferContext};
pub use params::{MemoryParams, TexImage2DParams, TexSubImage2DParams, TextureId, UploadParams};
pub use shared_memory::{
    HeapSharedMemory, MappedMemory, SafeSharedMemoryPool, SafeSharedMemoryRegion, SharedMemory,
    SharedMemoryError, SharedMemoryId,
};
pub use stats::UploadStats;
