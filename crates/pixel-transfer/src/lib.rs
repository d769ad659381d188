//! Asynchronous pixel uploads from shared memory into GL textures.
//!
//! The main thread owns a [`TransferCoordinator`]. It creates one
//! [`TransferState`] per texture and submits uploads against it; each upload
//! is executed on the single [`TransferWorker`] thread, which owns a GL context
//! sharing textures with the main context. Completed definitions are handed
//! back to the main thread by [`TransferCoordinator::reconcile_completed`],
//! which runs bind callbacks strictly in submission order.
//!
//! # Overview
//!
//! - [`TransferState`] tracks one texture's transfer (`Idle`, `InProgress`,
//!   `Completed`, `Cancelled`). Dropping it cancels outstanding work.
//! - [`TransferWorker`] is a FIFO task thread; [`TransferWorker::global`] is
//!   the process-wide instance, initialized once and never torn down.
//! - [`TransferCoordinator`] is the main-thread façade: submission,
//!   reconciliation, blocking waits, drain notifications and stats.
//! - [`TransferConfig`] carries thread name, priority policy and context
//!   creation preferences.
//!
//! Pixel data is always read through a
//! [`SafeSharedMemoryRegion`](pixel_transfer_core::SafeSharedMemoryRegion)
//! acquired on the worker thread.

pub mod config;
pub mod coordinator;
mod event;
pub mod state;
mod task;
pub mod worker;

pub use config::{PriorityHook, ThreadPriority, TransferConfig};
pub use coordinator::{DrainCallback, TransferCoordinator};
pub use state::{BindCallback, TransferPhase, TransferState};
pub use worker::{InitError, PriorityBoost, TransferWorker, WorkerScope};

pub use pixel_transfer_core::{
    MemoryParams, SharedMemory, TexImage2DParams, TexSubImage2DParams, TextureId, UploadParams,
};
