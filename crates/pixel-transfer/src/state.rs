//! Per-texture transfer state shared between the main and transfer threads.
//!
//! A [`TransferState`] is the caller's unique handle. Worker tasks hold the
//! inner [`TransferStateInternal`] and the coordinator's pending queue holds a
//! weak reference to the handle, so the caller dropping its handle is visible
//! to reconciliation even while tasks still reference the inner state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use pixel_transfer_core::{TexImage2DParams, TextureId};
use tracing::{trace, trace_span};

use crate::event::CompletionEvent;

/// Runs on the main thread once a submitted upload has completed. Receives the
/// texture that now holds the new contents.
pub type BindCallback = Box<dyn FnOnce(TextureId) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferPhase {
    /// Ready for a new submission.
    Idle = 0,
    InProgress = 1,
    /// Upload done, bind callback not yet run.
    Completed = 2,
    /// Owner dropped the state. Terminal.
    Cancelled = 3,
}

impl TransferPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransferPhase::Idle,
            1 => TransferPhase::InProgress,
            2 => TransferPhase::Completed,
            _ => TransferPhase::Cancelled,
        }
    }
}

pub(crate) struct TransferStateInternal {
    texture_id: TextureId,
    define_params: TexImage2DParams,
    phase: AtomicU8,
    // Signaled whenever no transfer is in flight.
    completion: CompletionEvent,
    // Serializes task execution against cancellation.
    upload_lock: Mutex<()>,
    cancelled: AtomicBool,
    submitted: AtomicBool,
    // Bumped by every submission; completions for older ones are dropped.
    generation: AtomicU64,
    bind_callback: Mutex<Option<BindCallback>>,
}

impl TransferStateInternal {
    fn new(texture_id: TextureId, define_params: TexImage2DParams) -> Self {
        Self {
            texture_id,
            define_params,
            phase: AtomicU8::new(TransferPhase::Idle as u8),
            completion: CompletionEvent::new(true),
            upload_lock: Mutex::new(()),
            cancelled: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            bind_callback: Mutex::new(None),
        }
    }

    pub(crate) fn texture_id(&self) -> TextureId {
        self.texture_id
    }

    pub(crate) fn phase(&self) -> TransferPhase {
        TransferPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn is_transfer_in_progress(&self) -> bool {
        !self.completion.is_signaled()
    }

    #[cfg(test)]
    pub(crate) fn has_pending_bind(&self) -> bool {
        self.bind_callback.lock().is_some()
    }

    /// Held by a task for its whole execution.
    pub(crate) fn lock_upload(&self) -> MutexGuard<'_, ()> {
        self.upload_lock.lock()
    }

    /// Only meaningful while holding [`lock_upload`](Self::lock_upload).
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Start a new submission and return its generation.
    pub(crate) fn mark_in_progress(&self) -> u64 {
        let callback = self.bind_callback.lock();
        assert!(
            !self.is_transfer_in_progress(),
            "{}: transfer submitted while another is in progress",
            self.texture_id
        );
        assert!(
            callback.is_none(),
            "{}: transfer submitted before the previous one was bound",
            self.texture_id
        );
        self.submitted.store(true, Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.phase
            .store(TransferPhase::InProgress as u8, Ordering::Release);
        self.completion.reset();
        generation
    }

    /// Complete the current submission, whichever it is.
    pub(crate) fn mark_completed(&self) {
        let callback = self.bind_callback.lock();
        self.finish(&callback);
    }

    /// Complete submission `generation`. Ignored if the state has been
    /// resubmitted since.
    pub(crate) fn complete_transfer(&self, generation: u64) {
        let callback = self.bind_callback.lock();
        let current = self.generation.load(Ordering::Acquire);
        if current != generation {
            trace!(texture = %self.texture_id, generation, current, "stale completion ignored");
            return;
        }
        self.finish(&callback);
    }

    /// `InProgress` becomes `Completed` if a bind callback is waiting, `Idle`
    /// otherwise. Any other phase is left alone. The caller holds the callback
    /// lock across the decision and the transition.
    fn finish(&self, callback: &Option<BindCallback>) {
        let next = if callback.is_some() {
            TransferPhase::Completed
        } else {
            TransferPhase::Idle
        };
        if self
            .phase
            .compare_exchange(
                TransferPhase::InProgress as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            trace!(texture = %self.texture_id, phase = ?self.phase(), "completion ignored");
            return;
        }
        trace!(texture = %self.texture_id, ?next, "MarkAsCompleted");
        self.completion.signal();
    }

    pub(crate) fn wait_for_completion(&self) {
        assert!(
            self.submitted.load(Ordering::Acquire),
            "{}: waiting on a transfer that was never submitted",
            self.texture_id
        );
        let _span = trace_span!("WaitForTransferCompletion", texture = %self.texture_id).entered();
        self.completion.wait();
    }

    pub(crate) fn set_bind_callback(&self, callback: BindCallback) {
        *self.bind_callback.lock() = Some(callback);
    }

    /// Run the bind callback and return to `Idle`.
    pub(crate) fn bind_transfer(&self) {
        let _span = trace_span!(
            "BindAsyncTransfer",
            texture = %self.texture_id,
            width = self.define_params.width,
            height = self.define_params.height
        )
        .entered();
        debug_assert!(!self.texture_id.is_null());

        let callback = {
            let mut slot = self.bind_callback.lock();
            let _ = self.phase.compare_exchange(
                TransferPhase::Completed as u8,
                TransferPhase::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            slot.take()
        };
        if let Some(callback) = callback {
            callback(self.texture_id);
        }
    }

    /// Forget a bind callback that will never be run.
    pub(crate) fn discard_bind(&self) {
        let mut slot = self.bind_callback.lock();
        if slot.take().is_some() {
            let _ = self.phase.compare_exchange(
                TransferPhase::Completed as u8,
                TransferPhase::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    fn cancel(&self) {
        let _locked = self.upload_lock.lock();
        self.cancelled.store(true, Ordering::Release);
        self.phase
            .store(TransferPhase::Cancelled as u8, Ordering::Release);
        self.bind_callback.lock().take();
    }
}

/// Owner side of the state. Dropping it cancels outstanding work.
pub(crate) struct TransferStateImpl {
    internal: Arc<TransferStateInternal>,
}

impl TransferStateImpl {
    pub(crate) fn internal(&self) -> &Arc<TransferStateInternal> {
        &self.internal
    }
}

impl Drop for TransferStateImpl {
    fn drop(&mut self) {
        let _span = trace_span!("~TransferState", texture = %self.internal.texture_id).entered();
        // Blocks until a running task for this state has finished.
        self.internal.cancel();
    }
}

/// Transfer state of one texture, owned by the caller.
///
/// Create it with
/// [`TransferCoordinator::create_transfer_state`](crate::TransferCoordinator::create_transfer_state).
/// Dropping it while a transfer is queued or running sets the cancellation
/// flag under the same lock the worker holds while uploading: a queued task
/// then skips all GPU work, a running one finishes first.
pub struct TransferState {
    inner: Arc<TransferStateImpl>,
}

impl TransferState {
    pub(crate) fn new(texture_id: TextureId, define_params: TexImage2DParams) -> Self {
        Self {
            inner: Arc::new(TransferStateImpl {
                internal: Arc::new(TransferStateInternal::new(texture_id, define_params)),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<TransferStateImpl> {
        &self.inner
    }

    pub(crate) fn internal(&self) -> &Arc<TransferStateInternal> {
        &self.inner.internal
    }

    pub fn texture_id(&self) -> TextureId {
        self.internal().texture_id
    }

    /// Definition the texture was created with.
    pub fn define_params(&self) -> &TexImage2DParams {
        &self.internal().define_params
    }

    pub fn phase(&self) -> TransferPhase {
        self.internal().phase()
    }

    /// Non-blocking; callable from any thread.
    pub fn is_transfer_in_progress(&self) -> bool {
        self.internal().is_transfer_in_progress()
    }

    /// Block until the outstanding transfer completes. Returns immediately if
    /// none is outstanding. Any number of threads may wait at once.
    ///
    /// A transfer whose memory range failed validation never completes, so
    /// waiting on it never returns.
    ///
    /// # Panics
    ///
    /// If no transfer was ever submitted for this state.
    pub fn wait_for_completion(&self) {
        self.internal().wait_for_completion();
    }

    /// # Panics
    ///
    /// If a transfer is already in progress, or a completed one still waits
    /// for its bind callback.
    pub fn mark_in_progress(&self) {
        self.internal().mark_in_progress();
    }

    /// Signal completion of the outstanding transfer. Normally the worker does
    /// this after the upload. Once the state has been resubmitted, the worker's
    /// completion of the earlier submission is ignored.
    pub fn mark_completed(&self) {
        self.internal().mark_completed();
    }
}

impl fmt::Debug for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferState")
            .field("texture_id", &self.texture_id())
            .field("phase", &self.phase())
            .finish()
    }
}
