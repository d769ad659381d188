//! [`TransferCoordinator`]: the main-thread side of the pipeline.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use pixel_transfer_core::{
    ContextFactory, MemoryParams, ShareGroup, TexImage2DParams, TexSubImage2DParams, TextureId,
    UploadParams, UploadStats,
};
use tracing::{trace, trace_span};

use crate::config::TransferConfig;
use crate::state::{TransferState, TransferStateImpl};
use crate::task::{notify_completion, TransferTask};
use crate::worker::{InitError, TransferWorker};

/// Receives the memory parameters of a drained region, with the handle
/// replaced by the one the transfer thread kept mapped. Runs on the transfer
/// thread.
pub type DrainCallback = Box<dyn FnOnce(&MemoryParams) + Send>;

/// Submits uploads to a [`TransferWorker`] and binds finished ones in order.
///
/// Meant to be driven from one thread (the one that owns the main GL
/// context): submissions and [`reconcile_completed`](Self::reconcile_completed)
/// happen there, the uploads themselves on the worker.
pub struct TransferCoordinator {
    worker: Arc<TransferWorker>,
    // Definitions awaiting their bind callback, in submission order.
    pending: VecDeque<Weak<TransferStateImpl>>,
    stats: Arc<UploadStats>,
}

impl TransferCoordinator {
    pub fn new(worker: Arc<TransferWorker>) -> Self {
        Self {
            worker,
            pending: VecDeque::new(),
            stats: Arc::new(UploadStats::new()),
        }
    }

    /// Coordinator on the process-wide worker, starting it if needed.
    ///
    /// `share_group` is the main context's share group; without one the worker
    /// cannot be initialized.
    pub fn with_global_worker(
        share_group: Option<ShareGroup>,
        factory: impl ContextFactory,
        config: &TransferConfig,
    ) -> Result<Self, InitError> {
        TransferWorker::global(share_group, factory, config).map(Self::new)
    }

    pub fn worker(&self) -> &Arc<TransferWorker> {
        &self.worker
    }

    /// New `Idle` state for `texture_id`.
    pub fn create_transfer_state(
        &self,
        texture_id: TextureId,
        define_params: TexImage2DParams,
    ) -> TransferState {
        TransferState::new(texture_id, define_params)
    }

    /// Upload `memory` into `state`'s texture and queue `bind_callback` for
    /// [`reconcile_completed`](Self::reconcile_completed).
    ///
    /// # Panics
    ///
    /// If the texture id is zero, the target is not `GL_TEXTURE_2D`, the level
    /// is not 0, a transfer is already in progress, or the previous completed
    /// transfer has not been bound yet.
    pub fn submit_upload(
        &mut self,
        state: &TransferState,
        params: impl Into<UploadParams>,
        memory: MemoryParams,
        bind_callback: impl FnOnce(TextureId) + Send + 'static,
    ) {
        let params = params.into();
        check_submission(state, &params);

        let generation = state.internal().mark_in_progress();
        self.pending.push_back(Arc::downgrade(state.inner()));
        state.internal().set_bind_callback(Box::new(bind_callback));

        self.post_transfer(state, generation, params, memory);
    }

    /// Update a rectangle of `state`'s texture. No bind callback; the state
    /// goes straight back to `Idle` when the upload is done.
    ///
    /// # Panics
    ///
    /// Same preconditions as [`submit_upload`](Self::submit_upload).
    pub fn submit_sub_image(
        &mut self,
        state: &TransferState,
        params: TexSubImage2DParams,
        memory: MemoryParams,
    ) {
        let _span = trace_span!(
            "AsyncTexSubImage2D",
            texture = %state.texture_id(),
            width = params.width,
            height = params.height
        )
        .entered();
        let params = UploadParams::SubImage(params);
        check_submission(state, &params);

        let generation = state.internal().mark_in_progress();
        self.post_transfer(state, generation, params, memory);
    }

    fn post_transfer(
        &self,
        state: &TransferState,
        generation: u64,
        params: UploadParams,
        memory: MemoryParams,
    ) {
        let task = TransferTask {
            state: state.internal().clone(),
            generation,
            params,
            memory,
            stats: self.stats.clone(),
        };
        self.worker.post_task(move |scope| task.execute(scope));
    }

    /// Run bind callbacks of completed definitions, oldest first.
    ///
    /// Entries whose state was dropped are discarded. Draining stops at the
    /// first transfer still in progress: transfers finish in submission order,
    /// so nothing behind it can be bound yet. Returns the number of callbacks
    /// run.
    pub fn reconcile_completed(&mut self) -> usize {
        let mut bound = 0;
        while let Some(front) = self.pending.front() {
            let Some(state) = front.upgrade() else {
                self.pending.pop_front();
                continue;
            };
            if state.internal().is_transfer_in_progress() {
                break;
            }
            state.internal().bind_transfer();
            self.pending.pop_front();
            bound += 1;
        }
        if bound > 0 {
            trace!(bound, remaining = self.pending.len(), "bound completed transfers");
        }
        bound
    }

    /// Block until `state`'s outstanding transfer has completed, with the
    /// transfer thread at normal priority meanwhile.
    ///
    /// This stalls the calling thread; prefer
    /// [`reconcile_completed`](Self::reconcile_completed) where possible.
    ///
    /// # Panics
    ///
    /// If nothing was ever submitted for `state`.
    pub fn wait_for_completion(&self, state: &TransferState) {
        debug_assert!(!state.texture_id().is_null());
        let _boost = state
            .is_transfer_in_progress()
            .then(|| self.worker.boost_priority());
        state.wait_for_completion();
        debug_assert!(!state.is_transfer_in_progress());
    }

    /// Call `callback` on the transfer thread once every upload submitted so
    /// far has run, signalling that their memory may be reused.
    ///
    /// If `memory` does not describe a valid region the callback is dropped
    /// without being called.
    pub fn notify_when_drained(
        &self,
        memory: MemoryParams,
        callback: impl FnOnce(&MemoryParams) + Send + 'static,
    ) {
        let callback: DrainCallback = Box::new(callback);
        self.worker
            .post_task(move |scope| notify_completion(scope, memory, callback));
    }

    /// Definitions still waiting for reconciliation, including entries whose
    /// state has been dropped but not yet skipped.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn upload_count(&self) -> u64 {
        self.stats.upload_count()
    }

    pub fn total_upload_time(&self) -> Duration {
        self.stats.total_upload_time()
    }

    pub fn stats(&self) -> &Arc<UploadStats> {
        &self.stats
    }

    /// Uploads are scheduled by the worker alone; there is never extra work to
    /// pump from the main thread.
    pub fn needs_process_more_pending_transfers(&self) -> bool {
        false
    }

    pub fn process_more_pending_transfers(&mut self) {}
}

fn check_submission(state: &TransferState, params: &UploadParams) {
    let texture = state.texture_id();
    assert!(!texture.is_null(), "upload submitted for texture 0");
    assert_eq!(
        params.target(),
        gl::TEXTURE_2D,
        "{texture}: only GL_TEXTURE_2D uploads are supported"
    );
    assert_eq!(params.level(), 0, "{texture}: only level 0 uploads are supported");
}

impl Drop for TransferCoordinator {
    fn drop(&mut self) {
        // Live states must not keep a callback nobody will run, or they could
        // never be submitted again.
        for state in self.pending.drain(..).filter_map(|weak| weak.upgrade()) {
            state.internal().discard_bind();
        }
    }
}

impl fmt::Debug for TransferCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferCoordinator")
            .field("worker", &self.worker)
            .field("pending", &self.pending.len())
            .field("uploads", &self.stats.upload_count())
            .finish()
    }
}
