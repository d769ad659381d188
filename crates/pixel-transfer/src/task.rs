//! Work items executed on the transfer thread.

use std::sync::Arc;
use std::time::Instant;

use pixel_transfer_core::{MemoryParams, SafeSharedMemoryRegion, UploadParams, UploadStats};
use tracing::{error, info_span, trace};

use crate::coordinator::DrainCallback;
use crate::state::TransferStateInternal;
use crate::worker::WorkerScope;

/// One upload, fully described at submission time.
pub(crate) struct TransferTask {
    pub(crate) state: Arc<TransferStateInternal>,
    /// Submission this task completes; see [`TransferStateInternal::mark_in_progress`].
    pub(crate) generation: u64,
    pub(crate) params: UploadParams,
    pub(crate) memory: MemoryParams,
    pub(crate) stats: Arc<UploadStats>,
}

impl TransferTask {
    pub(crate) fn execute(self, scope: &mut WorkerScope) {
        let state = &self.state;
        let texture = state.texture_id();

        let _locked = state.lock_upload();
        if state.is_cancelled() {
            trace!(%texture, "transfer cancelled before execution");
            return;
        }

        let (width, height) = self.params.extent();
        let _span = match self.params {
            UploadParams::Define(_) => info_span!("PerformAsyncTexImage2D", %texture, width, height),
            UploadParams::SubImage(_) => {
                info_span!("PerformAsyncTexSubImage2D", %texture, width, height)
            }
        }
        .entered();
        debug_assert_eq!(self.params.level(), 0);

        let begin = Instant::now();

        let region = match SafeSharedMemoryRegion::acquire(scope.pool(), &self.memory) {
            Ok(region) => region,
            Err(err) => {
                // The state stays in progress: an invalid range is a caller bug
                // and the transfer never completes.
                error!(%texture, %err, "rejecting transfer with invalid shared memory");
                return;
            }
        };

        let context = scope.context();
        let uploaded = match &self.params {
            UploadParams::Define(params) => context.tex_image_2d(texture, params, region.data()),
            UploadParams::SubImage(params) => {
                context.tex_sub_image_2d(texture, params, region.data())
            }
        };
        if let Err(err) = uploaded {
            // Same outcome as an invalid range: never completes.
            error!(%texture, "GL refused transfer: {err:#}");
            return;
        }
        context.flush();

        self.stats.add_upload(begin.elapsed());
        state.complete_transfer(self.generation);
    }
}

/// Hand `memory` back to `callback` once every task posted before this one
/// has run.
pub(crate) fn notify_completion(scope: &mut WorkerScope, memory: MemoryParams, callback: DrainCallback) {
    let _span = info_span!("PerformNotifyCompletion").entered();
    let region = match SafeSharedMemoryRegion::acquire(scope.pool(), &memory) {
        Ok(region) => region,
        Err(err) => {
            error!(%err, "dropping drain notification with invalid shared memory");
            return;
        }
    };

    let safe_memory = MemoryParams {
        shared_memory: region.shared_memory().clone(),
        ..memory
    };
    callback(&safe_memory);
}
