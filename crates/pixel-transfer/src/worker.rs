//! The transfer thread.
//!
//! A [`TransferWorker`] owns one OS thread that executes posted tasks in FIFO
//! order. On startup the thread creates an offscreen surface and a GL context
//! sharing resources with the main context, and keeps both current for its
//! whole life. The spawner blocks until that handshake has succeeded or
//! failed.
//!
//! Most processes use [`TransferWorker::global`]: one lazily started worker
//! that is never torn down. Its GL objects are reclaimed at process exit.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use pixel_transfer_core::{
    ContextFactory, OffscreenSurface, SafeSharedMemoryPool, ShareGroup, TransferContext,
};
use thiserror::Error;
use tracing::{debug, error, info_span, trace};

use crate::config::{PriorityHook, ThreadPriority, TransferConfig};

/// Why the transfer thread could not be brought up. Uploads are unavailable
/// for as long as the failed worker would have lived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("no parent context provided")]
    NoParentContext,
    #[error("unable to create offscreen surface: {0}")]
    SurfaceCreation(String),
    #[error("unable to create shared context: {0}")]
    ContextCreation(String),
    #[error("unable to make shared context current: {0}")]
    MakeCurrent(String),
    #[error("unable to spawn transfer thread: {0}")]
    ThreadSpawn(String),
    #[error("transfer thread exited during initialization")]
    WorkerExited,
}

type Job = Box<dyn FnOnce(&mut WorkerScope) + Send>;

/// Everything a task may touch on the transfer thread.
pub struct WorkerScope {
    context: Box<dyn TransferContext>,
    // Must outlive `context`, which is current against it.
    _surface: Box<dyn OffscreenSurface>,
    pool: SafeSharedMemoryPool,
}

impl WorkerScope {
    fn initialize(
        share_group: Option<ShareGroup>,
        mut factory: impl ContextFactory,
        config: &TransferConfig,
    ) -> Result<Self, InitError> {
        let _span = info_span!("InitializeOnTransferThread").entered();

        let share_group = share_group.ok_or(InitError::NoParentContext)?;

        let surface = factory
            .create_offscreen_surface(config.surface_size)
            .map_err(|e| InitError::SurfaceCreation(format!("{e:#}")))?;

        let mut context = factory
            .create_shared_context(&share_group, surface.as_ref(), config.gpu_preference)
            .map_err(|e| InitError::ContextCreation(format!("{e:#}")))?;

        context
            .make_current(surface.as_ref())
            .map_err(|e| InitError::MakeCurrent(format!("{e:#}")))?;

        Ok(Self {
            context,
            _surface: surface,
            pool: SafeSharedMemoryPool::new(),
        })
    }

    /// The shared GL context, current on this thread.
    pub fn context(&mut self) -> &mut dyn TransferContext {
        self.context.as_mut()
    }

    /// Mappings of shared memory blocks used by tasks on this thread.
    pub fn pool(&self) -> &SafeSharedMemoryPool {
        &self.pool
    }
}

struct PriorityControl {
    current: AtomicU8,
    idle: ThreadPriority,
    boosts: Mutex<usize>,
    hook: Option<PriorityHook>,
}

impl PriorityControl {
    fn set(&self, priority: ThreadPriority) {
        self.current.store(priority as u8, Ordering::Release);
        trace!(?priority, "transfer thread priority");
        if let Some(hook) = &self.hook {
            hook(priority);
        }
    }
}

/// Handle to a running transfer thread.
pub struct TransferWorker {
    sender: mpsc::Sender<Job>,
    priority: PriorityControl,
    thread_name: String,
}

static GLOBAL_WORKER: OnceCell<Result<Arc<TransferWorker>, InitError>> = OnceCell::new();

impl TransferWorker {
    /// Start a dedicated transfer thread and block until its GL context is
    /// current.
    ///
    /// The thread exits once the returned handle and every clone of it are
    /// gone and the queued tasks have run.
    pub fn spawn(
        share_group: Option<ShareGroup>,
        factory: impl ContextFactory,
        config: &TransferConfig,
    ) -> Result<Arc<Self>, InitError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let (init_tx, init_rx) = mpsc::sync_channel::<Result<(), InitError>>(1);

        let thread_config = config.clone();
        thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let mut scope = match WorkerScope::initialize(share_group, factory, &thread_config) {
                    Ok(scope) => {
                        let _ = init_tx.send(Ok(()));
                        scope
                    }
                    Err(err) => {
                        error!(%err, "transfer thread initialization failed");
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };
                debug!("transfer thread running");
                while let Ok(job) = receiver.recv() {
                    job(&mut scope);
                }
                debug!("transfer thread exiting");
            })
            .map_err(|e| InitError::ThreadSpawn(e.to_string()))?;

        init_rx.recv().map_err(|_| InitError::WorkerExited)??;

        let worker = Arc::new(Self {
            sender,
            priority: PriorityControl {
                current: AtomicU8::new(ThreadPriority::Normal as u8),
                idle: config.idle_priority(),
                boosts: Mutex::new(0),
                hook: config.priority_hook.clone(),
            },
            thread_name: config.thread_name.clone(),
        });
        if worker.priority.idle != ThreadPriority::Normal {
            worker.priority.set(worker.priority.idle);
        }
        Ok(worker)
    }

    /// The process-wide worker, started on first use.
    ///
    /// Only the first call's arguments are used; later calls drop their
    /// factory and get the first outcome, including a failed one. The worker
    /// is never shut down.
    pub fn global(
        share_group: Option<ShareGroup>,
        factory: impl ContextFactory,
        config: &TransferConfig,
    ) -> Result<Arc<Self>, InitError> {
        GLOBAL_WORKER
            .get_or_init(|| Self::spawn(share_group, factory, config))
            .clone()
    }

    /// The process-wide worker if [`global`](Self::global) already succeeded.
    pub fn try_global() -> Option<Arc<Self>> {
        GLOBAL_WORKER.get().and_then(|r| r.as_ref().ok()).cloned()
    }

    /// Queue `task` behind everything posted so far.
    pub fn post_task(&self, task: impl FnOnce(&mut WorkerScope) + Send + 'static) {
        if self.sender.send(Box::new(task)).is_err() {
            error!(thread = %self.thread_name, "transfer thread is gone, dropping task");
        }
    }

    pub fn priority(&self) -> ThreadPriority {
        ThreadPriority::from_u8(self.priority.current.load(Ordering::Acquire))
    }

    /// Run the thread at normal priority until the guard is dropped.
    pub fn boost_priority(&self) -> PriorityBoost<'_> {
        let mut boosts = self.priority.boosts.lock();
        if *boosts == 0 && self.priority.idle != ThreadPriority::Normal {
            self.priority.set(ThreadPriority::Normal);
        }
        *boosts += 1;
        PriorityBoost { worker: self }
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

impl fmt::Debug for TransferWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferWorker")
            .field("thread_name", &self.thread_name)
            .field("priority", &self.priority())
            .finish()
    }
}

/// Keeps the transfer thread at normal priority while alive. Nested boosts
/// restore the idle priority only when the last one ends.
#[must_use = "the priority drops back as soon as the guard is dropped"]
pub struct PriorityBoost<'a> {
    worker: &'a TransferWorker,
}

impl Drop for PriorityBoost<'_> {
    fn drop(&mut self) {
        let control = &self.worker.priority;
        let mut boosts = control.boosts.lock();
        *boosts -= 1;
        if *boosts == 0 && control.idle != ThreadPriority::Normal {
            control.set(control.idle);
        }
    }
}
