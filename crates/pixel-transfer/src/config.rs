//! Worker configuration.

use std::fmt;
use std::sync::Arc;

use pixel_transfer_core::GpuPreference;

pub const DEFAULT_THREAD_NAME: &str = "AsyncTransferThread";

/// Scheduling hint for the transfer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadPriority {
    Background = 0,
    Normal = 1,
}

impl ThreadPriority {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ThreadPriority::Background,
            _ => ThreadPriority::Normal,
        }
    }
}

/// Applies a priority change to the OS thread. Called from whichever thread
/// changes the hint.
pub type PriorityHook = Arc<dyn Fn(ThreadPriority) + Send + Sync>;

/// How the transfer thread is started.
#[derive(Clone)]
pub struct TransferConfig {
    pub thread_name: String,
    /// Run at [`ThreadPriority::Background`] except while a caller is blocked
    /// in a wait.
    pub background_priority: bool,
    /// Size of the offscreen surface the shared context is made current on.
    pub surface_size: (u32, u32),
    pub gpu_preference: GpuPreference,
    pub(crate) priority_hook: Option<PriorityHook>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            background_priority: cfg!(any(target_os = "linux", target_os = "android")),
            surface_size: (1, 1),
            gpu_preference: GpuPreference::default(),
            priority_hook: None,
        }
    }
}

impl TransferConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_background_priority(mut self, enabled: bool) -> Self {
        self.background_priority = enabled;
        self
    }

    pub fn with_surface_size(mut self, width: u32, height: u32) -> Self {
        self.surface_size = (width, height);
        self
    }

    pub fn with_gpu_preference(mut self, preference: GpuPreference) -> Self {
        self.gpu_preference = preference;
        self
    }

    pub fn with_priority_hook(mut self, hook: impl Fn(ThreadPriority) + Send + Sync + 'static) -> Self {
        self.priority_hook = Some(Arc::new(hook));
        self
    }

    /// Priority the thread runs at when nobody is waiting on it.
    pub fn idle_priority(&self) -> ThreadPriority {
        if self.background_priority {
            ThreadPriority::Background
        } else {
            ThreadPriority::Normal
        }
    }
}

impl fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferConfig")
            .field("thread_name", &self.thread_name)
            .field("background_priority", &self.background_priority)
            .field("surface_size", &self.surface_size)
            .field("gpu_preference", &self.gpu_preference)
            .field("priority_hook", &self.priority_hook.is_some())
            .finish()
    }
}
