//! Collaborator interface for the transfer thread's GL context.
//!
//! The pipeline never creates platform GL objects itself. An embedder supplies
//! a [`ContextFactory`] that, on the transfer thread, creates a small
//! offscreen surface and a context sharing textures with the main context's
//! [`ShareGroup`]. The resulting [`TransferContext`] performs the actual pixel
//! uploads.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::params::{TexImage2DParams, TexSubImage2DParams, TextureId};

/// Opaque token for the resource-sharing group of the main GL context.
///
/// Factories downcast it to whatever platform object they need.
#[derive(Clone)]
pub struct ShareGroup(Arc<dyn Any + Send + Sync>);

impl ShareGroup {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ShareGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareGroup").finish_non_exhaustive()
    }
}

/// Which adapter the shared context should be created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPreference {
    #[default]
    PreferIntegrated,
    PreferDiscrete,
}

/// Offscreen drawable the transfer context is made current against.
pub trait OffscreenSurface {
    fn size(&self) -> (u32, u32);
}

/// A GL context living on the transfer thread.
///
/// All methods are called from that thread only, with the context current.
pub trait TransferContext {
    fn make_current(&mut self, surface: &dyn OffscreenSurface) -> Result<()>;

    /// Define `texture`'s level-0 storage from `pixels`.
    ///
    /// An `Err` means no GL call was issued and the texture is unchanged.
    fn tex_image_2d(
        &mut self,
        texture: TextureId,
        params: &TexImage2DParams,
        pixels: &[u8],
    ) -> Result<()>;

    /// Overwrite a rectangle of `texture` with `pixels`. Fails like
    /// [`tex_image_2d`](Self::tex_image_2d).
    fn tex_sub_image_2d(
        &mut self,
        texture: TextureId,
        params: &TexSubImage2DParams,
        pixels: &[u8],
    ) -> Result<()>;

    /// Push queued commands so the main context observes the new contents.
    fn flush(&mut self);
}

/// Produces the transfer thread's surface and shared context.
///
/// The factory is moved onto the transfer thread and invoked there exactly
/// once during initialization.
pub trait ContextFactory: Send + 'static {
    fn create_offscreen_surface(&mut self, size: (u32, u32)) -> Result<Box<dyn OffscreenSurface>>;

    fn create_shared_context(
        &mut self,
        share_group: &ShareGroup,
        surface: &dyn OffscreenSurface,
        preference: GpuPreference,
    ) -> Result<Box<dyn TransferContext>>;
}
