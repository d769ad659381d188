//! Closure-driven [`ContextFactory`].

use anyhow::Result;
use pixel_transfer_core::{
    ContextFactory, GpuPreference, OffscreenSurface, ShareGroup, TransferContext,
};

use crate::context::{GlTransferContext, NativeContext};

/// Builds the transfer thread's GL objects from two embedder closures and
/// wraps the resulting native context in a [`GlTransferContext`].
///
/// Both closures run on the transfer thread.
pub struct ClosureContextFactory<S, C> {
    create_surface: S,
    create_context: C,
    unpack_alignment: usize,
}

impl<S, C> ClosureContextFactory<S, C>
where
    S: FnMut((u32, u32)) -> Result<Box<dyn OffscreenSurface>> + Send + 'static,
    C: FnMut(&ShareGroup, &dyn OffscreenSurface, GpuPreference) -> Result<Box<dyn NativeContext>>
        + Send
        + 'static,
{
    pub fn new(create_surface: S, create_context: C) -> Self {
        Self {
            create_surface,
            create_context,
            unpack_alignment: 4,
        }
    }

    pub fn with_unpack_alignment(mut self, alignment: usize) -> Self {
        self.unpack_alignment = alignment;
        self
    }
}

impl<S, C> ContextFactory for ClosureContextFactory<S, C>
where
    S: FnMut((u32, u32)) -> Result<Box<dyn OffscreenSurface>> + Send + 'static,
    C: FnMut(&ShareGroup, &dyn OffscreenSurface, GpuPreference) -> Result<Box<dyn NativeContext>>
        + Send
        + 'static,
{
    fn create_offscreen_surface(&mut self, size: (u32, u32)) -> Result<Box<dyn OffscreenSurface>> {
        (self.create_surface)(size)
    }

    fn create_shared_context(
        &mut self,
        share_group: &ShareGroup,
        surface: &dyn OffscreenSurface,
        preference: GpuPreference,
    ) -> Result<Box<dyn TransferContext>> {
        let native = (self.create_context)(share_group, surface, preference)?;
        Ok(Box::new(
            GlTransferContext::new(native).with_unpack_alignment(self.unpack_alignment),
        ))
    }
}
