//! [`GlTransferContext`]: raw GL uploads on the transfer thread.

use anyhow::{anyhow, ensure, Result};
use gl::types::{GLenum, GLint, GLsizei};
use pixel_transfer_core::{
    OffscreenSurface, TexImage2DParams, TexSubImage2DParams, TextureId, TransferContext,
};
use tracing::trace_span;

use crate::loader::load_gl_functions;
use crate::pixels::image_size;

/// Platform half of a shared context: only knows how to become current.
///
/// Supplied by the embedder (EGL, CGL, WGL, GLX...).
pub trait NativeContext {
    fn make_current(&mut self, surface: &dyn OffscreenSurface) -> Result<()>;
}

/// [`TransferContext`] issuing `gl` calls.
///
/// Each upload binds the target texture, uploads and unbinds again so the
/// transfer context never holds a stale binding across tasks.
pub struct GlTransferContext {
    native: Box<dyn NativeContext>,
    unpack_alignment: usize,
}

impl GlTransferContext {
    pub fn new(native: Box<dyn NativeContext>) -> Self {
        Self {
            native,
            unpack_alignment: 4,
        }
    }

    /// Row alignment applied with `glPixelStorei` once the context is current.
    /// Must be 1, 2, 4 or 8.
    pub fn with_unpack_alignment(mut self, alignment: usize) -> Self {
        assert!(
            matches!(alignment, 1 | 2 | 4 | 8),
            "invalid unpack alignment {alignment}"
        );
        self.unpack_alignment = alignment;
        self
    }

    /// Refuse buffers shorter than what GL would read.
    fn check_len(
        &self,
        width: GLsizei,
        height: GLsizei,
        format: GLenum,
        ty: GLenum,
        pixels: &[u8],
    ) -> Result<()> {
        let needed = image_size(width, height, format, ty, self.unpack_alignment).ok_or_else(
            || anyhow!("unsupported pixel layout {width}x{height} format {format:#x} type {ty:#x}"),
        )?;
        ensure!(
            needed <= pixels.len(),
            "pixel data too short: need {needed} bytes, have {}",
            pixels.len()
        );
        Ok(())
    }
}

impl TransferContext for GlTransferContext {
    fn make_current(&mut self, surface: &dyn OffscreenSurface) -> Result<()> {
        self.native.make_current(surface)?;
        load_gl_functions();
        unsafe {
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, self.unpack_alignment as GLint);
        }
        Ok(())
    }

    fn tex_image_2d(
        &mut self,
        texture: TextureId,
        params: &TexImage2DParams,
        pixels: &[u8],
    ) -> Result<()> {
        self.check_len(params.width, params.height, params.format, params.ty, pixels)?;

        let _span = trace_span!("glTexImage2D", %texture).entered();
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture.get());
            gl::TexImage2D(
                gl::TEXTURE_2D,
                params.level,
                params.internal_format,
                params.width,
                params.height,
                params.border,
                params.format,
                params.ty,
                pixels.as_ptr().cast(),
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
        Ok(())
    }

    fn tex_sub_image_2d(
        &mut self,
        texture: TextureId,
        params: &TexSubImage2DParams,
        pixels: &[u8],
    ) -> Result<()> {
        self.check_len(params.width, params.height, params.format, params.ty, pixels)?;

        let _span = trace_span!("glTexSubImage2D", %texture).entered();
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture.get());
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                params.level,
                params.xoffset,
                params.yoffset,
                params.width,
                params.height,
                params.format,
                params.ty,
                pixels.as_ptr().cast(),
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
        Ok(())
    }

    fn flush(&mut self) {
        unsafe {
            gl::Flush();
        }
    }
}
