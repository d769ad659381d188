//! Texture ids and the parameter blocks carried by every upload request.

use std::fmt;
use std::sync::Arc;

use gl::types::{GLenum, GLint, GLsizei, GLuint};

use crate::shared_memory::SharedMemory;

/// GL texture name. Zero is never a valid upload target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(GLuint);

impl TextureId {
    pub const fn new(name: GLuint) -> Self {
        Self(name)
    }

    /// Raw GL texture name.
    pub const fn get(self) -> GLuint {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

/// Parameters of a full texture definition (`glTexImage2D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexImage2DParams {
    pub target: GLenum,
    pub level: GLint,
    pub internal_format: GLint,
    pub width: GLsizei,
    pub height: GLsizei,
    pub border: GLint,
    pub format: GLenum,
    pub ty: GLenum,
}

impl TexImage2DParams {
    /// Level-0 `GL_TEXTURE_2D` definition of `width`x`height` RGBA8 pixels.
    pub fn rgba8(width: GLsizei, height: GLsizei) -> Self {
        Self {
            target: gl::TEXTURE_2D,
            level: 0,
            internal_format: gl::RGBA as GLint,
            width,
            height,
            border: 0,
            format: gl::RGBA,
            ty: gl::UNSIGNED_BYTE,
        }
    }
}

/// Parameters of a sub-rectangle update (`glTexSubImage2D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexSubImage2DParams {
    pub target: GLenum,
    pub level: GLint,
    pub xoffset: GLint,
    pub yoffset: GLint,
    pub width: GLsizei,
    pub height: GLsizei,
    pub format: GLenum,
    pub ty: GLenum,
}

impl TexSubImage2DParams {
    /// Level-0 RGBA8 update of the rectangle `(x, y, width, height)`.
    pub fn rgba8(x: GLint, y: GLint, width: GLsizei, height: GLsizei) -> Self {
        Self {
            target: gl::TEXTURE_2D,
            level: 0,
            xoffset: x,
            yoffset: y,
            width,
            height,
            format: gl::RGBA,
            ty: gl::UNSIGNED_BYTE,
        }
    }
}

/// Either flavour of upload. Definition replaces the texture storage, sub-image
/// writes into a rectangle of existing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadParams {
    Define(TexImage2DParams),
    SubImage(TexSubImage2DParams),
}

impl UploadParams {
    pub fn target(&self) -> GLenum {
        match self {
            UploadParams::Define(p) => p.target,
            UploadParams::SubImage(p) => p.target,
        }
    }

    pub fn level(&self) -> GLint {
        match self {
            UploadParams::Define(p) => p.level,
            UploadParams::SubImage(p) => p.level,
        }
    }

    /// `(width, height)` of the uploaded rectangle.
    pub fn extent(&self) -> (GLsizei, GLsizei) {
        match self {
            UploadParams::Define(p) => (p.width, p.height),
            UploadParams::SubImage(p) => (p.width, p.height),
        }
    }
}

impl From<TexImage2DParams> for UploadParams {
    fn from(params: TexImage2DParams) -> Self {
        UploadParams::Define(params)
    }
}

impl From<TexSubImage2DParams> for UploadParams {
    fn from(params: TexSubImage2DParams) -> Self {
        UploadParams::SubImage(params)
    }
}

/// Where the pixels of an upload live: `shm_data_size` bytes at
/// `shm_data_offset` inside a shared block declared to be `shm_size` bytes.
///
/// The declared range is only trusted after [`SafeSharedMemoryRegion::acquire`]
/// has validated it.
///
/// [`SafeSharedMemoryRegion::acquire`]: crate::SafeSharedMemoryRegion::acquire
#[derive(Clone)]
pub struct MemoryParams {
    pub shared_memory: Arc<dyn SharedMemory>,
    pub shm_size: usize,
    pub shm_data_offset: usize,
    pub shm_data_size: usize,
}

impl MemoryParams {
    /// Describe the whole of `shared_memory` as both the block and the data.
    pub fn whole(shared_memory: Arc<dyn SharedMemory>) -> Self {
        let len = shared_memory.len();
        Self {
            shared_memory,
            shm_size: len,
            shm_data_offset: 0,
            shm_data_size: len,
        }
    }
}

impl fmt::Debug for MemoryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryParams")
            .field("shared_memory", &self.shared_memory.id())
            .field("shm_size", &self.shm_size)
            .field("shm_data_offset", &self.shm_data_offset)
            .field("shm_data_size", &self.shm_data_size)
            .finish()
    }
}
