//! Client-side pixel buffer sizing.
//!
//! `glTexImage2D` reads `width * height` pixels from the pointer it is given
//! with no length attached. These helpers compute how many bytes that is so
//! the caller can refuse short buffers before handing GL a pointer.

use gl::types::{GLenum, GLsizei};

fn components(format: GLenum) -> Option<usize> {
    match format {
        gl::RED | gl::ALPHA | gl::DEPTH_COMPONENT | gl::RED_INTEGER => Some(1),
        gl::RG | gl::RG_INTEGER => Some(2),
        gl::RGB | gl::BGR | gl::RGB_INTEGER => Some(3),
        gl::RGBA | gl::BGRA | gl::RGBA_INTEGER => Some(4),
        _ => None,
    }
}

/// Bytes per pixel for a `format`/`type` pair, or `None` if unsupported.
pub fn bytes_per_pixel(format: GLenum, ty: GLenum) -> Option<usize> {
    match ty {
        gl::UNSIGNED_BYTE | gl::BYTE => components(format),
        gl::UNSIGNED_SHORT | gl::SHORT | gl::HALF_FLOAT => components(format).map(|c| c * 2),
        gl::UNSIGNED_INT | gl::INT | gl::FLOAT => components(format).map(|c| c * 4),
        // Packed types hold a whole pixel in one value.
        gl::UNSIGNED_SHORT_5_6_5 | gl::UNSIGNED_SHORT_4_4_4_4 | gl::UNSIGNED_SHORT_5_5_5_1 => {
            Some(2)
        }
        gl::UNSIGNED_INT_8_8_8_8 | gl::UNSIGNED_INT_8_8_8_8_REV | gl::UNSIGNED_INT_2_10_10_10_REV => {
            Some(4)
        }
        _ => None,
    }
}

/// Bytes GL will read for a `width`x`height` image with rows padded to
/// `unpack_alignment`. The last row is not padded.
pub fn image_size(
    width: GLsizei,
    height: GLsizei,
    format: GLenum,
    ty: GLenum,
    unpack_alignment: usize,
) -> Option<usize> {
    let width = usize::try_from(width).ok()?;
    let height = usize::try_from(height).ok()?;
    if width == 0 || height == 0 {
        return Some(0);
    }
    let row = width.checked_mul(bytes_per_pixel(format, ty)?)?;
    let alignment = unpack_alignment.max(1);
    let padded_row = row.checked_add(alignment - 1)? / alignment * alignment;
    padded_row.checked_mul(height - 1)?.checked_add(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_is_four_bytes() {
        assert_eq!(bytes_per_pixel(gl::RGBA, gl::UNSIGNED_BYTE), Some(4));
        assert_eq!(bytes_per_pixel(gl::RGB, gl::UNSIGNED_SHORT_5_6_5), Some(2));
        assert_eq!(bytes_per_pixel(gl::RGBA, gl::FLOAT), Some(16));
        assert_eq!(bytes_per_pixel(0xdead, gl::UNSIGNED_BYTE), None);
    }

    #[test]
    fn rows_are_padded_except_the_last() {
        // 3 RGB pixels = 9 bytes per row, padded to 12 with alignment 4.
        assert_eq!(image_size(3, 2, gl::RGB, gl::UNSIGNED_BYTE, 4), Some(12 + 9));
        assert_eq!(image_size(3, 2, gl::RGB, gl::UNSIGNED_BYTE, 1), Some(18));
        assert_eq!(image_size(64, 64, gl::RGBA, gl::UNSIGNED_BYTE, 4), Some(64 * 64 * 4));
    }

    #[test]
    fn degenerate_extents() {
        assert_eq!(image_size(0, 16, gl::RGBA, gl::UNSIGNED_BYTE, 4), Some(0));
        assert_eq!(image_size(-1, 16, gl::RGBA, gl::UNSIGNED_BYTE, 4), None);
    }
}
