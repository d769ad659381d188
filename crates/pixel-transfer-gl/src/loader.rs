//! One-time loading of GL function pointers.

use std::sync::Once;

static GL_INIT_ONCE: Once = Once::new();

/// Load GL entry points through `gl_loader`.
///
/// Pointers are process-global, so this runs exactly once no matter how many
/// contexts call it. Call it with a context current.
pub fn load_gl_functions() {
    GL_INIT_ONCE.call_once(|| {
        gl_loader::init_gl();
        gl::load_with(|s| gl_loader::get_proc_address(s).cast());
        tracing::debug!("GL function pointers loaded");
    });
}
