//! OpenGL implementation of the transfer thread's context.
//!
//! [`GlTransferContext`] turns the pipeline's upload requests into raw `gl`
//! calls on the transfer thread. Creating the platform context itself stays
//! with the embedder: wrap its surface/context constructors in a
//! [`ClosureContextFactory`] and hand that to the worker.
//!
//! ### Warning
//!
//! Every GL call here assumes the shared context is current on the calling
//! thread. The worker guarantees that by making it current once during
//! initialization and never releasing it.

mod context;
mod factory;
mod loader;
pub mod pixels;

pub use context::{GlTransferContext, NativeContext};
pub use factory::ClosureContextFactory;
pub use loader::load_gl_functions;
