// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! RustGlim is an OpenGL-1.1-style immediate-mode layer on top of modern OpenGL
//! (3.3 core on native, WebGL2/GLES3 on wasm) through the glow bindings.
//! begin/vertex/end calls are staged into CPU arrays and turned into a handful
//! of real draw calls when the batch is flushed, so porting-era code written
//! against the fixed pipeline keeps working over a programmable one.
//!
//! Everything hangs off a [`GlimContext`]: it owns the default white texture,
//! the default shader, a GL-1.1-style matrix stack and one or more render
//! batches. The caller keeps ownership of the [`glow::Context`] and passes it
//! into every method that has to talk to the driver, so the crate works the
//! same whether the surface comes from SDL, winit/glutin or a web canvas.
//!
//! Quads are the native primitive of the batch: four vertices per quad on the
//! CPU side, expanded into two triangles through a fixed index pattern at draw
//! time. Lines and triangles share the same vertex streams and are drawn with
//! plain array draws.
//!
//! Texture switches, shader switches and blend-mode changes all split or drain
//! the batch as needed; the caller only has to call `draw_current_batch` once
//! per frame.

/// quad elements per staging buffer, 4 vertices each
pub const DEFAULT_BATCH_BUFFER_ELEMENTS: usize = 8192;
/// staging buffers rotated through per batch to avoid stalling on the driver
pub const DEFAULT_BATCH_BUFFERS: usize = 1;
/// draw-call records per batch before a forced drain
pub const DEFAULT_BATCH_DRAWCALLS: usize = 256;
/// auxiliary texture units usable through set_uniform_sampler (unit 0 is the span texture)
pub const DEFAULT_BATCH_MAX_TEXTURE_UNITS: usize = 4;
/// matrix stack slots shared by both stacks
pub const MAX_MATRIX_STACK_SIZE: usize = 32;
/// depth step applied per end() so unsorted 2D draws keep paint order
pub const DEFAULT_DEPTH_INCREMENT: f32 = 1.0 / 20000.0;

/// vertex staging, draw-call table and span accounting
pub mod batch;

/// the owning context object: immediate-mode API, registry, flush
pub mod context;

/// glow-facing wrappers: buffers, shaders, textures, capability probe
pub mod gl;

/// log
pub mod log;

/// column-major 4x4 matrices and projection builders
pub mod math;

/// GL-1.1-style modelview/projection stacks with a transform accumulator
pub mod stack;

/// blend modes, state flags, shader/framebuffer/aux-texture bookkeeping
pub mod state;

pub use batch::{DrawMode, RenderBatch};
pub use context::{BatchHandle, GlimContext};
pub use gl::buffer::BatchBuffers;
pub use gl::shader::{GlShader, UniformValue};
pub use gl::texture::{GlRenderTexture, GlTexture, PixelFormat};
pub use gl::GlCapabilities;
pub use math::Matrix;
pub use stack::MatrixMode;
pub use state::{BlendFactorsSeparate, BlendMode, StateFlags};
