// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! # GPU Resource Layer
//!
//! Thin wrappers over the driver: shader compile/link, texture upload,
//! render targets and the per-batch VAO/VBO/EBO objects. Everything here
//! talks to `glow` directly; the batching and state logic above never
//! touches the driver without going through this layer.

/// Per-batch buffer objects and attribute setup
pub mod buffer;

/// Shader program wrapper, uniform upload, default shader sources
pub mod shader;

/// 2D textures, pixel formats and render-to-texture targets
pub mod texture;

use glow::HasContext;
use log::info;

/// What the driver reported at init. Probed once, logged, and consulted
/// for the VAO path and texture limits.
pub struct GlCapabilities {
    pub version: String,
    pub vendor: String,
    pub renderer: String,
    pub glsl_version: String,
    pub max_texture_size: i32,
    pub max_vertex_attribs: i32,
    pub vao_supported: bool,
    pub compressed_dxt: bool,
    pub compressed_etc2: bool,
    pub compressed_astc: bool,
}

impl GlCapabilities {
    pub fn probe(gl: &glow::Context) -> Self {
        let (version, vendor, renderer, glsl_version, max_texture_size, max_vertex_attribs) = unsafe {
            (
                gl.get_parameter_string(glow::VERSION),
                gl.get_parameter_string(glow::VENDOR),
                gl.get_parameter_string(glow::RENDERER),
                gl.get_parameter_string(glow::SHADING_LANGUAGE_VERSION),
                gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE),
                gl.get_parameter_i32(glow::MAX_VERTEX_ATTRIBS),
            )
        };
        let extensions = unsafe { gl.supported_extensions() };

        // ES2-class contexts only have VAOs through the OES extension
        let es2 = version.starts_with("OpenGL ES 2");
        let vao_supported = !es2 || extensions.contains("GL_OES_vertex_array_object");

        let compressed_dxt = extensions.contains("GL_EXT_texture_compression_s3tc")
            || extensions.contains("WEBGL_compressed_texture_s3tc");
        let compressed_etc2 = extensions.contains("GL_ARB_ES3_compatibility")
            || extensions.contains("GL_OES_compressed_ETC2_RGBA8_texture");
        let compressed_astc = extensions.contains("GL_KHR_texture_compression_astc_ldr")
            || extensions.contains("WEBGL_compressed_texture_astc");

        info!("GPU: {} [{}]", renderer, vendor);
        info!("driver: {}, GLSL {}", version, glsl_version);
        info!(
            "limits: max texture size {}, max vertex attribs {}",
            max_texture_size, max_vertex_attribs
        );
        info!(
            "features: vao {}, s3tc {}, etc2 {}, astc {}",
            vao_supported, compressed_dxt, compressed_etc2, compressed_astc
        );

        Self {
            version,
            vendor,
            renderer,
            glsl_version,
            max_texture_size,
            max_vertex_attribs,
            vao_supported,
            compressed_dxt,
            compressed_etc2,
            compressed_astc,
        }
    }
}
