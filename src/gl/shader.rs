// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! Shader program wrapper and the embedded default shader.
//!
//! Sources are version-agnostic; the caller passes the `#version` line
//! (`"#version 330 core"` natively, `"#version 300 es"` on the web) and
//! it gets prefixed at compile time.

use glow::HasContext;
use log::warn;

/// Default vertex shader: position through mvp, texcoord and color
/// passed straight to the fragment stage.
pub const VERTEX_SRC_DEFAULT: &str = r#"
            precision highp float;
            layout(location=0) in vec3 vertexPosition;
            layout(location=1) in vec2 vertexTexCoord;
            layout(location=2) in vec4 vertexColor;
            uniform mat4 mvp;
            out vec2 fragTexCoord;
            out vec4 fragColor;
            void main() {
                fragTexCoord = vertexTexCoord;
                fragColor = vertexColor;
                gl_Position = mvp * vec4(vertexPosition, 1.0);
            }
        "#;

/// Default fragment shader: texel × tint × vertex color.
pub const FRAGMENT_SRC_DEFAULT: &str = r#"
            precision highp float;
            uniform sampler2D texture0;
            uniform vec4 colDiffuse;
            in vec2 fragTexCoord;
            in vec4 fragColor;
            layout(location=0) out vec4 finalColor;
            void main() {
                vec4 texelColor = texture(texture0, fragTexCoord);
                finalColor = texelColor * colDiffuse * fragColor;
            }
        "#;

/// Typed uniform payloads; the upload match is exhaustive so adding a
/// variant forces the dispatch to be extended.
#[derive(Clone, Debug)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Sampler2D(i32),
    Matrix([f32; 16]),
}

pub struct GlShader {
    pub program: glow::Program,
    pub mvp_loc: Option<glow::UniformLocation>,
    pub texture0_loc: Option<glow::UniformLocation>,
    pub col_diffuse_loc: Option<glow::UniformLocation>,
}

impl GlShader {
    pub fn new(
        gl: &glow::Context,
        ver: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, String> {
        unsafe {
            let vertex_shader = gl.create_shader(glow::VERTEX_SHADER)?;
            gl.shader_source(vertex_shader, &format!("{}\n{}", ver, vertex_source));
            gl.compile_shader(vertex_shader);
            if !gl.get_shader_compile_status(vertex_shader) {
                let log = gl.get_shader_info_log(vertex_shader);
                warn!("vertex shader compilation error: {}", log);
                gl.delete_shader(vertex_shader);
                return Err(log);
            }

            let fragment_shader = gl.create_shader(glow::FRAGMENT_SHADER)?;
            gl.shader_source(fragment_shader, &format!("{}\n{}", ver, fragment_source));
            gl.compile_shader(fragment_shader);
            if !gl.get_shader_compile_status(fragment_shader) {
                let log = gl.get_shader_info_log(fragment_shader);
                warn!("fragment shader compilation error: {}", log);
                gl.delete_shader(vertex_shader);
                gl.delete_shader(fragment_shader);
                return Err(log);
            }

            let program = gl.create_program()?;
            gl.attach_shader(program, vertex_shader);
            gl.attach_shader(program, fragment_shader);
            gl.link_program(program);
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                warn!("program linking error: {}", log);
                gl.detach_shader(program, vertex_shader);
                gl.detach_shader(program, fragment_shader);
                gl.delete_shader(vertex_shader);
                gl.delete_shader(fragment_shader);
                gl.delete_program(program);
                return Err(log);
            }
            gl.detach_shader(program, vertex_shader);
            gl.detach_shader(program, fragment_shader);
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);

            let mvp_loc = gl.get_uniform_location(program, "mvp");
            let texture0_loc = gl.get_uniform_location(program, "texture0");
            let col_diffuse_loc = gl.get_uniform_location(program, "colDiffuse");

            Ok(Self {
                program,
                mvp_loc,
                texture0_loc,
                col_diffuse_loc,
            })
        }
    }

    pub fn new_default(gl: &glow::Context, ver: &str) -> Result<Self, String> {
        Self::new(gl, ver, VERTEX_SRC_DEFAULT, FRAGMENT_SRC_DEFAULT)
    }

    pub fn bind(&self, gl: &glow::Context) {
        unsafe {
            gl.use_program(Some(self.program));
        }
    }

    pub fn get_program(&self) -> glow::Program {
        self.program
    }

    pub fn uniform_location(
        &self,
        gl: &glow::Context,
        name: &str,
    ) -> Option<glow::UniformLocation> {
        unsafe { gl.get_uniform_location(self.program, name) }
    }

    /// Upload one uniform by name. The program must currently be bound.
    pub fn set_uniform(&self, gl: &glow::Context, name: &str, value: UniformValue) {
        match self.uniform_location(gl, name) {
            Some(loc) => upload_uniform(gl, Some(&loc), value),
            None => warn!("uniform not found: {}", name),
        }
    }

    pub fn free(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_program(self.program);
        }
    }
}

pub fn upload_uniform(
    gl: &glow::Context,
    loc: Option<&glow::UniformLocation>,
    value: UniformValue,
) {
    unsafe {
        match value {
            UniformValue::Int(v) => gl.uniform_1_i32(loc, v),
            UniformValue::Float(v) => gl.uniform_1_f32(loc, v),
            UniformValue::Vec2(v) => gl.uniform_2_f32_slice(loc, &v),
            UniformValue::Vec3(v) => gl.uniform_3_f32_slice(loc, &v),
            UniformValue::Vec4(v) => gl.uniform_4_f32_slice(loc, &v),
            UniformValue::Sampler2D(v) => gl.uniform_1_i32(loc, v),
            UniformValue::Matrix(v) => gl.uniform_matrix_4_f32_slice(loc, false, &v),
        }
    }
}
