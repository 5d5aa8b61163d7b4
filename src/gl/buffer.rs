// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! GPU objects backing one staging vertex buffer: an optional VAO, three
//! attribute VBOs and the static quad-pattern EBO.
//!
//! Attribute layout matches the default shader:
//! location 0 = vec3 position, 1 = vec2 texcoord, 2 = vec4 color
//! (unsigned bytes, normalized).

use crate::batch::quad_index_pattern;
use glow::HasContext;

pub struct BatchBuffers {
    pub vao: Option<glow::VertexArray>,
    pub vbo_positions: glow::Buffer,
    pub vbo_texcoords: glow::Buffer,
    pub vbo_colors: glow::Buffer,
    pub ebo: glow::Buffer,
}

impl BatchBuffers {
    /// Allocate the GPU side for `elements` quads. Attribute VBOs are
    /// dynamic (re-filled each flush), the index buffer is written once.
    /// `use_vao` comes from the capability probe; without it the pointers
    /// are re-specified at every draw instead.
    pub fn new(gl: &glow::Context, elements: usize, use_vao: bool) -> Result<Self, String> {
        let n = elements * 4;
        unsafe {
            let vao = if use_vao {
                let v = gl.create_vertex_array()?;
                gl.bind_vertex_array(Some(v));
                Some(v)
            } else {
                None
            };

            let vbo_positions = gl.create_buffer()?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo_positions));
            gl.buffer_data_size(
                glow::ARRAY_BUFFER,
                (n * 3 * std::mem::size_of::<f32>()) as i32,
                glow::DYNAMIC_DRAW,
            );

            let vbo_texcoords = gl.create_buffer()?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo_texcoords));
            gl.buffer_data_size(
                glow::ARRAY_BUFFER,
                (n * 2 * std::mem::size_of::<f32>()) as i32,
                glow::DYNAMIC_DRAW,
            );

            let vbo_colors = gl.create_buffer()?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo_colors));
            gl.buffer_data_size(glow::ARRAY_BUFFER, (n * 4) as i32, glow::DYNAMIC_DRAW);

            let ebo = gl.create_buffer()?;
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            let indices = quad_index_pattern(elements);
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                indices.align_to::<u8>().1,
                glow::STATIC_DRAW,
            );

            let buffers = Self {
                vao,
                vbo_positions,
                vbo_texcoords,
                vbo_colors,
                ebo,
            };
            buffers.specify_attributes(gl);

            if vao.is_some() {
                gl.bind_vertex_array(None);
            }
            Ok(buffers)
        }
    }

    fn specify_attributes(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_positions));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, 0, 0);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_texcoords));
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 0, 0);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_colors));
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(2, 4, glow::UNSIGNED_BYTE, true, 0, 0);

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
        }
    }

    /// Upload the used prefix of every attribute array.
    pub fn upload_prefix(&self, gl: &glow::Context, positions: &[f32], texcoords: &[f32], colors: &[u8]) {
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_positions));
            gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, positions.align_to::<u8>().1);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_texcoords));
            gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, texcoords.align_to::<u8>().1);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_colors));
            gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, colors);
        }
    }

    /// Make the attribute setup current for the span draws.
    pub fn bind_for_draw(&self, gl: &glow::Context) {
        if self.vao.is_some() {
            unsafe {
                gl.bind_vertex_array(self.vao);
            }
        } else {
            self.specify_attributes(gl);
        }
    }

    pub fn unbind(&self, gl: &glow::Context) {
        unsafe {
            if self.vao.is_some() {
                gl.bind_vertex_array(None);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
        }
    }

    pub fn free(&self, gl: &glow::Context) {
        unsafe {
            if let Some(vao) = self.vao {
                gl.delete_vertex_array(vao);
            }
            gl.delete_buffer(self.vbo_positions);
            gl.delete_buffer(self.vbo_texcoords);
            gl.delete_buffer(self.vbo_colors);
            gl.delete_buffer(self.ebo);
        }
    }
}
