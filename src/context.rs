// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! `GlimContext`: the single owning object behind the whole API.
//!
//! One context owns the default texture/shader, the matrix stack, the
//! render state and every loaded batch; all immediate-mode calls are
//! methods here, taking `gl: &glow::Context` wherever the driver is
//! touched. There are no process-wide globals.
//!
//! ```text
//!   begin/vertex/end ──▶ active RenderBatch (CPU staging)
//!          │                      │ overflow / state change
//!          ▼                      ▼
//!   MatrixStack ──────────▶ flush: upload prefix, mvp, span draws
//!                                  │
//!                                  ▼
//!                     RenderState (blend/shader/textures/fbo)
//! ```

use crate::batch::{DrawMode, RenderBatch};
use crate::gl::buffer::BatchBuffers;
use crate::gl::shader::GlShader;
use crate::gl::texture::GlTexture;
use crate::gl::GlCapabilities;
use crate::math::Matrix;
use crate::stack::{MatrixMode, MatrixStack};
use crate::state::{BlendFactorsSeparate, BlendMode, BlendSetup, RenderState, StateFlags};
use crate::{DEFAULT_BATCH_BUFFERS, DEFAULT_BATCH_BUFFER_ELEMENTS, DEFAULT_BATCH_DRAWCALLS};
use glow::HasContext;
use log::{info, warn};

/// Identifies a batch loaded with `load_render_batch`. Slot 0 is the
/// default batch owned by the context itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BatchHandle(usize);

pub struct GlimContext {
    pub capabilities: GlCapabilities,
    state: RenderState,
    stack: MatrixStack,

    default_texture: GlTexture,
    default_shader: GlShader,
    default_batch: RenderBatch,
    /// User batches; handle = index + 1, freed slots are reused.
    batches: Vec<Option<RenderBatch>>,
    /// 0 selects the default batch.
    active: usize,

    current_normal: (f32, f32, f32),
    glsl_version: &'static str,
}

fn color_byte(v: f32) -> u8 {
    (v * 255.0) as u8
}

impl GlimContext {
    /// Probe the driver, create the default resources and establish the
    /// baseline pipeline state (depth LEQUAL but disabled, alpha blend
    /// on, back-face culling on, CCW front faces).
    pub fn new(gl: &glow::Context, width: i32, height: i32) -> Result<Self, String> {
        let capabilities = GlCapabilities::probe(gl);
        let glsl_version = if cfg!(target_arch = "wasm32") {
            "#version 300 es"
        } else {
            "#version 330 core"
        };

        let default_shader = GlShader::new_default(gl, glsl_version)?;
        let default_texture = GlTexture::white_placeholder(gl)?;

        let mut default_batch = RenderBatch::new(
            DEFAULT_BATCH_BUFFERS,
            DEFAULT_BATCH_BUFFER_ELEMENTS,
            DEFAULT_BATCH_DRAWCALLS,
        );
        for vb in default_batch.buffers_mut() {
            vb.gpu = Some(BatchBuffers::new(
                gl,
                DEFAULT_BATCH_BUFFER_ELEMENTS,
                capabilities.vao_supported,
            )?);
        }

        unsafe {
            gl.depth_func(glow::LEQUAL);
            gl.disable(glow::DEPTH_TEST);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.enable(glow::BLEND);
            gl.cull_face(glow::BACK);
            gl.front_face(glow::CCW);
            gl.enable(glow::CULL_FACE);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.viewport(0, 0, width, height);
        }

        info!("immediate-mode context ready: {}x{}", width, height);

        Ok(Self {
            capabilities,
            state: RenderState::new(width, height),
            stack: MatrixStack::new(),
            default_texture,
            default_shader,
            default_batch,
            batches: Vec::new(),
            active: 0,
            current_normal: (0.0, 0.0, 1.0),
            glsl_version,
        })
    }

    /// Free every GPU object this context created.
    pub fn close(mut self, gl: &glow::Context) {
        for slot in 0..self.batches.len() {
            if let Some(batch) = self.batches[slot].as_mut() {
                for vb in batch.buffers_mut() {
                    if let Some(gpu) = vb.gpu.take() {
                        gpu.free(gl);
                    }
                }
            }
        }
        for vb in self.default_batch.buffers_mut() {
            if let Some(gpu) = vb.gpu.take() {
                gpu.free(gl);
            }
        }
        self.default_shader.free(gl);
        self.default_texture.free(gl);
    }

    pub fn glsl_version(&self) -> &'static str {
        self.glsl_version
    }

    pub fn default_texture(&self) -> glow::Texture {
        self.default_texture.texture
    }

    pub fn default_shader(&self) -> &GlShader {
        &self.default_shader
    }

    pub fn current_normal(&self) -> (f32, f32, f32) {
        self.current_normal
    }

    // ---- batch registry -------------------------------------------------

    fn active_index(&self) -> usize {
        if self.active == 0 {
            0
        } else {
            match self.batches.get(self.active - 1) {
                Some(Some(_)) => self.active,
                _ => 0,
            }
        }
    }

    fn active_mut(&mut self) -> &mut RenderBatch {
        let i = self.active_index();
        if i == 0 {
            &mut self.default_batch
        } else {
            match self.batches[i - 1] {
                Some(ref mut b) => b,
                None => &mut self.default_batch,
            }
        }
    }

    fn active_ref(&self) -> &RenderBatch {
        let i = self.active_index();
        if i == 0 {
            &self.default_batch
        } else {
            match self.batches[i - 1] {
                Some(ref b) => b,
                None => &self.default_batch,
            }
        }
    }

    /// Create a batch with its own staging buffers and GPU objects.
    pub fn load_render_batch(
        &mut self,
        gl: &glow::Context,
        buffers_count: usize,
        elements: usize,
    ) -> Result<BatchHandle, String> {
        let mut batch = RenderBatch::new(buffers_count, elements, DEFAULT_BATCH_DRAWCALLS);
        for vb in batch.buffers_mut() {
            vb.gpu = Some(BatchBuffers::new(
                gl,
                elements,
                self.capabilities.vao_supported,
            )?);
        }
        let slot = self.batches.iter().position(|b| b.is_none());
        let index = match slot {
            Some(i) => {
                self.batches[i] = Some(batch);
                i
            }
            None => {
                self.batches.push(Some(batch));
                self.batches.len() - 1
            }
        };
        Ok(BatchHandle(index + 1))
    }

    /// Free a batch's GPU objects and release its slot. Pending geometry
    /// in it is discarded.
    pub fn unload_render_batch(&mut self, gl: &glow::Context, handle: BatchHandle) {
        if handle.0 == 0 {
            warn!("cannot unload the default batch");
            return;
        }
        match self.batches.get_mut(handle.0 - 1) {
            Some(slot) => {
                if let Some(mut batch) = slot.take() {
                    for vb in batch.buffers_mut() {
                        if let Some(gpu) = vb.gpu.take() {
                            gpu.free(gl);
                        }
                    }
                } else {
                    warn!("render batch already unloaded: {:?}", handle);
                }
            }
            None => warn!("unknown render batch: {:?}", handle),
        }
        if self.active == handle.0 {
            self.active = 0;
        }
    }

    /// Select the batch subsequent emission goes to (`None` = default).
    /// Geometry already staged in the previous batch stays there until
    /// that batch is drawn.
    pub fn set_active_render_batch(&mut self, handle: Option<BatchHandle>) {
        match handle {
            None => self.active = 0,
            Some(h) => {
                if matches!(self.batches.get(h.0.wrapping_sub(1)), Some(Some(_))) {
                    self.active = h.0;
                } else {
                    warn!("unknown render batch: {:?}, keeping current", h);
                }
            }
        }
    }

    pub fn active_render_batch(&self) -> Option<BatchHandle> {
        match self.active_index() {
            0 => None,
            i => Some(BatchHandle(i)),
        }
    }

    /// Flush one batch by handle.
    pub fn draw_render_batch(&mut self, gl: &glow::Context, handle: BatchHandle) {
        if handle.0 != 0 && !matches!(self.batches.get(handle.0 - 1), Some(Some(_))) {
            warn!("unknown render batch: {:?}", handle);
            return;
        }
        self.flush_slot(gl, handle.0);
    }

    /// Flush the active batch; the frame-end call.
    pub fn draw_current_batch(&mut self, gl: &glow::Context) {
        self.flush_slot(gl, self.active_index());
    }

    fn flush_active(&mut self, gl: &glow::Context) {
        self.flush_slot(gl, self.active_index());
    }

    // ---- primitive lifecycle --------------------------------------------

    /// Start (or continue) emission in `mode`. Changing mode closes the
    /// pending span; the batch is drained first when the span padding or
    /// a full draw table demands it.
    pub fn begin(&mut self, gl: &glow::Context, mode: DrawMode) {
        if !self.active_mut().try_begin(mode) {
            self.flush_active(gl);
            self.active_mut().try_begin(mode);
        }
    }

    /// Close one primitive: restores attribute lockstep, steps the depth
    /// bias, and drains the batch when fewer than four vertex slots
    /// remain. A drain here unwinds every pending matrix push first, so
    /// open push/pop pairs must not span primitives this close to the
    /// capacity limit.
    pub fn end(&mut self, gl: &glow::Context) {
        let b = self.active_mut();
        b.end_primitive();
        if b.needs_forced_flush() {
            self.stack.unwind();
            self.flush_active(gl);
        }
    }

    /// Stage one vertex, transformed by the accumulated transform when
    /// one is active. At a whole-primitive boundary a nearly full buffer
    /// is drained and emission continues seamlessly; mid-primitive the
    /// vertex is dropped with a log line instead.
    pub fn vertex3f(&mut self, gl: &glow::Context, x: f32, y: f32, z: f32) {
        let (x, y, z) = if self.stack.use_transform() {
            self.stack.transform().transform_point(x, y, z)
        } else {
            (x, y, z)
        };
        let b = self.active_mut();
        if b.needs_forced_flush() && b.at_primitive_boundary() {
            let p = *b.pending();
            self.flush_active(gl);
            let d = self.active_mut().pending_mut();
            d.mode = p.mode;
            d.texture = p.texture;
        }
        self.active_mut().stage_vertex(x, y, z);
    }

    /// `vertex3f` at the current depth, which steps per `end()` so
    /// unsorted 2D draws keep a stable paint order.
    pub fn vertex2f(&mut self, gl: &glow::Context, x: f32, y: f32) {
        let z = self.active_ref().current_depth();
        self.vertex3f(gl, x, y, z);
    }

    pub fn texcoord2f(&mut self, u: f32, v: f32) {
        self.active_mut().stage_texcoord(u, v);
    }

    pub fn color4ub(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.active_mut().stage_color(r, g, b, a);
    }

    pub fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.color4ub(color_byte(r), color_byte(g), color_byte(b), color_byte(a));
    }

    pub fn color3f(&mut self, r: f32, g: f32, b: f32) {
        self.color4f(r, g, b, 1.0);
    }

    /// Latched but not consumed by the batching pipeline.
    pub fn normal3f(&mut self, x: f32, y: f32, z: f32) {
        self.current_normal = (x, y, z);
    }

    // ---- matrix control --------------------------------------------------

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.stack.set_mode(mode);
    }

    pub fn push_matrix(&mut self) {
        self.stack.push();
    }

    pub fn pop_matrix(&mut self) {
        self.stack.pop();
    }

    pub fn load_identity(&mut self) {
        self.stack.load_identity();
    }

    pub fn translatef(&mut self, x: f32, y: f32, z: f32) {
        self.stack.translate(x, y, z);
    }

    /// Angle in degrees around the given axis.
    pub fn rotatef(&mut self, angle: f32, x: f32, y: f32, z: f32) {
        self.stack.rotate(angle, (x, y, z));
    }

    pub fn scalef(&mut self, x: f32, y: f32, z: f32) {
        self.stack.scale(x, y, z);
    }

    pub fn mult_matrix(&mut self, m: &[f32; 16]) {
        self.stack.mult_matrix(&Matrix::from_array(m));
    }

    pub fn frustum(&mut self, left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) {
        self.stack.frustum(left, right, bottom, top, znear, zfar);
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) {
        self.stack.ortho(left, right, bottom, top, znear, zfar);
    }

    pub fn matrix_modelview(&self) -> Matrix {
        *self.stack.modelview()
    }

    pub fn matrix_projection(&self) -> Matrix {
        *self.stack.projection()
    }

    pub fn matrix_transform(&self) -> Matrix {
        *self.stack.transform()
    }

    /// Applies to everything in the batch at its next flush.
    pub fn set_matrix_modelview(&mut self, m: &Matrix) {
        self.stack.set_modelview(*m);
    }

    pub fn set_matrix_projection(&mut self, m: &Matrix) {
        self.stack.set_projection(*m);
    }

    // ---- texture / shader / framebuffer ----------------------------------

    /// Select the texture for subsequent emission; `None` (or the default
    /// texture itself) selects the white placeholder. Splitting the span
    /// may drain the batch when the draw table or padding requires it.
    pub fn set_texture(&mut self, gl: &glow::Context, texture: Option<glow::Texture>) {
        let tex = match texture {
            Some(t) if t == self.default_texture.texture => None,
            other => other,
        };
        let prev = *self.active_ref().pending();
        if !self.active_mut().try_set_texture(tex) {
            self.flush_active(gl);
            let b = self.active_mut();
            b.try_set_texture(tex);
            // keep the interrupted primitive mode across the drain
            b.pending_mut().mode = prev.mode;
        }
    }

    /// Swap the program used at flush time (`None` = default shader).
    /// Drains pending geometry first when the program actually changes.
    pub fn set_shader(&mut self, gl: &glow::Context, shader: Option<&GlShader>) {
        let (program, mvp_loc) = match shader {
            Some(s) => (Some(s.program), s.mvp_loc.clone()),
            None => (None, None),
        };
        if self.state.program != program {
            self.flush_active(gl);
            self.state.program = program;
            self.state.program_mvp_loc = mvp_loc;
        }
    }

    /// Register `texture` into an auxiliary unit and point the sampler
    /// uniform at it. The owning program must currently be bound; the
    /// actual binding happens at flush.
    pub fn set_uniform_sampler(
        &mut self,
        gl: &glow::Context,
        loc: Option<&glow::UniformLocation>,
        texture: glow::Texture,
    ) {
        match self.state.register_aux_texture(texture) {
            Some(unit) => unsafe {
                gl.uniform_1_i32(loc, unit as i32);
            },
            None => warn!("auxiliary texture slots exhausted, texture not registered"),
        }
    }

    /// Retarget rendering into `framebuffer`. Pending geometry is NOT
    /// drained; call `draw_current_batch` first when switching targets
    /// mid-frame.
    pub fn enable_framebuffer(&mut self, gl: &glow::Context, framebuffer: glow::Framebuffer) {
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
        }
        self.state.framebuffer = Some(framebuffer);
    }

    /// Back to the window framebuffer; same no-drain contract as
    /// `enable_framebuffer`.
    pub fn disable_framebuffer(&mut self, gl: &glow::Context) {
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        self.state.framebuffer = None;
    }

    pub fn current_framebuffer(&self) -> Option<glow::Framebuffer> {
        self.state.framebuffer
    }

    // ---- blend & toggles -------------------------------------------------

    /// Change the blend mode. Drains pending geometry first so the new
    /// mode only affects draws issued afterwards; re-selecting a custom
    /// mode after `set_blend_factors*` re-applies the factors the same
    /// way.
    pub fn set_blend_mode(&mut self, gl: &glow::Context, mode: BlendMode) {
        if self.state.blend_change_needs_flush(mode) {
            self.flush_active(gl);
            match self.state.blend_setup(mode) {
                BlendSetup::Combined { src, dst, equation } => unsafe {
                    gl.blend_func(src, dst);
                    gl.blend_equation(equation);
                },
                BlendSetup::Separate(f) => unsafe {
                    gl.blend_func_separate(f.src_rgb, f.dst_rgb, f.src_alpha, f.dst_alpha);
                    gl.blend_equation_separate(f.eq_rgb, f.eq_alpha);
                },
            }
            self.state.commit_blend_mode(mode);
        }
    }

    /// Raw factors for [`BlendMode::Custom`]; applied when that mode is
    /// next selected.
    pub fn set_blend_factors(&mut self, src: u32, dst: u32, equation: u32) {
        self.state.set_blend_factors(src, dst, equation);
    }

    pub fn set_blend_factors_separate(&mut self, factors: BlendFactorsSeparate) {
        self.state.set_blend_factors_separate(factors);
    }

    pub fn enable_depth_test(&mut self, gl: &glow::Context) {
        unsafe {
            gl.enable(glow::DEPTH_TEST);
        }
        self.state.flags.insert(StateFlags::DEPTH_TEST);
    }

    pub fn disable_depth_test(&mut self, gl: &glow::Context) {
        unsafe {
            gl.disable(glow::DEPTH_TEST);
        }
        self.state.flags.remove(StateFlags::DEPTH_TEST);
    }

    pub fn enable_backface_culling(&mut self, gl: &glow::Context) {
        unsafe {
            gl.enable(glow::CULL_FACE);
        }
        self.state.flags.insert(StateFlags::BACKFACE_CULLING);
    }

    pub fn disable_backface_culling(&mut self, gl: &glow::Context) {
        unsafe {
            gl.disable(glow::CULL_FACE);
        }
        self.state.flags.remove(StateFlags::BACKFACE_CULLING);
    }

    pub fn enable_scissor_test(&mut self, gl: &glow::Context) {
        unsafe {
            gl.enable(glow::SCISSOR_TEST);
        }
        self.state.flags.insert(StateFlags::SCISSOR_TEST);
    }

    pub fn disable_scissor_test(&mut self, gl: &glow::Context) {
        unsafe {
            gl.disable(glow::SCISSOR_TEST);
        }
        self.state.flags.remove(StateFlags::SCISSOR_TEST);
    }

    pub fn scissor(&mut self, gl: &glow::Context, x: i32, y: i32, width: i32, height: i32) {
        unsafe {
            gl.scissor(x, y, width, height);
        }
    }

    pub fn enable_color_blend(&mut self, gl: &glow::Context) {
        unsafe {
            gl.enable(glow::BLEND);
        }
        self.state.flags.insert(StateFlags::COLOR_BLEND);
    }

    pub fn disable_color_blend(&mut self, gl: &glow::Context) {
        unsafe {
            gl.disable(glow::BLEND);
        }
        self.state.flags.remove(StateFlags::COLOR_BLEND);
    }

    pub fn state_flags(&self) -> StateFlags {
        self.state.flags
    }

    // ---- stereo ----------------------------------------------------------

    pub fn enable_stereo_render(&mut self) {
        self.state.flags.insert(StateFlags::STEREO_RENDER);
    }

    pub fn disable_stereo_render(&mut self) {
        self.state.flags.remove(StateFlags::STEREO_RENDER);
    }

    pub fn is_stereo_render_enabled(&self) -> bool {
        self.state.stereo()
    }

    /// Eye 0 renders into the left viewport half, eye 1 into the right.
    pub fn set_matrix_projection_stereo(&mut self, left: &Matrix, right: &Matrix) {
        self.state.projection_stereo = [*left, *right];
    }

    pub fn set_matrix_view_offset_stereo(&mut self, left: &Matrix, right: &Matrix) {
        self.state.view_offset_stereo = [*left, *right];
    }

    // ---- screen utilities ------------------------------------------------

    pub fn viewport(&mut self, gl: &glow::Context, x: i32, y: i32, width: i32, height: i32) {
        unsafe {
            gl.viewport(x, y, width, height);
        }
    }

    /// Size used for the stereo viewport halves and the post-stereo
    /// restore.
    pub fn set_framebuffer_size(&mut self, width: i32, height: i32) {
        self.state.framebuffer_width = width;
        self.state.framebuffer_height = height;
    }

    pub fn clear_color(&mut self, gl: &glow::Context, r: u8, g: u8, b: u8, a: u8) {
        unsafe {
            gl.clear_color(
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
                a as f32 / 255.0,
            );
        }
    }

    pub fn clear_screen_buffers(&self, gl: &glow::Context) {
        unsafe {
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    /// Read the current framebuffer as RGBA bytes in image row order
    /// (top row first) with opaque alpha.
    pub fn read_screen_pixels(&self, gl: &glow::Context, width: i32, height: i32) -> Vec<u8> {
        let w = width.max(0) as usize;
        let h = height.max(0) as usize;
        let mut raw = vec![0u8; w * h * 4];
        unsafe {
            gl.read_pixels(
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut raw),
            );
        }
        let mut out = vec![0u8; w * h * 4];
        for row in 0..h {
            let src = (h - 1 - row) * w * 4;
            let dst = row * w * 4;
            out[dst..dst + w * 4].copy_from_slice(&raw[src..src + w * 4]);
        }
        for px in out.chunks_exact_mut(4) {
            px[3] = 255;
        }
        out
    }

    // ---- the flush -------------------------------------------------------

    /// Draw everything staged in `slot` and reset it: upload the used
    /// attribute prefix, bind program and mvp, bind auxiliary textures,
    /// then one GPU draw per span. In stereo the viewport/matrix section
    /// runs once per eye. Afterwards counters and the draw table are
    /// fresh, the depth restarts and the next staging buffer rotates in.
    fn flush_slot(&mut self, gl: &glow::Context, slot: usize) {
        let batch = if slot == 0 {
            &mut self.default_batch
        } else {
            match self.batches.get_mut(slot - 1) {
                Some(Some(b)) => b,
                _ => {
                    warn!("flush of unknown batch slot {}", slot);
                    return;
                }
            }
        };
        if !batch.has_pending() {
            return;
        }
        batch.finalize_pending_span();

        let vb = batch.buffer();
        let gpu = match vb.gpu.as_ref() {
            Some(g) => g,
            None => {
                warn!("batch has no GPU buffers, dropping staged geometry");
                batch.reset_after_flush();
                return;
            }
        };
        gpu.upload_prefix(
            gl,
            vb.positions_prefix(),
            vb.texcoords_prefix(),
            vb.colors_prefix(),
        );

        let modelview = *self.stack.modelview();
        let projection = *self.stack.projection();

        let (program, mvp_loc) = match self.state.program {
            Some(p) => (p, self.state.program_mvp_loc.clone()),
            None => (
                self.default_shader.program,
                self.default_shader.mvp_loc.clone(),
            ),
        };
        unsafe {
            gl.use_program(Some(program));
        }
        if self.state.program.is_none() {
            // default shader: unit 0 sampler and a neutral tint
            unsafe {
                gl.uniform_1_i32(self.default_shader.texture0_loc.as_ref(), 0);
                gl.uniform_4_f32_slice(
                    self.default_shader.col_diffuse_loc.as_ref(),
                    &[1.0, 1.0, 1.0, 1.0],
                );
            }
        }

        for (i, tex) in self.state.aux_textures().iter().enumerate() {
            if let Some(t) = tex {
                unsafe {
                    gl.active_texture(glow::TEXTURE1 + i as u32);
                    gl.bind_texture(glow::TEXTURE_2D, Some(*t));
                }
            }
        }
        unsafe {
            gl.active_texture(glow::TEXTURE0);
        }

        gpu.bind_for_draw(gl);

        let stereo = self.state.stereo();
        let eyes = if stereo { 2 } else { 1 };
        let fb_w = self.state.framebuffer_width;
        let fb_h = self.state.framebuffer_height;

        for eye in 0..eyes {
            let mut mvp;
            if stereo {
                unsafe {
                    gl.viewport(eye as i32 * fb_w / 2, 0, fb_w / 2, fb_h);
                }
                let mut eye_modelview = self.state.view_offset_stereo[eye];
                eye_modelview.multiply(&modelview);
                mvp = self.state.projection_stereo[eye];
                mvp.multiply(&eye_modelview);
            } else {
                mvp = projection;
                mvp.multiply(&modelview);
            }
            unsafe {
                gl.uniform_matrix_4_f32_slice(mvp_loc.as_ref(), false, &mvp.to_array());
            }

            for span in batch.spans() {
                if span.vertex_count == 0 {
                    continue;
                }
                let tex = span.texture.unwrap_or(self.default_texture.texture);
                unsafe {
                    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
                }
                match span.mode {
                    DrawMode::Lines | DrawMode::Triangles => unsafe {
                        gl.draw_arrays(
                            if span.mode == DrawMode::Lines {
                                glow::LINES
                            } else {
                                glow::TRIANGLES
                            },
                            span.first_vertex as i32,
                            span.vertex_count as i32,
                        );
                    },
                    DrawMode::Quads => unsafe {
                        let index_count = span.vertex_count / 4 * 6;
                        let byte_offset = span.first_vertex / 4 * 6 * std::mem::size_of::<u32>();
                        gl.draw_elements(
                            glow::TRIANGLES,
                            index_count as i32,
                            glow::UNSIGNED_INT,
                            byte_offset as i32,
                        );
                    },
                }
            }
        }
        if stereo {
            unsafe {
                gl.viewport(0, 0, fb_w, fb_h);
            }
        }

        gpu.unbind(gl);
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        for (i, tex) in self.state.aux_textures().iter().enumerate() {
            if tex.is_some() {
                unsafe {
                    gl.active_texture(glow::TEXTURE1 + i as u32);
                    gl.bind_texture(glow::TEXTURE_2D, None);
                }
            }
        }
        unsafe {
            gl.active_texture(glow::TEXTURE0);
            gl.use_program(None);
        }
        self.state.clear_aux_textures();

        batch.reset_after_flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_byte_saturates() {
        assert_eq!(color_byte(0.0), 0);
        assert_eq!(color_byte(1.0), 255);
        assert_eq!(color_byte(1.5), 255);
        assert_eq!(color_byte(-0.5), 0);
        assert_eq!(color_byte(0.5), 127);
    }
}
