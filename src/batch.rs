// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! CPU-side render batch: staging vertex buffers, the draw-call tracker
//! and the span bookkeeping that turns an immediate-mode call stream into
//! a minimal list of GPU draws.
//!
//! Layout:
//!
//! ```text
//!   RenderBatch
//!     ├── VertexBuffer x buffers_count   (multi-buffering, round-robin)
//!     │     positions[3N] texcoords[2N] colors[4N] + GPU objects
//!     └── DrawCall table (fixed capacity, explicit counter)
//!           each: { mode, vertex_count, vertex_alignment, texture }
//! ```
//!
//! All logic here is GL-free. Methods that may require draining the batch
//! (`try_begin`, `try_set_texture`) report that instead of flushing, and
//! the caller re-invokes them after the flush; `GlimContext` owns that
//! loop and the actual driver calls.

use crate::DEFAULT_DEPTH_INCREMENT;
use log::warn;

/// Primitive modes accepted by `begin`. Quads are drawn through the
/// shared two-triangle index pattern, the other modes with plain arrays.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DrawMode {
    Lines,
    Triangles,
    Quads,
}

impl DrawMode {
    /// Vertices forming one whole primitive of this mode.
    pub fn primitive_unit(self) -> usize {
        match self {
            DrawMode::Lines => 2,
            DrawMode::Triangles => 3,
            DrawMode::Quads => 4,
        }
    }
}

/// One contiguous run of staged vertices sharing mode and texture,
/// issuable as a single GPU draw. `texture == None` means the default
/// white placeholder, resolved at flush time.
#[derive(Clone, Copy, Debug)]
pub struct DrawCall {
    pub mode: DrawMode,
    pub vertex_count: usize,
    pub vertex_alignment: usize,
    pub texture: Option<glow::Texture>,
}

impl DrawCall {
    fn reset(&mut self) {
        self.mode = DrawMode::Quads;
        self.vertex_count = 0;
        self.vertex_alignment = 0;
        self.texture = None;
    }
}

/// A resolved span for the flush loop: `first_vertex` already includes
/// every previous span's alignment padding.
#[derive(Clone, Copy, Debug)]
pub struct Span {
    pub mode: DrawMode,
    pub texture: Option<glow::Texture>,
    pub first_vertex: usize,
    pub vertex_count: usize,
}

/// The quad index pattern shared by every buffer: two triangles per
/// four-vertex group.
pub fn quad_index_pattern(elements: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(elements * 6);
    for k in 0..elements as u32 {
        indices.push(4 * k);
        indices.push(4 * k + 1);
        indices.push(4 * k + 2);
        indices.push(4 * k);
        indices.push(4 * k + 2);
        indices.push(4 * k + 3);
    }
    indices
}

/// One CPU staging buffer plus its GPU objects. Attribute arrays are
/// allocated once and written through explicit counters; nothing grows
/// at emission time.
pub struct VertexBuffer {
    pub positions: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub colors: Vec<u8>,
    pub v_count: usize,
    pub tc_count: usize,
    pub c_count: usize,
    pub gpu: Option<crate::gl::buffer::BatchBuffers>,
}

impl VertexBuffer {
    pub fn new(elements: usize) -> Self {
        let n = elements * 4;
        Self {
            positions: vec![0.0; n * 3],
            texcoords: vec![0.0; n * 2],
            colors: vec![0; n * 4],
            v_count: 0,
            tc_count: 0,
            c_count: 0,
            gpu: None,
        }
    }

    pub fn vertex_capacity(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn positions_prefix(&self) -> &[f32] {
        &self.positions[..self.v_count * 3]
    }

    pub fn texcoords_prefix(&self) -> &[f32] {
        &self.texcoords[..self.v_count * 2]
    }

    pub fn colors_prefix(&self) -> &[u8] {
        &self.colors[..self.v_count * 4]
    }

    fn last_color(&self) -> [u8; 4] {
        if self.c_count == 0 {
            [255, 255, 255, 255]
        } else {
            let i = (self.c_count - 1) * 4;
            [
                self.colors[i],
                self.colors[i + 1],
                self.colors[i + 2],
                self.colors[i + 3],
            ]
        }
    }

    fn push_position(&mut self, x: f32, y: f32, z: f32) {
        let i = self.v_count * 3;
        self.positions[i] = x;
        self.positions[i + 1] = y;
        self.positions[i + 2] = z;
        self.v_count += 1;
    }

    fn push_texcoord(&mut self, u: f32, v: f32) {
        let i = self.tc_count * 2;
        self.texcoords[i] = u;
        self.texcoords[i + 1] = v;
        self.tc_count += 1;
    }

    fn push_color(&mut self, c: [u8; 4]) {
        let i = self.c_count * 4;
        self.colors[i..i + 4].copy_from_slice(&c);
        self.c_count += 1;
    }

    /// Append `n` degenerate vertices: the last position repeated, zero
    /// texcoords, the last color repeated. Padding slots are skipped by
    /// every draw, they only keep the quad index pattern aligned.
    fn pad(&mut self, n: usize) {
        let pos = if self.v_count == 0 {
            [0.0, 0.0, 0.0]
        } else {
            let i = (self.v_count - 1) * 3;
            [
                self.positions[i],
                self.positions[i + 1],
                self.positions[i + 2],
            ]
        };
        let col = self.last_color();
        for _ in 0..n {
            self.push_position(pos[0], pos[1], pos[2]);
            self.push_texcoord(0.0, 0.0);
            self.push_color(col);
        }
    }

    /// Bring color and texcoord counts level with the position count:
    /// colors repeat the last emitted value (opaque white when none was
    /// ever emitted), texcoords fill with zero.
    fn backfill(&mut self) {
        let col = self.last_color();
        while self.c_count < self.v_count {
            self.push_color(col);
        }
        while self.tc_count < self.v_count {
            self.push_texcoord(0.0, 0.0);
        }
    }

    fn reset(&mut self) {
        self.v_count = 0;
        self.tc_count = 0;
        self.c_count = 0;
    }
}

/// The flushable unit: staging buffers rotated across flush cycles plus
/// the ordered draw-call table.
pub struct RenderBatch {
    buffers: Vec<VertexBuffer>,
    current_buffer: usize,
    draws: Vec<DrawCall>,
    draw_count: usize,
    current_depth: f32,
    elements: usize,
}

impl RenderBatch {
    /// CPU side only; `load_render_batch` attaches the GPU objects.
    pub fn new(buffers_count: usize, elements: usize, draw_capacity: usize) -> Self {
        let buffers_count = buffers_count.max(1);
        let mut buffers = Vec::with_capacity(buffers_count);
        for _ in 0..buffers_count {
            buffers.push(VertexBuffer::new(elements));
        }
        let draws = vec![
            DrawCall {
                mode: DrawMode::Quads,
                vertex_count: 0,
                vertex_alignment: 0,
                texture: None,
            };
            draw_capacity
        ];
        Self {
            buffers,
            current_buffer: 0,
            draws,
            draw_count: 1,
            current_depth: -1.0,
            elements,
        }
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn vertex_capacity(&self) -> usize {
        self.elements * 4
    }

    pub fn buffers_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn current_buffer_index(&self) -> usize {
        self.current_buffer
    }

    pub fn buffer(&self) -> &VertexBuffer {
        &self.buffers[self.current_buffer]
    }

    pub fn buffer_mut(&mut self) -> &mut VertexBuffer {
        &mut self.buffers[self.current_buffer]
    }

    pub fn buffers_mut(&mut self) -> &mut [VertexBuffer] {
        &mut self.buffers
    }

    pub fn vertex_count(&self) -> usize {
        self.buffer().v_count
    }

    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draws[..self.draw_count]
    }

    pub fn current_depth(&self) -> f32 {
        self.current_depth
    }

    pub fn has_pending(&self) -> bool {
        self.buffer().v_count > 0
    }

    pub fn pending(&self) -> &DrawCall {
        &self.draws[self.draw_count - 1]
    }

    pub fn pending_mut(&mut self) -> &mut DrawCall {
        &mut self.draws[self.draw_count - 1]
    }

    fn free_vertices(&self) -> usize {
        self.vertex_capacity() - self.buffer().v_count
    }

    /// `extra` more vertices still fit the current buffer.
    pub fn fits(&self, extra: usize) -> bool {
        self.buffer().v_count + extra <= self.vertex_capacity()
    }

    pub fn is_full(&self) -> bool {
        self.free_vertices() == 0
    }

    fn table_full(&self) -> bool {
        self.draw_count >= self.draws.len()
    }

    /// Fewer than a whole quad's worth of slots left; the capacity check
    /// `end` runs to force a mid-frame flush.
    pub fn needs_forced_flush(&self) -> bool {
        self.free_vertices() < 4
    }

    /// True when the pending span sits between whole primitives, the
    /// only place a long run may be split across a flush.
    pub fn at_primitive_boundary(&self) -> bool {
        let d = self.pending();
        d.vertex_count % d.mode.primitive_unit() == 0
    }

    /// Padding needed to close the pending span on a multiple of 4, so
    /// the quad index pattern stays valid for later QUADS spans.
    pub fn close_span_alignment(&self) -> usize {
        let d = self.pending();
        match d.mode {
            DrawMode::Lines => d.vertex_count % 4,
            DrawMode::Triangles => {
                if d.vertex_count % 4 == 0 {
                    0
                } else {
                    4 - d.vertex_count % 4
                }
            }
            DrawMode::Quads => 0,
        }
    }

    fn advance_padding(&mut self, n: usize) {
        self.pending_mut().vertex_alignment = n;
        self.buffer_mut().pad(n);
    }

    fn open_span(&mut self, mode: DrawMode, texture: Option<glow::Texture>) {
        let d = &mut self.draws[self.draw_count];
        d.mode = mode;
        d.vertex_count = 0;
        d.vertex_alignment = 0;
        d.texture = texture;
        self.draw_count += 1;
    }

    /// Switch the pending span's primitive mode. Returns false when the
    /// batch must be flushed first; call again afterwards. The record a
    /// new mode opens keeps the pending texture.
    pub fn try_begin(&mut self, mode: DrawMode) -> bool {
        let p = *self.pending();
        if p.mode == mode {
            return true;
        }
        if p.vertex_count > 0 {
            let align = self.close_span_alignment();
            if !self.fits(align) || self.table_full() {
                return false;
            }
            self.advance_padding(align);
            self.open_span(mode, p.texture);
        }
        let d = self.pending_mut();
        d.mode = mode;
        d.vertex_count = 0;
        d.vertex_alignment = 0;
        true
    }

    /// Switch the pending span's texture (`None` = default placeholder).
    /// Returns false when the batch must be flushed first; the caller
    /// restores the interrupted mode after the retry.
    pub fn try_set_texture(&mut self, texture: Option<glow::Texture>) -> bool {
        let p = *self.pending();
        if p.texture == texture {
            return true;
        }
        if p.vertex_count > 0 {
            let align = self.close_span_alignment();
            if !self.fits(align) || self.table_full() {
                return false;
            }
            self.advance_padding(align);
            self.open_span(p.mode, texture);
        }
        let d = self.pending_mut();
        d.mode = p.mode;
        d.texture = texture;
        d.vertex_count = 0;
        d.vertex_alignment = 0;
        true
    }

    /// Stage one transformed position. Ignored (with a log line) when
    /// the buffer is completely full; primitives cannot be broken at an
    /// arbitrary vertex.
    pub fn stage_vertex(&mut self, x: f32, y: f32, z: f32) {
        if self.is_full() {
            warn!(
                "vertex buffer overflow, vertex dropped ({} staged)",
                self.buffer().v_count
            );
            return;
        }
        self.buffer_mut().push_position(x, y, z);
        self.pending_mut().vertex_count += 1;
    }

    pub fn stage_texcoord(&mut self, u: f32, v: f32) {
        if self.buffer().tc_count >= self.vertex_capacity() {
            warn!("texcoord overflow, value dropped");
            return;
        }
        self.buffer_mut().push_texcoord(u, v);
    }

    pub fn stage_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        if self.buffer().c_count >= self.vertex_capacity() {
            warn!("color overflow, value dropped");
            return;
        }
        self.buffer_mut().push_color([r, g, b, a]);
    }

    /// Close one primitive: restore attribute lockstep and step the
    /// depth used for 2D paint ordering.
    pub fn end_primitive(&mut self) {
        self.buffer_mut().backfill();
        self.current_depth += DEFAULT_DEPTH_INCREMENT;
    }

    /// Pad the pending span before upload so the staged vertex count
    /// equals the span sum exactly. Padding is capped by the remaining
    /// slots; the table resets right after the flush either way.
    pub fn finalize_pending_span(&mut self) {
        if self.pending().vertex_count == 0 {
            return;
        }
        let align = self.close_span_alignment().min(self.free_vertices());
        if align > 0 {
            self.advance_padding(align);
        }
    }

    /// Spans in submission order with resolved vertex offsets.
    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        let mut offset = 0usize;
        self.draws[..self.draw_count].iter().map(move |d| {
            let s = Span {
                mode: d.mode,
                texture: d.texture,
                first_vertex: offset,
                vertex_count: d.vertex_count,
            };
            offset += d.vertex_count + d.vertex_alignment;
            s
        })
    }

    /// Post-flush reset: counters to zero, one default record, depth
    /// restarted, and the next staging buffer becomes current.
    pub fn reset_after_flush(&mut self) {
        self.buffer_mut().reset();
        for d in self.draws.iter_mut() {
            d.reset();
        }
        self.draw_count = 1;
        self.current_depth = -1.0;
        self.current_buffer = (self.current_buffer + 1) % self.buffers.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn tex(n: u32) -> Option<glow::Texture> {
        Some(glow::NativeTexture(NonZeroU32::new(n).unwrap()))
    }

    fn batch(buffers: usize, elements: usize, draws: usize) -> RenderBatch {
        RenderBatch::new(buffers, elements, draws)
    }

    fn stage_quad(b: &mut RenderBatch) {
        assert!(b.try_begin(DrawMode::Quads));
        for i in 0..4 {
            b.stage_vertex(i as f32, 0.0, 0.0);
        }
        b.end_primitive();
    }

    #[test]
    fn test_quad_index_pattern() {
        let idx = quad_index_pattern(2);
        assert_eq!(idx, vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_lockstep_after_end() {
        let mut b = batch(1, 64, 8);
        assert!(b.try_begin(DrawMode::Quads));
        b.stage_color(255, 0, 0, 255);
        for i in 0..4 {
            b.stage_vertex(i as f32, 1.0, 0.0);
        }
        b.stage_texcoord(0.5, 0.5);
        b.end_primitive();

        let buf = b.buffer();
        assert_eq!(buf.v_count, 4);
        assert_eq!(buf.c_count, 4);
        assert_eq!(buf.tc_count, 4);
        // colors repeat the last emitted value
        assert_eq!(&buf.colors[12..16], &[255, 0, 0, 255]);
        // texcoords fill with zero
        assert_eq!(buf.texcoords[2], 0.0);
        assert_eq!(buf.texcoords[7], 0.0);
    }

    #[test]
    fn test_backfill_white_when_no_color_emitted() {
        let mut b = batch(1, 16, 8);
        assert!(b.try_begin(DrawMode::Triangles));
        for _ in 0..3 {
            b.stage_vertex(0.0, 0.0, 0.0);
        }
        b.end_primitive();
        assert_eq!(&b.buffer().colors[0..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_alignment_rules() {
        let cases = [
            (DrawMode::Lines, 2, 2),
            (DrawMode::Lines, 4, 0),
            (DrawMode::Lines, 6, 2),
            (DrawMode::Triangles, 3, 1),
            (DrawMode::Triangles, 6, 2),
            (DrawMode::Triangles, 8, 0),
            (DrawMode::Quads, 4, 0),
            (DrawMode::Quads, 12, 0),
        ];
        for (mode, count, expect) in cases {
            let mut b = batch(1, 64, 8);
            assert!(b.try_begin(mode));
            for _ in 0..count {
                b.stage_vertex(0.0, 0.0, 0.0);
            }
            assert_eq!(
                b.close_span_alignment(),
                expect,
                "mode {:?} count {}",
                mode,
                count
            );
        }
    }

    #[test]
    fn test_quad_then_triangle_spans() {
        let mut b = batch(1, 64, 8);
        assert!(b.try_set_texture(tex(1)));
        stage_quad(&mut b);
        assert!(b.try_begin(DrawMode::Triangles));
        for _ in 0..3 {
            b.stage_vertex(0.0, 0.0, 0.0);
        }
        b.end_primitive();
        b.finalize_pending_span();

        let calls = b.draw_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].mode, DrawMode::Quads);
        assert_eq!(calls[0].vertex_count, 4);
        assert_eq!(calls[0].vertex_alignment, 0);
        assert_eq!(calls[0].texture, tex(1));
        assert_eq!(calls[1].mode, DrawMode::Triangles);
        assert_eq!(calls[1].vertex_count, 3);
        assert_eq!(calls[1].vertex_alignment, 1);
        // the new span keeps the texture selection
        assert_eq!(calls[1].texture, tex(1));
        // staged = 4 + 3 + 1 padding
        assert_eq!(b.vertex_count(), 8);
    }

    #[test]
    fn test_span_sum_matches_staged_vertices() {
        let mut b = batch(1, 64, 8);
        assert!(b.try_set_texture(tex(1)));
        stage_quad(&mut b);
        assert!(b.try_begin(DrawMode::Lines));
        for _ in 0..2 {
            b.stage_vertex(0.0, 0.0, 0.0);
        }
        b.end_primitive();
        assert!(b.try_set_texture(tex(2)));
        assert!(b.try_begin(DrawMode::Quads));
        stage_quad(&mut b);
        b.finalize_pending_span();

        let sum: usize = b
            .draw_calls()
            .iter()
            .map(|d| d.vertex_count + d.vertex_alignment)
            .sum();
        assert_eq!(sum, b.vertex_count());
    }

    #[test]
    fn test_draw_calls_equal_maximal_runs() {
        let mut b = batch(1, 64, 16);
        // run 1: quads on t1 (two quads, one span)
        assert!(b.try_set_texture(tex(1)));
        stage_quad(&mut b);
        stage_quad(&mut b);
        // same texture again: no split
        assert!(b.try_set_texture(tex(1)));
        stage_quad(&mut b);
        // run 2: texture change
        assert!(b.try_set_texture(tex(2)));
        stage_quad(&mut b);
        // run 3: mode change
        assert!(b.try_begin(DrawMode::Triangles));
        for _ in 0..3 {
            b.stage_vertex(0.0, 0.0, 0.0);
        }
        b.end_primitive();

        assert_eq!(b.draw_count(), 3);
    }

    #[test]
    fn test_spans_offsets_include_alignment() {
        let mut b = batch(1, 64, 8);
        assert!(b.try_begin(DrawMode::Triangles));
        for _ in 0..3 {
            b.stage_vertex(0.0, 0.0, 0.0);
        }
        b.end_primitive();
        assert!(b.try_begin(DrawMode::Quads));
        stage_quad(&mut b);

        let spans: Vec<Span> = b.spans().collect();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].first_vertex, 0);
        assert_eq!(spans[0].vertex_count, 3);
        // quad span starts after 3 + 1 alignment, on a multiple of 4
        assert_eq!(spans[1].first_vertex, 4);
        assert_eq!(spans[1].first_vertex % 4, 0);
        // index offset for the quad span: 6 indices per quad group
        assert_eq!(spans[1].first_vertex / 4 * 6, 6);
    }

    #[test]
    fn test_forced_flush_threshold() {
        // capacity 8: the first quad leaves exactly 4 free (no flush),
        // the second fills the buffer (flush).
        let mut b = batch(2, 2, 8);
        stage_quad(&mut b);
        assert!(!b.needs_forced_flush());
        stage_quad(&mut b);
        assert!(b.needs_forced_flush());

        b.reset_after_flush();
        assert_eq!(b.vertex_count(), 0);
        assert_eq!(b.draw_count(), 1);
        assert_eq!(b.current_buffer_index(), 1);
        assert_eq!(b.current_depth(), -1.0);

        // the third quad lands in the fresh buffer with a fresh table
        stage_quad(&mut b);
        assert_eq!(b.vertex_count(), 4);
        assert_eq!(b.current_buffer_index(), 1);
        assert_eq!(b.draw_calls()[0].texture, None);
    }

    #[test]
    fn test_buffer_rotation_wraps() {
        let mut b = batch(3, 2, 8);
        assert_eq!(b.current_buffer_index(), 0);
        b.reset_after_flush();
        assert_eq!(b.current_buffer_index(), 1);
        b.reset_after_flush();
        assert_eq!(b.current_buffer_index(), 2);
        b.reset_after_flush();
        assert_eq!(b.current_buffer_index(), 0);
    }

    #[test]
    fn test_begin_requests_flush_when_padding_does_not_fit() {
        // capacity 4, three staged line vertices: closing needs 3 pads.
        let mut b = batch(1, 1, 8);
        assert!(b.try_begin(DrawMode::Lines));
        for _ in 0..3 {
            b.stage_vertex(0.0, 0.0, 0.0);
        }
        assert!(!b.try_begin(DrawMode::Triangles));
        // after the caller flushes, the retry succeeds
        b.reset_after_flush();
        assert!(b.try_begin(DrawMode::Triangles));
        assert_eq!(b.pending().mode, DrawMode::Triangles);
    }

    #[test]
    fn test_full_draw_table_requests_flush() {
        let mut b = batch(1, 64, 2);
        assert!(b.try_set_texture(tex(1)));
        stage_quad(&mut b);
        assert!(b.try_set_texture(tex(2))); // second record
        stage_quad(&mut b);
        // a third span does not fit the table
        assert!(!b.try_set_texture(tex(3)));
        b.reset_after_flush();
        assert!(b.try_set_texture(tex(3)));
    }

    #[test]
    fn test_stage_vertex_drops_when_full() {
        let mut b = batch(1, 1, 8);
        assert!(b.try_begin(DrawMode::Quads));
        for _ in 0..6 {
            b.stage_vertex(1.0, 2.0, 3.0);
        }
        assert_eq!(b.vertex_count(), 4);
        assert!(b.is_full());
    }

    #[test]
    fn test_empty_batch_has_nothing_pending() {
        let mut b = batch(1, 8, 8);
        assert!(!b.has_pending());
        // set_texture alone leaves nothing to draw
        assert!(b.try_set_texture(tex(9)));
        assert!(!b.has_pending());
        assert_eq!(b.vertex_count(), 0);
        b.finalize_pending_span();
        assert_eq!(b.vertex_count(), 0);
    }

    #[test]
    fn test_depth_steps_per_end() {
        let mut b = batch(1, 8, 8);
        let d0 = b.current_depth();
        stage_quad(&mut b);
        assert!(b.current_depth() > d0);
        let d1 = b.current_depth();
        stage_quad(&mut b);
        assert!((b.current_depth() - d1 - (d1 - d0)).abs() < 1e-7);
    }

    #[test]
    fn test_padding_repeats_last_vertex_and_color() {
        let mut b = batch(1, 4, 8);
        assert!(b.try_begin(DrawMode::Triangles));
        b.stage_color(10, 20, 30, 40);
        for i in 0..3 {
            b.stage_vertex(i as f32, 5.0, 0.0);
        }
        b.end_primitive();
        assert!(b.try_begin(DrawMode::Quads));

        let buf = b.buffer();
        assert_eq!(buf.v_count, 4);
        // padded position repeats the last staged vertex
        assert_eq!(&buf.positions[9..12], &[2.0, 5.0, 0.0]);
        // padded color repeats the last color
        assert_eq!(&buf.colors[12..16], &[10, 20, 30, 40]);
    }
}
