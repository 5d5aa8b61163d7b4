// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! Emulated matrix stack: a modelview/projection pair, a transform
//! accumulator that becomes the active matrix inside push/pop scopes,
//! and a bounded save stack.
//!
//! While at least one push is outstanding in ModelView mode, ops land in
//! the accumulator and every staged vertex is premultiplied by it. When
//! the stack empties the active pointer returns to the base modelview.

use crate::math::Matrix;
use crate::MAX_MATRIX_STACK_SIZE;
use log::warn;

pub const DEG2RAD: f32 = std::f32::consts::PI / 180.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MatrixMode {
    ModelView,
    Projection,
}

/// Which matrix the next operation writes to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ActiveTarget {
    ModelView,
    Projection,
    Transform,
}

pub struct MatrixStack {
    mode: MatrixMode,
    target: ActiveTarget,
    modelview: Matrix,
    projection: Matrix,
    transform: Matrix,
    use_transform: bool,
    stack: [Matrix; MAX_MATRIX_STACK_SIZE],
    depth: usize,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            mode: MatrixMode::ModelView,
            target: ActiveTarget::ModelView,
            modelview: Matrix::new(),
            projection: Matrix::new(),
            transform: Matrix::new(),
            use_transform: false,
            stack: [Matrix::new(); MAX_MATRIX_STACK_SIZE],
            depth: 0,
        }
    }

    pub fn set_mode(&mut self, mode: MatrixMode) {
        self.target = match mode {
            MatrixMode::ModelView => ActiveTarget::ModelView,
            MatrixMode::Projection => ActiveTarget::Projection,
        };
        self.mode = mode;
    }

    pub fn mode(&self) -> MatrixMode {
        self.mode
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True while vertices must be premultiplied by the accumulator.
    pub fn use_transform(&self) -> bool {
        self.use_transform
    }

    pub fn transform(&self) -> &Matrix {
        &self.transform
    }

    pub fn modelview(&self) -> &Matrix {
        &self.modelview
    }

    pub fn projection(&self) -> &Matrix {
        &self.projection
    }

    pub fn set_modelview(&mut self, m: Matrix) {
        self.modelview = m;
    }

    pub fn set_projection(&mut self, m: Matrix) {
        self.projection = m;
    }

    fn current_mut(&mut self) -> &mut Matrix {
        match self.target {
            ActiveTarget::ModelView => &mut self.modelview,
            ActiveTarget::Projection => &mut self.projection,
            ActiveTarget::Transform => &mut self.transform,
        }
    }

    /// Save the active matrix. A push in ModelView mode retargets the
    /// active matrix to the transform accumulator first, so the scope's
    /// ops compose there instead of in the base modelview.
    pub fn push(&mut self) {
        if self.depth >= MAX_MATRIX_STACK_SIZE {
            warn!(
                "matrix stack overflow, push ignored (size {})",
                MAX_MATRIX_STACK_SIZE
            );
            return;
        }
        if self.mode == MatrixMode::ModelView {
            self.use_transform = true;
            self.target = ActiveTarget::Transform;
        }
        self.stack[self.depth] = *self.current_mut();
        self.depth += 1;
    }

    /// Restore the most recently pushed matrix. Popping an empty stack is
    /// a no-op apart from retargeting back to the base modelview.
    pub fn pop(&mut self) {
        if self.depth > 0 {
            let m = self.stack[self.depth - 1];
            *self.current_mut() = m;
            self.depth -= 1;
        }
        if self.depth == 0 && self.mode == MatrixMode::ModelView {
            self.target = ActiveTarget::ModelView;
            self.use_transform = false;
        }
    }

    /// Run every outstanding pop. Called before a forced flush so the
    /// flush observes a clean modelview; the unwound pushes are lost.
    pub fn unwind(&mut self) {
        while self.depth > 0 {
            self.pop();
        }
        if self.mode == MatrixMode::ModelView {
            self.target = ActiveTarget::ModelView;
            self.use_transform = false;
        }
    }

    pub fn load_identity(&mut self) {
        self.current_mut().identity();
    }

    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.current_mut().multiply(&Matrix::translation(x, y, z));
    }

    /// Angle in degrees, rotating around `axis`.
    pub fn rotate(&mut self, angle: f32, axis: (f32, f32, f32)) {
        self.current_mut()
            .multiply(&Matrix::rotation(axis, angle * DEG2RAD));
    }

    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.current_mut().multiply(&Matrix::scaling(x, y, z));
    }

    pub fn mult_matrix(&mut self, m: &Matrix) {
        self.current_mut().multiply(m);
    }

    /// Composes on the outside of the active matrix, unlike the ops above.
    pub fn frustum(&mut self, left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) {
        self.current_mut()
            .premultiply(&Matrix::frustum(left, right, bottom, top, znear, zfar));
    }

    pub fn ortho(&mut self, left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) {
        self.current_mut()
            .premultiply(&Matrix::ortho(left, right, bottom, top, znear, zfar));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &[f32; 16], b: &[f32; 16]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_balanced_push_pop_leaves_no_trace() {
        let mut s = MatrixStack::new();
        s.push();
        s.translate(5.0, 0.0, 0.0);
        s.pop();
        s.translate(5.0, 0.0, 0.0);

        let mut expect = MatrixStack::new();
        expect.translate(5.0, 0.0, 0.0);

        assert!(approx(
            &s.modelview().to_array(),
            &expect.modelview().to_array()
        ));
        assert!(approx(&s.transform().to_array(), &Matrix::new().to_array()));
        assert!(!s.use_transform());
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn test_scope_ops_hit_accumulator_not_modelview() {
        let mut s = MatrixStack::new();
        s.push();
        assert!(s.use_transform());
        s.translate(3.0, 4.0, 0.0);
        assert!(approx(
            &s.modelview().to_array(),
            &Matrix::new().to_array()
        ));
        assert!(approx(
            &s.transform().to_array(),
            &Matrix::translation(3.0, 4.0, 0.0).to_array()
        ));
    }

    #[test]
    fn test_nested_scopes_restore_in_order() {
        let mut s = MatrixStack::new();
        s.push();
        s.translate(1.0, 0.0, 0.0);
        s.push();
        s.translate(0.0, 1.0, 0.0);
        s.pop();
        assert!(approx(
            &s.transform().to_array(),
            &Matrix::translation(1.0, 0.0, 0.0).to_array()
        ));
        assert!(s.use_transform());
        s.pop();
        assert!(!s.use_transform());
    }

    #[test]
    fn test_overflow_is_logged_and_ignored() {
        let mut s = MatrixStack::new();
        for _ in 0..MAX_MATRIX_STACK_SIZE + 3 {
            s.push();
        }
        assert_eq!(s.depth(), MAX_MATRIX_STACK_SIZE);
        for _ in 0..MAX_MATRIX_STACK_SIZE {
            s.pop();
        }
        assert_eq!(s.depth(), 0);
        assert!(!s.use_transform());
    }

    #[test]
    fn test_pop_empty_is_noop() {
        let mut s = MatrixStack::new();
        s.pop();
        s.pop();
        assert_eq!(s.depth(), 0);
        assert!(!s.use_transform());
    }

    #[test]
    fn test_projection_mode_does_not_use_accumulator() {
        let mut s = MatrixStack::new();
        s.set_mode(MatrixMode::Projection);
        s.push();
        assert!(!s.use_transform());
        s.ortho(0.0, 800.0, 600.0, 0.0, -1.0, 1.0);
        s.pop();
        assert!(approx(
            &s.projection().to_array(),
            &Matrix::new().to_array()
        ));
        assert!(approx(
            &s.modelview().to_array(),
            &Matrix::new().to_array()
        ));
    }

    #[test]
    fn test_mode_switch_retargets_base_matrix() {
        // Switching modes inside a scope points ops back at the base
        // matrix even though the scope is still open.
        let mut s = MatrixStack::new();
        s.push();
        s.set_mode(MatrixMode::Projection);
        s.set_mode(MatrixMode::ModelView);
        s.translate(2.0, 0.0, 0.0);
        assert!(approx(
            &s.modelview().to_array(),
            &Matrix::translation(2.0, 0.0, 0.0).to_array()
        ));
        assert!(s.use_transform());
        s.unwind();
        assert!(!s.use_transform());
    }

    #[test]
    fn test_unwind_clears_all_scopes() {
        let mut s = MatrixStack::new();
        let base = s.modelview().to_array();
        s.push();
        s.translate(1.0, 2.0, 3.0);
        s.push();
        s.scale(2.0, 2.0, 1.0);
        s.unwind();
        assert_eq!(s.depth(), 0);
        assert!(!s.use_transform());
        assert!(approx(&s.modelview().to_array(), &base));
    }

    #[test]
    fn test_ortho_composes_outside() {
        // translate-then-ortho must equal ortho x translation.
        let mut s = MatrixStack::new();
        s.translate(10.0, 0.0, 0.0);
        s.ortho(0.0, 100.0, 100.0, 0.0, -1.0, 1.0);

        let mut expect = Matrix::ortho(0.0, 100.0, 100.0, 0.0, -1.0, 1.0);
        expect.multiply(&Matrix::translation(10.0, 0.0, 0.0));
        assert!(approx(&s.modelview().to_array(), &expect.to_array()));
    }
}
