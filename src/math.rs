// RustGlim
// copyright zipxing@hotmail.com 2022～2025

//! 4x4 matrix math for the emulated fixed-function pipeline.
//!
//! Matrices are column-major: field `mN` is flat index N in GL upload
//! order, so `m0..m3` is the first column. Points are column vectors,
//! `a.multiply(&b)` is the mathematical product a x b (b applies first).

#[derive(Clone, Copy)]
pub struct Matrix {
    pub m0: f32,
    pub m1: f32,
    pub m2: f32,
    pub m3: f32,
    pub m4: f32,
    pub m5: f32,
    pub m6: f32,
    pub m7: f32,
    pub m8: f32,
    pub m9: f32,
    pub m10: f32,
    pub m11: f32,
    pub m12: f32,
    pub m13: f32,
    pub m14: f32,
    pub m15: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new()
    }
}

impl Matrix {
    /// Identity matrix.
    pub fn new() -> Self {
        Self::from_array(&[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    pub fn from_array(a: &[f32; 16]) -> Self {
        Self {
            m0: a[0],
            m1: a[1],
            m2: a[2],
            m3: a[3],
            m4: a[4],
            m5: a[5],
            m6: a[6],
            m7: a[7],
            m8: a[8],
            m9: a[9],
            m10: a[10],
            m11: a[11],
            m12: a[12],
            m13: a[13],
            m14: a[14],
            m15: a[15],
        }
    }

    /// Flat column-major array, the order GL uniform upload expects.
    pub fn to_array(&self) -> [f32; 16] {
        [
            self.m0, self.m1, self.m2, self.m3, self.m4, self.m5, self.m6, self.m7, self.m8,
            self.m9, self.m10, self.m11, self.m12, self.m13, self.m14, self.m15,
        ]
    }

    pub fn identity(&mut self) {
        *self = Self::new();
    }

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::new();
        m.m12 = x;
        m.m13 = y;
        m.m14 = z;
        m
    }

    /// Rotation of `angle` radians around `axis` (normalized internally).
    pub fn rotation(axis: (f32, f32, f32), angle: f32) -> Self {
        let (mut x, mut y, mut z) = axis;
        let len_sq = x * x + y * y + z * z;
        if len_sq != 1.0 && len_sq != 0.0 {
            let ilen = 1.0 / len_sq.sqrt();
            x *= ilen;
            y *= ilen;
            z *= ilen;
        }
        let s = angle.sin();
        let c = angle.cos();
        let t = 1.0 - c;

        Self::from_array(&[
            x * x * t + c,
            y * x * t + z * s,
            z * x * t - y * s,
            0.0,
            x * y * t - z * s,
            y * y * t + c,
            z * y * t + x * s,
            0.0,
            x * z * t + y * s,
            y * z * t - x * s,
            z * z * t + c,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ])
    }

    pub fn scaling(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::new();
        m.m0 = x;
        m.m5 = y;
        m.m10 = z;
        m
    }

    pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) -> Self {
        let rl = (right - left) as f32;
        let tb = (top - bottom) as f32;
        let fn_ = (zfar - znear) as f32;

        let mut m = Self::from_array(&[0.0; 16]);
        m.m0 = (znear as f32) * 2.0 / rl;
        m.m5 = (znear as f32) * 2.0 / tb;
        m.m8 = (right + left) as f32 / rl;
        m.m9 = (top + bottom) as f32 / tb;
        m.m10 = -((zfar + znear) as f32) / fn_;
        m.m11 = -1.0;
        m.m14 = -((zfar * znear * 2.0) as f32) / fn_;
        m
    }

    pub fn ortho(left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) -> Self {
        let rl = (right - left) as f32;
        let tb = (top - bottom) as f32;
        let fn_ = (zfar - znear) as f32;

        let mut m = Self::from_array(&[0.0; 16]);
        m.m0 = 2.0 / rl;
        m.m5 = 2.0 / tb;
        m.m10 = -2.0 / fn_;
        m.m12 = -((left + right) as f32) / rl;
        m.m13 = -((top + bottom) as f32) / tb;
        m.m14 = -((zfar + znear) as f32) / fn_;
        m.m15 = 1.0;
        m
    }

    /// self = self x other. Later factors apply closer to the vertex.
    pub fn multiply(&mut self, other: &Matrix) {
        let a = *self;
        let b = *other;

        self.m0 = a.m0 * b.m0 + a.m4 * b.m1 + a.m8 * b.m2 + a.m12 * b.m3;
        self.m1 = a.m1 * b.m0 + a.m5 * b.m1 + a.m9 * b.m2 + a.m13 * b.m3;
        self.m2 = a.m2 * b.m0 + a.m6 * b.m1 + a.m10 * b.m2 + a.m14 * b.m3;
        self.m3 = a.m3 * b.m0 + a.m7 * b.m1 + a.m11 * b.m2 + a.m15 * b.m3;
        self.m4 = a.m0 * b.m4 + a.m4 * b.m5 + a.m8 * b.m6 + a.m12 * b.m7;
        self.m5 = a.m1 * b.m4 + a.m5 * b.m5 + a.m9 * b.m6 + a.m13 * b.m7;
        self.m6 = a.m2 * b.m4 + a.m6 * b.m5 + a.m10 * b.m6 + a.m14 * b.m7;
        self.m7 = a.m3 * b.m4 + a.m7 * b.m5 + a.m11 * b.m6 + a.m15 * b.m7;
        self.m8 = a.m0 * b.m8 + a.m4 * b.m9 + a.m8 * b.m10 + a.m12 * b.m11;
        self.m9 = a.m1 * b.m8 + a.m5 * b.m9 + a.m9 * b.m10 + a.m13 * b.m11;
        self.m10 = a.m2 * b.m8 + a.m6 * b.m9 + a.m10 * b.m10 + a.m14 * b.m11;
        self.m11 = a.m3 * b.m8 + a.m7 * b.m9 + a.m11 * b.m10 + a.m15 * b.m11;
        self.m12 = a.m0 * b.m12 + a.m4 * b.m13 + a.m8 * b.m14 + a.m12 * b.m15;
        self.m13 = a.m1 * b.m12 + a.m5 * b.m13 + a.m9 * b.m14 + a.m13 * b.m15;
        self.m14 = a.m2 * b.m12 + a.m6 * b.m13 + a.m10 * b.m14 + a.m14 * b.m15;
        self.m15 = a.m3 * b.m12 + a.m7 * b.m13 + a.m11 * b.m14 + a.m15 * b.m15;
    }

    /// self = other x self. Used where a factor composes on the outside,
    /// such as projection setup and stereo view offsets.
    pub fn premultiply(&mut self, other: &Matrix) {
        let mut m = *other;
        m.multiply(self);
        *self = m;
    }

    pub fn transpose(&mut self) {
        *self = Self::from_array(&[
            self.m0, self.m4, self.m8, self.m12, self.m1, self.m5, self.m9, self.m13, self.m2,
            self.m6, self.m10, self.m14, self.m3, self.m7, self.m11, self.m15,
        ]);
    }

    /// Transform a point (w = 1, no perspective divide).
    pub fn transform_point(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        (
            self.m0 * x + self.m4 * y + self.m8 * z + self.m12,
            self.m1 * x + self.m5 * y + self.m9 * z + self.m13,
            self.m2 * x + self.m6 * y + self.m10 * z + self.m14,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &[f32; 16], b: &[f32; 16]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_identity() {
        let m = Matrix::new();
        assert_eq!(m.to_array()[0], 1.0);
        assert_eq!(m.to_array()[5], 1.0);
        assert_eq!(m.to_array()[12], 0.0);
        assert_eq!(m.transform_point(3.0, -2.0, 7.0), (3.0, -2.0, 7.0));
    }

    #[test]
    fn test_multiply_identity_is_noop() {
        let mut m = Matrix::translation(1.0, 2.0, 3.0);
        let before = m.to_array();
        m.multiply(&Matrix::new());
        assert!(approx(&m.to_array(), &before));
        m.premultiply(&Matrix::new());
        assert!(approx(&m.to_array(), &before));
    }

    #[test]
    fn test_later_factor_applies_first() {
        // current = T(10,0,0) then scale by 2: point (1,0,0) is scaled
        // first, then translated -> 12, not (1+10)*2 = 22.
        let mut m = Matrix::translation(10.0, 0.0, 0.0);
        m.multiply(&Matrix::scaling(2.0, 2.0, 2.0));
        let (x, y, z) = m.transform_point(1.0, 0.0, 0.0);
        assert!((x - 12.0).abs() < 1e-5);
        assert!(y.abs() < 1e-5 && z.abs() < 1e-5);
    }

    #[test]
    fn test_premultiply_applies_last() {
        let mut m = Matrix::translation(10.0, 0.0, 0.0);
        m.premultiply(&Matrix::scaling(2.0, 2.0, 2.0));
        let (x, _, _) = m.transform_point(1.0, 0.0, 0.0);
        assert!((x - 22.0).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_quarter_turn_z() {
        let r = Matrix::rotation((0.0, 0.0, 1.0), std::f32::consts::FRAC_PI_2);
        let (x, y, _) = r.transform_point(1.0, 0.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_axis_is_normalized() {
        let a = Matrix::rotation((0.0, 0.0, 10.0), 1.0);
        let b = Matrix::rotation((0.0, 0.0, 1.0), 1.0);
        assert!(approx(&a.to_array(), &b.to_array()));
    }

    #[test]
    fn test_ortho_maps_corners_to_clip_space() {
        let o = Matrix::ortho(0.0, 800.0, 600.0, 0.0, -1.0, 1.0);
        let (x, y, _) = o.transform_point(0.0, 0.0, 0.0);
        assert!((x + 1.0).abs() < 1e-5 && (y - 1.0).abs() < 1e-5);
        let (x, y, _) = o.transform_point(800.0, 600.0, 0.0);
        assert!((x - 1.0).abs() < 1e-5 && (y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_frustum_w_column() {
        let f = Matrix::frustum(-1.0, 1.0, -1.0, 1.0, 0.1, 100.0);
        assert!((f.m11 + 1.0).abs() < 1e-6);
        assert_eq!(f.m15, 0.0);
    }

    #[test]
    fn test_transpose_round_trip() {
        let mut m = Matrix::frustum(-0.5, 1.0, -1.0, 0.25, 0.1, 10.0);
        let orig = m.to_array();
        m.transpose();
        m.transpose();
        assert!(approx(&m.to_array(), &orig));
    }
}
