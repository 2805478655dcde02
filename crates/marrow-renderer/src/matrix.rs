//! Matrix stacks and clip-plane registers.
//!
//! Column-major 4x4 matrices, one stack per matrix mode, plus the
//! clip-plane slots, current color, and fog color that the legacy
//! fixed-function pipeline kept in driver state. All of it lives in one
//! value owned by the rasterizer; temporary transforms go through
//! [`MatrixStack::scoped`], which cannot leave a stack unbalanced.

pub type Mat4 = [f32; 16];

#[rustfmt::skip]
pub const MAT4_IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Multiply two column-major matrices: `a * b`.
pub fn mat4_multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[k * 4 + row] * b[col * 4 + k];
            }
            out[col * 4 + row] = sum;
        }
    }
    out
}

/// General 4x4 inverse by cofactor expansion. Returns identity for a
/// singular matrix, which keeps a degenerate modelview from poisoning
/// the uniforms downstream.
pub fn mat4_inverse(m: &Mat4) -> Mat4 {
    let mut inv = [0.0f32; 16];

    inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
        + m[9] * m[7] * m[14] + m[13] * m[6] * m[11] - m[13] * m[7] * m[10];
    inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
        - m[8] * m[7] * m[14] - m[12] * m[6] * m[11] + m[12] * m[7] * m[10];
    inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
        + m[8] * m[7] * m[13] + m[12] * m[5] * m[11] - m[12] * m[7] * m[9];
    inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
        - m[8] * m[6] * m[13] - m[12] * m[5] * m[10] + m[12] * m[6] * m[9];
    inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
        - m[9] * m[3] * m[14] - m[13] * m[2] * m[11] + m[13] * m[3] * m[10];
    inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
        + m[8] * m[3] * m[14] + m[12] * m[2] * m[11] - m[12] * m[3] * m[10];
    inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
        - m[8] * m[3] * m[13] - m[12] * m[1] * m[11] + m[12] * m[3] * m[9];
    inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
        + m[8] * m[2] * m[13] + m[12] * m[1] * m[10] - m[12] * m[2] * m[9];
    inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
        + m[5] * m[3] * m[14] + m[13] * m[2] * m[7] - m[13] * m[3] * m[6];
    inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
        - m[4] * m[3] * m[14] - m[12] * m[2] * m[7] + m[12] * m[3] * m[6];
    inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
        + m[4] * m[3] * m[13] + m[12] * m[1] * m[7] - m[12] * m[3] * m[5];
    inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
        - m[4] * m[2] * m[13] - m[12] * m[1] * m[6] + m[12] * m[2] * m[5];
    inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
        - m[5] * m[3] * m[10] - m[9] * m[2] * m[7] + m[9] * m[3] * m[6];
    inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
        + m[4] * m[3] * m[10] + m[8] * m[2] * m[7] - m[8] * m[3] * m[6];
    inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
        - m[4] * m[3] * m[9] - m[8] * m[1] * m[7] + m[8] * m[3] * m[5];
    inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
        + m[4] * m[2] * m[9] + m[8] * m[1] * m[6] - m[8] * m[2] * m[5];

    let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
    if det.abs() < 1e-12 {
        return MAT4_IDENTITY;
    }
    let inv_det = 1.0 / det;
    for v in inv.iter_mut() {
        *v *= inv_det;
    }
    inv
}

pub fn mat4_translation(x: f32, y: f32, z: f32) -> Mat4 {
    let mut m = MAT4_IDENTITY;
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

/// Rotation about the z axis, in degrees.
pub fn mat4_rotation_z(degrees: f32) -> Mat4 {
    let r = degrees.to_radians();
    let (s, c) = r.sin_cos();
    let mut m = MAT4_IDENTITY;
    m[0] = c;
    m[1] = s;
    m[4] = -s;
    m[5] = c;
    m
}

pub fn mat4_scaling(x: f32, y: f32, z: f32) -> Mat4 {
    let mut m = MAT4_IDENTITY;
    m[0] = x;
    m[5] = y;
    m[10] = z;
    m
}

/// Transform a point, with perspective divide.
pub fn mat4_transform_point(m: &Mat4, p: [f32; 3]) -> [f32; 3] {
    let x = m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12];
    let y = m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13];
    let z = m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14];
    let w = m[3] * p[0] + m[7] * p[1] + m[11] * p[2] + m[15];
    if w.abs() > 1e-12 {
        [x / w, y / w, z / w]
    } else {
        [x, y, z]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMode {
    ModelView,
    Projection,
    Texture,
}

const MODE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipPlane {
    pub coefficients: [f32; 4],
    pub enabled: bool,
}

/// Clip-plane slot assignments. Slots 0 and 1 carry the window clip,
/// slot 5 the media boundary.
pub const CLIP_PLANE_LEFT: usize = 0;
pub const CLIP_PLANE_RIGHT: usize = 1;
pub const CLIP_PLANE_MEDIA: usize = 5;
/// Liquid surface plane fed to shaders for refraction tinting.
pub const MEDIA_PLANE: usize = 6;
pub const CLIP_PLANE_COUNT: usize = 8;

/// The renderer's matrix, plane, and color registers.
pub struct MatrixStack {
    stacks: [Vec<Mat4>; MODE_COUNT],
    mode: MatrixMode,
    planes: [ClipPlane; CLIP_PLANE_COUNT],
    color: [f32; 4],
    fog_color: [f32; 4],
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            stacks: [
                vec![MAT4_IDENTITY],
                vec![MAT4_IDENTITY],
                vec![MAT4_IDENTITY],
            ],
            mode: MatrixMode::ModelView,
            planes: [ClipPlane::default(); CLIP_PLANE_COUNT],
            color: [1.0, 1.0, 1.0, 1.0],
            fog_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn stack_index(mode: MatrixMode) -> usize {
        match mode {
            MatrixMode::ModelView => 0,
            MatrixMode::Projection => 1,
            MatrixMode::Texture => 2,
        }
    }

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.mode = mode;
    }

    fn top_mut(&mut self) -> &mut Mat4 {
        let idx = Self::stack_index(self.mode);
        // Stacks are created non-empty and scoped pops never remove the base.
        self.stacks[idx].last_mut().unwrap()
    }

    pub fn top(&self, mode: MatrixMode) -> &Mat4 {
        self.stacks[Self::stack_index(mode)].last().unwrap()
    }

    /// Push a copy of a mode's top matrix. Crate-internal: callers go
    /// through `scoped` or the rasterizer's scope helpers, which keep
    /// push and pop paired structurally.
    pub(crate) fn push(&mut self, mode: MatrixMode) {
        let idx = Self::stack_index(mode);
        let top = *self.stacks[idx].last().unwrap();
        self.stacks[idx].push(top);
    }

    /// Pop a mode's stack; the base matrix is never removed.
    pub(crate) fn pop(&mut self, mode: MatrixMode) {
        let idx = Self::stack_index(mode);
        if self.stacks[idx].len() > 1 {
            self.stacks[idx].pop();
        }
    }

    /// Run `f` with the current mode's matrix pushed; the matrix is
    /// popped however `f` exits the happy path.
    pub fn scoped<R>(&mut self, mode: MatrixMode, f: impl FnOnce(&mut Self) -> R) -> R {
        let idx = Self::stack_index(mode);
        let top = *self.stacks[idx].last().unwrap();
        self.stacks[idx].push(top);
        let saved_mode = self.mode;
        self.mode = mode;
        let result = f(self);
        self.mode = saved_mode;
        self.stacks[idx].pop();
        result
    }

    pub fn depth(&self, mode: MatrixMode) -> usize {
        self.stacks[Self::stack_index(mode)].len()
    }

    pub fn load_identity(&mut self) {
        *self.top_mut() = MAT4_IDENTITY;
    }

    pub fn load_matrix(&mut self, m: &Mat4) {
        *self.top_mut() = *m;
    }

    pub fn translatef(&mut self, x: f32, y: f32, z: f32) {
        let t = mat4_translation(x, y, z);
        let top = self.top_mut();
        *top = mat4_multiply(top, &t);
    }

    pub fn rotatef_z(&mut self, degrees: f32) {
        let r = mat4_rotation_z(degrees);
        let top = self.top_mut();
        *top = mat4_multiply(top, &r);
    }

    pub fn scalef(&mut self, x: f32, y: f32, z: f32) {
        let s = mat4_scaling(x, y, z);
        let top = self.top_mut();
        *top = mat4_multiply(top, &s);
    }

    pub fn modelview(&self) -> Mat4 {
        *self.top(MatrixMode::ModelView)
    }

    pub fn projection(&self) -> Mat4 {
        *self.top(MatrixMode::Projection)
    }

    pub fn texture(&self) -> Mat4 {
        *self.top(MatrixMode::Texture)
    }

    pub fn modelview_projection(&self) -> Mat4 {
        mat4_multiply(self.top(MatrixMode::Projection), self.top(MatrixMode::ModelView))
    }

    pub fn modelview_inverse(&self) -> Mat4 {
        mat4_inverse(self.top(MatrixMode::ModelView))
    }

    /// Transform a point by the current modelview-projection.
    pub fn transform_vertex(&self, p: [f32; 3]) -> [f32; 3] {
        mat4_transform_point(&self.modelview_projection(), p)
    }

    // --------------------------------------------------------
    //  Clip planes
    // --------------------------------------------------------

    /// Store a clip plane in eye space: the given object-space plane is
    /// transformed by the inverse-transpose of the current modelview,
    /// matching the fixed-function convention.
    pub fn clip_plane(&mut self, slot: usize, plane: [f32; 4]) {
        let inv = self.modelview_inverse();
        // pᵀ M⁻¹ as a row vector: dot the plane with each column of M⁻¹.
        let mut eye = [0.0f32; 4];
        for (row, out) in eye.iter_mut().enumerate() {
            *out = plane[0] * inv[row * 4]
                + plane[1] * inv[row * 4 + 1]
                + plane[2] * inv[row * 4 + 2]
                + plane[3] * inv[row * 4 + 3];
        }
        self.planes[slot].coefficients = eye;
    }

    pub fn enable_plane(&mut self, slot: usize) {
        self.planes[slot].enabled = true;
    }

    pub fn disable_plane(&mut self, slot: usize) {
        self.planes[slot].enabled = false;
    }

    pub fn plane(&self, slot: usize) -> ClipPlane {
        self.planes[slot]
    }

    /// The plane uniform a shader sees: the coefficients when enabled,
    /// all zeros when disabled (a zero plane clips nothing).
    pub fn plane_uniform(&self, slot: usize) -> [f32; 4] {
        if self.planes[slot].enabled {
            self.planes[slot].coefficients
        } else {
            [0.0; 4]
        }
    }

    // --------------------------------------------------------
    //  Color registers
    // --------------------------------------------------------

    pub fn color4f(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.color = [r, g, b, a];
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    pub fn set_fog_color(&mut self, c: [f32; 4]) {
        self.fog_color = c;
    }

    pub fn fog_color(&self) -> [f32; 4] {
        self.fog_color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn mat_approx_eq(a: &Mat4, b: &Mat4, eps: f32) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| approx_eq(*x, *y, eps))
    }

    #[test]
    fn test_mat4_multiply_identity() {
        let result = mat4_multiply(&MAT4_IDENTITY, &MAT4_IDENTITY);
        assert!(mat_approx_eq(&result, &MAT4_IDENTITY, 1e-6));
    }

    #[test]
    fn test_mat4_multiply_translation() {
        let t = mat4_translation(3.0, 5.0, 7.0);
        assert!(mat_approx_eq(&mat4_multiply(&MAT4_IDENTITY, &t), &t, 1e-6));
        assert!(mat_approx_eq(&mat4_multiply(&t, &MAT4_IDENTITY), &t, 1e-6));
    }

    #[test]
    fn test_mat4_inverse_roundtrip() {
        let m = mat4_multiply(
            &mat4_multiply(&mat4_translation(1.0, -2.0, 3.0), &mat4_rotation_z(33.0)),
            &mat4_scaling(2.0, 2.0, 0.5),
        );
        let product = mat4_multiply(&m, &mat4_inverse(&m));
        assert!(mat_approx_eq(&product, &MAT4_IDENTITY, 1e-4));
    }

    #[test]
    fn test_mat4_inverse_singular_is_identity() {
        let singular = mat4_scaling(0.0, 1.0, 1.0);
        assert!(mat_approx_eq(&mat4_inverse(&singular), &MAT4_IDENTITY, 1e-6));
    }

    #[test]
    fn test_transform_point_translation() {
        let m = mat4_translation(10.0, 0.0, -4.0);
        let p = mat4_transform_point(&m, [1.0, 2.0, 3.0]);
        assert!(approx_eq(p[0], 11.0, 1e-6));
        assert!(approx_eq(p[1], 2.0, 1e-6));
        assert!(approx_eq(p[2], -1.0, 1e-6));
    }

    #[test]
    fn test_scoped_restores_depth_and_contents() {
        let mut ms = MatrixStack::new();
        ms.matrix_mode(MatrixMode::ModelView);
        ms.translatef(5.0, 0.0, 0.0);
        let before = ms.modelview();
        let depth = ms.depth(MatrixMode::ModelView);

        ms.scoped(MatrixMode::ModelView, |ms| {
            ms.rotatef_z(90.0);
            ms.translatef(0.0, 1.0, 0.0);
        });

        assert_eq!(ms.depth(MatrixMode::ModelView), depth);
        assert!(mat_approx_eq(&ms.modelview(), &before, 1e-6));
    }

    #[test]
    fn test_scoped_restores_mode() {
        let mut ms = MatrixStack::new();
        ms.matrix_mode(MatrixMode::Texture);
        ms.scoped(MatrixMode::ModelView, |ms| {
            ms.load_identity();
        });
        // Back on the texture stack: this must not touch modelview.
        ms.translatef(0.5, 0.0, 0.0);
        assert!(mat_approx_eq(&ms.modelview(), &MAT4_IDENTITY, 1e-6));
        assert!(approx_eq(ms.texture()[12], 0.5, 1e-6));
    }

    #[test]
    fn test_clip_plane_identity_modelview_passthrough() {
        let mut ms = MatrixStack::new();
        ms.clip_plane(CLIP_PLANE_LEFT, [1.0, 2.0, 0.0, 0.0]);
        let p = ms.plane(CLIP_PLANE_LEFT);
        assert!(mat_approx_eq(
            &[p.coefficients[0], p.coefficients[1], p.coefficients[2], p.coefficients[3],
              0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            &[1.0, 2.0, 0.0, 0.0,
              0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            1e-6
        ));
    }

    #[test]
    fn test_clip_plane_translation_adjusts_distance() {
        let mut ms = MatrixStack::new();
        ms.matrix_mode(MatrixMode::ModelView);
        ms.translatef(2.0, 0.0, 0.0);
        // Plane x >= 0 in object space sits at x >= 2 in eye space.
        ms.clip_plane(CLIP_PLANE_LEFT, [1.0, 0.0, 0.0, 0.0]);
        let p = ms.plane(CLIP_PLANE_LEFT).coefficients;
        assert!(approx_eq(p[0], 1.0, 1e-5));
        assert!(approx_eq(p[3], -2.0, 1e-5));
    }

    #[test]
    fn test_disabled_plane_uniform_is_zero() {
        let mut ms = MatrixStack::new();
        ms.clip_plane(CLIP_PLANE_RIGHT, [0.0, 1.0, 0.0, 3.0]);
        assert_eq!(ms.plane_uniform(CLIP_PLANE_RIGHT), [0.0; 4]);
        ms.enable_plane(CLIP_PLANE_RIGHT);
        assert_ne!(ms.plane_uniform(CLIP_PLANE_RIGHT), [0.0; 4]);
    }
}
