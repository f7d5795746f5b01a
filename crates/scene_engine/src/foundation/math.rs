//! Math utilities and types
//!
//! Provides the fundamental math types used by the scene pipeline. All
//! matrices are column-vector (`M * v`) and right-handed, with clip-space
//! depth mapped to `[0, 1]`.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Local or world placement of a skeleton node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Unit scale, no rotation, at the origin
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Decompose a translation * rotation * scale matrix (no shear)
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        // Remove scale before extracting the rotation
        let rotation_matrix = Matrix3::new(
            utils::div0(matrix.m11, scale_x), utils::div0(matrix.m12, scale_y), utils::div0(matrix.m13, scale_z),
            utils::div0(matrix.m21, scale_x), utils::div0(matrix.m22, scale_y), utils::div0(matrix.m23, scale_z),
            utils::div0(matrix.m31, scale_x), utils::div0(matrix.m32, scale_y), utils::div0(matrix.m33, scale_z),
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Interpolate between two transforms (lerp for position/scale, slerp for rotation)
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        let rotation = self
            .rotation
            .try_slerp(&other.rotation, t, 1.0e-6)
            .unwrap_or_else(|| self.rotation.nlerp(&other.rotation, t));
        Self {
            position: self.position.lerp(&other.position, t),
            rotation,
            scale: self.scale.lerp(&other.scale, t),
        }
    }
}

/// Math utility functions
pub mod utils {
    use super::{Mat4, Quat, Vec3, Vec4};

    /// Degrees to radians
    #[inline]
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Division that yields zero instead of infinity/NaN for a zero divisor
    #[inline]
    pub fn div0(x: f32, y: f32) -> f32 {
        if y != 0.0 { x / y } else { 0.0 }
    }

    /// Reciprocal that yields zero for zero input
    #[inline]
    pub fn rcp0(x: f32) -> f32 {
        div0(1.0, x)
    }

    /// Component-wise [`rcp0`]
    pub fn rcp0_vec(v: &Vec3) -> Vec3 {
        Vec3::new(rcp0(v.x), rcp0(v.y), rcp0(v.z))
    }

    /// Normalize, falling back to zero for degenerate vectors
    pub fn normalize_or_zero(v: &Vec3) -> Vec3 {
        v.try_normalize(1.0e-12).unwrap_or_else(Vec3::zeros)
    }

    /// Reflect `v` about the plane with unit normal `n`
    pub fn reflect(v: &Vec3, n: &Vec3) -> Vec3 {
        v - n * (2.0 * v.dot(n))
    }

    /// Transform a point into homogeneous clip space (w not divided)
    #[inline]
    pub fn apply_point(m: &Mat4, p: &Vec3) -> Vec4 {
        m * Vec4::new(p.x, p.y, p.z, 1.0)
    }

    /// Rotation from X then Y then Z Euler angles in degrees
    pub fn quat_from_degrees(dx: f32, dy: f32, dz: f32) -> Quat {
        let qx = Quat::from_axis_angle(&Vec3::x_axis(), deg_to_rad(dx));
        let qy = Quat::from_axis_angle(&Vec3::y_axis(), deg_to_rad(dy));
        let qz = Quat::from_axis_angle(&Vec3::z_axis(), deg_to_rad(dz));
        qz * qy * qx
    }
}

/// Extension trait for Mat4 with camera construction helpers
pub trait Mat4Ext {
    /// Right-handed perspective projection with depth mapped to `[0, 1]`
    fn perspective_rh_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    ///
    /// When `up` is parallel to the viewing direction an orthogonal axis is
    /// substituted so the result stays invertible.
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Fixed matrix mapping clip-space XY from `[-1, 1]` to texture `[0, 1]`
    fn texture_bias() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective_rh_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // P = [cot/a  0    0     0   ]
        //     [0      cot  0     0   ]
        //     [0      0    -q    -q*n]
        //     [0      0    -1    0   ]   with q = f/(f-n)
        let cot = utils::rcp0((fov_y * 0.5).tan());
        let q = utils::div0(far, far - near);

        let mut result = Mat4::zeros();
        result[(0, 0)] = utils::div0(cot, aspect);
        result[(1, 1)] = cot;
        result[(2, 2)] = -q;
        result[(2, 3)] = -q * near;
        result[(3, 2)] = -1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = utils::normalize_or_zero(&(target - eye));
        let mut right = forward.cross(&up);
        if right.norm_squared() < 1.0e-12 {
            let alt = if forward.x.abs() < 0.9 { Vec3::x() } else { Vec3::z() };
            right = forward.cross(&alt);
        }
        let right = utils::normalize_or_zero(&right);
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn texture_bias() -> Mat4 {
        Mat4::new(
            0.5, 0.0, 0.0, 0.5,
            0.0, 0.5, 0.0, 0.5,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }
}
