// Transform utilities for scene import
//
// dotXSI stores transforms as translation, XYZ Euler rotation in degrees and
// non-uniform scale. These helpers turn them into glam affines and handle the
// optional Z mirror used to switch coordinate-system handedness.

use glam::{Affine3A, Mat3, Quat, Vec3};

/// Optional handedness flip applied to imported geometry and transforms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mirror {
    /// Keep the source coordinate system.
    #[default]
    None,
    /// Negate the Z axis of every point, direction and transform.
    FlipZ,
}

impl Mirror {
    /// Factor applied to Z components (1 or -1).
    pub fn sign(self) -> f32 {
        match self {
            Mirror::None => 1.0,
            Mirror::FlipZ => -1.0,
        }
    }

    /// Whether faces must be emitted in reverse corner order.
    pub fn reverses_winding(self) -> bool {
        self == Mirror::FlipZ
    }

    /// Mirror a point or direction.
    pub fn vector(self, v: Vec3) -> Vec3 {
        Vec3::new(v.x, v.y, v.z * self.sign())
    }

    /// Mirror an affine transform (conjugation by the Z flip).
    pub fn affine(self, a: Affine3A) -> Affine3A {
        match self {
            Mirror::None => a,
            Mirror::FlipZ => {
                let flip = Affine3A::from_scale(Vec3::new(1.0, 1.0, -1.0));
                flip * a * flip
            }
        }
    }

    /// Mirror a rotation so it matches [`Mirror::affine`] on its matrix.
    pub fn rotation(self, q: Quat) -> Quat {
        match self {
            Mirror::None => q,
            Mirror::FlipZ => Quat::from_xyzw(-q.x, -q.y, q.z, q.w),
        }
    }
}

/// Rotation from XYZ Euler angles in degrees (X applied first, Z last).
pub fn euler_xyz_degrees(degrees: Vec3) -> Quat {
    Quat::from_rotation_z(degrees.z.to_radians())
        * Quat::from_rotation_y(degrees.y.to_radians())
        * Quat::from_rotation_x(degrees.x.to_radians())
}

/// Compose scale, then rotation (Euler degrees), then translation.
pub fn compose_srt(scale: Vec3, rotation_degrees: Vec3, translation: Vec3) -> Affine3A {
    Affine3A::from_scale_rotation_translation(scale, euler_xyz_degrees(rotation_degrees), translation)
}

/// Inverse-bind matrix for a joint whose bind pose is given as components.
///
/// Zero scale components are treated as 1 so the inverse stays finite.
pub fn inverse_bind_pose(translation: Vec3, rotation_degrees: Vec3, scale: Vec3) -> Affine3A {
    let safe = Vec3::select(scale.cmpeq(Vec3::ZERO), Vec3::ONE, scale);
    compose_srt(safe, rotation_degrees, translation).inverse()
}

/// Extension trait for Affine3A with mesh-baking helpers.
pub trait AffineExt {
    /// Transform a surface normal (inverse-transpose of the linear part), normalized.
    fn transform_normal(&self, normal: Vec3) -> Vec3;
}

impl AffineExt for Affine3A {
    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        let linear = Mat3::from(self.matrix3);
        let det = linear.determinant();
        if det.abs() <= f32::EPSILON {
            return normal;
        }
        (linear.inverse().transpose() * normal).normalize_or_zero()
    }
}
