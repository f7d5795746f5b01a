//! View frustum for visibility culling
//!
//! The frustum is built from the eight world-space corners of the view
//! volume. Plane normals point inward, so a negative signed distance means
//! "outside".

use crate::foundation::math::{utils, Mat4, Point3, Vec3};

use super::bounds::{Sphere, AABB};

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Signed distance term: `normal · p + distance == 0` on the plane
    pub distance: f32,
}

impl Plane {
    /// Create a new plane
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Plane through `point` with the given normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            distance: -normal.dot(&point),
        }
    }

    /// Signed distance from the plane (positive on the normal side)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }

    /// Intersection parameter `t` of segment `p0 -> p1`, if it crosses the plane
    pub fn segment_intersection(&self, p0: Vec3, p1: Vec3) -> Option<f32> {
        let d0 = self.distance_to_point(p0);
        let d1 = self.distance_to_point(p1);
        if (d0 > 0.0 && d1 > 0.0) || (d0 < 0.0 && d1 < 0.0) {
            return None;
        }
        let denom = d0 - d1;
        if denom == 0.0 {
            return None;
        }
        Some(d0 / denom)
    }
}

/// Indices into [`Frustum::corners`] for each face, wound arbitrarily;
/// orientation is fixed up against the frustum centroid.
const FACE_CORNERS: [[usize; 3]; 6] = [
    [0, 1, 2], // near
    [4, 6, 5], // far
    [0, 3, 7], // left
    [1, 5, 6], // right
    [0, 4, 5], // top
    [3, 2, 6], // bottom
];

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes defining the frustum (near, far, left, right, top, bottom)
    pub planes: [Plane; 6],
    /// World-space corners: near TL, TR, BR, BL, then far TL, TR, BR, BL
    pub corners: [Vec3; 8],
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_corners(AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0)).corners())
    }
}

impl Frustum {
    /// Build a perspective frustum from the camera's inverse view matrix
    pub fn from_view(inv_view: &Mat4, fovy: f32, aspect: f32, near: f32, far: f32) -> Self {
        let t = (fovy * 0.5).tan();
        let near_y = near * t;
        let near_x = near_y * aspect;
        let far_y = far * t;
        let far_x = far_y * aspect;
        let view_corners = [
            Vec3::new(-near_x, near_y, -near),
            Vec3::new(near_x, near_y, -near),
            Vec3::new(near_x, -near_y, -near),
            Vec3::new(-near_x, -near_y, -near),
            Vec3::new(-far_x, far_y, -far),
            Vec3::new(far_x, far_y, -far),
            Vec3::new(far_x, -far_y, -far),
            Vec3::new(-far_x, -far_y, -far),
        ];
        let corners = view_corners.map(|c| inv_view.transform_point(&Point3::from(c)).coords);
        Self::from_corners(corners)
    }

    /// Build planes from eight corners in the [`Frustum::corners`] order
    pub fn from_corners(corners: [Vec3; 8]) -> Self {
        let centroid = corners.iter().sum::<Vec3>() / 8.0;
        let planes = FACE_CORNERS.map(|[a, b, c]| {
            let (pa, pb, pc) = (corners[a], corners[b], corners[c]);
            let mut normal = utils::normalize_or_zero(&(pb - pa).cross(&(pc - pa)));
            if normal.dot(&(centroid - pa)) < 0.0 {
                normal = -normal;
            }
            Plane::from_point_normal(pa, normal)
        });
        Self { planes, corners }
    }

    /// True when the box lies completely outside one of the planes
    pub fn cull_aabb(&self, aabb: &AABB) -> bool {
        let center = aabb.center();
        let extents = aabb.extents();
        self.planes.iter().any(|plane| {
            let r = extents.dot(&plane.normal.abs());
            plane.distance_to_point(center) < -r
        })
    }

    /// True when the sphere lies completely outside one of the planes
    pub fn cull_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .any(|plane| plane.distance_to_point(sphere.center) < -sphere.radius)
    }

    /// Stricter overlap test: rejects spheres near frustum edges that pass
    /// every plane test but miss the volume's bounding box.
    pub fn overlaps_sphere(&self, sphere: &Sphere) -> bool {
        if self.cull_sphere(sphere) {
            return false;
        }
        let mut bounds = AABB::from_point(self.corners[0]);
        for c in &self.corners[1..] {
            bounds.add_point(*c);
        }
        sphere.overlaps_aabb(&bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;

    fn test_frustum() -> Frustum {
        let view = Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        let inv_view = view.try_inverse().unwrap();
        Frustum::from_view(&inv_view, utils::deg_to_rad(60.0), 1.0, 0.1, 100.0)
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let frustum = test_frustum();
        let aabb = AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0));
        assert!(!frustum.cull_aabb(&aabb));
    }

    #[test]
    fn test_box_behind_camera_is_culled() {
        let frustum = test_frustum();
        let aabb = AABB::from_center_extents(Vec3::new(0.0, 0.0, 20.0), Vec3::repeat(1.0));
        assert!(frustum.cull_aabb(&aabb));
    }

    #[test]
    fn test_sphere_far_to_the_side_is_culled() {
        let frustum = test_frustum();
        assert!(frustum.cull_sphere(&Sphere::new(Vec3::new(50.0, 0.0, 0.0), 1.0)));
        assert!(!frustum.cull_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -50.0), 1.0)));
        assert!(frustum.overlaps_sphere(&Sphere::new(Vec3::zeros(), 0.5)));
    }

    #[test]
    fn test_plane_segment_intersection() {
        let plane = Plane::from_point_normal(Vec3::zeros(), Vec3::y());
        let t = plane.segment_intersection(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -3.0, 0.0));
        assert_eq!(t, Some(0.25));
        assert!(plane
            .segment_intersection(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 2.0, 0.0))
            .is_none());
    }
}
