//! Static collision geometry
//!
//! A collision model is an immutable polygon soup (triangles and quads) in
//! world space, indexed by an octree for range and segment queries. Models
//! are shared read-only between worker threads.

use crate::foundation::math::Vec3;
use crate::geometry::{Plane, AABB};
use crate::spatial::{Octree, OctreeConfig, OctreeEntry};

/// Planar triangle or quad
///
/// Vertices wind counter-clockwise when viewed from the front, which is the
/// side the normal points to.
#[derive(Debug, Clone, Copy)]
pub struct CollisionPolygon {
    vertices: [Vec3; 4],
    vertex_count: usize,
    plane: Plane,
    bounds: AABB,
}

impl CollisionPolygon {
    /// Create a triangle; returns None for degenerate input
    pub fn triangle(v0: Vec3, v1: Vec3, v2: Vec3) -> Option<Self> {
        Self::build([v0, v1, v2, v0], 3)
    }

    /// Create a quad; returns None for degenerate input
    pub fn quad(v0: Vec3, v1: Vec3, v2: Vec3, v3: Vec3) -> Option<Self> {
        Self::build([v0, v1, v2, v3], 4)
    }

    fn build(vertices: [Vec3; 4], vertex_count: usize) -> Option<Self> {
        let normal = (vertices[1] - vertices[0])
            .cross(&(vertices[2] - vertices[0]))
            .try_normalize(1.0e-12)?;
        let mut bounds = AABB::from_point(vertices[0]);
        for v in &vertices[1..vertex_count] {
            bounds.add_point(*v);
        }
        Some(Self {
            vertices,
            vertex_count,
            plane: Plane::from_point_normal(vertices[0], normal),
            bounds,
        })
    }

    /// Vertices in winding order
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices[..self.vertex_count]
    }

    /// Number of vertices (3 or 4)
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Unit front-facing normal
    pub fn normal(&self) -> Vec3 {
        self.plane.normal
    }

    /// Supporting plane
    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// World-space bounds
    pub fn bounds(&self) -> &AABB {
        &self.bounds
    }

    /// True when `y` lies within the polygon's vertical extent
    pub fn in_y_range(&self, y: f32) -> bool {
        y >= self.bounds.min.y && y <= self.bounds.max.y
    }

    /// Vertex following `i` in winding order
    pub fn next_vertex(&self, i: usize) -> Vec3 {
        self.vertices[(i + 1) % self.vertex_count]
    }

    /// True when `point` (assumed on or near the plane) lies inside every edge
    pub fn is_point_inside(&self, point: Vec3) -> bool {
        let normal = self.normal();
        (0..self.vertex_count).all(|i| {
            let v = self.vertices[i];
            let edge = self.next_vertex(i) - v;
            edge.cross(&(point - v)).dot(&normal) >= 0.0
        })
    }

    /// Point where segment `p0 -> p1` crosses the supporting plane
    pub fn segment_plane_intersection(&self, p0: Vec3, p1: Vec3) -> Option<Vec3> {
        self.plane
            .segment_intersection(p0, p1)
            .map(|t| p0 + (p1 - p0) * t)
    }

    /// Point where segment `p0 -> p1` crosses the polygon, with its parameter
    pub fn segment_intersection(&self, p0: Vec3, p1: Vec3) -> Option<(Vec3, f32)> {
        let t = self.plane.segment_intersection(p0, p1)?;
        let hit = p0 + (p1 - p0) * t;
        self.is_point_inside(hit).then_some((hit, t))
    }
}

/// Segment hit against a collision model
#[derive(Debug, Clone, Copy)]
pub struct SegmentHit {
    /// Index of the polygon that was hit
    pub polygon: usize,
    /// Hit position
    pub position: Vec3,
    /// Polygon normal
    pub normal: Vec3,
    /// Distance from the segment start
    pub distance: f32,
}

/// Static polygon soup with spatial index
#[derive(Debug, Clone)]
pub struct CollisionModel {
    name: String,
    polygons: Vec<CollisionPolygon>,
    bounds: AABB,
    tree: Octree,
}

impl CollisionModel {
    /// Build a collision model from polygons
    pub fn new(name: impl Into<String>, polygons: Vec<CollisionPolygon>) -> Self {
        let mut bounds = polygons
            .first()
            .map_or_else(AABB::default, |p| *p.bounds());
        for poly in &polygons {
            bounds.merge(poly.bounds());
        }
        // Pad so flat models still have volume for subdivision
        let padded = AABB::new(bounds.min - Vec3::repeat(1.0), bounds.max + Vec3::repeat(1.0));

        let mut tree = Octree::new(padded, OctreeConfig::default());
        for (idx, poly) in polygons.iter().enumerate() {
            let center = poly.bounds().center();
            let radius = poly.bounds().extents().magnitude();
            if let Ok(id) = u32::try_from(idx) {
                tree.insert(id, center, radius);
            }
        }

        Self {
            name: name.into(),
            polygons,
            bounds,
            tree,
        }
    }

    /// Build from an indexed triangle list, skipping degenerate triangles
    pub fn from_triangles(name: impl Into<String>, vertices: &[Vec3], indices: &[u32]) -> Self {
        let name = name.into();
        let polygons: Vec<CollisionPolygon> = indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let v = |i: u32| vertices.get(i as usize).copied();
                CollisionPolygon::triangle(v(tri[0])?, v(tri[1])?, v(tri[2])?)
            })
            .collect();
        let skipped = indices.len() / 3 - polygons.len();
        if skipped > 0 {
            log::debug!("Collision model '{}': skipped {} degenerate triangles", name, skipped);
        }
        Self::new(name, polygons)
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of polygons
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Polygon by index
    pub fn polygon(&self, idx: usize) -> Option<&CollisionPolygon> {
        self.polygons.get(idx)
    }

    /// Bounds of every polygon
    pub fn bounds(&self) -> &AABB {
        &self.bounds
    }

    /// Visit polygons whose bounds overlap `range`, in index order
    ///
    /// The visitor returns false to stop the query.
    pub fn range_query(&self, range: &AABB, mut visit: impl FnMut(usize, &CollisionPolygon) -> bool) {
        let mut entries: Vec<OctreeEntry> = Vec::new();
        self.tree.query_aabb(range, &mut entries);
        entries.sort_unstable_by_key(|e| e.id);
        for entry in entries {
            let idx = entry.id as usize;
            if let Some(poly) = self.polygons.get(idx) {
                if poly.bounds().intersects(range) && !visit(idx, poly) {
                    break;
                }
            }
        }
    }

    /// Visit every polygon crossed by segment `p0 -> p1`
    pub fn hit_query(&self, p0: Vec3, p1: Vec3, mut visit: impl FnMut(&SegmentHit) -> bool) {
        let mut entries: Vec<OctreeEntry> = Vec::new();
        self.tree.query_segment(p0, p1, &mut entries);
        entries.sort_unstable_by_key(|e| e.id);
        let length = (p1 - p0).magnitude();
        for entry in entries {
            let idx = entry.id as usize;
            let Some(poly) = self.polygons.get(idx) else { continue };
            if let Some((position, t)) = poly.segment_intersection(p0, p1) {
                let hit = SegmentHit {
                    polygon: idx,
                    position,
                    normal: poly.normal(),
                    distance: t * length,
                };
                if !visit(&hit) {
                    break;
                }
            }
        }
    }

    /// Nearest segment hit whose normal has `y > min_normal_y`
    pub fn nearest_hit(&self, p0: Vec3, p1: Vec3, min_normal_y: f32) -> Option<SegmentHit> {
        let mut best: Option<SegmentHit> = None;
        self.hit_query(p0, p1, |hit| {
            if hit.normal.y > min_normal_y && best.map_or(true, |b| hit.distance < b.distance) {
                best = Some(*hit);
            }
            true
        });
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn floor() -> CollisionModel {
        let quad = CollisionPolygon::quad(
            Vec3::new(-5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, -5.0),
            Vec3::new(-5.0, 0.0, -5.0),
        )
        .unwrap();
        CollisionModel::new("floor", vec![quad])
    }

    #[test]
    fn test_quad_normal_faces_front() {
        let model = floor();
        assert_relative_eq!(model.polygon(0).unwrap().normal(), Vec3::y());
    }

    #[test]
    fn test_degenerate_triangle_is_rejected() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!(CollisionPolygon::triangle(p, p, p).is_none());
    }

    #[test]
    fn test_point_inside_polygon() {
        let model = floor();
        let poly = model.polygon(0).unwrap();
        assert!(poly.is_point_inside(Vec3::new(1.0, 0.0, 1.0)));
        assert!(!poly.is_point_inside(Vec3::new(6.0, 0.0, 1.0)));
    }

    #[test]
    fn test_range_query_finds_overlapping_polygons() {
        let model = floor();
        let mut found = Vec::new();
        model.range_query(&AABB::from_sphere(Vec3::new(0.0, 0.5, 0.0), 1.0), |idx, _| {
            found.push(idx);
            true
        });
        assert_eq!(found, vec![0]);

        found.clear();
        model.range_query(&AABB::from_sphere(Vec3::new(0.0, 10.0, 0.0), 1.0), |idx, _| {
            found.push(idx);
            true
        });
        assert!(found.is_empty());
    }

    #[test]
    fn test_nearest_hit() {
        let model = floor();
        let hit = model
            .nearest_hit(Vec3::new(1.0, 2.0, 1.0), Vec3::new(1.0, -1.0, 1.0), 0.0)
            .unwrap();
        assert_relative_eq!(hit.position, Vec3::new(1.0, 0.0, 1.0), epsilon = 1e-5);
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-5);
    }
}
