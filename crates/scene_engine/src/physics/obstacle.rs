//! Obstacle response
//!
//! Stateless routines that push a moving sphere out of static geometry.
//! They are called from object update jobs, so every function is reentrant:
//! the only mutable state is the caller's scratch heap.
//!
//! All routines take the sphere's previous (`old_pos`) and desired
//! (`new_pos`) centers and return an [`Adjustment`].

use crate::foundation::collections::BitArray;
use crate::foundation::math::{utils, Vec3};
use crate::foundation::memory::LocalHeap;
use crate::geometry::{Capsule, Sphere, AABB};

use super::collision::{CollisionModel, CollisionPolygon, SegmentHit};

/// Walls steeper than this (`|normal.y| <` limit) take part in wall sliding
pub const DEFAULT_WALL_SLOPE_LIMIT: f32 = 0.7;

/// Fraction of the reflected velocity kept after a sphere/capsule bounce
pub const DEFAULT_REFLECT_FACTOR: f32 = 0.5;

/// Gap left between separated volumes
pub const DEFAULT_SEPARATION_MARGIN: f32 = 1.0e-2;

/// Height above the query point where ground probing starts
pub const DEFAULT_GROUND_OFFSET_TOP: f32 = 1.8;

/// Depth below the query point where ground probing ends
pub const DEFAULT_GROUND_OFFSET_BOTTOM: f32 = 0.5;

/// Surfaces need `normal.y` above this to count as ground
pub const DEFAULT_GROUND_SLOPE_LIMIT: f32 = 0.5;

/// Half-length of the vertical capsule standing in for a pillar
const PILLAR_AXIS_HALF: f32 = 1.0;

const WALL_MARGIN: f32 = 0.005;
const WALL_MAX_ITERATIONS: usize = 15;
const EDGE_EPSILON: f32 = 1.0e-6;
const SEPARATION_EPSILON: f32 = 1.0e-5;

/// Result of an obstacle adjustment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    /// True when the position was changed
    pub adjusted: bool,
    /// Resolved position (equal to the input when `adjusted` is false)
    pub position: Vec3,
}

impl Adjustment {
    fn unchanged(position: Vec3) -> Self {
        Self { adjusted: false, position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contact {
    None,
    Face,
    Edge,
}

/// Working state for one wall-sliding query
struct Ball<'a> {
    new_pos: Vec3,
    old_pos: Vec3,
    adj_pos: Vec3,
    radius: f32,
    range: f32,
    sq_dist: f32,
    adj_idx: Option<usize>,
    contact: Contact,
    accepted: Contact,
    stamps: &'a mut BitArray,
}

impl Ball<'_> {
    fn adjust(&mut self, idx: usize, poly: &CollisionPolygon) {
        let sdist = poly.plane().distance_to_point(self.new_pos);
        let adist = sdist.abs();
        if sdist > 0.0 && adist > self.radius {
            if adist > self.range {
                self.stamps.set(idx);
            }
            return;
        }

        let nrm = poly.normal();
        let isect = if adist > self.radius {
            if adist > self.range {
                self.stamps.set(idx);
            }
            match poly.segment_plane_intersection(self.new_pos, self.old_pos) {
                Some(p) => p,
                None => return,
            }
        } else {
            let toward = if sdist > 0.0 { -nrm } else { nrm };
            self.new_pos + toward * adist
        };

        let r = self.radius;
        let adj = if poly.is_point_inside(isect) {
            self.contact = Contact::Face;
            let push = (r - adist) + WALL_MARGIN;
            if sdist <= 0.0 { -nrm * push } else { nrm * push }
        } else {
            if self.contact == Contact::Face {
                return;
            }
            match self.closest_feature(poly) {
                Some((dir, mov)) => {
                    self.contact = Contact::Edge;
                    dir * (r + mov + WALL_MARGIN)
                }
                None => return,
            }
        };

        let adj = adj + self.new_pos;
        let dist2 = (adj - self.old_pos).magnitude_squared();
        if dist2 > self.sq_dist && (self.accepted == Contact::Face || self.contact != Contact::Face) {
            return;
        }
        self.accepted = self.contact;
        self.sq_dist = dist2;
        self.adj_pos = adj;
        self.adj_idx = Some(idx);
    }

    /// Push direction and signed travel for the nearest vertex or edge in reach
    fn closest_feature(&self, poly: &CollisionPolygon) -> Option<(Vec3, f32)> {
        let rr = self.radius * self.radius;
        let mut best_edge2 = f32::MAX;
        let mut found: Option<(Vec3, f32)> = None;

        // Orient away from the feature on the side the sphere came from
        let orient = |vec: Vec3, dist2: f32, anchor: Vec3| {
            let dir = utils::normalize_or_zero(&vec);
            let mov = dist2.sqrt();
            if dir.dot(&(self.old_pos - anchor)) < 0.0 {
                (-dir, mov)
            } else {
                (dir, -mov)
            }
        };

        for (i, &vtx) in poly.vertices().iter().enumerate() {
            let ev = self.new_pos - vtx;
            let dist2 = ev.magnitude_squared();
            if dist2 <= rr && dist2 < best_edge2 {
                found = Some(orient(ev, dist2, vtx));
            }

            let nv = poly.next_vertex(i) - vtx;
            let len2 = nv.magnitude_squared();
            if len2 > EDGE_EPSILON {
                let nd = ev.dot(&nv);
                if nd >= EDGE_EPSILON && len2 >= nd {
                    let on_edge = vtx + nv * (nd / len2);
                    let av = self.new_pos - on_edge;
                    let dist2 = av.magnitude_squared();
                    if dist2 <= rr && dist2 < best_edge2 {
                        found = Some(orient(av, dist2, on_edge));
                        best_edge2 = dist2;
                    }
                }
            }
        }
        found
    }
}

/// Slide a sphere along static walls
///
/// Gathers polygons steeper than `wall_slope_lim` within
/// `radius + 2 * |new_pos - old_pos|` of `new_pos` and iteratively pushes
/// the sphere out of them. A push is only accepted when it moves the result
/// closer to `old_pos` than the previously accepted one, unless it upgrades
/// an edge contact to a face contact. A limit of zero or less disables the
/// slope filter.
pub fn wall_adj(
    scratch: &mut LocalHeap,
    collision: &CollisionModel,
    new_pos: Vec3,
    old_pos: Vec3,
    radius: f32,
    wall_slope_lim: f32,
) -> Adjustment {
    let npol = collision.polygon_count();
    if npol == 0 {
        return Adjustment::unchanged(new_pos);
    }

    let max_range = radius + (new_pos - old_pos).magnitude() * 2.0;
    let range = AABB::from_sphere(new_pos, max_range);
    let (candidates, stamps) = scratch.poly_scratch(npol);
    collision.range_query(&range, |idx, poly| {
        let is_wall = wall_slope_lim <= 0.0 || poly.normal().y.abs() < wall_slope_lim;
        if is_wall {
            if let Ok(id) = u32::try_from(idx) {
                candidates.push(id);
            }
        }
        true
    });
    if candidates.is_empty() {
        return Adjustment::unchanged(new_pos);
    }

    let mut ball = Ball {
        new_pos,
        old_pos,
        adj_pos: new_pos,
        radius,
        range: max_range,
        sq_dist: f32::MAX,
        adj_idx: None,
        contact: Contact::None,
        accepted: Contact::None,
        stamps,
    };

    let mut adj_count = 0;
    let mut iteration = 0;
    loop {
        for &id in candidates.iter() {
            let idx = id as usize;
            if ball.adj_idx == Some(idx) {
                continue;
            }
            let Some(poly) = collision.polygon(idx) else { continue };
            let calc = if iteration > 0 {
                !ball.stamps.test(idx)
            } else if poly.in_y_range(new_pos.y) {
                true
            } else {
                ball.stamps.set(idx);
                false
            };
            if calc {
                ball.adjust(idx, poly);
            }
        }
        if ball.contact == Contact::None {
            break;
        }
        ball.new_pos = ball.adj_pos;
        adj_count += 1;
        if iteration >= WALL_MAX_ITERATIONS {
            break;
        }
        iteration += 1;
    }

    Adjustment {
        adjusted: adj_count > 0,
        position: ball.new_pos,
    }
}

/// Separation vector that moves `center` out of a sphere/capsule contact
/// centered on `anchor`, preferring the direction opposite to `vel`.
fn separation(center: Vec3, anchor: Vec3, vel: Vec3, radius_sum: f32) -> Vec3 {
    let mut sep_dist = radius_sum;
    let sep_dir = -vel;
    let dv = center - anchor;
    let mut vec = dv + sep_dir * dv.magnitude();
    let len = vec.magnitude();
    if len < SEPARATION_EPSILON {
        vec = utils::normalize_or_zero(&sep_dir);
    } else {
        sep_dist /= len;
    }
    vec * sep_dist - dv
}

/// Push a moving sphere out of a static sphere, with a damped bounce
///
/// The reflected velocity is scaled by `reflect_factor`; if the bounced
/// position still overlaps, plain separation is used instead.
pub fn sph_sph_adj(
    new_pos: Vec3,
    old_pos: Vec3,
    radius: f32,
    static_pos: Vec3,
    static_radius: f32,
    reflect_factor: f32,
    margin: f32,
) -> Adjustment {
    let stat = Sphere::new(static_pos, static_radius);
    if !Sphere::new(new_pos, radius).overlaps(&stat) {
        return Adjustment::unchanged(new_pos);
    }
    let vel = new_pos - old_pos;
    let sep = separation(new_pos, static_pos, vel, radius + static_radius + margin);
    let nv = utils::normalize_or_zero(&(new_pos + sep - static_pos));
    let mut position = new_pos + utils::reflect(&vel, &nv) * reflect_factor;
    if Sphere::new(position, radius).overlaps(&stat) {
        position = new_pos + sep;
    }
    Adjustment { adjusted: true, position }
}

/// Push a moving sphere out of a static capsule, with a damped bounce
pub fn sph_cap_adj(
    new_pos: Vec3,
    old_pos: Vec3,
    radius: f32,
    static_pos0: Vec3,
    static_pos1: Vec3,
    static_radius: f32,
    reflect_factor: f32,
    margin: f32,
) -> Adjustment {
    let capsule = Capsule::new(static_pos0, static_pos1, static_radius);
    let Some(axis_point) = Sphere::new(new_pos, radius).overlaps_capsule(&capsule) else {
        return Adjustment::unchanged(new_pos);
    };
    let vel = new_pos - old_pos;
    let sep = separation(new_pos, axis_point, vel, radius + static_radius + margin);
    let nv = utils::normalize_or_zero(&(new_pos + sep - axis_point));
    let mut position = new_pos + utils::reflect(&vel, &nv) * reflect_factor;
    if Sphere::new(position, radius).overlaps_capsule(&capsule).is_some() {
        position = new_pos + sep;
    }
    Adjustment { adjusted: true, position }
}

/// Push a moving vertical pillar out of a static one
///
/// Pillars stand on their `y` and extend `height` upward. When the vertical
/// spans overlap, the bases are resolved in the XZ plane as a sphere against
/// an upright capsule; the height of `new_pos` is kept.
pub fn pillar_adj(
    new_pos: Vec3,
    old_pos: Vec3,
    radius: f32,
    height: f32,
    static_pos: Vec3,
    static_radius: f32,
    static_height: f32,
    reflect_factor: f32,
    margin: f32,
) -> Adjustment {
    let spans_overlap = new_pos.y <= static_pos.y + static_height && new_pos.y + height >= static_pos.y;
    if !spans_overlap {
        return Adjustment::unchanged(new_pos);
    }
    let flat = |v: Vec3| Vec3::new(v.x, 0.0, v.z);
    let axis0 = Vec3::new(static_pos.x, -PILLAR_AXIS_HALF, static_pos.z);
    let axis1 = Vec3::new(static_pos.x, PILLAR_AXIS_HALF, static_pos.z);
    let adj = sph_cap_adj(
        flat(new_pos),
        flat(old_pos),
        radius,
        axis0,
        axis1,
        static_radius,
        reflect_factor,
        margin,
    );
    if !adj.adjusted {
        return Adjustment::unchanged(new_pos);
    }
    Adjustment {
        adjusted: true,
        position: Vec3::new(adj.position.x, new_pos.y, adj.position.z),
    }
}

/// Ground contact found under a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundHit {
    /// Contact point
    pub position: Vec3,
    /// Surface normal
    pub normal: Vec3,
    /// Index of the polygon hit
    pub polygon: usize,
}

impl From<SegmentHit> for GroundHit {
    fn from(hit: SegmentHit) -> Self {
        Self {
            position: hit.position,
            normal: hit.normal,
            polygon: hit.polygon,
        }
    }
}

/// Nearest walkable surface under `pos`
///
/// Probes from `offs_top` above to `offs_btm` below `pos`. Only surfaces with
/// `normal.y > slope_lim` count as ground.
pub fn ground_hit(
    collision: &CollisionModel,
    pos: Vec3,
    offs_top: f32,
    offs_btm: f32,
    slope_lim: f32,
) -> Option<GroundHit> {
    let top = pos + Vec3::new(0.0, offs_top, 0.0);
    let bottom = pos - Vec3::new(0.0, offs_btm, 0.0);
    collision.nearest_hit(top, bottom, slope_lim).map(GroundHit::from)
}

/// Height of the nearest walkable surface under `pos`
///
/// [`ground_hit`] with [`DEFAULT_GROUND_SLOPE_LIMIT`]; returns `pos.y` when
/// nothing is hit.
pub fn ground_height(collision: &CollisionModel, pos: Vec3, offs_top: f32, offs_btm: f32) -> f32 {
    ground_hit(collision, pos, offs_top, offs_btm, DEFAULT_GROUND_SLOPE_LIMIT).map_or(pos.y, |hit| hit.position.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wall_model() -> CollisionModel {
        // Large wall in the plane x = 1, facing -X
        let tri = CollisionPolygon::triangle(
            Vec3::new(1.0, -5.0, -5.0),
            Vec3::new(1.0, -5.0, 15.0),
            Vec3::new(1.0, 15.0, -5.0),
        )
        .unwrap();
        CollisionModel::new("wall", vec![tri])
    }

    #[test]
    fn test_wall_adj_pushes_sphere_out_of_wall() {
        let model = wall_model();
        let mut heap = LocalHeap::new(0, 0);
        let radius = 0.5;
        let result = wall_adj(&mut heap, &model, Vec3::new(0.8, 0.0, 0.0), Vec3::zeros(), radius, 0.0);
        assert!(result.adjusted);
        let plane_dist = 1.0 - result.position.x;
        assert!(plane_dist >= radius - 1e-4, "distance {plane_dist} below radius");
        assert_relative_eq!(result.position.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_wall_adj_without_contact_is_unchanged() {
        let model = wall_model();
        let mut heap = LocalHeap::new(0, 0);
        let pos = Vec3::new(-10.0, 0.0, 0.0);
        let result = wall_adj(&mut heap, &model, pos, Vec3::new(-10.1, 0.0, 0.0), 0.5, 0.0);
        assert!(!result.adjusted);
        assert_eq!(result.position, pos);
    }

    #[test]
    fn test_wall_adj_ignores_floors_under_slope_limit() {
        let floor = CollisionPolygon::quad(
            Vec3::new(-5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, -5.0),
            Vec3::new(-5.0, 0.0, -5.0),
        )
        .unwrap();
        let model = CollisionModel::new("floor", vec![floor]);
        let mut heap = LocalHeap::new(0, 0);
        let pos = Vec3::new(0.0, 0.2, 0.0);
        let result = wall_adj(&mut heap, &model, pos, Vec3::new(0.0, 0.3, 0.0), 0.5, DEFAULT_WALL_SLOPE_LIMIT);
        assert!(!result.adjusted);
        assert_eq!(result.position, pos);
    }

    #[test]
    fn test_sph_sph_adj_separates() {
        let result = sph_sph_adj(
            Vec3::new(0.9, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            0.5,
            Vec3::zeros(),
            0.5,
            DEFAULT_REFLECT_FACTOR,
            DEFAULT_SEPARATION_MARGIN,
        );
        assert!(result.adjusted);
        assert!(result.position.magnitude() > 1.0);
    }

    #[test]
    fn test_sph_sph_adj_no_overlap() {
        let pos = Vec3::new(3.0, 0.0, 0.0);
        let result = sph_sph_adj(pos, Vec3::new(4.0, 0.0, 0.0), 0.5, Vec3::zeros(), 0.5, 0.5, 0.01);
        assert!(!result.adjusted);
        assert_eq!(result.position, pos);
    }

    #[test]
    fn test_sph_cap_adj_separates_from_axis() {
        let result = sph_cap_adj(
            Vec3::new(0.6, 1.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            0.5,
            Vec3::zeros(),
            Vec3::new(0.0, 2.0, 0.0),
            0.5,
            DEFAULT_REFLECT_FACTOR,
            DEFAULT_SEPARATION_MARGIN,
        );
        assert!(result.adjusted);
        let horizontal = Vec3::new(result.position.x, 0.0, result.position.z).magnitude();
        assert!(horizontal > 1.0);
    }

    #[test]
    fn test_pillar_adj_separates_overlapping_pillars() {
        let new_pos = Vec3::new(0.6, 0.5, 0.0);
        let result = pillar_adj(
            new_pos,
            Vec3::new(2.0, 0.5, 0.0),
            0.5,
            2.0,
            Vec3::zeros(),
            0.5,
            2.0,
            DEFAULT_REFLECT_FACTOR,
            DEFAULT_SEPARATION_MARGIN,
        );
        assert!(result.adjusted);
        assert_eq!(result.position.y, new_pos.y);
        let horizontal = Vec3::new(result.position.x, 0.0, result.position.z).magnitude();
        assert!(horizontal > 1.0, "still overlapping at {horizontal}");
    }

    #[test]
    fn test_pillar_adj_ignores_disjoint_heights() {
        let new_pos = Vec3::new(0.6, 0.0, 0.0);
        let result = pillar_adj(new_pos, Vec3::new(2.0, 0.0, 0.0), 0.5, 2.0, Vec3::new(0.0, 5.0, 0.0), 0.5, 2.0, 0.5, 0.01);
        assert!(!result.adjusted);
        assert_eq!(result.position, new_pos);
    }

    #[test]
    fn test_ground_hit_respects_slope_limit() {
        // 45 degree ramp through the origin, y = x
        let ramp = CollisionPolygon::quad(
            Vec3::new(-5.0, -5.0, 5.0),
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(5.0, 5.0, -5.0),
            Vec3::new(-5.0, -5.0, -5.0),
        )
        .unwrap();
        let model = CollisionModel::new("ramp", vec![ramp]);
        let pos = Vec3::new(0.0, 0.2, 0.0);

        let hit = ground_hit(&model, pos, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM, 0.5).unwrap();
        assert_eq!(hit.polygon, 0);
        assert_relative_eq!(hit.position.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(hit.normal.y, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-5);

        assert!(ground_hit(&model, pos, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM, 0.8).is_none());
        assert_relative_eq!(ground_height(&model, pos, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_ground_height() {
        let floor = CollisionPolygon::quad(
            Vec3::new(-5.0, 0.25, 5.0),
            Vec3::new(5.0, 0.25, 5.0),
            Vec3::new(5.0, 0.25, -5.0),
            Vec3::new(-5.0, 0.25, -5.0),
        )
        .unwrap();
        let model = CollisionModel::new("floor", vec![floor]);
        let h = ground_height(&model, Vec3::new(1.0, 0.5, 1.0), DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM);
        assert_relative_eq!(h, 0.25, epsilon = 1e-5);
        let miss = ground_height(&model, Vec3::new(10.0, 0.5, 1.0), DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM);
        assert_relative_eq!(miss, 0.5);
    }
}
