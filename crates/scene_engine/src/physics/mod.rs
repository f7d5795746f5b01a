//! Physics module for static collision queries and obstacle response
//!
//! Provides polygon collision models indexed by an octree, plus the
//! sphere-versus-geometry adjusters used by object update callbacks.

pub mod collision;
pub mod obstacle;

pub use collision::{CollisionModel, CollisionPolygon, SegmentHit};
pub use obstacle::{
    ground_height, ground_hit, pillar_adj, sph_cap_adj, sph_sph_adj, wall_adj, Adjustment, GroundHit,
    DEFAULT_GROUND_OFFSET_BOTTOM, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_SLOPE_LIMIT, DEFAULT_REFLECT_FACTOR,
    DEFAULT_SEPARATION_MARGIN, DEFAULT_WALL_SLOPE_LIMIT,
};
