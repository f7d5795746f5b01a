//! Geometric primitives shared by culling, shadow fitting and collision.

pub mod bounds;
pub mod frustum;

pub use bounds::{Capsule, Sphere, AABB};
pub use frustum::{Frustum, Plane};
