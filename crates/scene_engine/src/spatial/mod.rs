//! Spatial partitioning structures

pub mod octree;

pub use octree::{Octree, OctreeConfig, OctreeEntry};
