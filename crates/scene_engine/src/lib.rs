//! # Scene Engine
//!
//! Per-frame scene update pipeline for a real-time 3D engine.
//!
//! ## Features
//!
//! - **Object Registry**: Name-keyed objects with stable iteration order
//! - **Prioritized Jobs**: Parallel per-object updates with barriers between priority levels
//! - **Visibility**: View-frustum and shadow-cast culling per render batch
//! - **Shadow Fitting**: Uniform and perspective-warped shadow projections
//! - **Collision Response**: Wall sliding, sphere/capsule/pillar separation and ground probing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     scene_engine::foundation::logging::init();
//!     let mut scene = ScenePipeline::new(SceneConfig::default(), None, None)?;
//!     let model = std::sync::Arc::new(ModelData::new("empty", Vec::new(), Vec::new()));
//!     scene.add_obj(Some(model), Some("thing"));
//!
//!     scene.frame_begin(Vec4::zeros());
//!     scene.exec();
//!     scene.visibility();
//!     scene.draw(true);
//!     scene.frame_end();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;

pub mod foundation;
pub mod config;
pub mod geometry;
pub mod spatial;
pub mod physics;
pub mod task;
pub mod assets;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{MemoryResourceManager, Package, ResourceManager},
        core::{config::{Config, SceneConfig}, runtime::SceneRuntime},
        foundation::math::{Mat4, Quat, Transform, Vec3, Vec4},
        geometry::{Sphere, AABB},
        physics::{ground_height, ground_hit, pillar_adj, sph_cap_adj, sph_sph_adj, wall_adj, CollisionModel},
        render::{DrawInterface, DrawMode, NullDraw, Sprite},
        scene::{
            lock_object, ModelData, MotionData, ObjectFlags, ObjectKey, ObjectRef, SceneError, SceneObject,
            ScenePipeline,
        },
        task::JobContext,
    };
}
