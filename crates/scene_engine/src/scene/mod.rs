//! Scene objects and the per-frame pipeline that updates them
//!
//! - [`object`] and [`registry`]: named objects and their owner
//! - [`model`] and [`motion`]: shared model/motion data and per-object work
//! - [`view`], [`shadow`] and [`context`]: camera and shadow state
//! - [`lighting`]: ambient, specular, fog and colour-correction parameters
//! - [`visibility`]: view and shadow-cast culling
//! - [`pipeline`]: the frame driver

pub mod context;
pub mod lighting;
pub mod model;
pub mod motion;
pub mod object;
pub mod pipeline;
pub mod registry;
pub mod shadow;
pub mod view;
pub mod visibility;

pub use context::{ContextCache, DrawContext};
pub use lighting::{ColorCorrection, Fog, HemiLight, SpecLight};
pub use model::{Material, ModelBatch, ModelData, ModelParams, ModelWork, SkeletonNode};
pub use motion::{MotionData, MotionTrack, MotionWork};
pub use object::{ExecFn, ObjectCallbacks, ObjectFlags, ObjectFn, BatchFn, SceneObject, MAX_PRIORITY};
pub use pipeline::{SceneError, ScenePipeline, SceneResult};
pub use registry::{lock_object, ObjectKey, ObjectRef, ObjectRegistry};
pub use shadow::{ShadowContext, ShadowFit};
pub use view::ViewContext;
pub use visibility::VisibilityParams;
