//! Scene objects
//!
//! A [`SceneObject`] binds an optional model and skeletal pose to a name, an
//! execution priority, per-object callbacks and caller-owned scratch slots.
//! Objects live in the [`ObjectRegistry`](super::registry::ObjectRegistry)
//! behind a mutex so jobs on different workers can update different objects
//! at the same time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::foundation::math::{utils, Mat4, Quat, Transform, Vec3};
use crate::geometry::AABB;
use crate::task::JobContext;

use super::model::{ModelData, ModelWork};
use super::motion::{MotionData, MotionWork};
use super::visibility::{self, VisibilityParams};

/// Number of priority levels; objects run in ascending level order
pub const MAX_PRIORITY: u8 = 8;

/// Length of the integer scratch array
pub const INT_WK_LEN: usize = 16;
/// Length of the float scratch array
pub const FLT_WK_LEN: usize = 16;
/// Length of the shared-pointer scratch array
pub const PTR_WK_LEN: usize = 4;

bitflags! {
    /// Per-object switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Skip the opaque and semi-transparent passes
        const DRAW_DISABLED = 1 << 0;
        /// Never cast shadows
        const SHADOW_CAST_DISABLED = 1 << 1;
        /// Never receive shadows
        const SHADOW_RECEIVE_DISABLED = 1 << 2;
    }
}

/// Replaces the default per-frame update
pub type ExecFn = Arc<dyn Fn(&mut SceneObject, &mut JobContext<'_>) + Send + Sync>;
/// Hook around the pose update stages, also used for draw and delete hooks
pub type ObjectFn = Arc<dyn Fn(&mut SceneObject) + Send + Sync>;
/// Hook around a single batch draw
pub type BatchFn = Arc<dyn Fn(&mut SceneObject, usize) + Send + Sync>;

/// Optional per-object callbacks
#[derive(Clone, Default)]
pub struct ObjectCallbacks {
    /// Per-frame update; `advance(None, 0.0)` runs when unset
    pub exec: Option<ExecFn>,
    /// After the motion is applied, before blending
    pub before_blend: Option<ObjectFn>,
    /// After blending, before world matrices are computed
    pub after_blend: Option<ObjectFn>,
    /// After world matrices are computed
    pub world: Option<ObjectFn>,
    /// On removal from the registry
    pub delete: Option<ObjectFn>,
    /// Before the object's opaque batches are drawn
    pub pre_opaque: Option<ObjectFn>,
    /// After the object's opaque batches are drawn
    pub post_opaque: Option<ObjectFn>,
    /// Before each non-shadow batch draw
    pub batch_pre_draw: Option<BatchFn>,
    /// After each non-shadow batch draw
    pub batch_post_draw: Option<BatchFn>,
}

impl fmt::Debug for ObjectCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCallbacks")
            .field("exec", &self.exec.is_some())
            .field("before_blend", &self.before_blend.is_some())
            .field("after_blend", &self.after_blend.is_some())
            .field("world", &self.world.is_some())
            .field("delete", &self.delete.is_some())
            .field("pre_opaque", &self.pre_opaque.is_some())
            .field("post_opaque", &self.post_opaque.is_some())
            .field("batch_pre_draw", &self.batch_pre_draw.is_some())
            .field("batch_post_draw", &self.batch_post_draw.is_some())
            .finish()
    }
}

/// Named scene entity
pub struct SceneObject {
    name: String,
    model: Option<ModelWork>,
    motion: Option<MotionWork>,
    priority: u8,
    /// Draw and shadow switches
    pub flags: ObjectFlags,
    /// Per-object hooks
    pub callbacks: ObjectCallbacks,
    /// Caller-defined integer state
    pub int_wk: [i32; INT_WK_LEN],
    /// Caller-defined float state
    pub flt_wk: [f32; FLT_WK_LEN],
    /// Caller-defined shared state
    pub ptr_wk: [Option<Arc<dyn Any + Send + Sync>>; PTR_WK_LEN],
}

impl fmt::Debug for SceneObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneObject")
            .field("name", &self.name)
            .field("model", &self.model.as_ref().map(|m| m.data().name().to_string()))
            .field("has_motion", &self.motion.is_some())
            .field("priority", &self.priority)
            .field("flags", &self.flags)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl SceneObject {
    /// Create an object; a model with a skeleton also gets pose work
    pub fn new(name: String, model: Option<Arc<ModelData>>) -> Self {
        let motion = model.as_ref().and_then(|m| MotionWork::new(Arc::clone(m)));
        Self {
            name,
            model: model.map(ModelWork::new),
            motion,
            priority: 0,
            flags: ObjectFlags::empty(),
            callbacks: ObjectCallbacks::default(),
            int_wk: [0; INT_WK_LEN],
            flt_wk: [0.0; FLT_WK_LEN],
            ptr_wk: Default::default(),
        }
    }

    /// Unique object name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execution priority level
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Set the priority level, clamped below [`MAX_PRIORITY`]
    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(MAX_PRIORITY - 1);
    }

    /// Model work state
    pub fn model(&self) -> Option<&ModelWork> {
        self.model.as_ref()
    }

    /// Mutable model work state
    pub fn model_mut(&mut self) -> Option<&mut ModelWork> {
        self.model.as_mut()
    }

    /// Skeletal pose state
    pub fn motion(&self) -> Option<&MotionWork> {
        self.motion.as_ref()
    }

    /// Mutable skeletal pose state
    pub fn motion_mut(&mut self) -> Option<&mut MotionWork> {
        self.motion.as_mut()
    }

    /// Shared model data
    pub fn model_data(&self) -> Option<&Arc<ModelData>> {
        self.model.as_ref().map(ModelWork::data)
    }

    /// Number of render batches
    pub fn batch_count(&self) -> usize {
        self.model.as_ref().map_or(0, ModelWork::batch_count)
    }

    /// Material name of batch `ibat`
    pub fn batch_material_name(&self, ibat: usize) -> Option<&str> {
        self.model_data()
            .and_then(|d| d.batches().get(ibat))
            .map(|b| b.material.name.as_str())
    }

    /// Enable or disable drawing
    pub fn set_draw_disabled(&mut self, disabled: bool) {
        self.flags.set(ObjectFlags::DRAW_DISABLED, disabled);
    }

    /// Enable or disable shadow casting
    pub fn set_shadow_cast_disabled(&mut self, disabled: bool) {
        self.flags.set(ObjectFlags::SHADOW_CAST_DISABLED, disabled);
    }

    /// Enable or disable shadow receiving
    pub fn set_shadow_receive_disabled(&mut self, disabled: bool) {
        self.flags.set(ObjectFlags::SHADOW_RECEIVE_DISABLED, disabled);
        if let Some(work) = self.model.as_mut() {
            work.params.shadow_receive = !disabled;
        }
    }

    /// Multiply the base color of every batch
    pub fn set_base_color_scale(&mut self, r: f32, g: f32, b: f32) {
        if let Some(work) = self.model.as_mut() {
            work.params.base_color_scale = Vec3::new(r, g, b);
        }
    }

    /// Set the shadow lookup offset bias
    pub fn set_shadow_offset_bias(&mut self, bias: f32) {
        if let Some(work) = self.model.as_mut() {
            work.params.shadow_offset_bias = bias;
        }
    }

    /// Set the shadow weight bias
    pub fn set_shadow_weight_bias(&mut self, bias: f32) {
        if let Some(work) = self.model.as_mut() {
            work.params.shadow_weight_bias = bias;
        }
    }

    /// Zero the integer scratch slots
    pub fn clear_int_wk(&mut self) {
        self.int_wk = [0; INT_WK_LEN];
    }

    /// Zero the float scratch slots
    pub fn clear_flt_wk(&mut self) {
        self.flt_wk = [0.0; FLT_WK_LEN];
    }

    /// Empty the shared-pointer scratch slots
    pub fn clear_ptr_wk(&mut self) {
        self.ptr_wk = Default::default();
    }

    /// Store shared state in slot `idx`; out-of-range slots are ignored
    pub fn set_ptr_wk(&mut self, idx: usize, value: Arc<dyn Any + Send + Sync>) {
        if let Some(slot) = self.ptr_wk.get_mut(idx) {
            *slot = Some(value);
        }
    }

    /// Shared state in slot `idx`, if present and of type `T`
    pub fn ptr_wk_as<T: Any + Send + Sync>(&self, idx: usize) -> Option<&T> {
        self.ptr_wk.get(idx)?.as_deref()?.downcast_ref::<T>()
    }

    /// Frame count of the motion applied most recently
    pub fn current_motion_frame_count(&self) -> usize {
        self.motion
            .as_ref()
            .and_then(MotionWork::current_motion)
            .map_or(0, |m| m.frame_count())
    }

    /// Current motion frame
    pub fn motion_frame(&self) -> f32 {
        self.motion.as_ref().map_or(0.0, MotionWork::frame)
    }

    /// Set the current motion frame
    pub fn set_motion_frame(&mut self, frame: f32) {
        if let Some(mot) = self.motion.as_mut() {
            mot.set_frame(frame);
        }
    }

    /// Apply `motion` and advance by `frame_add`
    pub fn exec_motion(&mut self, motion: &Arc<MotionData>, frame_add: f32) {
        if let Some(mot) = self.motion.as_mut() {
            mot.apply_motion(motion, frame_add);
        }
    }

    /// Start a cross-fade over `duration` frames
    pub fn init_motion_blend(&mut self, duration: u32) {
        if let Some(mot) = self.motion.as_mut() {
            mot.blend_init(duration);
        }
    }

    /// Step the cross-fade
    pub fn exec_motion_blend(&mut self) {
        if let Some(mot) = self.motion.as_mut() {
            mot.blend_exec();
        }
    }

    /// Recompute skeleton world matrices
    pub fn update_world(&mut self) {
        if let Some(mot) = self.motion.as_mut() {
            mot.calc_world();
        }
    }

    /// Copy the skeleton pose into the model's skin
    pub fn update_skin(&mut self) {
        if let Some(work) = self.model.as_mut() {
            work.set_pose(self.motion.as_ref());
        }
    }

    /// Recompute world bounds
    pub fn update_bounds(&mut self) {
        if let Some(work) = self.model.as_mut() {
            work.update_bounds();
        }
    }

    /// Default per-frame update
    ///
    /// With a motion: apply it, blend, compute world matrices and skin,
    /// running the blend and world hooks in between. Bounds are always
    /// recomputed.
    pub fn advance(&mut self, motion: Option<&Arc<MotionData>>, frame_add: f32) {
        if let Some(motion) = motion {
            self.exec_motion(motion, frame_add);
            if let Some(f) = self.callbacks.before_blend.clone() {
                f(self);
            }
            self.exec_motion_blend();
            if let Some(f) = self.callbacks.after_blend.clone() {
                f(self);
            }
            self.update_world();
            if let Some(f) = self.callbacks.world.clone() {
                f(self);
            }
            self.update_skin();
        }
        self.update_bounds();
    }

    /// Snapshot world transforms and bounds into the previous-frame slots
    pub fn copy_prev_state(&mut self) {
        if let Some(work) = self.model.as_mut() {
            work.copy_prev();
        }
        if let Some(mot) = self.motion.as_mut() {
            mot.copy_prev();
        }
    }

    /// Whole-object visibility update
    pub fn update_visibility(&mut self, params: &VisibilityParams) {
        visibility::update_object(self, params);
    }

    /// Single-batch visibility update
    pub fn update_batch_visibility(&mut self, ibat: usize, params: &VisibilityParams) {
        visibility::update_batch(self, ibat, params);
    }

    /// Skeleton node index by name
    pub fn find_skel_id(&self, name: &str) -> Option<usize> {
        self.model_data().and_then(|d| d.find_node(name))
    }

    /// Local matrix of skeleton node `iskl` (identity without a pose)
    pub fn skel_local_matrix(&self, iskl: usize) -> Mat4 {
        self.motion
            .as_ref()
            .and_then(|m| m.node_local(iskl))
            .map_or_else(Mat4::identity, Transform::to_matrix)
    }

    /// Local rest matrix of skeleton node `iskl`
    pub fn skel_local_rest_matrix(&self, iskl: usize) -> Mat4 {
        self.model_data()
            .and_then(|d| d.rest_local(iskl))
            .map_or_else(Mat4::identity, |t| t.to_matrix())
    }

    /// Previous-frame world matrix of skeleton node `iskl`
    pub fn skel_prev_world_matrix(&self, iskl: usize) -> Mat4 {
        self.motion
            .as_ref()
            .and_then(|m| m.prev_world_matrices().get(iskl).copied())
            .unwrap_or_else(Mat4::identity)
    }

    /// World matrix of skeleton node `iskl` computed from current locals
    pub fn calc_skel_world_matrix(&self, iskl: usize) -> Mat4 {
        self.motion
            .as_ref()
            .map_or_else(Mat4::identity, |m| m.calc_node_world(iskl))
    }

    /// Overwrite the local transform of skeleton node `iskl`
    pub fn set_skel_local_matrix(&mut self, iskl: usize, m: &Mat4) {
        if let Some(mot) = self.motion.as_mut() {
            mot.set_node_local(iskl, Transform::from_matrix(m));
        }
    }

    /// Set rotation and position of skeleton node `iskl`
    pub fn set_skel_local_quat_pos(&mut self, iskl: usize, rotation: Quat, position: Vec3) {
        if let Some(mot) = self.motion.as_mut() {
            let scale = mot.node_local(iskl).map_or_else(|| Vec3::repeat(1.0), |t| t.scale);
            mot.set_node_local(iskl, Transform { position, rotation, scale });
        }
    }

    /// Restore skeleton node `iskl` to its rest transform
    pub fn reset_skel_local(&mut self, iskl: usize) {
        if let Some(mot) = self.motion.as_mut() {
            mot.reset_node_local(iskl);
        }
    }

    /// Set the world placement
    ///
    /// Skinned objects keep their placement in the root node; the model
    /// placement is updated too so bounds follow before the next pose update.
    pub fn set_world_matrix(&mut self, m: &Mat4) {
        if let Some(mot) = self.motion.as_mut() {
            mot.set_root_local(Transform::from_matrix(m));
        }
        if let Some(work) = self.model.as_mut() {
            work.world = *m;
        }
    }

    /// Set world rotation and position
    pub fn set_world_quat_pos(&mut self, rotation: Quat, position: Vec3) {
        self.set_world_matrix(&Transform::from_position_rotation(position, rotation).to_matrix());
    }

    /// Set world position, keeping rotation
    pub fn set_world_pos(&mut self, position: Vec3) {
        let rotation = self.world_quat();
        self.set_world_quat_pos(rotation, position);
    }

    /// Current world placement
    pub fn world_matrix(&self) -> Mat4 {
        if let Some(mot) = self.motion.as_ref() {
            if mot.root_id().is_some() {
                return mot.root_local().to_matrix();
            }
        }
        self.model.as_ref().map_or_else(Mat4::identity, |w| w.world)
    }

    /// World position
    pub fn world_pos(&self) -> Vec3 {
        self.world_matrix().column(3).xyz()
    }

    /// World rotation
    pub fn world_quat(&self) -> Quat {
        Transform::from_matrix(&self.world_matrix()).rotation
    }

    /// Rotate about the world Y axis by `degrees`
    pub fn add_world_deg_y(&mut self, degrees: f32) {
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), utils::deg_to_rad(degrees)) * self.world_quat();
        let position = self.world_pos();
        self.set_world_quat_pos(rotation, position);
    }

    /// World bounds, or a point at the origin without a model
    pub fn world_bbox(&self) -> AABB {
        self.model
            .as_ref()
            .map_or_else(|| AABB::from_point(Vec3::zeros()), |w| *w.world_bbox())
    }

    /// Center: the `center` node when present, else the bounds center
    pub fn center_pos(&self) -> Vec3 {
        if let Some(mot) = self.motion.as_ref() {
            if let Some(center) = mot.center_id() {
                return mot.calc_node_world(center).column(3).xyz();
            }
        }
        self.world_bbox().center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::{box_model, walker_model, walk_motion};
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    #[test]
    fn test_priority_is_clamped() {
        let mut obj = SceneObject::new("p".to_string(), None);
        obj.set_priority(200);
        assert_eq!(obj.priority(), MAX_PRIORITY - 1);
    }

    #[test]
    fn test_scratch_slots() {
        let mut obj = SceneObject::new("wk".to_string(), None);
        obj.int_wk[3] = 7;
        obj.flt_wk[0] = 1.5;
        obj.set_ptr_wk(1, Arc::new(42u32));
        obj.set_ptr_wk(99, Arc::new(1u32));
        assert_eq!(obj.ptr_wk_as::<u32>(1), Some(&42));
        assert_eq!(obj.ptr_wk_as::<i64>(1), None);
        obj.clear_int_wk();
        obj.clear_flt_wk();
        obj.clear_ptr_wk();
        assert_eq!(obj.int_wk, [0; INT_WK_LEN]);
        assert_eq!(obj.flt_wk[0], 0.0);
        assert!(obj.ptr_wk_as::<u32>(1).is_none());
    }

    #[test]
    fn test_world_position_moves_bounds() {
        let mut obj = SceneObject::new("box".to_string(), Some(box_model()));
        obj.set_world_pos(Vec3::new(3.0, 0.0, 0.0));
        obj.advance(None, 0.0);
        assert_relative_eq!(obj.world_pos(), Vec3::new(3.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(obj.center_pos().x, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_advance_runs_hooks_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut obj = SceneObject::new("walker".to_string(), Some(walker_model()));
        let log = |tag: &'static str| -> ObjectFn {
            let order = Arc::clone(&order);
            Arc::new(move |_obj: &mut SceneObject| order.lock().unwrap().push(tag))
        };
        obj.callbacks.before_blend = Some(log("before_blend"));
        obj.callbacks.after_blend = Some(log("after_blend"));
        obj.callbacks.world = Some(log("world"));

        obj.advance(None, 1.0);
        assert!(order.lock().unwrap().is_empty());

        obj.advance(Some(&walk_motion()), 1.0);
        assert_eq!(*order.lock().unwrap(), vec!["before_blend", "after_blend", "world"]);
        assert_eq!(obj.current_motion_frame_count(), 4);
        assert_relative_eq!(obj.motion_frame(), 1.0);
    }

    #[test]
    fn test_skinned_world_placement() {
        let mut obj = SceneObject::new("walker".to_string(), Some(walker_model()));
        obj.set_world_pos(Vec3::new(0.0, 0.0, -4.0));
        obj.advance(Some(&walk_motion()), 1.0);
        assert_relative_eq!(obj.world_pos().z, -4.0, epsilon = 1e-6);
        assert_relative_eq!(obj.model().unwrap().world_bbox().center().z, -4.0, epsilon = 1e-4);
        let hip = obj.find_skel_id("hip").unwrap();
        assert_relative_eq!(obj.calc_skel_world_matrix(hip)[(2, 3)], -4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_copy_prev_state_is_idempotent() {
        let mut obj = SceneObject::new("walker".to_string(), Some(walker_model()));
        obj.set_world_pos(Vec3::new(1.0, 0.0, 0.0));
        obj.advance(Some(&walk_motion()), 1.0);
        obj.copy_prev_state();
        obj.copy_prev_state();
        let work = obj.model().unwrap();
        assert_eq!(work.prev_world(), &work.world);
        assert_eq!(work.prev_world_bbox(), work.world_bbox());
        let mot = obj.motion().unwrap();
        assert_eq!(mot.prev_world_matrices(), mot.world_matrices());
    }

    #[test]
    fn test_add_world_deg_y() {
        let mut obj = SceneObject::new("box".to_string(), Some(box_model()));
        obj.add_world_deg_y(90.0);
        let fwd = obj.world_matrix().transform_vector(&Vec3::z());
        assert_relative_eq!(fwd, Vec3::x(), epsilon = 1e-5);
    }
}
