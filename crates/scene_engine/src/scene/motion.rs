//! Keyframed skeletal motion
//!
//! [`MotionData`] holds one keyframe per frame for each animated node.
//! [`MotionWork`] is the per-object pose: local node transforms, their
//! world matrices, the previous frame's world matrices and the blend state
//! used for cross-fading between motions.
//!
//! The root node's local transform is the object's world placement; motion
//! tracks never overwrite it.

use std::sync::Arc;

use crate::foundation::math::{Mat4, Transform};

use super::model::ModelData;

/// Keyframes for a single skeleton node
#[derive(Debug, Clone, PartialEq)]
pub struct MotionTrack {
    /// Name of the animated node
    pub node: String,
    /// One local transform per frame
    pub keys: Vec<Transform>,
}

/// Named set of node tracks
#[derive(Debug, Clone, PartialEq)]
pub struct MotionData {
    name: String,
    frame_count: usize,
    tracks: Vec<MotionTrack>,
}

impl MotionData {
    /// Build a motion; the frame count is the longest track's key count
    pub fn new(name: impl Into<String>, tracks: Vec<MotionTrack>) -> Self {
        let frame_count = tracks.iter().map(|t| t.keys.len()).max().unwrap_or(0);
        Self {
            name: name.into(),
            frame_count,
            tracks,
        }
    }

    /// Motion name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Node tracks
    pub fn tracks(&self) -> &[MotionTrack] {
        &self.tracks
    }

    /// Interpolated pose of `track` at `frame`, clamped to the track's range
    pub fn sample(&self, track: &MotionTrack, frame: f32) -> Option<Transform> {
        let last = track.keys.len().checked_sub(1)?;
        let frame = frame.clamp(0.0, last as f32);
        let i0 = (frame.floor() as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let t = frame - i0 as f32;
        Some(track.keys[i0].interpolate(&track.keys[i1], t))
    }
}

/// Per-object skeletal pose state
#[derive(Debug, Clone)]
pub struct MotionWork {
    model: Arc<ModelData>,
    local: Vec<Transform>,
    world: Vec<Mat4>,
    prev_world: Vec<Mat4>,
    blend_src: Vec<Transform>,
    blend_duration: u32,
    blend_count: u32,
    current: Option<Arc<MotionData>>,
    frame: f32,
    root_id: Option<usize>,
    center_id: Option<usize>,
}

impl MotionWork {
    /// Pose work for `model`; `None` when the model has no skeleton
    pub fn new(model: Arc<ModelData>) -> Option<Self> {
        if !model.has_skeleton() {
            return None;
        }
        let local: Vec<Transform> = model.nodes().iter().map(|n| n.rest).collect();
        let world: Vec<Mat4> = (0..local.len()).map(|i| model.rest_world(i)).collect();
        let root_id = model.nodes().iter().position(|n| n.parent.is_none());
        let center_id = model.find_node("center");
        Some(Self {
            model,
            blend_src: local.clone(),
            local,
            prev_world: world.clone(),
            world,
            blend_duration: 0,
            blend_count: 0,
            current: None,
            frame: 0.0,
            root_id,
            center_id,
        })
    }

    /// Number of skeleton nodes
    pub fn node_count(&self) -> usize {
        self.local.len()
    }

    /// Root node index
    pub fn root_id(&self) -> Option<usize> {
        self.root_id
    }

    /// Index of the node named `center`, if the model has one
    pub fn center_id(&self) -> Option<usize> {
        self.center_id
    }

    /// Motion applied most recently
    pub fn current_motion(&self) -> Option<&Arc<MotionData>> {
        self.current.as_ref()
    }

    /// Current playback frame
    pub fn frame(&self) -> f32 {
        self.frame
    }

    /// Set the playback frame
    pub fn set_frame(&mut self, frame: f32) {
        self.frame = frame;
    }

    /// World matrices computed by the last [`MotionWork::calc_world`]
    pub fn world_matrices(&self) -> &[Mat4] {
        &self.world
    }

    /// Previous-frame world matrices
    pub fn prev_world_matrices(&self) -> &[Mat4] {
        &self.prev_world
    }

    /// Local transform of node `idx`
    pub fn node_local(&self, idx: usize) -> Option<&Transform> {
        self.local.get(idx)
    }

    /// Overwrite the local transform of node `idx`
    pub fn set_node_local(&mut self, idx: usize, xform: Transform) {
        if let Some(dst) = self.local.get_mut(idx) {
            *dst = xform;
        }
    }

    /// Restore node `idx` to its rest transform
    pub fn reset_node_local(&mut self, idx: usize) {
        if let Some(rest) = self.model.rest_local(idx) {
            self.set_node_local(idx, rest);
        }
    }

    /// World placement stored in the root node
    pub fn root_local(&self) -> Transform {
        self.root_id
            .and_then(|r| self.local.get(r).copied())
            .unwrap_or_default()
    }

    /// Set the world placement stored in the root node
    pub fn set_root_local(&mut self, xform: Transform) {
        if let Some(root) = self.root_id {
            self.set_node_local(root, xform);
        }
    }

    /// Pose every tracked node from `motion` at the current frame, then advance
    /// the frame by `frame_add`, wrapping at the motion's end
    pub fn apply_motion(&mut self, motion: &Arc<MotionData>, frame_add: f32) {
        let switched = self.current.as_ref().map_or(true, |cur| !Arc::ptr_eq(cur, motion));
        if switched {
            self.current = Some(Arc::clone(motion));
            self.frame = 0.0;
        }
        let nframes = motion.frame_count() as f32;
        if nframes > 0.0 {
            self.frame = self.frame.rem_euclid(nframes);
        }
        for track in motion.tracks() {
            let Some(idx) = self.model.find_node(&track.node) else { continue };
            if Some(idx) == self.root_id {
                continue;
            }
            if let Some(pose) = motion.sample(track, self.frame) {
                self.local[idx] = pose;
            }
        }
        self.frame += frame_add;
        if nframes > 0.0 && self.frame >= nframes {
            self.frame = self.frame.rem_euclid(nframes);
        }
    }

    /// Start cross-fading from the current pose over `duration` frames
    pub fn blend_init(&mut self, duration: u32) {
        self.blend_src.clone_from(&self.local);
        self.blend_duration = duration;
        self.blend_count = duration;
    }

    /// Blend the freshly applied pose with the saved one
    pub fn blend_exec(&mut self) {
        if self.blend_count == 0 || self.blend_duration == 0 {
            return;
        }
        self.blend_count -= 1;
        let t = 1.0 - self.blend_count as f32 / self.blend_duration as f32;
        for (idx, (dst, src)) in self.local.iter_mut().zip(&self.blend_src).enumerate() {
            if Some(idx) != self.root_id {
                *dst = src.interpolate(dst, t);
            }
        }
    }

    /// True while a blend is in progress
    pub fn is_blending(&self) -> bool {
        self.blend_count > 0
    }

    /// Recompute world matrices from local transforms
    pub fn calc_world(&mut self) {
        for idx in 0..self.local.len() {
            let local = self.local[idx].to_matrix();
            self.world[idx] = match self.model.nodes()[idx].parent {
                Some(parent) if parent < idx => self.world[parent] * local,
                _ => local,
            };
        }
    }

    /// World matrix of node `idx` computed directly from local transforms
    pub fn calc_node_world(&self, idx: usize) -> Mat4 {
        let mut m = Mat4::identity();
        let mut cur = Some(idx);
        while let Some(i) = cur {
            let Some(local) = self.local.get(i) else { break };
            m = local.to_matrix() * m;
            cur = self.model.nodes()[i].parent;
        }
        m
    }

    /// Snapshot world matrices into the previous-frame slots
    pub fn copy_prev(&mut self) {
        self.prev_world.clone_from(&self.world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Quat, Vec3};
    use crate::scene::model::SkeletonNode;
    use approx::assert_relative_eq;

    fn arm_model() -> Arc<ModelData> {
        Arc::new(ModelData::new(
            "arm",
            vec![
                SkeletonNode {
                    name: "root".to_string(),
                    parent: None,
                    rest: Transform::identity(),
                },
                SkeletonNode {
                    name: "hand".to_string(),
                    parent: Some(0),
                    rest: Transform::from_position_rotation(Vec3::new(0.0, 1.0, 0.0), Quat::identity()),
                },
            ],
            Vec::new(),
        ))
    }

    fn slide_motion() -> Arc<MotionData> {
        let key = |x: f32| Transform::from_position_rotation(Vec3::new(x, 1.0, 0.0), Quat::identity());
        Arc::new(MotionData::new(
            "slide",
            vec![MotionTrack {
                node: "hand".to_string(),
                keys: vec![key(0.0), key(1.0), key(2.0), key(3.0)],
            }],
        ))
    }

    #[test]
    fn test_no_skeleton_has_no_motion_work() {
        let model = Arc::new(ModelData::new("flat", Vec::new(), Vec::new()));
        assert!(MotionWork::new(model).is_none());
    }

    #[test]
    fn test_sample_interpolates() {
        let motion = slide_motion();
        let pose = motion.sample(&motion.tracks()[0], 1.5).unwrap();
        assert_relative_eq!(pose.position.x, 1.5, epsilon = 1e-6);
        let clamped = motion.sample(&motion.tracks()[0], 10.0).unwrap();
        assert_relative_eq!(clamped.position.x, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_apply_motion_advances_and_wraps() {
        let mut work = MotionWork::new(arm_model()).unwrap();
        let motion = slide_motion();
        work.apply_motion(&motion, 1.0);
        assert_relative_eq!(work.node_local(1).unwrap().position.x, 0.0);
        work.apply_motion(&motion, 1.0);
        assert_relative_eq!(work.node_local(1).unwrap().position.x, 1.0);
        work.apply_motion(&motion, 2.5);
        assert_relative_eq!(work.frame(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_world_follows_root() {
        let mut work = MotionWork::new(arm_model()).unwrap();
        work.set_root_local(Transform::from_position_rotation(Vec3::new(5.0, 0.0, 0.0), Quat::identity()));
        work.calc_world();
        let hand = work.world_matrices()[1];
        assert_relative_eq!(hand[(0, 3)], 5.0, epsilon = 1e-6);
        assert_relative_eq!(hand[(1, 3)], 1.0, epsilon = 1e-6);
        assert_relative_eq!(work.calc_node_world(1), hand, epsilon = 1e-6);
    }

    #[test]
    fn test_blend_reaches_target() {
        let mut work = MotionWork::new(arm_model()).unwrap();
        let motion = slide_motion();
        work.set_frame(0.0);
        work.blend_init(2);
        work.apply_motion(&motion, 0.0);
        work.set_node_local(1, motion.sample(&motion.tracks()[0], 2.0).unwrap());
        work.blend_exec();
        assert_relative_eq!(work.node_local(1).unwrap().position.x, 1.0, epsilon = 1e-5);
        assert!(work.is_blending());
        work.set_node_local(1, motion.sample(&motion.tracks()[0], 2.0).unwrap());
        work.blend_exec();
        assert_relative_eq!(work.node_local(1).unwrap().position.x, 2.0, epsilon = 1e-5);
        assert!(!work.is_blending());
    }
}
