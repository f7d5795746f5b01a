//! Model data and per-object model work state
//!
//! [`ModelData`] is immutable and shared between every object that uses it.
//! [`ModelWork`] is the per-object part: world placement, skin pose, world
//! bounds, and the per-batch visibility bits written by the visibility pass.

use std::collections::HashMap;
use std::sync::Arc;

use crate::foundation::collections::BitArray;
use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::geometry::{Frustum, AABB};

use super::motion::MotionWork;

/// Batch material description
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Drawn in the semi-transparent pass
    pub alpha: bool,
}

impl Material {
    /// Opaque material
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alpha: false,
        }
    }

    /// Alpha-blended material
    pub fn alpha(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alpha: true,
        }
    }
}

/// Drawable sub-range of a model sharing one material
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBatch {
    /// Batch material
    pub material: Material,
    /// Model-space bounds
    pub bbox: AABB,
}

/// Skeleton node in rest pose
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonNode {
    /// Node name
    pub name: String,
    /// Parent node index, `None` for roots
    pub parent: Option<usize>,
    /// Local rest transform
    pub rest: Transform,
}

/// Immutable model description
#[derive(Debug, Clone)]
pub struct ModelData {
    name: String,
    nodes: Vec<SkeletonNode>,
    batches: Vec<ModelBatch>,
    bbox: AABB,
    node_map: HashMap<String, usize>,
}

impl ModelData {
    /// Build a model; nodes must list parents before children
    pub fn new(name: impl Into<String>, nodes: Vec<SkeletonNode>, batches: Vec<ModelBatch>) -> Self {
        let mut bbox = batches.first().map_or_else(AABB::default, |b| b.bbox);
        for batch in &batches {
            bbox.merge(&batch.bbox);
        }
        let node_map = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.name.clone(), idx))
            .collect();
        Self {
            name: name.into(),
            nodes,
            batches,
            bbox,
            node_map,
        }
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Skeleton nodes
    pub fn nodes(&self) -> &[SkeletonNode] {
        &self.nodes
    }

    /// Render batches
    pub fn batches(&self) -> &[ModelBatch] {
        &self.batches
    }

    /// Number of render batches
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Model-space bounds of every batch
    pub fn bbox(&self) -> &AABB {
        &self.bbox
    }

    /// True when the model has a skeleton
    pub fn has_skeleton(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Index of the node called `name`
    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.node_map.get(name).copied()
    }

    /// Local rest transform of node `idx`
    pub fn rest_local(&self, idx: usize) -> Option<Transform> {
        self.nodes.get(idx).map(|n| n.rest)
    }

    /// Model-space rest matrix of node `idx`
    pub fn rest_world(&self, idx: usize) -> Mat4 {
        let mut m = Mat4::identity();
        let mut cur = Some(idx);
        while let Some(i) = cur {
            let Some(node) = self.nodes.get(i) else { break };
            m = node.rest.to_matrix() * m;
            cur = node.parent;
        }
        m
    }
}

/// Draw parameters carried per object and read by the draw backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    /// Base color multiplier
    pub base_color_scale: Vec3,
    /// Shadow lookup offset bias
    pub shadow_offset_bias: f32,
    /// Shadow weight bias
    pub shadow_weight_bias: f32,
    /// Receives shadows from other objects
    pub shadow_receive: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            base_color_scale: Vec3::repeat(1.0),
            shadow_offset_bias: 0.0,
            shadow_weight_bias: 0.0,
            shadow_receive: true,
        }
    }
}

/// Per-object model state
#[derive(Debug, Clone)]
pub struct ModelWork {
    data: Arc<ModelData>,
    /// Placement used when the object has no motion binding
    pub world: Mat4,
    prev_world: Mat4,
    skin: Vec<Mat4>,
    world_bbox: AABB,
    prev_world_bbox: AABB,
    batch_bboxes: Vec<AABB>,
    cull_bits: BitArray,
    cast_cull_bits: BitArray,
    /// Backend draw parameters
    pub params: ModelParams,
}

impl ModelWork {
    /// Create work state for `data` at the origin
    pub fn new(data: Arc<ModelData>) -> Self {
        let nbat = data.batch_count();
        let skin = (0..data.nodes().len()).map(|i| data.rest_world(i)).collect();
        let batch_bboxes = data.batches().iter().map(|b| b.bbox).collect();
        let world_bbox = *data.bbox();
        Self {
            data,
            world: Mat4::identity(),
            prev_world: Mat4::identity(),
            skin,
            world_bbox,
            prev_world_bbox: world_bbox,
            batch_bboxes,
            cull_bits: BitArray::new(nbat),
            cast_cull_bits: BitArray::new(nbat),
            params: ModelParams::default(),
        }
    }

    /// Shared model data
    pub fn data(&self) -> &Arc<ModelData> {
        &self.data
    }

    /// Number of batches
    pub fn batch_count(&self) -> usize {
        self.batch_bboxes.len()
    }

    /// Previous-frame placement
    pub fn prev_world(&self) -> &Mat4 {
        &self.prev_world
    }

    /// Current skin pose, one model-to-world matrix per skeleton node
    pub fn skin(&self) -> &[Mat4] {
        &self.skin
    }

    /// World-space bounds
    pub fn world_bbox(&self) -> &AABB {
        &self.world_bbox
    }

    /// Previous-frame world-space bounds
    pub fn prev_world_bbox(&self) -> &AABB {
        &self.prev_world_bbox
    }

    /// World-space bounds of batch `ibat`
    pub fn batch_bbox(&self, ibat: usize) -> Option<&AABB> {
        self.batch_bboxes.get(ibat)
    }

    /// View cull bits, set for batches outside the view frustum
    pub fn cull_bits(&self) -> &BitArray {
        &self.cull_bits
    }

    /// Shadow-cast cull bits, set for batches that cast no visible shadow
    pub fn cast_cull_bits(&self) -> &BitArray {
        &self.cast_cull_bits
    }

    pub(crate) fn cast_cull_bits_mut(&mut self) -> &mut BitArray {
        &mut self.cast_cull_bits
    }

    /// True when batch `ibat` was culled from the view
    pub fn is_batch_culled(&self, ibat: usize) -> bool {
        self.cull_bits.test(ibat)
    }

    /// True when batch `ibat` was culled from the shadow pass
    pub fn is_batch_cast_culled(&self, ibat: usize) -> bool {
        self.cast_cull_bits.test(ibat)
    }

    /// Snapshot placement and bounds into the previous-frame slots
    pub fn copy_prev(&mut self) {
        self.prev_world = self.world;
        self.prev_world_bbox = self.world_bbox;
    }

    /// Take the skin pose from `motion`, or derive it from the rest pose
    pub fn set_pose(&mut self, motion: Option<&MotionWork>) {
        match motion {
            Some(mot) if mot.node_count() == self.skin.len() => {
                self.skin.copy_from_slice(mot.world_matrices());
                if let Some(root) = mot.root_id() {
                    self.world = mot.world_matrices()[root];
                }
            }
            _ => {
                for (i, m) in self.skin.iter_mut().enumerate() {
                    *m = self.world * self.data.rest_world(i);
                }
            }
        }
    }

    /// Recompute batch and object bounds from the current placement
    pub fn update_bounds(&mut self) {
        for (dst, batch) in self.batch_bboxes.iter_mut().zip(self.data.batches()) {
            *dst = batch.bbox.transformed(&self.world);
        }
        let mut iter = self.batch_bboxes.iter();
        if let Some(first) = iter.next() {
            let mut bbox = *first;
            for b in iter {
                bbox.merge(b);
            }
            self.world_bbox = bbox;
        } else {
            self.world_bbox = self.data.bbox().transformed(&self.world);
        }
    }

    /// Cull the whole object, falling back to per-batch tests when it is
    /// at least partly inside the frustum
    pub fn frustum_cull(&mut self, frustum: &Frustum) {
        if frustum.cull_aabb(&self.world_bbox) {
            self.cull_bits.set_all();
            return;
        }
        for (i, bbox) in self.batch_bboxes.iter().enumerate() {
            self.cull_bits.assign(i, frustum.cull_aabb(bbox));
        }
    }

    /// Cull a single batch
    pub fn calc_batch_visibility(&mut self, frustum: &Frustum, ibat: usize) {
        if let Some(bbox) = self.batch_bboxes.get(ibat) {
            let culled = frustum.cull_aabb(bbox);
            self.cull_bits.assign(ibat, culled);
        }
    }
}
