//! Octree spatial partitioning structure
//!
//! Divides 3D space into hierarchical regions for fast range and segment
//! queries over static collision polygons. Each node subdivides into 8
//! octants when its entry count exceeds a threshold. Entries are stored by
//! center point and carry a bounding radius, so queries expand node bounds
//! by the largest radius in the tree.

use crate::foundation::math::Vec3;
use crate::geometry::AABB;

/// Configuration for octree behavior
#[derive(Debug, Clone)]
pub struct OctreeConfig {
    /// Maximum entries per node before subdivision
    pub max_entries_per_node: usize,

    /// Maximum subdivision depth
    pub max_depth: u32,

    /// Minimum node size (prevents excessive subdivision)
    pub min_node_size: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_entries_per_node: 8,
            max_depth: 8,
            min_node_size: 0.5,
        }
    }
}

/// Entry stored in the octree: an index with a bounding sphere
#[derive(Debug, Clone, Copy)]
pub struct OctreeEntry {
    /// Caller-defined index (polygon index for collision models)
    pub id: u32,
    /// Bounding sphere center
    pub position: Vec3,
    /// Bounding sphere radius
    pub radius: f32,
}

/// Single node in the octree hierarchy
#[derive(Debug, Clone)]
pub struct OctreeNode {
    /// World-space bounds of this node
    pub bounds: AABB,

    /// Entries contained in this node
    pub entries: Vec<OctreeEntry>,

    /// Child nodes (8 octants), None if this is a leaf
    pub children: Option<Box<[OctreeNode; 8]>>,

    /// Depth in the tree (0 = root)
    pub depth: u32,
}

impl OctreeNode {
    /// Create a new leaf node
    pub fn new(bounds: AABB, depth: u32) -> Self {
        Self {
            bounds,
            entries: Vec::new(),
            children: None,
            depth,
        }
    }

    /// Check if this node is a leaf (has no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    // Octant layout: bit 0 = +X, bit 1 = +Y, bit 2 = +Z
    fn octant_index(center: Vec3, position: Vec3) -> usize {
        let x_bit = usize::from(position.x >= center.x);
        let y_bit = usize::from(position.y >= center.y);
        let z_bit = usize::from(position.z >= center.z);
        (z_bit << 2) | (y_bit << 1) | x_bit
    }

    fn subdivide(&mut self) {
        if self.children.is_some() {
            return;
        }

        let center = self.bounds.center();
        let quarter_extents = self.bounds.extents() * 0.5;
        let depth = self.depth + 1;

        let children = std::array::from_fn(|octant| {
            let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
            let child_center = Vec3::new(
                center.x + quarter_extents.x * sign(1),
                center.y + quarter_extents.y * sign(2),
                center.z + quarter_extents.z * sign(4),
            );
            OctreeNode::new(AABB::from_center_extents(child_center, quarter_extents), depth)
        });
        let mut children: Box<[OctreeNode; 8]> = Box::new(children);

        for entry in std::mem::take(&mut self.entries) {
            children[Self::octant_index(center, entry.position)].entries.push(entry);
        }
        self.children = Some(children);
    }

    /// Insert an entry into this node
    pub fn insert(&mut self, entry: OctreeEntry, config: &OctreeConfig) -> bool {
        if !self.bounds.contains_point(entry.position) {
            return false;
        }

        if self.is_leaf() {
            let should_subdivide = self.entries.len() >= config.max_entries_per_node
                && self.depth < config.max_depth
                && self.bounds.extents().x > config.min_node_size;

            if !should_subdivide {
                self.entries.push(entry);
                return true;
            }
            self.subdivide();
        }

        let octant = Self::octant_index(self.bounds.center(), entry.position);
        match self.children {
            Some(ref mut children) => children[octant].insert(entry, config),
            None => false,
        }
    }

    /// Collect entries whose bounding sphere touches `range`
    pub fn query_aabb(&self, range: &AABB, max_entry_radius: f32, results: &mut Vec<OctreeEntry>) {
        let expansion = Vec3::repeat(max_entry_radius);
        let expanded = AABB::new(self.bounds.min - expansion, self.bounds.max + expansion);
        if !expanded.intersects(range) {
            return;
        }

        for entry in &self.entries {
            let closest = range.closest_point(entry.position);
            if (closest - entry.position).magnitude_squared() <= entry.radius * entry.radius {
                results.push(*entry);
            }
        }

        if let Some(ref children) = self.children {
            for child in children.iter() {
                child.query_aabb(range, max_entry_radius, results);
            }
        }
    }

    /// Collect entries in every node the segment `p0 -> p1` passes through
    pub fn query_segment(&self, p0: Vec3, p1: Vec3, max_entry_radius: f32, results: &mut Vec<OctreeEntry>) {
        let expansion = Vec3::repeat(max_entry_radius);
        let expanded = AABB::new(self.bounds.min - expansion, self.bounds.max + expansion);
        let dir = p1 - p0;
        match expanded.intersect_ray(p0, dir) {
            // `dir` is unnormalized, so the segment spans t in [0, 1]
            Some(t) if t <= 1.0 => {}
            _ => return,
        }

        results.extend_from_slice(&self.entries);

        if let Some(ref children) = self.children {
            for child in children.iter() {
                child.query_segment(p0, p1, max_entry_radius, results);
            }
        }
    }

    /// Count total entries in this node and all children
    pub fn count_entries(&self) -> usize {
        let mut count = self.entries.len();
        if let Some(ref children) = self.children {
            for child in children.iter() {
                count += child.count_entries();
            }
        }
        count
    }
}

/// Octree spatial partitioning structure
#[derive(Debug, Clone)]
pub struct Octree {
    /// Root node containing the entire indexed space
    pub root: OctreeNode,

    config: OctreeConfig,

    /// Largest entry radius, used to expand node bounds during queries
    max_entry_radius: f32,
}

impl Octree {
    /// Create a new octree with given world bounds
    pub fn new(world_bounds: AABB, config: OctreeConfig) -> Self {
        Self {
            root: OctreeNode::new(world_bounds, 0),
            config,
            max_entry_radius: 0.0,
        }
    }

    /// Insert an entry; returns false when its center lies outside the root bounds
    pub fn insert(&mut self, id: u32, position: Vec3, radius: f32) -> bool {
        if radius > self.max_entry_radius {
            self.max_entry_radius = radius;
        }
        self.root.insert(OctreeEntry { id, position, radius }, &self.config)
    }

    /// Entries whose bounding sphere touches `range`
    pub fn query_aabb(&self, range: &AABB, results: &mut Vec<OctreeEntry>) {
        self.root.query_aabb(range, self.max_entry_radius, results);
    }

    /// Candidate entries near the segment `p0 -> p1`
    ///
    /// Exact intersection must still be tested per entry.
    pub fn query_segment(&self, p0: Vec3, p1: Vec3, results: &mut Vec<OctreeEntry>) {
        self.root.query_segment(p0, p1, self.max_entry_radius, results);
    }

    /// Get total entry count
    pub fn entry_count(&self) -> usize {
        self.root.count_entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> AABB {
        AABB::new(Vec3::new(-100.0, -100.0, -100.0), Vec3::new(100.0, 100.0, 100.0))
    }

    #[test]
    fn test_octree_subdivision() {
        let config = OctreeConfig {
            max_entries_per_node: 4,
            max_depth: 3,
            min_node_size: 1.0,
        };
        let mut octree = Octree::new(world(), config);
        for id in 0..10 {
            octree.insert(id, Vec3::zeros(), 1.0);
        }
        assert_eq!(octree.entry_count(), 10);
        assert!(octree.root.children.is_some());
    }

    #[test]
    fn test_octree_aabb_query() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        octree.insert(0, Vec3::zeros(), 1.0);
        octree.insert(1, Vec3::new(5.0, 0.0, 0.0), 1.0);
        octree.insert(2, Vec3::new(50.0, 0.0, 0.0), 1.0);

        let mut results = Vec::new();
        octree.query_aabb(&AABB::from_sphere(Vec3::zeros(), 4.5), &mut results);
        let mut ids: Vec<u32> = results.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_octree_segment_query() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        octree.insert(7, Vec3::new(0.0, -1.0, 0.0), 2.0);
        let mut results = Vec::new();
        octree.query_segment(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -5.0, 0.0), &mut results);
        assert_eq!(results.len(), 1);

        results.clear();
        octree.query_segment(Vec3::new(500.0, 5.0, 0.0), Vec3::new(500.0, -5.0, 0.0), &mut results);
        assert!(results.is_empty());
    }
}
