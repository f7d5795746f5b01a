//! # Resource Manager
//!
//! Named packages of models, motions and collision models. The pipeline
//! looks resources up through the [`ResourceManager`] trait; how packages
//! are produced (file formats, streaming) is up to the implementation.
//!
//! [`MemoryResourceManager`] keeps packages that were assembled in code.

use std::collections::HashMap;
use std::sync::Arc;

use crate::physics::CollisionModel;
use crate::scene::model::ModelData;
use crate::scene::motion::MotionData;

/// Named bundle of resources loaded and unloaded together
#[derive(Debug, Clone, Default)]
pub struct Package {
    name: String,
    models: Vec<Arc<ModelData>>,
    motions: Vec<Arc<MotionData>>,
    collisions: Vec<Arc<CollisionModel>>,
}

impl Package {
    /// Empty package
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a model
    #[must_use]
    pub fn with_model(mut self, model: ModelData) -> Self {
        self.models.push(Arc::new(model));
        self
    }

    /// Add a motion
    #[must_use]
    pub fn with_motion(mut self, motion: MotionData) -> Self {
        self.motions.push(Arc::new(motion));
        self
    }

    /// Add a collision model
    #[must_use]
    pub fn with_collision(mut self, collision: CollisionModel) -> Self {
        self.collisions.push(Arc::new(collision));
        self
    }

    /// Package name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Models in insertion order
    pub fn models(&self) -> &[Arc<ModelData>] {
        &self.models
    }

    /// Motions in insertion order
    pub fn motions(&self) -> &[Arc<MotionData>] {
        &self.motions
    }

    /// Collision models in insertion order
    pub fn collisions(&self) -> &[Arc<CollisionModel>] {
        &self.collisions
    }

    /// Model called `name`
    pub fn find_model(&self, name: &str) -> Option<&Arc<ModelData>> {
        self.models.iter().find(|m| m.name() == name)
    }

    /// Motion called `name`
    pub fn find_motion(&self, name: &str) -> Option<&Arc<MotionData>> {
        self.motions.iter().find(|m| m.name() == name)
    }

    /// Collision model called `name`
    pub fn find_collision(&self, name: &str) -> Option<&Arc<CollisionModel>> {
        self.collisions.iter().find(|c| c.name() == name)
    }
}

/// Package store consumed by the pipeline
///
/// Lookups never fail loudly: a miss is `None`.
pub trait ResourceManager: Send {
    /// Register a package, replacing one with the same name
    fn load_pkg(&mut self, pkg: Package) -> Arc<Package>;

    /// Package called `name`
    fn find_pkg(&self, name: &str) -> Option<Arc<Package>>;

    /// Drop the package called `name`; false if it was not loaded
    fn unload_pkg(&mut self, name: &str) -> bool;

    /// Drop every package
    fn unload_all(&mut self);

    /// Loaded packages in load order
    fn packages(&self) -> Vec<Arc<Package>>;

    /// First model called `name` across packages in load order
    fn find_model(&self, name: &str) -> Option<Arc<ModelData>> {
        self.packages().iter().find_map(|p| p.find_model(name).cloned())
    }

    /// First motion called `name` across packages in load order
    fn find_motion(&self, name: &str) -> Option<Arc<MotionData>> {
        self.packages().iter().find_map(|p| p.find_motion(name).cloned())
    }

    /// First collision model called `name` across packages in load order
    fn find_collision(&self, name: &str) -> Option<Arc<CollisionModel>> {
        self.packages().iter().find_map(|p| p.find_collision(name).cloned())
    }
}

/// In-memory package store
#[derive(Debug, Default)]
pub struct MemoryResourceManager {
    packages: HashMap<String, Arc<Package>>,
    order: Vec<String>,
}

impl MemoryResourceManager {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceManager for MemoryResourceManager {
    fn load_pkg(&mut self, pkg: Package) -> Arc<Package> {
        let name = pkg.name().to_string();
        let pkg = Arc::new(pkg);
        if self.packages.insert(name.clone(), Arc::clone(&pkg)).is_some() {
            log::warn!("Package '{}' reloaded", name);
        } else {
            self.order.push(name.clone());
        }
        log::info!(
            "Loaded package '{}': {} models, {} motions, {} collisions",
            name,
            pkg.models().len(),
            pkg.motions().len(),
            pkg.collisions().len()
        );
        pkg
    }

    fn find_pkg(&self, name: &str) -> Option<Arc<Package>> {
        self.packages.get(name).cloned()
    }

    fn unload_pkg(&mut self, name: &str) -> bool {
        if self.packages.remove(name).is_none() {
            return false;
        }
        self.order.retain(|n| n != name);
        log::info!("Unloaded package '{}'", name);
        true
    }

    fn unload_all(&mut self) {
        self.packages.clear();
        self.order.clear();
        log::info!("Unloaded all packages");
    }

    fn packages(&self) -> Vec<Arc<Package>> {
        self.order
            .iter()
            .filter_map(|n| self.packages.get(n).cloned())
            .collect()
    }
}
