//! # Scene Configuration
//!
//! Startup parameters for the scene pipeline: worker pool size, scratch heap
//! size, visibility granularity and the initial camera/shadow setup.
//!
//! Every field has a default, so a configuration file only needs to list the
//! values it overrides:
//!
//! ```toml
//! num_workers = 8
//!
//! [shadow]
//! uniform = false
//! view_size = 40.0
//! ```

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Shadow Configuration
///
/// Initial shadow-fit parameters. `view_size`, `view_dist` and `margin` feed
/// the uniform fit directly; the perspective fit only uses `view_dist` and
/// `margin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Use the uniform (fixed box) fit instead of the perspective fit
    pub uniform: bool,
    /// Half-size of the uniform shadow box
    pub view_size: f32,
    /// Distance covered past the view target
    pub view_dist: f32,
    /// Extra distance behind the receivers along the light direction
    pub margin: f32,
    /// Shadow density
    pub density: f32,
    /// Density bias
    pub density_bias: f32,
    /// Distance where shadows begin to fade
    pub fade_start: f32,
    /// Distance where shadows are fully faded (0 disables fading)
    pub fade_end: f32,
    /// Light direction as (pitch, yaw) degrees applied to +Z
    pub dir_degrees: [f32; 2],
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            uniform: true,
            view_size: 30.0,
            view_dist: 50.0,
            margin: 30.0,
            density: 1.0,
            density_bias: 0.0,
            fade_start: 0.0,
            fade_end: 0.0,
            dir_degrees: [70.0, 140.0],
        }
    }
}

/// # View Configuration
///
/// Initial camera placement and projection range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Eye position
    pub position: [f32; 3],
    /// Look-at target
    pub target: [f32; 3],
    /// Up vector
    pub up: [f32; 3],
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
    /// Vertical field of view in degrees
    pub fovy_degrees: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            position: [0.75, 1.3, 3.5],
            target: [0.0, 0.95, 0.0],
            up: [0.0, 1.0, 0.0],
            near: 0.1,
            far: 1000.0,
            fovy_degrees: 30.0,
        }
    }
}

/// # Scene Configuration
///
/// Top-level configuration consumed by `ScenePipeline::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Shadow map resolution passed to the draw interface
    pub shadow_map_size: u32,
    /// Worker threads; zero runs every job on the driving thread
    pub num_workers: usize,
    /// Bytes per worker scratch heap; zero makes the heaps growable
    pub local_heap_size: usize,
    /// Submit one visibility job per batch instead of one per object
    pub visibility_per_batch: bool,
    /// Enable shadow-cast culling of batches outside the shadow frustum
    pub shadow_cast_cull: bool,
    /// Initial shadow parameters
    pub shadow: ShadowConfig,
    /// Initial view parameters
    pub view: ViewConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            shadow_map_size: 2048,
            num_workers: 4,
            local_heap_size: 0,
            visibility_per_batch: true,
            shadow_cast_cull: true,
            shadow: ShadowConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Validate ranges that would otherwise produce degenerate matrices
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shadow_map_size == 0 {
            return Err(ConfigError::Invalid("shadow_map_size must be positive".to_string()));
        }
        if !(self.view.near > 0.0 && self.view.far > self.view.near) {
            return Err(ConfigError::Invalid(format!(
                "view range must satisfy 0 < near < far (near {}, far {})",
                self.view.near, self.view.far
            )));
        }
        if !(self.view.fovy_degrees > 0.0 && self.view.fovy_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "fovy_degrees out of range: {}",
                self.view.fovy_degrees
            )));
        }
        Ok(())
    }
}

impl Config for SceneConfig {}
