//! # Draw Interface
//!
//! Abstraction between the scene pipeline and a GPU draw backend. The
//! pipeline decides *what* to draw and in which pass; the backend owns
//! command submission, shader programs and GPU buffers.
//!
//! [`NullDraw`] is a headless backend that only records the traffic it
//! receives. It is used when no backend is configured and by tests.

use std::sync::{Arc, Mutex, PoisonError};

use crate::assets::ResourceManager;
use crate::foundation::math::{Mat4, Mat4Ext, Vec4};
use crate::scene::context::DrawContext;
use crate::scene::model::{ModelData, ModelWork};

/// How a batch is rasterized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    /// Regular shaded draw
    Standard,
    /// Shaded draw with alpha-test discard
    AlphaDiscard,
    /// Depth-only draw into the shadow map
    ShadowCast,
}

/// Screen-space textured quad
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    /// Corner positions in reference-screen pixels
    pub pos: [[f32; 2]; 4],
    /// Corner texture coordinates
    pub tex: [[f32; 2]; 4],
    /// RGBA multiplier
    pub color: Vec4,
    /// Gamma applied to the sampled color
    pub gamma: f32,
    /// Width of the reference screen `pos` is expressed in
    pub ref_width: f32,
    /// Height of the reference screen `pos` is expressed in
    pub ref_height: f32,
    /// Texture name, `None` for a flat quad
    pub texture: Option<String>,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            pos: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            tex: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            color: Vec4::repeat(1.0),
            gamma: 1.0,
            ref_width: 640.0,
            ref_height: 480.0,
            texture: None,
        }
    }
}

/// Draw backend consumed by the pipeline
///
/// Calls arrive only from the driving thread. Backends report problems
/// through logging; a frame is never aborted.
pub trait DrawInterface: Send {
    /// Create backend resources for a `shadow_map_size` shadow map
    fn init(&mut self, shadow_map_size: u32, resources: Option<&dyn ResourceManager>);

    /// Release backend resources
    fn reset(&mut self);

    /// Current screen width in pixels
    fn screen_width(&self) -> u32;

    /// Current screen height in pixels
    fn screen_height(&self) -> u32;

    /// Matrix mapping shadow clip space to shadow-map texture space
    fn shadow_bias_matrix(&self) -> Mat4 {
        Mat4::texture_bias()
    }

    /// Start a frame, clearing to `clear_color`
    fn begin(&mut self, clear_color: Vec4);

    /// Finish the frame
    fn end(&mut self);

    /// Draw batch `ibat` of `work`
    fn batch(&mut self, work: &ModelWork, ibat: usize, mode: DrawMode, ctx: &DrawContext);

    /// Draw a screen-space sprite
    fn sprite(&mut self, sprite: &Sprite);

    /// Upload GPU resources for a model
    fn prepare_model(&mut self, _model: &ModelData) {}

    /// Release GPU resources of a model
    fn release_model(&mut self, _model: &ModelData) {}
}

/// One recorded batch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    /// Model name
    pub model: String,
    /// Batch index
    pub batch: usize,
    /// Draw mode
    pub mode: DrawMode,
}

/// Traffic recorded by [`NullDraw`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawLog {
    /// `init` calls
    pub inits: usize,
    /// `reset` calls
    pub resets: usize,
    /// `begin` calls
    pub begins: usize,
    /// `end` calls
    pub ends: usize,
    /// Batch calls since the last `begin`
    pub batches: Vec<BatchRecord>,
    /// Sprite calls since the last `begin`
    pub sprites: usize,
    /// Models currently prepared
    pub prepared_models: Vec<String>,
    /// Shadow map size passed to `init`
    pub shadow_map_size: u32,
}

impl DrawLog {
    /// Number of recorded batches drawn in `mode`
    pub fn count(&self, mode: DrawMode) -> usize {
        self.batches.iter().filter(|b| b.mode == mode).count()
    }
}

/// Shared view of a [`NullDraw`] log
pub type DrawLogHandle = Arc<Mutex<DrawLog>>;

/// Headless backend recording every call
#[derive(Debug)]
pub struct NullDraw {
    width: u32,
    height: u32,
    log: DrawLogHandle,
}

impl Default for NullDraw {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl NullDraw {
    /// Backend reporting a `width` x `height` screen
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            log: Arc::default(),
        }
    }

    /// Handle to the recorded traffic, usable after the backend is moved
    pub fn log_handle(&self) -> DrawLogHandle {
        Arc::clone(&self.log)
    }

    fn record(&self, f: impl FnOnce(&mut DrawLog)) {
        f(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl DrawInterface for NullDraw {
    fn init(&mut self, shadow_map_size: u32, _resources: Option<&dyn ResourceManager>) {
        self.record(|log| {
            log.inits += 1;
            log.shadow_map_size = shadow_map_size;
        });
    }

    fn reset(&mut self) {
        self.record(|log| {
            log.resets += 1;
            log.prepared_models.clear();
        });
    }

    fn screen_width(&self) -> u32 {
        self.width
    }

    fn screen_height(&self) -> u32 {
        self.height
    }

    fn begin(&mut self, _clear_color: Vec4) {
        self.record(|log| {
            log.begins += 1;
            log.batches.clear();
            log.sprites = 0;
        });
    }

    fn end(&mut self) {
        self.record(|log| log.ends += 1);
    }

    fn batch(&mut self, work: &ModelWork, ibat: usize, mode: DrawMode, _ctx: &DrawContext) {
        let model = work.data().name().to_string();
        self.record(|log| log.batches.push(BatchRecord { model, batch: ibat, mode }));
    }

    fn sprite(&mut self, _sprite: &Sprite) {
        self.record(|log| log.sprites += 1);
    }

    fn prepare_model(&mut self, model: &ModelData) {
        let name = model.name().to_string();
        self.record(|log| {
            if !log.prepared_models.contains(&name) {
                log.prepared_models.push(name);
            }
        });
    }

    fn release_model(&mut self, model: &ModelData) {
        self.record(|log| log.prepared_models.retain(|m| m != model.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::test_support::box_model;

    #[test]
    fn test_null_draw_records_frame() {
        let mut draw = NullDraw::new(800, 600);
        let log = draw.log_handle();
        draw.init(1024, None);
        draw.begin(Vec4::zeros());
        let work = ModelWork::new(box_model());
        let ctx = DrawContext::default();
        draw.batch(&work, 0, DrawMode::ShadowCast, &ctx);
        draw.batch(&work, 1, DrawMode::Standard, &ctx);
        draw.sprite(&Sprite::default());
        draw.end();

        let log = log.lock().unwrap();
        assert_eq!(log.shadow_map_size, 1024);
        assert_eq!((log.begins, log.ends, log.sprites), (1, 1, 1));
        assert_eq!(log.count(DrawMode::ShadowCast), 1);
        assert_eq!(log.batches[1], BatchRecord { model: "box".to_string(), batch: 1, mode: DrawMode::Standard });
        assert_eq!((draw.screen_width(), draw.screen_height()), (800, 600));
    }

    #[test]
    fn test_default_bias_maps_clip_to_texture() {
        let draw = NullDraw::default();
        let p = draw.shadow_bias_matrix() * Vec4::new(-1.0, 1.0, 0.5, 1.0);
        assert_eq!((p.x, p.y, p.z), (0.0, 1.0, 0.5));
    }
}
