//! Draw context and its lazily refreshed cache
//!
//! [`DrawContext`] is what the draw backend sees for every batch: the view
//! and shadow state plus lighting, fog and colour correction. [`ContextCache`] owns the current context, the dirty
//! flags that trigger recomputation, the shadow-fit parameters and a small
//! save/restore stack.

use crate::core::config::SceneConfig;
use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::AABB;

use super::lighting::{ColorCorrection, Fog, HemiLight, SpecLight};
use super::shadow::{ShadowContext, ShadowFit};
use super::view::ViewContext;

/// Depth of the push/pop stack
pub const CONTEXT_STACK_DEPTH: usize = 4;

/// State handed to the draw backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawContext {
    /// Camera state
    pub view: ViewContext,
    /// Shadow state
    pub shadow: ShadowContext,
    /// Ambient light
    pub hemi: HemiLight,
    /// Specular light
    pub spec: SpecLight,
    /// Distance fog
    pub fog: Fog,
    /// Colour correction
    pub cc: ColorCorrection,
}

impl DrawContext {
    /// Context from configuration
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            view: ViewContext::from_config(&config.view),
            shadow: ShadowContext::from_config(&config.shadow),
            ..Self::default()
        }
    }

    /// Set the sky colour of the ambient light
    pub fn set_hemi_upper(&mut self, rgb: Vec3) {
        self.hemi.upper = rgb;
    }

    /// Set the ground colour of the ambient light
    pub fn set_hemi_lower(&mut self, rgb: Vec3) {
        self.hemi.lower = rgb;
    }

    /// Flat ambient light
    pub fn set_hemi_const(&mut self, rgb: Vec3) {
        self.hemi.set_const(rgb);
    }

    /// Set the ambient sky direction
    pub fn set_hemi_up(&mut self, up: Vec3) {
        self.hemi.set_up(up);
    }

    /// Set the ambient blend exponent
    pub fn set_hemi_exp(&mut self, exp: f32) {
        self.hemi.exp = exp;
    }

    /// Set the ambient gain
    pub fn set_hemi_gain(&mut self, gain: f32) {
        self.hemi.gain = gain;
    }

    /// Set the specular light direction
    pub fn set_spec_dir(&mut self, dir: Vec3) {
        self.spec.set_dir(dir);
    }

    /// Point the specular light along the shadow light
    pub fn set_spec_dir_to_shadow(&mut self) {
        self.spec.set_dir(self.shadow.dir());
    }

    /// Set the specular colour
    pub fn set_spec_rgb(&mut self, rgb: Vec3) {
        self.spec.rgb = rgb;
    }

    /// Set the fog colour
    pub fn set_fog_rgb(&mut self, rgb: Vec3) {
        self.fog.rgb = rgb;
    }

    /// Set the fog density
    pub fn set_fog_density(&mut self, density: f32) {
        self.fog.set_density(density);
    }

    /// Set the fog start and end distances
    pub fn set_fog_range(&mut self, start: f32, end: f32) {
        self.fog.set_range(start, end);
    }

    /// Set the fog falloff curve
    pub fn set_fog_curve(&mut self, cp1: f32, cp2: f32) {
        self.fog.set_curve(cp1, cp2);
    }

    /// Set gamma on all channels
    pub fn set_gamma(&mut self, gamma: f32) {
        self.cc.set_gamma_rgb(Vec3::repeat(gamma));
    }

    /// Set exposure on all channels
    pub fn set_exposure(&mut self, exposure: f32) {
        self.cc.exposure = Vec3::repeat(exposure);
    }

    /// Set the linear white point on all channels
    pub fn set_linear_white(&mut self, white: f32) {
        self.cc.linear_white = Vec3::repeat(white);
    }

    /// Set the linear gain on all channels
    pub fn set_linear_gain(&mut self, gain: f32) {
        self.cc.linear_gain = Vec3::repeat(gain);
    }

    /// Set the linear bias on all channels
    pub fn set_linear_bias(&mut self, bias: f32) {
        self.cc.linear_bias = Vec3::repeat(bias);
    }

    /// False when the box lies past the shadow fade end as seen from the viewer
    pub fn receives_shadow(&self, bbox: &AABB) -> bool {
        let (start, end) = (self.shadow.fade_start(), self.shadow.fade_end());
        if end > 0.0 && end > start {
            let vpos = self.view.position();
            let npos = bbox.closest_point(vpos);
            return (npos - vpos).norm() <= end;
        }
        true
    }
}

/// Current draw context with dirty tracking
///
/// Camera setters dirty both the view and the shadow; light and fit setters
/// dirty only the shadow. [`ContextCache::refresh`] recomputes whatever is
/// dirty. Only the driving thread mutates the cache.
#[derive(Debug, Clone)]
pub struct ContextCache {
    ctx: DrawContext,
    stack: Vec<DrawContext>,
    fit: ShadowFit,
    view_dirty: bool,
    shadow_dirty: bool,
}

impl ContextCache {
    /// Cache initialized from configuration, fully dirty
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            ctx: DrawContext::from_config(config),
            stack: Vec::with_capacity(CONTEXT_STACK_DEPTH),
            fit: ShadowFit::from_config(&config.shadow),
            view_dirty: true,
            shadow_dirty: true,
        }
    }

    /// Context as last refreshed
    pub fn current(&self) -> &DrawContext {
        &self.ctx
    }

    /// Lighting, fog and colour-correction access
    ///
    /// These values do not feed the fit, so nothing is marked dirty. Camera
    /// and shadow-light changes must go through the cache setters instead.
    pub fn params_mut(&mut self) -> &mut DrawContext {
        &mut self.ctx
    }

    /// Shadow-fit parameters
    pub fn shadow_fit(&self) -> &ShadowFit {
        &self.fit
    }

    /// Pending view recomputation
    pub fn is_view_dirty(&self) -> bool {
        self.view_dirty
    }

    /// Pending shadow recomputation
    pub fn is_shadow_dirty(&self) -> bool {
        self.shadow_dirty
    }

    /// Recompute dirty state for a `width` x `height` screen and return the context
    pub fn refresh(&mut self, width: u32, height: u32, shadow_bias: &Mat4) -> &DrawContext {
        if self.view_dirty {
            self.ctx.view.update(width, height);
            self.view_dirty = false;
        }
        if self.shadow_dirty {
            let view_proj = self.fit.fit(&self.ctx.view, self.ctx.shadow.dir());
            self.ctx.shadow.set_matrices(view_proj, shadow_bias);
            self.shadow_dirty = false;
        }
        &self.ctx
    }

    /// Mark both view and shadow for recomputation
    pub fn invalidate(&mut self) {
        self.view_dirty = true;
        self.shadow_dirty = true;
    }

    /// Set eye, target and up vector
    pub fn set_view(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.ctx.view.set_view(position, target, up);
        self.invalidate();
    }

    /// Set near/far clip distances
    pub fn set_view_range(&mut self, near: f32, far: f32) {
        self.ctx.view.set_range(near, far);
        self.invalidate();
    }

    /// Set the vertical field of view in degrees
    pub fn set_fovy_degrees(&mut self, fovy: f32) {
        self.ctx.view.set_fovy_degrees(fovy);
        self.invalidate();
    }

    /// Select the uniform or perspective fit
    pub fn set_shadow_uniform(&mut self, uniform: bool) {
        self.fit.uniform = uniform;
        self.shadow_dirty = true;
    }

    /// Set fit size, margin and distance
    pub fn set_shadow_proj_params(&mut self, size: f32, margin: f32, dist: f32) {
        self.fit.view_size = size;
        self.fit.margin = margin;
        self.fit.view_dist = dist;
        self.shadow_dirty = true;
    }

    /// Set the light direction
    pub fn set_shadow_dir(&mut self, dir: Vec3) {
        self.ctx.shadow.set_dir(dir);
        self.shadow_dirty = true;
    }

    /// Set the light direction from pitch/yaw degrees
    pub fn set_shadow_dir_degrees(&mut self, dx: f32, dy: f32) {
        self.ctx.shadow.set_dir_degrees(dx, dy);
        self.shadow_dirty = true;
    }

    /// Set density and density bias; these do not affect the fit
    pub fn set_shadow_density(&mut self, density: f32, bias: f32) {
        self.ctx.shadow.set_density(density);
        self.ctx.shadow.set_density_bias(bias);
    }

    /// Set the shadow fade range
    pub fn set_shadow_fade(&mut self, start: f32, end: f32) {
        self.ctx.shadow.set_fade(start, end);
    }

    /// Save the current context; ignored when the stack is full
    pub fn push(&mut self) -> bool {
        if self.stack.len() >= CONTEXT_STACK_DEPTH {
            log::warn!("Draw context stack full ({} entries)", CONTEXT_STACK_DEPTH);
            return false;
        }
        self.stack.push(self.ctx.clone());
        self.invalidate();
        true
    }

    /// Restore the last saved context; ignored when the stack is empty
    pub fn pop(&mut self) -> bool {
        let Some(ctx) = self.stack.pop() else { return false };
        self.ctx = ctx;
        self.invalidate();
        true
    }

    /// Number of saved contexts
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
