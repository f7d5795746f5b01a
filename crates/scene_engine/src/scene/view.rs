//! Camera state and derived matrices

use crate::core::config::ViewConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::geometry::{Frustum, Sphere};

/// Camera parameters plus the matrices and frustum derived from them
///
/// Setters only store parameters; derived values are refreshed by
/// [`ViewContext::update`], which the owner calls when its dirty flag is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewContext {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    near: f32,
    far: f32,
    fovy_degrees: f32,

    view: Mat4,
    proj: Mat4,
    view_proj: Mat4,
    inv_view: Mat4,
    inv_proj: Mat4,
    inv_view_proj: Mat4,
    frustum: Frustum,
}

impl Default for ViewContext {
    fn default() -> Self {
        Self::from_config(&ViewConfig::default())
    }
}

impl ViewContext {
    /// Camera from configuration, with matrices computed for a 640x480 screen
    pub fn from_config(config: &ViewConfig) -> Self {
        let mut ctx = Self {
            position: Vec3::from(config.position),
            target: Vec3::from(config.target),
            up: Vec3::from(config.up),
            near: config.near,
            far: config.far,
            fovy_degrees: config.fovy_degrees,
            view: Mat4::identity(),
            proj: Mat4::identity(),
            view_proj: Mat4::identity(),
            inv_view: Mat4::identity(),
            inv_proj: Mat4::identity(),
            inv_view_proj: Mat4::identity(),
            frustum: Frustum::default(),
        };
        ctx.update(640, 480);
        ctx
    }

    /// Set eye, target and up vector
    pub fn set_view(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.position = position;
        self.target = target;
        self.up = up;
    }

    /// Set near and far clip distances
    pub fn set_range(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
    }

    /// Set the vertical field of view in degrees
    pub fn set_fovy_degrees(&mut self, fovy: f32) {
        self.fovy_degrees = fovy;
    }

    /// Recompute matrices and frustum for a `width` x `height` screen
    pub fn update(&mut self, width: u32, height: u32) {
        let aspect = utils::div0(width as f32, height as f32);
        let fovy = utils::deg_to_rad(self.fovy_degrees);
        self.view = Mat4::look_at(self.position, self.target, self.up);
        self.inv_view = self.view.try_inverse().unwrap_or_else(Mat4::identity);
        self.proj = Mat4::perspective_rh_zo(fovy, aspect, self.near, self.far);
        self.view_proj = self.proj * self.view;
        self.inv_proj = self.proj.try_inverse().unwrap_or_else(Mat4::identity);
        self.inv_view_proj = self.view_proj.try_inverse().unwrap_or_else(Mat4::identity);
        self.frustum = Frustum::from_view(&self.inv_view, fovy, aspect, self.near, self.far);
    }

    /// Eye position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Look-at target
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Up vector
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Normalized viewing direction
    pub fn dir(&self) -> Vec3 {
        utils::normalize_or_zero(&(self.target - self.position))
    }

    /// Near clip distance
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far clip distance
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Vertical field of view in degrees
    pub fn fovy_degrees(&self) -> f32 {
        self.fovy_degrees
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// Projection matrix
    pub fn proj_matrix(&self) -> &Mat4 {
        &self.proj
    }

    /// Projection times view
    pub fn view_proj_matrix(&self) -> &Mat4 {
        &self.view_proj
    }

    /// View-to-world matrix
    pub fn inv_view_matrix(&self) -> &Mat4 {
        &self.inv_view
    }

    /// Inverse projection
    pub fn inv_proj_matrix(&self) -> &Mat4 {
        &self.inv_proj
    }

    /// Clip-to-world matrix
    pub fn inv_view_proj_matrix(&self) -> &Mat4 {
        &self.inv_view_proj
    }

    /// View frustum in world space
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Frustum test; `exact` also rejects spheres near the frustum edges
    pub fn is_sphere_visible(&self, sphere: &Sphere, exact: bool) -> bool {
        let visible = !self.frustum.cull_sphere(sphere);
        if visible && exact {
            return self.frustum.overlaps_sphere(sphere);
        }
        visible
    }
}
