//! Shadow state and shadow-camera fitting
//!
//! [`ShadowContext`] carries the light direction and shading parameters
//! together with the fitted shadow matrices. [`ShadowFit`] derives the
//! shadow view-projection from the current camera in one of two modes:
//!
//! - uniform: an orthographic box of fixed size centered on the view target,
//!   looking along the light direction
//! - perspective: a warped projection fitted to a slice of the view frustum
//!   that spends more shadow-map texels close to the viewer
//!
//! Matrices are column-vector (`clip = M * p`) with depth in `[0, 1]`.

use crate::core::config::ShadowConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3, Vec4};

use super::view::ViewContext;

/// Smallest view/light angle sine the perspective warp accepts
const SIN_FLOOR: f32 = 1.0e-8;

/// Light direction, shading parameters and fitted shadow matrices
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowContext {
    dir: Vec3,
    density: f32,
    density_bias: f32,
    fade_start: f32,
    fade_end: f32,
    view_proj: Mat4,
    sampling: Mat4,
}

impl Default for ShadowContext {
    fn default() -> Self {
        Self::from_config(&ShadowConfig::default())
    }
}

impl ShadowContext {
    /// Shadow state from configuration, with identity matrices
    pub fn from_config(config: &ShadowConfig) -> Self {
        let mut ctx = Self {
            dir: -Vec3::y(),
            density: config.density,
            density_bias: config.density_bias,
            fade_start: config.fade_start,
            fade_end: config.fade_end,
            view_proj: Mat4::identity(),
            sampling: Mat4::identity(),
        };
        ctx.set_dir_degrees(config.dir_degrees[0], config.dir_degrees[1]);
        ctx
    }

    /// Set the light direction (normalized on store)
    pub fn set_dir(&mut self, dir: Vec3) {
        self.dir = utils::normalize_or_zero(&dir);
    }

    /// Light direction from pitch/yaw degrees applied to +Z
    pub fn set_dir_degrees(&mut self, dx: f32, dy: f32) {
        self.set_dir(utils::quat_from_degrees(dx, dy, 0.0) * Vec3::z());
    }

    /// Normalized light direction
    pub fn dir(&self) -> Vec3 {
        self.dir
    }

    /// Set shadow density
    pub fn set_density(&mut self, density: f32) {
        self.density = density;
    }

    /// Set density bias
    pub fn set_density_bias(&mut self, bias: f32) {
        self.density_bias = bias;
    }

    /// Effective density, never negative
    pub fn density(&self) -> f32 {
        (self.density + self.density_bias).max(0.0)
    }

    /// Set the fade range; an end of zero disables fading
    pub fn set_fade(&mut self, start: f32, end: f32) {
        self.fade_start = start;
        self.fade_end = end;
    }

    /// Fade start distance
    pub fn fade_start(&self) -> f32 {
        self.fade_start
    }

    /// Fade end distance
    pub fn fade_end(&self) -> f32 {
        self.fade_end
    }

    /// Fitted shadow view-projection
    pub fn view_proj_matrix(&self) -> &Mat4 {
        &self.view_proj
    }

    /// View-projection followed by the backend's texture bias
    pub fn sampling_matrix(&self) -> &Mat4 {
        &self.sampling
    }

    pub(crate) fn set_matrices(&mut self, view_proj: Mat4, bias: &Mat4) {
        self.view_proj = view_proj;
        self.sampling = bias * view_proj;
    }
}

/// Shadow-camera fit parameters and mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFit {
    /// Use the uniform fit
    pub uniform: bool,
    /// Half-size of the uniform box
    pub view_size: f32,
    /// Distance covered by the fit
    pub view_dist: f32,
    /// Extra depth behind receivers along the light direction
    pub margin: f32,
}

impl Default for ShadowFit {
    fn default() -> Self {
        Self::from_config(&ShadowConfig::default())
    }
}

impl ShadowFit {
    /// Fit parameters from configuration
    pub fn from_config(config: &ShadowConfig) -> Self {
        Self {
            uniform: config.uniform,
            view_size: config.view_size,
            view_dist: config.view_dist,
            margin: config.margin,
        }
    }

    /// Shadow view-projection for `view` and light direction `dir`
    pub fn fit(&self, view: &ViewContext, dir: Vec3) -> Mat4 {
        if self.uniform {
            self.fit_uniform(view, dir)
        } else {
            self.fit_perspective(view, dir)
        }
    }

    /// Orthographic box following the view target
    pub fn fit_uniform(&self, view: &ViewContext, dir: Vec3) -> Mat4 {
        let dir = utils::normalize_or_zero(&dir);
        let tgt = view.target();
        let pos = tgt - dir * self.margin;
        let light_view = Mat4::look_at(pos, tgt, Vec3::y());

        let mut proj = Mat4::identity();
        proj[(0, 0)] = utils::rcp0(self.view_size);
        proj[(1, 1)] = proj[(0, 0)];
        let zscale = utils::rcp0(1.0 - (self.margin + self.view_dist));
        proj[(2, 2)] = zscale;
        proj[(2, 3)] = zscale;
        proj * light_view
    }

    /// Warped projection fitted to the near part of the view frustum
    ///
    /// The warp has no solution when the light runs along the view axis;
    /// that case falls back to [`ShadowFit::fit_uniform`].
    pub fn fit_perspective(&self, view: &ViewContext, dir: Vec3) -> Mat4 {
        let dir = utils::normalize_or_zero(&dir);
        let proj = view.proj_matrix();
        let inv_view = view.inv_view_matrix();
        let view_proj = view.view_proj_matrix();
        let inv_view_proj = view.inv_view_proj_matrix();

        // Shrink the covered distance as the light lines up with the view
        let back = inv_view.column(2).xyz();
        let mut vdist = self.view_dist * proj[(1, 1)];
        let mut reduce = back.dot(&dir).abs();
        if reduce > 0.7 {
            vdist *= 0.5;
        }
        reduce *= 0.8;

        let near_pos = view.inv_proj_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let dnear = -utils::div0(near_pos.z, near_pos.w);
        let dfar = dnear + (vdist - dnear) * (1.0 - reduce);

        let vdir = utils::normalize_or_zero(&-back);
        let cos_vl = -vdir.dot(&dir);
        let sy = (1.0 - cos_vl * cos_vl).max(0.0).sqrt();
        let up = utils::normalize_or_zero(&dir.cross(&vdir.cross(&dir)));
        if sy <= SIN_FLOOR || up == Vec3::zeros() {
            return self.fit_uniform(view, dir);
        }

        let eye = inv_view.column(3).xyz();
        let clip_depth = |d: f32| {
            let p = utils::apply_point(view_proj, &(eye + vdir * d));
            utils::div0(p.z, p.w)
        };
        let znear = clip_depth(dnear).max(0.0);
        let zfar = clip_depth(dfar).min(1.0);

        let slice = [
            (-1.0, -1.0, znear),
            (1.0, -1.0, znear),
            (-1.0, 1.0, znear),
            (1.0, 1.0, znear),
            (-1.0, -1.0, zfar),
            (1.0, -1.0, zfar),
            (-1.0, 1.0, zfar),
            (1.0, 1.0, zfar),
        ]
        .map(|(x, y, z)| {
            let p = inv_view_proj * Vec4::new(x, y, z, 1.0);
            p.xyz() * utils::rcp0(p.w)
        });

        let mut pos = eye;
        let light_view = Mat4::look_at(pos, pos - dir, up);

        let (mut ymin, mut ymax) = (f32::MAX, f32::MIN);
        for p in &slice {
            let ty = utils::apply_point(&light_view, p).y;
            ymin = ymin.min(ty);
            ymax = ymax.max(ty);
        }

        let t = (dnear + (dnear * dfar).max(0.0).sqrt()) / sy;
        let y = (ymax - ymin) + t;

        let mut warp = Mat4::identity();
        warp[(0, 0)] = -1.0;
        warp[(1, 1)] = utils::div0(y + t, y - t);
        warp[(3, 1)] = 1.0;
        warp[(1, 3)] = utils::div0(-2.0 * y * t, y - t);
        warp[(3, 3)] = 0.0;

        pos += up * (ymin - t);
        let light_view = Mat4::look_at(pos, pos - dir, up);
        let warped = warp * light_view;

        let mut vmin = Vec3::repeat(f32::MAX);
        let mut vmax = Vec3::repeat(f32::MIN);
        for p in &slice {
            let q = utils::apply_point(&warped, p);
            let v = q.xyz() * utils::rcp0(q.w);
            vmin = vmin.inf(&v);
            vmax = vmax.sup(&v);
        }

        let offs = dir * self.margin;
        let mut zmin = vmin.z;
        for p in &slice {
            let q = utils::apply_point(&warped, &(p - offs));
            zmin = zmin.min(utils::div0(q.z, q.w));
        }
        vmin.z = zmin;

        let vd = utils::rcp0_vec(&(vmax - vmin));
        let vs = Vec3::new(2.0, 2.0, 1.0).component_mul(&vd);
        let vt = -Vec3::new(vmin.x + vmax.x, vmin.y + vmax.y, vmin.z).component_mul(&vd);
        let mut fit = Mat4::identity();
        fit[(0, 0)] = vs.x;
        fit[(1, 1)] = vs.y;
        fit[(2, 2)] = vs.z;
        fit[(0, 3)] = vt.x;
        fit[(1, 3)] = vt.y;
        fit[(2, 3)] = vt.z;

        fit * warped
    }
}
