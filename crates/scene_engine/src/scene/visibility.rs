//! Per-object and per-batch visibility
//!
//! Visibility jobs read a [`VisibilityParams`] snapshot taken on the driving
//! thread after the view and shadow contexts are refreshed, and write the
//! object's cull bits. The draw pass consumes the bits later.

use crate::foundation::math::{utils, Mat4, Vec3};
use crate::geometry::{Frustum, AABB};

use super::object::{ObjectFlags, SceneObject};

/// Read-only inputs of the visibility pass
#[derive(Debug, Clone)]
pub struct VisibilityParams {
    /// Current view frustum
    pub frustum: Frustum,
    /// Current shadow view-projection
    pub shadow_view_proj: Mat4,
    /// Uniform shadow fit is active
    pub shadow_uniform: bool,
    /// Shadow-cast culling is enabled
    pub shadow_cast_cull: bool,
}

/// True when a box can cast a shadow into the visible part of the shadow map
///
/// The uniform fit is affine, so the two extreme corners bound the projected
/// box. The perspective fit warps space, so all eight corners are projected.
pub fn batch_shadow_cast_visible(bbox: &AABB, view_proj: &Mat4, uniform: bool) -> bool {
    let (mut x0, mut y0, mut x1, mut y1);
    if uniform {
        let vmin = utils::apply_point(view_proj, &bbox.min);
        let vmax = utils::apply_point(view_proj, &bbox.max);
        let xmin = utils::div0(vmin.x, vmin.w);
        let ymin = utils::div0(vmin.y, vmin.w);
        let xmax = utils::div0(vmax.x, vmax.w);
        let ymax = utils::div0(vmax.y, vmax.w);
        x0 = xmin.min(xmax);
        y0 = ymin.min(ymax);
        x1 = xmin.max(xmax);
        y1 = ymin.max(ymax);
    } else {
        let (lo, hi) = (bbox.min, bbox.max);
        let corners = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
        ];
        x0 = f32::MAX;
        y0 = f32::MAX;
        x1 = f32::MIN;
        y1 = f32::MIN;
        for c in &corners {
            let v = utils::apply_point(view_proj, c);
            let rw = utils::rcp0(v.w);
            let (sx, sy) = (v.x * rw, v.y * rw);
            x0 = x0.min(sx);
            y0 = y0.min(sy);
            x1 = x1.max(sx);
            y1 = y1.max(sy);
        }
    }
    x0 *= 0.5;
    y0 *= 0.5;
    x1 *= 0.5;
    y1 *= 0.5;
    x0 <= 1.0 && x1 >= -1.0 && y0 <= 1.0 && y1 >= -1.0
}

/// Whole-object visibility: view cull bits plus shadow-cast bits for every batch
pub fn update_object(obj: &mut SceneObject, params: &VisibilityParams) {
    let cast_disabled = obj.flags.contains(ObjectFlags::SHADOW_CAST_DISABLED);
    let Some(work) = obj.model_mut() else { return };
    work.frustum_cull(&params.frustum);

    let nbat = work.batch_count();
    if cast_disabled {
        work.cast_cull_bits_mut().set_all();
        return;
    }
    work.cast_cull_bits_mut().clear_all();
    if params.shadow_cast_cull {
        for ibat in 0..nbat {
            let visible = work
                .batch_bbox(ibat)
                .map_or(true, |bbox| batch_shadow_cast_visible(bbox, &params.shadow_view_proj, params.shadow_uniform));
            if !visible {
                work.cast_cull_bits_mut().set(ibat);
            }
        }
    }
}

/// Single-batch visibility used when the pass runs one job per batch
pub fn update_batch(obj: &mut SceneObject, ibat: usize, params: &VisibilityParams) {
    let cast_disabled = obj.flags.contains(ObjectFlags::SHADOW_CAST_DISABLED);
    let Some(work) = obj.model_mut() else { return };
    work.calc_batch_visibility(&params.frustum, ibat);

    if cast_disabled {
        work.cast_cull_bits_mut().set(ibat);
    } else if params.shadow_cast_cull {
        let visible = work
            .batch_bbox(ibat)
            .map_or(true, |bbox| batch_shadow_cast_visible(bbox, &params.shadow_view_proj, params.shadow_uniform));
        work.cast_cull_bits_mut().assign(ibat, !visible);
    } else {
        work.cast_cull_bits_mut().clear(ibat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::shadow::ShadowFit;
    use crate::scene::test_support::box_model;
    use crate::scene::view::ViewContext;

    fn ortho_params(cull: bool) -> VisibilityParams {
        VisibilityParams {
            frustum: Frustum::from_corners(AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(10.0)).corners()),
            shadow_view_proj: Mat4::new_scaling(0.1),
            shadow_uniform: true,
            shadow_cast_cull: cull,
        }
    }

    #[test]
    fn test_box_inside_shadow_box_casts() {
        let bbox = AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0));
        assert!(batch_shadow_cast_visible(&bbox, &Mat4::new_scaling(0.1), true));
        assert!(batch_shadow_cast_visible(&bbox, &Mat4::new_scaling(0.1), false));
    }

    #[test]
    fn test_box_far_outside_shadow_box_is_culled() {
        let bbox = AABB::from_center_extents(Vec3::new(100.0, 0.0, 0.0), Vec3::repeat(1.0));
        assert!(!batch_shadow_cast_visible(&bbox, &Mat4::new_scaling(0.1), true));
        assert!(!batch_shadow_cast_visible(&bbox, &Mat4::new_scaling(0.1), false));
    }

    #[test]
    fn test_halved_range_tolerates_margin() {
        // NDC x in [1.5, 1.7] still counts after halving
        let bbox = AABB::new(Vec3::new(15.0, 0.0, 0.0), Vec3::new(17.0, 1.0, 1.0));
        assert!(batch_shadow_cast_visible(&bbox, &Mat4::new_scaling(0.1), true));
    }

    #[test]
    fn test_perspective_fit_projects_all_corners() {
        let mut view = ViewContext::default();
        view.set_view(Vec3::new(0.0, 2.0, 10.0), Vec3::zeros(), Vec3::y());
        view.update(640, 480);
        let fit = ShadowFit::default();
        let m = fit.fit_perspective(&view, Vec3::new(0.3, -1.0, 0.2));

        // The warp pushes both extreme corners past the left edge while the
        // far-side bottom edge stays inside the map.
        let bbox = AABB::new(Vec3::new(-45.0, -25.0, -10.0), Vec3::new(0.0, -20.0, 15.0));
        let ndc_x = |p: Vec3| {
            let v = utils::apply_point(&m, &p);
            v.x / v.w
        };
        assert!(ndc_x(bbox.min) < -3.0);
        assert!(ndc_x(bbox.max) < -3.0);
        assert!(ndc_x(Vec3::new(0.0, -25.0, -10.0)).abs() < 1.0);

        assert!(!batch_shadow_cast_visible(&bbox, &m, true));
        assert!(batch_shadow_cast_visible(&bbox, &m, false));
    }

    #[test]
    fn test_object_outside_frustum_culls_every_batch() {
        let mut obj = SceneObject::new("far".to_string(), Some(box_model()));
        obj.set_world_pos(Vec3::new(50.0, 0.0, 0.0));
        obj.update_bounds();
        update_object(&mut obj, &ortho_params(true));
        let work = obj.model().unwrap();
        assert!(work.cull_bits().all());
    }

    #[test]
    fn test_cast_disabled_is_always_shadow_culled() {
        let mut obj = SceneObject::new("noshadow".to_string(), Some(box_model()));
        obj.flags.insert(ObjectFlags::SHADOW_CAST_DISABLED);
        obj.update_bounds();
        update_object(&mut obj, &ortho_params(false));
        assert!(obj.model().unwrap().cast_cull_bits().all());

        update_batch(&mut obj, 1, &ortho_params(false));
        assert!(obj.model().unwrap().is_batch_cast_culled(1));
    }

    #[test]
    fn test_per_batch_matches_per_object() {
        let mut a = SceneObject::new("a".to_string(), Some(box_model()));
        let mut b = SceneObject::new("b".to_string(), Some(box_model()));
        for obj in [&mut a, &mut b] {
            obj.set_world_pos(Vec3::new(9.0, 0.0, 0.0));
            obj.update_bounds();
        }
        let params = ortho_params(true);
        update_object(&mut a, &params);
        for ibat in 0..2 {
            update_batch(&mut b, ibat, &params);
        }
        let (wa, wb) = (a.model().unwrap(), b.model().unwrap());
        for ibat in 0..2 {
            assert_eq!(wa.is_batch_culled(ibat), wb.is_batch_culled(ibat));
            assert_eq!(wa.is_batch_cast_culled(ibat), wb.is_batch_cast_culled(ibat));
        }
    }
}
