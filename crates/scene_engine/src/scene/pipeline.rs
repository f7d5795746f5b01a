//! # Scene Pipeline
//!
//! Drives the per-frame sequence over every registered object:
//!
//! 1. [`ScenePipeline::exec`] snapshots previous-frame state, then runs one
//!    job batch per priority level in ascending order
//! 2. [`ScenePipeline::visibility`] refreshes the view and shadow contexts
//!    and computes per-batch cull bits in parallel
//! 3. [`ScenePipeline::draw`] submits the shadow-cast, opaque and
//!    semi-transparent passes to the draw interface in registry order
//!
//! Every phase is a full barrier. With zero workers all jobs run on the
//! calling thread through the same job functions.

use std::sync::Arc;

use thiserror::Error;

use crate::assets::{Package, ResourceManager};
use crate::core::config::{ConfigError, SceneConfig};
use crate::core::runtime::SceneRuntime;
use crate::foundation::math::{Vec3, Vec4};
use crate::geometry::Sphere;
use crate::render::{DrawInterface, DrawMode, NullDraw, Sprite};
use crate::task::{JobContext, JobFn, JobQueue, TaskError, WorkerPool};

use super::context::{ContextCache, DrawContext};
use super::lighting::{Fog, HemiLight};
use super::model::ModelData;
use super::object::{ExecFn, ObjectFlags, ObjectFn, SceneObject, MAX_PRIORITY};
use super::registry::{lock_object, ObjectKey, ObjectRef, ObjectRegistry};
use super::visibility::VisibilityParams;

/// Pipeline construction errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// Configuration rejected
    #[error("Invalid scene configuration: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool could not start
    #[error("Worker pool error: {0}")]
    Task(#[from] TaskError),
}

/// Result type for pipeline construction
pub type SceneResult<T> = Result<T, SceneError>;

/// One visibility job: a whole object or a single batch of it
struct VisibilityJob {
    obj: ObjectRef,
    batch: Option<usize>,
}

#[derive(Clone, Copy)]
enum Pass {
    ShadowCast,
    Opaque,
    Semi { discard: bool },
}

/// Scene owner and per-frame driver
pub struct ScenePipeline {
    config: SceneConfig,
    runtime: Arc<SceneRuntime>,
    pool: WorkerPool,
    registry: ObjectRegistry,
    draw: Box<dyn DrawInterface>,
    resources: Option<Box<dyn ResourceManager>>,
    contexts: ContextCache,
    prev_queue: JobQueue<ObjectRef>,
    exec_queue: JobQueue<ObjectRef>,
    vis_queue: JobQueue<VisibilityJob>,
    frame_count: u64,
}

impl ScenePipeline {
    /// Create a pipeline
    ///
    /// Without a draw interface a [`NullDraw`] is used. Zero workers or a
    /// missing resource manager only degrade functionality.
    pub fn new(
        config: SceneConfig,
        draw: Option<Box<dyn DrawInterface>>,
        resources: Option<Box<dyn ResourceManager>>,
    ) -> SceneResult<Self> {
        config.validate()?;
        if config.num_workers == 0 {
            log::warn!("No scene workers configured; jobs run on the calling thread");
        }
        if resources.is_none() {
            log::warn!("No resource manager; package functions are disabled");
        }
        let mut draw = draw.unwrap_or_else(|| Box::new(NullDraw::default()));
        draw.init(config.shadow_map_size, resources.as_deref());

        let runtime = Arc::new(SceneRuntime::new(config.local_heap_size));
        let pool = WorkerPool::new(config.num_workers, config.local_heap_size, Arc::clone(&runtime))?;
        log::info!(
            "Scene pipeline initialized: {} workers, shadow map {}",
            pool.workers_num(),
            config.shadow_map_size
        );

        Ok(Self {
            contexts: ContextCache::new(&config),
            config,
            runtime,
            pool,
            registry: ObjectRegistry::new(),
            draw,
            resources,
            prev_queue: JobQueue::new(),
            exec_queue: JobQueue::new(),
            vis_queue: JobQueue::new(),
            frame_count: 0,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Shared runtime state
    pub fn runtime(&self) -> &Arc<SceneRuntime> {
        &self.runtime
    }

    /// Object registry
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Number of worker threads
    pub fn workers_num(&self) -> usize {
        self.pool.workers_num()
    }

    /// Completed jobs per worker, the calling thread last
    pub fn completed_jobs(&self) -> Vec<u64> {
        self.pool.completed_jobs()
    }

    /// Next value of the global random generator
    pub fn glb_rng_next(&self) -> u64 {
        self.runtime.rng_next()
    }

    /// Remove every object and restore the initial view and shadow state
    pub fn reset(&mut self) {
        self.registry.remove_all();
        self.contexts = ContextCache::new(&self.config);
        self.runtime.reset();
        self.frame_count = 0;
        log::info!("Scene pipeline reset");
    }

    // ---- objects ----

    /// Create an object for `model`; see [`ObjectRegistry::create`]
    pub fn add_obj(&mut self, model: Option<Arc<ModelData>>, name: Option<&str>) -> Option<ObjectKey> {
        self.registry.create(model, name)
    }

    /// Create an object for the model called `model_name`
    pub fn add_obj_by_model_name(&mut self, model_name: &str, name: Option<&str>) -> Option<ObjectKey> {
        let model = self.resources.as_ref().and_then(|r| r.find_model(model_name));
        if model.is_none() {
            log::warn!("Model '{}' not found", model_name);
        }
        self.registry.create(model, name)
    }

    /// Key of the object called `name`
    pub fn find_obj(&self, name: &str) -> Option<ObjectKey> {
        self.registry.find(name)
    }

    /// Object for `key`
    pub fn obj(&self, key: ObjectKey) -> Option<ObjectRef> {
        self.registry.get(key).cloned()
    }

    /// Object called `name`
    pub fn obj_by_name(&self, name: &str) -> Option<ObjectRef> {
        self.registry.get_by_name(name).cloned()
    }

    /// Remove an object
    pub fn del_obj(&mut self, key: ObjectKey) -> bool {
        self.registry.remove(key)
    }

    /// Remove every object
    pub fn del_all_objs(&mut self) {
        self.registry.remove_all();
    }

    /// Visit objects in registry order until `f` returns false
    pub fn for_each_obj(&self, mut f: impl FnMut(&mut SceneObject) -> bool) {
        self.registry.for_each(|_, obj| f(&mut *lock_object(obj)));
    }

    /// Number of objects
    pub fn get_num_objs(&self) -> usize {
        self.registry.len()
    }

    /// Set the per-frame update of the object called `name`
    pub fn set_obj_exec_func(&self, name: &str, func: Option<ExecFn>) -> bool {
        self.with_obj(name, |obj| obj.callbacks.exec = func).is_some()
    }

    /// Set the delete callback of the object called `name`
    pub fn set_obj_del_func(&self, name: &str, func: Option<ObjectFn>) -> bool {
        self.with_obj(name, |obj| obj.callbacks.delete = func).is_some()
    }

    /// World position of the object called `name`, zero when absent
    pub fn obj_world_pos(&self, name: &str) -> Vec3 {
        self.with_obj(name, |obj| obj.world_pos()).unwrap_or_else(Vec3::zeros)
    }

    /// Center position of the object called `name`, zero when absent
    pub fn obj_center_pos(&self, name: &str) -> Vec3 {
        self.with_obj(name, |obj| obj.center_pos()).unwrap_or_else(Vec3::zeros)
    }

    fn with_obj<R>(&self, name: &str, f: impl FnOnce(&mut SceneObject) -> R) -> Option<R> {
        let obj = self.registry.get_by_name(name)?;
        Some(f(&mut *lock_object(obj)))
    }

    fn live_objects(&self) -> Vec<ObjectRef> {
        self.registry.iter().map(|(_, obj)| Arc::clone(obj)).collect()
    }

    // ---- frame ----

    /// Start a frame: begin drawing and purge scratch heaps
    pub fn frame_begin(&mut self, clear_color: Vec4) {
        self.draw.begin(clear_color);
        self.pool.begin_frame();
        self.runtime.purge_shared_heap();
    }

    /// Finish a frame
    pub fn frame_end(&mut self) {
        self.draw.end();
        self.frame_count += 1;
    }

    /// Frames completed since creation or reset
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Snapshot previous-frame state, then run every priority level in order
    pub fn exec(&mut self) {
        let objs = self.live_objects();

        self.prev_queue.purge();
        self.prev_queue.reserve(objs.len());
        for obj in &objs {
            self.prev_queue.add(Arc::clone(obj));
        }
        let njob = self.pool.execute(&mut self.prev_queue, copy_prev_job());
        self.log_phase("copy-prev", njob);

        let mut levels: Vec<Vec<ObjectRef>> = vec![Vec::new(); usize::from(MAX_PRIORITY)];
        for obj in objs {
            let level = usize::from(lock_object(&obj).priority());
            levels[level].push(obj);
        }
        for (level, objs) in levels.into_iter().enumerate() {
            if objs.is_empty() {
                continue;
            }
            self.exec_queue.purge();
            self.exec_queue.reserve(objs.len());
            for obj in objs {
                self.exec_queue.add(obj);
            }
            let njob = self.pool.execute(&mut self.exec_queue, exec_job());
            self.log_phase(&format!("exec level {level}"), njob);
        }
    }

    /// Compute view and shadow-cast cull bits for every object
    pub fn visibility(&mut self) {
        let params = Arc::new(self.visibility_params());
        let objs = self.live_objects();

        self.vis_queue.purge();
        if self.config.visibility_per_batch {
            let njob = objs.iter().map(|o| lock_object(o).batch_count()).sum();
            self.vis_queue.reserve(njob);
            for obj in objs {
                let nbat = lock_object(&obj).batch_count();
                for ibat in 0..nbat {
                    self.vis_queue.add(VisibilityJob {
                        obj: Arc::clone(&obj),
                        batch: Some(ibat),
                    });
                }
            }
        } else {
            self.vis_queue.reserve(objs.len());
            for obj in objs {
                self.vis_queue.add(VisibilityJob { obj, batch: None });
            }
        }
        let njob = self.pool.execute(&mut self.vis_queue, visibility_job(params));
        self.log_phase("visibility", njob);
    }

    fn visibility_params(&mut self) -> VisibilityParams {
        let shadow_uniform = self.contexts.shadow_fit().uniform;
        let shadow_cast_cull = self.config.shadow_cast_cull;
        let ctx = self.refresh_context();
        VisibilityParams {
            frustum: ctx.view.frustum().clone(),
            shadow_view_proj: *ctx.shadow.view_proj_matrix(),
            shadow_uniform,
            shadow_cast_cull,
        }
    }

    fn log_phase(&self, phase: &str, njob: usize) {
        log::debug!("{}: {} jobs, completed per worker {:?}", phase, njob, self.pool.completed_jobs());
    }

    /// Submit the shadow-cast, opaque and semi-transparent passes
    pub fn draw(&mut self, discard: bool) {
        let (width, height) = (self.draw.screen_width(), self.draw.screen_height());
        let bias = self.draw.shadow_bias_matrix();
        self.contexts.refresh(width, height, &bias);

        let objs = self.live_objects();
        let ctx = self.contexts.current();
        let draw = self.draw.as_mut();
        for pass in [Pass::ShadowCast, Pass::Opaque, Pass::Semi { discard }] {
            for obj in &objs {
                draw_object(draw, ctx, &mut lock_object(obj), pass);
            }
        }
    }

    /// Draw a screen-space sprite
    pub fn sprite(&mut self, sprite: &Sprite) {
        self.draw.sprite(sprite);
    }

    // ---- view and shadow ----

    fn refresh_context(&mut self) -> &DrawContext {
        let (width, height) = (self.draw.screen_width(), self.draw.screen_height());
        let bias = self.draw.shadow_bias_matrix();
        self.contexts.refresh(width, height, &bias)
    }

    /// Up-to-date view and shadow state
    pub fn draw_context(&mut self) -> &DrawContext {
        self.refresh_context()
    }

    /// Set eye, target and up vector
    pub fn set_view(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.contexts.set_view(position, target, up);
    }

    /// Set near and far clip distances
    pub fn set_view_range(&mut self, near: f32, far: f32) {
        self.contexts.set_view_range(near, far);
    }

    /// Set the vertical field of view in degrees
    pub fn set_fovy_degrees(&mut self, fovy: f32) {
        self.contexts.set_fovy_degrees(fovy);
    }

    /// Select the uniform or perspective shadow fit
    pub fn set_shadow_uniform(&mut self, uniform: bool) {
        self.contexts.set_shadow_uniform(uniform);
    }

    /// Set shadow fit size, margin and distance
    pub fn set_shadow_proj_params(&mut self, size: f32, margin: f32, dist: f32) {
        self.contexts.set_shadow_proj_params(size, margin, dist);
    }

    /// Set the light direction
    pub fn set_shadow_dir(&mut self, dir: Vec3) {
        self.contexts.set_shadow_dir(dir);
    }

    /// Set the light direction from pitch/yaw degrees
    pub fn set_shadow_dir_degrees(&mut self, dx: f32, dy: f32) {
        self.contexts.set_shadow_dir_degrees(dx, dy);
    }

    /// Set shadow density and density bias
    pub fn set_shadow_density(&mut self, density: f32, bias: f32) {
        self.contexts.set_shadow_density(density, bias);
    }

    /// Set the shadow fade range
    pub fn set_shadow_fade(&mut self, start: f32, end: f32) {
        self.contexts.set_shadow_fade(start, end);
    }

    // ---- lighting, fog, colour correction ----

    /// Set the ambient sky colour
    pub fn set_hemi_upper(&mut self, rgb: Vec3) {
        self.contexts.params_mut().set_hemi_upper(rgb);
    }

    /// Set the ambient ground colour
    pub fn set_hemi_lower(&mut self, rgb: Vec3) {
        self.contexts.params_mut().set_hemi_lower(rgb);
    }

    /// Flat ambient light
    pub fn set_hemi_const(&mut self, rgb: Vec3) {
        self.contexts.params_mut().set_hemi_const(rgb);
    }

    /// Set the ambient sky direction
    pub fn set_hemi_up(&mut self, up: Vec3) {
        self.contexts.params_mut().set_hemi_up(up);
    }

    /// Set the ambient blend exponent
    pub fn set_hemi_exp(&mut self, exp: f32) {
        self.contexts.params_mut().set_hemi_exp(exp);
    }

    /// Set the ambient gain
    pub fn set_hemi_gain(&mut self, gain: f32) {
        self.contexts.params_mut().set_hemi_gain(gain);
    }

    /// Restore the default ambient light
    pub fn reset_hemi(&mut self) {
        self.contexts.params_mut().hemi = HemiLight::default();
    }

    /// Set the specular light direction
    pub fn set_spec_dir(&mut self, dir: Vec3) {
        self.contexts.params_mut().set_spec_dir(dir);
    }

    /// Point the specular light along the shadow light
    pub fn set_spec_dir_to_shadow(&mut self) {
        self.contexts.params_mut().set_spec_dir_to_shadow();
    }

    /// Set the specular colour
    pub fn set_spec_rgb(&mut self, rgb: Vec3) {
        self.contexts.params_mut().set_spec_rgb(rgb);
    }

    /// Set the fog colour
    pub fn set_fog_rgb(&mut self, rgb: Vec3) {
        self.contexts.params_mut().set_fog_rgb(rgb);
    }

    /// Set the fog density
    pub fn set_fog_density(&mut self, density: f32) {
        self.contexts.params_mut().set_fog_density(density);
    }

    /// Set the fog start and end distances
    pub fn set_fog_range(&mut self, start: f32, end: f32) {
        self.contexts.params_mut().set_fog_range(start, end);
    }

    /// Set the fog falloff curve
    pub fn set_fog_curve(&mut self, cp1: f32, cp2: f32) {
        self.contexts.params_mut().set_fog_curve(cp1, cp2);
    }

    /// Use a straight-line fog falloff
    pub fn set_fog_linear(&mut self) {
        self.contexts.params_mut().fog.set_linear();
    }

    /// Restore the default fog
    pub fn reset_fog(&mut self) {
        self.contexts.params_mut().fog = Fog::default();
    }

    /// Set gamma on all channels
    pub fn set_gamma(&mut self, gamma: f32) {
        self.contexts.params_mut().set_gamma(gamma);
    }

    /// Set exposure on all channels
    pub fn set_exposure(&mut self, exposure: f32) {
        self.contexts.params_mut().set_exposure(exposure);
    }

    /// Set the linear white point
    pub fn set_linear_white(&mut self, white: f32) {
        self.contexts.params_mut().set_linear_white(white);
    }

    /// Set the linear gain
    pub fn set_linear_gain(&mut self, gain: f32) {
        self.contexts.params_mut().set_linear_gain(gain);
    }

    /// Set the linear bias
    pub fn set_linear_bias(&mut self, bias: f32) {
        self.contexts.params_mut().set_linear_bias(bias);
    }

    /// Save the draw context
    pub fn push_ctx(&mut self) -> bool {
        self.contexts.push()
    }

    /// Restore the last saved draw context
    pub fn pop_ctx(&mut self) -> bool {
        self.contexts.pop()
    }

    /// Test a sphere against the current view frustum
    pub fn is_sphere_visible(&mut self, sphere: &Sphere, exact: bool) -> bool {
        self.refresh_context().view.is_sphere_visible(sphere, exact)
    }

    // ---- packages ----

    /// Register a package with the resource manager
    pub fn load_pkg(&mut self, pkg: Package) -> Option<Arc<Package>> {
        let Some(rsrc) = self.resources.as_mut() else {
            log::warn!("Cannot load package '{}' without a resource manager", pkg.name());
            return None;
        };
        Some(rsrc.load_pkg(pkg))
    }

    /// Package called `name`
    pub fn find_pkg(&self, name: &str) -> Option<Arc<Package>> {
        self.resources.as_ref()?.find_pkg(name)
    }

    /// Release GPU resources and unload the package called `name`
    pub fn unload_pkg(&mut self, name: &str) -> bool {
        self.release_pkg_gfx(name);
        self.resources.as_mut().is_some_and(|r| r.unload_pkg(name))
    }

    /// Release GPU resources and unload every package
    pub fn unload_all_pkgs(&mut self) {
        let Some(rsrc) = self.resources.as_mut() else { return };
        for pkg in rsrc.packages() {
            for model in pkg.models() {
                self.draw.release_model(model);
            }
        }
        rsrc.unload_all();
    }

    /// Upload GPU resources for every model of a package
    pub fn prepare_pkg_gfx(&mut self, name: &str) -> bool {
        let Some(pkg) = self.find_pkg(name) else {
            log::warn!("Package '{}' not found", name);
            return false;
        };
        for model in pkg.models() {
            self.draw.prepare_model(model);
        }
        true
    }

    /// Release GPU resources of every model of a package
    pub fn release_pkg_gfx(&mut self, name: &str) -> bool {
        let Some(pkg) = self.find_pkg(name) else { return false };
        for model in pkg.models() {
            self.draw.release_model(model);
        }
        true
    }

    /// Create one object per package model, named `prefix` + model name
    ///
    /// Returns the number of objects created or already present.
    pub fn add_all_pkg_objs(&mut self, pkg_name: &str, prefix: Option<&str>) -> usize {
        let Some(pkg) = self.find_pkg(pkg_name) else {
            log::warn!("Package '{}' not found", pkg_name);
            return 0;
        };
        let prefix = prefix.unwrap_or("");
        pkg.models()
            .iter()
            .filter(|model| {
                let name = format!("{prefix}{}", model.name());
                self.registry.create(Some(Arc::clone(model)), Some(&name)).is_some()
            })
            .count()
    }
}

impl Drop for ScenePipeline {
    fn drop(&mut self) {
        self.registry.remove_all();
        self.unload_all_pkgs();
        self.draw.reset();
    }
}

fn copy_prev_job() -> JobFn<ObjectRef> {
    Arc::new(|obj: &ObjectRef, _ctx: &mut JobContext<'_>| {
        lock_object(obj).copy_prev_state();
    })
}

fn exec_job() -> JobFn<ObjectRef> {
    Arc::new(|obj: &ObjectRef, ctx: &mut JobContext<'_>| {
        let mut guard = lock_object(obj);
        match guard.callbacks.exec.clone() {
            Some(f) => f(&mut *guard, ctx),
            None => guard.advance(None, 0.0),
        }
    })
}

fn visibility_job(params: Arc<VisibilityParams>) -> JobFn<VisibilityJob> {
    Arc::new(move |job: &VisibilityJob, _ctx: &mut JobContext<'_>| {
        let mut guard = lock_object(&job.obj);
        match job.batch {
            Some(ibat) => guard.update_batch_visibility(ibat, &params),
            None => guard.update_visibility(&params),
        }
    })
}

fn draw_object(draw: &mut dyn DrawInterface, ctx: &DrawContext, obj: &mut SceneObject, pass: Pass) {
    let shadow = matches!(pass, Pass::ShadowCast);
    if shadow && obj.flags.contains(ObjectFlags::SHADOW_CAST_DISABLED) {
        return;
    }
    if !shadow && obj.flags.contains(ObjectFlags::DRAW_DISABLED) {
        return;
    }
    let Some(data) = obj.model_data().cloned() else { return };

    if let (Pass::Opaque, Some(f)) = (pass, obj.callbacks.pre_opaque.clone()) {
        f(obj);
    }
    for (ibat, batch) in data.batches().iter().enumerate() {
        let mode = match pass {
            Pass::ShadowCast => DrawMode::ShadowCast,
            Pass::Opaque if !batch.material.alpha => DrawMode::Standard,
            Pass::Semi { discard: true } if batch.material.alpha => DrawMode::AlphaDiscard,
            Pass::Semi { discard: false } if batch.material.alpha => DrawMode::Standard,
            _ => continue,
        };
        draw_batch(draw, ctx, obj, ibat, mode);
    }
    if let (Pass::Opaque, Some(f)) = (pass, obj.callbacks.post_opaque.clone()) {
        f(obj);
    }
}

fn draw_batch(draw: &mut dyn DrawInterface, ctx: &DrawContext, obj: &mut SceneObject, ibat: usize, mode: DrawMode) {
    let shadow = mode == DrawMode::ShadowCast;
    let culled = obj.model().map_or(true, |work| {
        if shadow {
            work.is_batch_cast_culled(ibat)
        } else {
            work.is_batch_culled(ibat)
        }
    });
    if culled {
        return;
    }
    if !shadow {
        if let Some(f) = obj.callbacks.batch_pre_draw.clone() {
            f(obj, ibat);
        }
    }
    if let Some(work) = obj.model() {
        draw.batch(work, ibat, mode, ctx);
    }
    if !shadow {
        if let Some(f) = obj.callbacks.batch_post_draw.clone() {
            f(obj, ibat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryResourceManager;
    use crate::scene::lighting::ColorCorrection;
    use crate::render::{BatchRecord, DrawLogHandle};
    use crate::scene::test_support::box_model;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn pipeline(num_workers: usize) -> (ScenePipeline, DrawLogHandle) {
        let config = SceneConfig {
            num_workers,
            shadow_cast_cull: false,
            ..SceneConfig::default()
        };
        let draw = NullDraw::new(640, 480);
        let log = draw.log_handle();
        let rsrc = MemoryResourceManager::new();
        let scene = ScenePipeline::new(config, Some(Box::new(draw)), Some(Box::new(rsrc))).unwrap();
        (scene, log)
    }

    fn record(model: &str, batch: usize, mode: DrawMode) -> BatchRecord {
        BatchRecord {
            model: model.to_string(),
            batch,
            mode,
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SceneConfig {
            shadow_map_size: 0,
            ..SceneConfig::default()
        };
        assert!(matches!(ScenePipeline::new(config, None, None), Err(SceneError::Config(_))));
    }

    #[test]
    fn test_priority_levels_are_barriers() {
        let (mut scene, _) = pipeline(4);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..32u8 {
            let key = scene.add_obj(Some(box_model()), None).unwrap();
            let obj = scene.obj(key).unwrap();
            let mut obj = lock_object(&obj);
            obj.set_priority(i % 4);
            let order = Arc::clone(&order);
            obj.callbacks.exec = Some(Arc::new(move |obj: &mut SceneObject, _ctx: &mut JobContext<'_>| {
                std::thread::yield_now();
                order.lock().unwrap().push(obj.priority());
            }));
        }
        scene.exec();
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 32);
        assert!(order.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_create_is_idempotent() {
        let (mut scene, _) = pipeline(0);
        let a = scene.add_obj(Some(box_model()), Some("crate"));
        let b = scene.add_obj(Some(box_model()), Some("crate"));
        assert_eq!(a, b);
        assert_eq!(scene.get_num_objs(), 1);
        assert!(scene.add_obj(None, Some("missing")).is_none());
        assert!(scene.add_obj_by_model_name("nothing", None).is_none());
    }

    #[test]
    fn test_remove_all_empties_registry() {
        let (mut scene, _) = pipeline(2);
        for _ in 0..5 {
            scene.add_obj(Some(box_model()), None);
        }
        scene.del_all_objs();
        assert_eq!(scene.get_num_objs(), 0);
        let mut visited = 0;
        scene.for_each_obj(|_| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
    }

    fn run_scene(num_workers: usize) -> Vec<(Vec3, bool)> {
        let (mut scene, _) = pipeline(num_workers);
        for i in 0..20 {
            let key = scene.add_obj(Some(box_model()), None).unwrap();
            let obj = scene.obj(key).unwrap();
            let mut obj = lock_object(&obj);
            obj.set_priority((i % 3) as u8);
            obj.flt_wk[0] = i as f32 * 4.0 - 40.0;
            obj.callbacks.exec = Some(Arc::new(|obj: &mut SceneObject, _ctx: &mut JobContext<'_>| {
                let x = obj.flt_wk[0];
                obj.set_world_pos(Vec3::new(x, 0.0, 0.0));
                obj.advance(None, 0.0);
            }));
        }
        scene.exec();
        scene.visibility();
        let mut out = Vec::new();
        scene.for_each_obj(|obj| {
            out.push((obj.world_bbox().center(), obj.model().unwrap().cull_bits().all()));
            true
        });
        out
    }

    #[test]
    fn test_zero_workers_match_parallel_results() {
        let serial = run_scene(0);
        let parallel = run_scene(4);
        assert_eq!(serial.len(), parallel.len());
        for (a, b) in serial.iter().zip(&parallel) {
            assert_relative_eq!(a.0, b.0, epsilon = 1e-6);
            assert_eq!(a.1, b.1);
        }
        assert!(serial.iter().any(|(_, culled)| *culled));
        assert!(serial.iter().any(|(_, culled)| !*culled));
    }

    #[test]
    fn test_copy_prev_converges() {
        let (mut scene, _) = pipeline(2);
        let key = scene.add_obj(Some(box_model()), Some("mover")).unwrap();
        let obj = scene.obj(key).unwrap();
        lock_object(&obj).set_world_pos(Vec3::new(1.0, 2.0, 3.0));
        scene.exec();
        scene.exec();
        let obj = lock_object(&obj);
        let work = obj.model().unwrap();
        assert_eq!(work.prev_world(), &work.world);
        assert_eq!(work.prev_world_bbox(), work.world_bbox());
    }

    #[test]
    fn test_draw_pass_order() {
        let (mut scene, log) = pipeline(2);
        scene.add_obj(Some(box_model()), Some("box"));
        scene.frame_begin(Vec4::zeros());
        scene.exec();
        scene.visibility();
        scene.draw(true);
        scene.frame_end();

        let log = log.lock().unwrap();
        assert_eq!(
            log.batches,
            vec![
                record("box", 0, DrawMode::ShadowCast),
                record("box", 1, DrawMode::ShadowCast),
                record("box", 0, DrawMode::Standard),
                record("box", 1, DrawMode::AlphaDiscard),
            ]
        );
        assert_eq!((log.begins, log.ends), (1, 1));
        assert_eq!(scene.frame_count(), 1);
    }

    #[test]
    fn test_draw_flags_and_culling() {
        let (mut scene, log) = pipeline(0);
        let hidden = scene.add_obj(Some(box_model()), Some("hidden")).unwrap();
        let caster = scene.add_obj(Some(box_model()), Some("nocast")).unwrap();
        let far = scene.add_obj(Some(box_model()), Some("far")).unwrap();
        lock_object(&scene.obj(hidden).unwrap()).set_draw_disabled(true);
        lock_object(&scene.obj(caster).unwrap()).set_shadow_cast_disabled(true);
        lock_object(&scene.obj(far).unwrap()).set_world_pos(Vec3::new(0.0, 0.0, 500.0));

        scene.exec();
        scene.visibility();
        scene.draw(false);

        // hidden and far cast shadows; only nocast is drawn
        let log = log.lock().unwrap();
        assert_eq!(log.count(DrawMode::ShadowCast), 4);
        assert_eq!(log.count(DrawMode::Standard), 2);
        assert_eq!(log.count(DrawMode::AlphaDiscard), 0);
    }

    #[test]
    fn test_draw_callbacks() {
        let (mut scene, _) = pipeline(0);
        let key = scene.add_obj(Some(box_model()), Some("box")).unwrap();
        let opaque = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(AtomicUsize::new(0));
        {
            let obj = scene.obj(key).unwrap();
            let mut obj = lock_object(&obj);
            let counter = Arc::clone(&opaque);
            obj.callbacks.pre_opaque = Some(Arc::new(move |_obj: &mut SceneObject| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            let counter = Arc::clone(&opaque);
            obj.callbacks.post_opaque = Some(Arc::new(move |_obj: &mut SceneObject| {
                counter.fetch_add(10, Ordering::SeqCst);
            }));
            let counter = Arc::clone(&batches);
            obj.callbacks.batch_pre_draw = Some(Arc::new(move |_obj: &mut SceneObject, _ibat: usize| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        scene.exec();
        scene.visibility();
        scene.draw(false);
        assert_eq!(opaque.load(Ordering::SeqCst), 11);
        assert_eq!(batches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_per_batch_visibility_matches_per_object() {
        let bits = |per_batch: bool| {
            let config = SceneConfig {
                num_workers: 2,
                visibility_per_batch: per_batch,
                ..SceneConfig::default()
            };
            let mut scene = ScenePipeline::new(config, None, None).unwrap();
            for i in 0..10 {
                let key = scene.add_obj(Some(box_model()), None).unwrap();
                lock_object(&scene.obj(key).unwrap()).set_world_pos(Vec3::new(i as f32 * 3.0 - 15.0, 0.0, -2.0));
            }
            scene.exec();
            scene.visibility();
            let mut out = Vec::new();
            scene.for_each_obj(|obj| {
                let work = obj.model().unwrap();
                out.push((work.cull_bits().clone(), work.cast_cull_bits().clone()));
                true
            });
            out
        };
        assert_eq!(bits(false), bits(true));
    }

    #[test]
    fn test_packages() {
        let (mut scene, log) = pipeline(0);
        let pkg = Package::new("props")
            .with_model((*box_model()).clone())
            .with_model(ModelData::new("crate", Vec::new(), box_model().batches().to_vec()));
        assert!(scene.load_pkg(pkg).is_some());
        assert!(scene.prepare_pkg_gfx("props"));
        assert_eq!(log.lock().unwrap().prepared_models.len(), 2);

        assert_eq!(scene.add_all_pkg_objs("props", Some("p_")), 2);
        assert_eq!(scene.add_all_pkg_objs("props", Some("p_")), 2);
        assert_eq!(scene.get_num_objs(), 2);
        assert!(scene.find_obj("p_crate").is_some());
        assert_eq!(scene.add_all_pkg_objs("missing", None), 0);

        assert!(scene.add_obj_by_model_name("crate", Some("c")).is_some());
        assert!(scene.unload_pkg("props"));
        assert!(log.lock().unwrap().prepared_models.is_empty());
        assert!(scene.find_pkg("props").is_none());
    }

    #[test]
    fn test_obj_queries_by_name() {
        let (mut scene, _) = pipeline(0);
        scene.add_obj(Some(box_model()), Some("box"));
        let deleted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&deleted);
        assert!(scene.set_obj_del_func(
            "box",
            Some(Arc::new(move |_obj: &mut SceneObject| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        ));
        assert!(scene.set_obj_exec_func(
            "box",
            Some(Arc::new(|obj: &mut SceneObject, _ctx: &mut JobContext<'_>| {
                obj.set_world_pos(Vec3::new(0.0, 2.0, 0.0));
                obj.update_bounds();
            }))
        ));
        assert!(!scene.set_obj_exec_func("nobody", None));
        scene.exec();
        assert_relative_eq!(scene.obj_world_pos("box"), Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(scene.obj_center_pos("box").y, 2.25, epsilon = 1e-5);
        assert_eq!(scene.obj_world_pos("nobody"), Vec3::zeros());
        scene.reset();
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        assert_eq!(scene.get_num_objs(), 0);
    }

    #[test]
    fn test_context_push_pop_and_sphere_visibility() {
        let (mut scene, _) = pipeline(0);
        assert!(scene.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 1.0, 0.0), 0.5), true));
        assert!(scene.push_ctx());
        scene.set_view(Vec3::new(0.0, 1.0, -10.0), Vec3::new(0.0, 1.0, -20.0), Vec3::y());
        assert!(!scene.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 1.0, 0.0), 0.5), false));
        assert!(scene.pop_ctx());
        assert!(scene.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 1.0, 0.0), 0.5), false));
        assert!(!scene.pop_ctx());
    }

    #[test]
    fn test_lighting_setters_survive_push_pop() {
        let (mut scene, _) = pipeline(0);
        scene.set_fog_rgb(Vec3::new(0.5, 0.6, 0.7));
        scene.set_fog_density(0.2);
        assert!(scene.push_ctx());
        scene.set_fog_density(0.9);
        scene.set_hemi_upper(Vec3::repeat(2.0));
        scene.set_gamma(1.0);
        scene.set_linear_bias(0.25);
        {
            let ctx = scene.draw_context();
            assert_eq!(ctx.fog.density(), 0.9);
            assert_eq!(ctx.hemi.upper, Vec3::repeat(2.0));
            assert_eq!(ctx.cc.gamma(), Vec3::repeat(1.0));
            assert_eq!(ctx.cc.linear_bias, Vec3::repeat(0.25));
        }
        assert!(scene.pop_ctx());
        let ctx = scene.draw_context();
        assert_eq!(ctx.fog.density(), 0.2);
        assert_eq!(ctx.fog.rgb, Vec3::new(0.5, 0.6, 0.7));
        assert_eq!(ctx.hemi, HemiLight::default());
        assert_eq!(ctx.cc, ColorCorrection::default());
    }

    #[test]
    fn test_global_rng_is_deterministic() {
        let (mut scene, _) = pipeline(0);
        let first: Vec<u64> = (0..4).map(|_| scene.glb_rng_next()).collect();
        scene.reset();
        let again: Vec<u64> = (0..4).map(|_| scene.glb_rng_next()).collect();
        assert_eq!(first, again);
    }
}
