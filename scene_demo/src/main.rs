//! Headless scene demo
//!
//! Builds a walled plaza with a leader and a crowd of followers, then runs a
//! few hundred frames through the scene pipeline against the null draw
//! backend and logs what the pipeline did.
//!
//! Usage: `scene_demo [config.toml|config.ron]`

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scene_engine::physics::{
    CollisionPolygon, DEFAULT_GROUND_OFFSET_BOTTOM, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_WALL_SLOPE_LIMIT,
};
use scene_engine::prelude::*;
use scene_engine::scene::{Material, ModelBatch, MotionTrack, SkeletonNode};
use thiserror::Error;

const FRAMES: u64 = 240;
const FOLLOWERS: usize = 48;
const PLAZA_HALF: f32 = 8.0;
const BODY_RADIUS: f32 = 0.3;

#[derive(Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] scene_engine::core::config::ConfigError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Package '{0}' is missing {1}")]
    Package(String, &'static str),
}

fn wall(p0: Vec3, p1: Vec3) -> Option<CollisionPolygon> {
    let up = Vec3::new(0.0, 3.0, 0.0);
    CollisionPolygon::quad(p0, p1, p1 + up, p0 + up)
}

fn plaza_collision() -> CollisionModel {
    let h = PLAZA_HALF;
    let corners = [
        Vec3::new(h, 0.0, -h),
        Vec3::new(h, 0.0, h),
        Vec3::new(-h, 0.0, h),
        Vec3::new(-h, 0.0, -h),
    ];
    let mut polys: Vec<CollisionPolygon> = (0..4)
        .filter_map(|i| wall(corners[i], corners[(i + 1) % 4]))
        .collect();
    polys.extend(CollisionPolygon::quad(
        Vec3::new(-h, 0.0, h),
        Vec3::new(h, 0.0, h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(-h, 0.0, -h),
    ));
    CollisionModel::new("plaza", polys)
}

fn walker_model() -> ModelData {
    let node = |name: &str, parent, y| SkeletonNode {
        name: name.to_string(),
        parent,
        rest: Transform::from_position_rotation(Vec3::new(0.0, y, 0.0), Quat::identity()),
    };
    ModelData::new(
        "walker",
        vec![node("root", None, 0.0), node("center", Some(0), 0.9), node("head", Some(1), 0.7)],
        vec![
            ModelBatch {
                material: Material::opaque("body"),
                bbox: AABB::new(Vec3::new(-0.3, 0.0, -0.2), Vec3::new(0.3, 1.8, 0.2)),
            },
            ModelBatch {
                material: Material::alpha("visor"),
                bbox: AABB::new(Vec3::new(-0.15, 1.5, 0.1), Vec3::new(0.15, 1.7, 0.25)),
            },
        ],
    )
}

fn walk_motion() -> MotionData {
    let keys = (0..16)
        .map(|i| {
            let bob = (i as f32 / 16.0 * 2.0 * PI).sin() * 0.05;
            Transform::from_position_rotation(Vec3::new(0.0, 0.9 + bob, 0.0), Quat::identity())
        })
        .collect();
    MotionData::new(
        "walk",
        vec![MotionTrack {
            node: "center".to_string(),
            keys,
        }],
    )
}

/// Leader update: wander inside the plaza and publish the position
fn leader_exec(plaza: Arc<CollisionModel>, walk: Arc<MotionData>, shared: Arc<Mutex<Vec3>>) -> scene_engine::scene::ExecFn {
    Arc::new(move |obj: &mut SceneObject, ctx: &mut JobContext<'_>| {
        let old = obj.world_pos();
        let mut heading = obj.flt_wk[0];
        let step = Vec3::new(heading.sin(), 0.0, heading.cos()) * 0.08;
        let adj = wall_adj(ctx.local_heap(), &plaza, old + step, old, BODY_RADIUS, DEFAULT_WALL_SLOPE_LIMIT);
        if adj.adjusted {
            let turn = (ctx.rng_next() % 1000) as f32 / 1000.0;
            heading += PI * (0.5 + turn);
            obj.flt_wk[0] = heading;
        }
        let mut pos = adj.position;
        pos.y = ground_height(&plaza, pos, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM);
        obj.set_world_quat_pos(Quat::from_axis_angle(&Vec3::y_axis(), heading), pos);
        obj.advance(Some(&walk), 1.0);
        *shared.lock().unwrap_or_else(PoisonError::into_inner) = pos;
    })
}

/// Follower update: steer toward the leader's published position
fn follower_exec(plaza: Arc<CollisionModel>, walk: Arc<MotionData>, leader: Arc<Mutex<Vec3>>) -> scene_engine::scene::ExecFn {
    Arc::new(move |obj: &mut SceneObject, ctx: &mut JobContext<'_>| {
        let target = *leader.lock().unwrap_or_else(PoisonError::into_inner);
        let old = obj.world_pos();
        let to_target = Vec3::new(target.x - old.x, 0.0, target.z - old.z);
        let dist = to_target.norm();
        if dist < 1.0 {
            obj.advance(None, 0.0);
            return;
        }
        let speed = obj.flt_wk[1];
        let mut pos = old + to_target / dist * speed;
        let adj = wall_adj(ctx.local_heap(), &plaza, pos, old, BODY_RADIUS, DEFAULT_WALL_SLOPE_LIMIT);
        pos = adj.position;
        let leader_adj = sph_sph_adj(pos, old, BODY_RADIUS, target, BODY_RADIUS, 0.5, 0.01);
        pos = leader_adj.position;
        pos.y = ground_height(&plaza, pos, DEFAULT_GROUND_OFFSET_TOP, DEFAULT_GROUND_OFFSET_BOTTOM);
        let heading = to_target.x.atan2(to_target.z);
        obj.set_world_quat_pos(Quat::from_axis_angle(&Vec3::y_axis(), heading), pos);
        obj.advance(Some(&walk), speed * 10.0);
    })
}

fn run() -> Result<(), DemoError> {
    scene_engine::foundation::logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            SceneConfig::load_from_file(&path)?
        }
        None => SceneConfig::default(),
    };

    let draw = NullDraw::new(1280, 720);
    let draw_log = draw.log_handle();
    let mut scene = ScenePipeline::new(config, Some(Box::new(draw)), Some(Box::new(MemoryResourceManager::new())))?;

    let pkg = Package::new("plaza")
        .with_model(walker_model())
        .with_motion(walk_motion())
        .with_collision(plaza_collision());
    let pkg = scene.load_pkg(pkg).ok_or_else(|| DemoError::Package("plaza".to_string(), "resource manager"))?;
    scene.prepare_pkg_gfx("plaza");
    let plaza = pkg
        .find_collision("plaza")
        .cloned()
        .ok_or_else(|| DemoError::Package("plaza".to_string(), "collision"))?;
    let walk = pkg
        .find_motion("walk")
        .cloned()
        .ok_or_else(|| DemoError::Package("plaza".to_string(), "motion"))?;

    let leader_pos = Arc::new(Mutex::new(Vec3::zeros()));
    if let Some(key) = scene.add_obj_by_model_name("walker", Some("leader")) {
        if let Some(obj) = scene.obj(key) {
            let mut obj = lock_object(&obj);
            obj.set_priority(0);
            obj.flt_wk[0] = 0.3;
            obj.callbacks.exec = Some(leader_exec(Arc::clone(&plaza), Arc::clone(&walk), Arc::clone(&leader_pos)));
        }
    }

    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..FOLLOWERS {
        let name = format!("follower{i:02}");
        let Some(key) = scene.add_obj_by_model_name("walker", Some(&name)) else { continue };
        let Some(obj) = scene.obj(key) else { continue };
        let mut obj = lock_object(&obj);
        obj.set_priority(1);
        obj.flt_wk[1] = rng.gen_range(0.02..0.06);
        let x = rng.gen_range(-PLAZA_HALF + 1.0..PLAZA_HALF - 1.0);
        let z = rng.gen_range(-PLAZA_HALF + 1.0..PLAZA_HALF - 1.0);
        obj.set_world_pos(Vec3::new(x, 0.0, z));
        if i % 8 == 0 {
            obj.set_shadow_cast_disabled(true);
        }
        obj.callbacks.exec = Some(follower_exec(Arc::clone(&plaza), Arc::clone(&walk), Arc::clone(&leader_pos)));
    }
    log::info!("Spawned {} objects", scene.get_num_objs());

    scene.set_view(Vec3::new(0.0, 14.0, 18.0), Vec3::zeros(), Vec3::y());
    scene.set_shadow_dir_degrees(60.0, 30.0);
    scene.set_shadow_proj_params(20.0, 30.0, 40.0);
    scene.set_spec_dir_to_shadow();
    scene.set_hemi_lower(Vec3::new(0.1, 0.12, 0.08));
    scene.set_fog_rgb(Vec3::new(0.2, 0.3, 0.4));
    scene.set_fog_density(0.5);
    scene.set_fog_range(20.0, 60.0);
    scene.set_exposure(1.2);

    let mut total_batches = 0;
    for frame in 0..FRAMES {
        scene.frame_begin(Vec4::new(0.2, 0.3, 0.4, 1.0));
        scene.exec();
        scene.visibility();
        scene.draw(true);
        scene.sprite(&Sprite::default());
        scene.frame_end();

        let log = draw_log.lock().unwrap_or_else(PoisonError::into_inner);
        total_batches += log.batches.len();
        if frame % 60 == 0 {
            log::info!(
                "Frame {}: {} shadow, {} opaque, {} alpha batches; leader at {:?}",
                frame,
                log.count(DrawMode::ShadowCast),
                log.count(DrawMode::Standard),
                log.count(DrawMode::AlphaDiscard),
                scene.obj_center_pos("leader")
            );
        }
    }

    log::info!(
        "Ran {} frames, {} batches; jobs per worker {:?}",
        scene.frame_count(),
        total_batches,
        scene.completed_jobs()
    );

    scene.del_all_objs();
    scene.unload_all_pkgs();
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
