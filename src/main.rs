// src/main.rs

use std::collections::BTreeMap;

use glam::Vec2;
use sublight::frame_lib::{FrameContext, LightDraw, ViewRect, Viewer};
use sublight::geometry::Rect;
use sublight::lighting_lib::{BodyId, LightParams};
use sublight::occlusion_lib::{OcclusionWorld, VesselInfo, VesselTable};
use sublight::{LightManager, LightingConfig, LightingError};

const FRAMES: usize = 120;
const FRAME_TIME: f64 = 1.0 / 60.0;

/// Small two-vessel scene: a submarine with a few rooms and a docked shuttle.
fn build_scene(world: &mut OcclusionWorld, vessels: &mut VesselTable) {
    vessels.insert(1, VesselInfo::new(Vec2::ZERO, Rect::new(Vec2::new(-600.0, -300.0), Vec2::new(600.0, 300.0))));
    vessels.insert(2, VesselInfo::new(Vec2::new(800.0, 0.0), Rect::new(Vec2::new(-150.0, -100.0), Vec2::new(150.0, 100.0))));
    vessels.dock(1, 2);

    // hull walls overlap at the corners so their LOS lines join
    world.create(Some(1), Rect::new(Vec2::new(-600.0, 280.0), Vec2::new(600.0, 300.0)), None);
    world.create(Some(1), Rect::new(Vec2::new(-600.0, -300.0), Vec2::new(600.0, -280.0)), None);
    world.create(Some(1), Rect::new(Vec2::new(-600.0, -290.0), Vec2::new(-580.0, 290.0)), None);
    world.create(Some(1), Rect::new(Vec2::new(580.0, -290.0), Vec2::new(600.0, 290.0)), None);
    // interior walls
    world.create(Some(1), Rect::new(Vec2::new(-10.0, -285.0), Vec2::new(10.0, 120.0)), None);
    world.create(Some(1), Rect::new(Vec2::new(10.0, -10.0), Vec2::new(400.0, 10.0)), None);
    // shuttle
    world.create(Some(2), Rect::new(Vec2::new(-150.0, 80.0), Vec2::new(150.0, 100.0)), None);
    world.create(Some(2), Rect::new(Vec2::new(-150.0, -100.0), Vec2::new(150.0, -80.0)), None);
}

fn main() -> Result<(), LightingError> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => LightingConfig::load(path)?,
        None => LightingConfig::default(),
    };
    log::info!("Lighting config: {:?}", config);

    let mut world = OcclusionWorld::new();
    let mut vessels = VesselTable::new();
    build_scene(&mut world, &mut vessels);
    log::info!("Scene has {} occluders", world.len());

    let mut manager = LightManager::new(config);
    for i in 0..8 {
        let x = -500.0 + i as f32 * 140.0;
        manager.add_light(Vec2::new(x, 150.0), Some(1), LightParams::new(250.0, [1.0, 0.9, 0.7, 1.0]));
    }
    manager.add_light(
        Vec2::new(-300.0, -150.0),
        Some(1),
        LightParams { range: 300.0, pulse_frequency: 0.5, pulse_amount: 0.6, deferred: true, ..Default::default() },
    );
    manager.add_light(
        Vec2::new(0.0, 0.0),
        Some(2),
        LightParams { range: 150.0, flicker: 0.5, flicker_speed: 4.0, ..Default::default() },
    );
    let torch = manager.add_light(
        Vec2::ZERO,
        Some(1),
        LightParams { range: 200.0, casts_shadows: false, ..Default::default() },
    );
    let diver: BodyId = 1;
    manager.light_mut(torch)?.set_parent_body(Some(diver));

    let mut bodies: BTreeMap<BodyId, Vec2> = BTreeMap::new();
    for frame in 0..FRAMES {
        let time = frame as f64 * FRAME_TIME;
        let diver_pos = Vec2::new(-400.0 + frame as f32 * 5.0, -100.0);
        bodies.insert(diver, diver_pos);
        // the shuttle drifts against its dock
        vessels.set_position(2, Vec2::new(800.0 + (time * 3.0).sin() as f32 * 20.0, 0.0));

        let ctx = FrameContext {
            occluders: &world,
            vessels: &vessels,
            bodies: &bodies,
            view: ViewRect::new(diver_pos, Vec2::new(1920.0, 1080.0)),
            viewer: Some(Viewer::new(diver_pos, Some(1)).with_head(diver_pos + Vec2::new(0.0, 20.0))),
            time,
            in_editor: false,
        };
        let stats = manager.update(&ctx);
        log::debug!("Frame {}: {:?}", frame, stats);
    }
    manager.flush_worker();

    let draws = manager.draw_list(&vessels);
    let volumes = draws.iter().filter(|d| matches!(d, LightDraw::Volume { .. })).count();
    log::info!(
        "{} lights drawn ({} volumes, {} sprites), LOS mask has {} vertices",
        draws.len(),
        volumes,
        draws.len() - volumes,
        manager.los_mask().hard_vertices().len() + manager.los_mask().penumbra_vertices().len()
    );
    for light in manager.lights() {
        log::info!(
            "Light {}: {} rebuilds, {} mesh vertices",
            light.id(),
            light.recalculations(),
            light.mesh().vertex_count()
        );
    }
    Ok(())
}
