//! Headless world for running the pursuit stack without an engine.
//!
//! The actor walks a square loop around a central building, three NPCs
//! stand around the yard (one of them is taken out after a while) and the
//! doors only "load" a couple of seconds in.  Two robots ride on
//! [`SimNavigator`]s with simulated reactors, audio and fog.

use std::sync::{Arc, Mutex, PoisonError};

use warden_hal::sim::{SimAudio, SimEffects, SimNavigator, SimReactors};
use warden_middleware::PlayerInfo;
use warden_perception::{Aabb, ObstacleField, Occluder};
use warden_runtime::{ActorView, DoorLayout, NpcState, Scene, SceneClock};
use warden_types::Vec3;

/// Half the side of the actor's walking loop.
const LOOP_HALF: f32 = 20.0;
const WALK_SPEED: f32 = 4.0;
/// Seconds before the pursuit scenario starts.
const PURSUIT_STARTS: f32 = 1.0;
const DOORS_LOAD_AFTER: f32 = 2.0;
const NPC_DOWN_AFTER: f32 = 20.0;
const SHOT_EVERY: f32 = 3.0;

#[derive(Debug, Default)]
struct SimState {
    total_time: f32,
}

/// Shared world state.  The frame loop advances it; the telemetry task
/// reads it.
#[derive(Debug)]
pub struct SimScene {
    walls: Arc<ObstacleField>,
    npcs: Vec<Vec3>,
    doors: DoorLayout,
    state: Mutex<SimState>,
}

impl Default for SimScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SimScene {
    pub fn new() -> Self {
        let walls = ObstacleField::new(vec![
            // central building
            Aabb::new(Vec3::new(-8.0, 0.0, -8.0), Vec3::new(8.0, 10.0, 8.0)),
            // low wall on the east side of the loop
            Aabb::new(Vec3::new(26.0, 0.0, -10.0), Vec3::new(27.0, 4.0, 10.0)),
        ]);
        Self {
            walls: Arc::new(walls),
            npcs: vec![
                Vec3::new(-30.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 30.0),
                Vec3::new(12.0, 0.0, -12.0),
            ],
            doors: DoorLayout {
                open: vec![Vec3::new(0.0, 0.0, -8.5)],
                closed: vec![Vec3::new(8.5, 0.0, 0.0), Vec3::new(-8.5, 0.0, 0.0)],
            },
            state: Mutex::new(SimState::default()),
        }
    }

    /// The collision geometry, for building line-of-sight oracles.
    pub fn occluder(&self) -> Arc<dyn Occluder> {
        self.walls.clone()
    }

    pub fn advance(&self, dt: f32) {
        self.lock().total_time += dt.max(0.0);
    }

    pub fn elapsed(&self) -> f32 {
        self.lock().total_time
    }

    pub fn actor(&self) -> ActorView {
        let t = self.elapsed();
        ActorView {
            position: walk(t).0,
            pursuit_active: t >= PURSUIT_STARTS,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Position and heading (degrees about +Y) along the square loop after
/// `t` seconds of walking.
fn walk(t: f32) -> (Vec3, f32) {
    let side = 2.0 * LOOP_HALF;
    let s = (t * WALK_SPEED).rem_euclid(4.0 * side);
    let along = s % side;
    let h = LOOP_HALF;
    match (s / side) as u32 {
        0 => (Vec3::new(-h + along, 0.0, -h), 90.0),
        1 => (Vec3::new(h, 0.0, -h + along), 0.0),
        2 => (Vec3::new(h - along, 0.0, h), 270.0),
        _ => (Vec3::new(-h, 0.0, h - along), 180.0),
    }
}

impl Scene for SimScene {
    fn clock(&self) -> SceneClock {
        let t = self.elapsed();
        SceneClock {
            total_time: t,
            shoot_time: (t - PURSUIT_STARTS).max(0.0),
        }
    }

    fn player(&self) -> PlayerInfo {
        let t = self.elapsed();
        let (position, yaw) = walk(t);
        let shoot_time = (t - PURSUIT_STARTS).max(0.0);
        PlayerInfo {
            position,
            rotation: Vec3::new(0.0, yaw, 0.0),
            shots_fired: (shoot_time / SHOT_EVERY) as u32,
            ..PlayerInfo::default()
        }
    }

    fn npcs(&self) -> Vec<NpcState> {
        let t = self.elapsed();
        self.npcs
            .iter()
            .enumerate()
            .map(|(i, &position)| NpcState {
                position,
                alive: !(i == 0 && t >= NPC_DOWN_AFTER),
            })
            .collect()
    }

    fn doors(&self) -> Option<DoorLayout> {
        (self.elapsed() >= DOORS_LOAD_AFTER).then(|| self.doors.clone())
    }
}

/// Simulated hardware for one robot.  Every field is a handle over shared
/// state, so clones go to the controller and the originals stay here for
/// stepping and inspection.
#[derive(Debug, Clone)]
pub struct SimRobot {
    pub navigator: SimNavigator,
    pub reactors: SimReactors,
    pub spray: SimAudio,
    pub wheels: SimAudio,
    pub effects: SimEffects,
}

impl SimRobot {
    pub fn at(position: Vec3) -> Self {
        Self {
            navigator: SimNavigator::at(position),
            reactors: SimReactors::new(),
            spray: SimAudio::new(),
            wheels: SimAudio::new(),
            effects: SimEffects::new(),
        }
    }

    pub fn step(&self, dt: f32) {
        self.navigator.step(dt);
    }
}
