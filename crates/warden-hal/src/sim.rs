//! In-process stand-ins for every host seam.
//!
//! Each simulated device is a cheap cloneable handle over shared state, so a
//! test (or the headless scene) can hand one clone to the controller and
//! keep another to inspect or step it.
//!
//! # Example
//!
//! ```rust
//! use warden_hal::sim::SimNavigator;
//! use warden_hal::Navigator;
//! use warden_types::Vec3;
//!
//! let nav = SimNavigator::at(Vec3::ZERO);
//! let mut driver: Box<dyn Navigator> = Box::new(nav.clone());
//! driver.set_speed(10.0);
//! driver.set_destination(Vec3::new(100.0, 0.0, 0.0));
//!
//! nav.step(1.0);
//! assert!((nav.position().x - 10.0).abs() < 1e-4);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use warden_types::{Quaternion, Vec3};

use crate::audio::AudioChannel;
use crate::effects::{EffectId, EffectSpawner, Reactors};
use crate::navigator::{Navigator, PathStatus};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Navigator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct NavState {
    position: Vec3,
    rotation: Quaternion,
    velocity: Vec3,
    destination: Vec3,
    speed: f32,
    stopping_distance: f32,
    update_rotation: bool,
    path_status: PathStatus,
}

/// A kinematic navigator: moves in a straight line toward its destination at
/// its configured speed, halting at the stopping distance.  Obstacles are
/// not simulated.
#[derive(Debug, Clone)]
pub struct SimNavigator {
    state: Arc<Mutex<NavState>>,
}

impl SimNavigator {
    /// Create a stationary navigator at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            state: Arc::new(Mutex::new(NavState {
                position,
                rotation: Quaternion::identity(),
                velocity: Vec3::ZERO,
                destination: position,
                speed: 0.0,
                stopping_distance: 0.0,
                update_rotation: true,
                path_status: PathStatus::Complete,
            })),
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&self, dt: f32) {
        let mut s = lock(&self.state);
        let to_goal = s.destination - s.position;
        let remaining = to_goal.length() - s.stopping_distance;
        if dt <= 0.0 || s.speed <= 0.0 || remaining <= 0.0 {
            s.velocity = Vec3::ZERO;
            return;
        }
        let dir = to_goal.normalized();
        let travel = (s.speed * dt).min(remaining);
        s.position += dir * travel;
        s.velocity = dir * (travel / dt);
        if s.update_rotation
            && let Some(facing) = Quaternion::look_rotation(dir)
        {
            s.rotation = facing;
        }
    }

    /// Teleport the agent.
    pub fn warp(&self, position: Vec3) {
        let mut s = lock(&self.state);
        s.position = position;
        s.velocity = Vec3::ZERO;
    }

    /// Force the reported path status (e.g. to emulate an unreachable goal).
    pub fn set_path_status(&self, status: PathStatus) {
        lock(&self.state).path_status = status;
    }
}

impl Navigator for SimNavigator {
    fn position(&self) -> Vec3 {
        lock(&self.state).position
    }

    fn rotation(&self) -> Quaternion {
        lock(&self.state).rotation
    }

    fn set_rotation(&mut self, rotation: Quaternion) {
        lock(&self.state).rotation = rotation;
    }

    fn velocity(&self) -> Vec3 {
        lock(&self.state).velocity
    }

    fn destination(&self) -> Vec3 {
        lock(&self.state).destination
    }

    fn set_destination(&mut self, destination: Vec3) {
        lock(&self.state).destination = destination;
    }

    fn speed(&self) -> f32 {
        lock(&self.state).speed
    }

    fn set_speed(&mut self, speed: f32) {
        lock(&self.state).speed = speed;
    }

    fn stopping_distance(&self) -> f32 {
        lock(&self.state).stopping_distance
    }

    fn set_stopping_distance(&mut self, distance: f32) {
        lock(&self.state).stopping_distance = distance;
    }

    fn set_update_rotation(&mut self, enabled: bool) {
        lock(&self.state).update_rotation = enabled;
    }

    fn update_rotation(&self) -> bool {
        lock(&self.state).update_rotation
    }

    fn path_status(&self) -> PathStatus {
        lock(&self.state).path_status
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Effects
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EffectsState {
    next_id: u64,
    live: Vec<EffectId>,
    spawned: u64,
}

/// Records spawned fog puffs in creation order.
#[derive(Debug, Clone, Default)]
pub struct SimEffects {
    state: Arc<Mutex<EffectsState>>,
}

impl SimEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles of the effects currently alive, oldest first.
    pub fn live(&self) -> Vec<EffectId> {
        lock(&self.state).live.clone()
    }

    /// Total number of spawns since creation.
    pub fn spawned(&self) -> u64 {
        lock(&self.state).spawned
    }
}

impl EffectSpawner for SimEffects {
    fn spawn(&mut self) -> EffectId {
        let mut s = lock(&self.state);
        s.next_id += 1;
        let id = EffectId(s.next_id);
        s.live.push(id);
        s.spawned += 1;
        id
    }

    fn despawn(&mut self, id: EffectId) {
        lock(&self.state).live.retain(|&e| e != id);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reactors
// ────────────────────────────────────────────────────────────────────────────

/// Snapshot of a [`SimReactors`] rig.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactorState {
    pub calm_screen: bool,
    pub calm_text: String,
    pub alert_screen: bool,
    pub alerts: u32,
    pub top_light: bool,
    pub front_light_off: bool,
    pub arm_lights_off: bool,
    pub disabled: bool,
}

/// Records every reactor command.
#[derive(Debug, Clone, Default)]
pub struct SimReactors {
    state: Arc<Mutex<ReactorState>>,
}

impl SimReactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReactorState {
        lock(&self.state).clone()
    }
}

impl Reactors for SimReactors {
    fn set_calm_screen(&mut self, visible: bool) {
        lock(&self.state).calm_screen = visible;
    }

    fn set_calm_text(&mut self, text: &str) {
        lock(&self.state).calm_text = text.to_string();
    }

    fn alert(&mut self) {
        let mut s = lock(&self.state);
        s.alert_screen = true;
        s.alerts += 1;
        s.arm_lights_off = false;
        s.top_light = !s.top_light;
        s.front_light_off = !s.front_light_off;
    }

    fn lights_off(&mut self) {
        let mut s = lock(&self.state);
        s.top_light = false;
        s.arm_lights_off = true;
        s.front_light_off = true;
    }

    fn disable(&mut self) {
        lock(&self.state).disabled = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Audio
// ────────────────────────────────────────────────────────────────────────────

/// Snapshot of a [`SimAudio`] channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioState {
    pub muted: bool,
    pub plays: u32,
    pub volume: f32,
}

/// Records mute, play and volume commands.
#[derive(Debug, Clone, Default)]
pub struct SimAudio {
    state: Arc<Mutex<AudioState>>,
}

impl SimAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AudioState {
        *lock(&self.state)
    }
}

impl AudioChannel for SimAudio {
    fn set_muted(&mut self, muted: bool) {
        lock(&self.state).muted = muted;
    }

    fn play(&mut self) {
        lock(&self.state).plays += 1;
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.state).volume = volume;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
