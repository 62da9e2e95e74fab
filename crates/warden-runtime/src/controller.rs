//! [`PursuitController`] – one pursuit robot's per-frame driver.
//!
//! Each frame the controller accumulates elapsed time; once the tick
//! interval has passed it re-evaluates the robot:
//!
//! 1. **Active pursuit** – fire the distraction reactors, test line of sight
//!    to the actor, and feed the fog pool.
//! 2. **Inactive** – refresh the calm screen.
//! 3. **Decide** – run the [`ObjectiveStateMachine`] and hand the resulting
//!    destination and speed to the [`Navigator`].
//!
//! Every frame, regardless of the tick, the robot turns to face the actor
//! once it has (nearly) reached its destination, and the wheel volume
//! tracks how fast it is moving.
//!
//! All collaborators are injected through [`PursuitControllerBuilder`];
//! a missing one fails the build with
//! [`WardenError::MissingCollaborator`].

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warden_hal::{AudioChannel, EffectSpawner, Navigator, PathStatus, Reactors};
use warden_middleware::SharedForecast;
use warden_perception::{EyeOffsets, LineOfSightOracle, VisibilityConfig};
use warden_types::{Objective, Quaternion, Vec3, WardenError};

use crate::fog_pool::{FogConfig, FogEffectPool};
use crate::objective::ObjectiveStateMachine;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Behaviour toggles, fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Whether the robots take part at all.
    pub enabled: bool,
    /// Race for the forecast instead of following when the actor is seen.
    pub aggressive: bool,
    /// Use screens, siren and lights to draw the actor's attention.
    pub distracting: bool,
    /// Leave fog behind while the actor is visible.
    pub fog: bool,
}

impl Features {
    /// Flags used when the host runs without immersive mode.
    pub fn desktop() -> Self {
        Self {
            enabled: true,
            aggressive: false,
            distracting: true,
            fog: true,
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::desktop()
    }
}

/// Movement tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    pub max_speed: f32,
    /// Turn rate used when facing the actor, as a slerp factor per second.
    pub rotate_speed: f32,
    /// Stand-off distance kept while following.
    pub follow_distance: f32,
    /// Navigator stopping distance.
    pub stop_distance: f32,
    /// Seconds between objective evaluations.
    pub tick_interval: f32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            max_speed: 38.6,
            rotate_speed: 3.14,
            follow_distance: 49.21,
            stop_distance: 4.92,
            tick_interval: 0.5,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────────────────

/// What a controller last published about its robot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RobotSnapshot {
    pub position: Vec3,
    pub objective: Objective,
    pub actor_visible: bool,
    pub pursuit_active: bool,
    /// Current speed over configured speed; `0` while the speed is zero.
    pub velocity_ratio: f32,
}

/// Status slot a controller writes and the telemetry emitter reads.
#[derive(Debug, Default)]
pub struct RobotStatus {
    inner: Mutex<RobotSnapshot>,
}

pub type SharedStatus = Arc<RobotStatus>;

impl RobotStatus {
    pub fn shared() -> SharedStatus {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> RobotSnapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, snapshot: RobotSnapshot) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-frame input
// ────────────────────────────────────────────────────────────────────────────

/// The host's view of the actor for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorView {
    /// Ground position of the actor.
    pub position: Vec3,
    /// Whether the pursuit scenario is currently running.
    pub pursuit_active: bool,
}

/// Idle screen text: local time plus a fixed weather caption.
pub fn calm_screen_text(time: NaiveTime) -> String {
    format!("{}\n\nSlightly Cloudy\n74°", time.format("%I:%M %p"))
}

// ────────────────────────────────────────────────────────────────────────────
// PursuitController
// ────────────────────────────────────────────────────────────────────────────

/// Drives one robot.  Construct with [`PursuitController::builder`].
pub struct PursuitController {
    name: String,
    features: Features,
    config: PursuitConfig,
    navigator: Box<dyn Navigator>,
    oracle: LineOfSightOracle,
    eyes: EyeOffsets,
    forecast: SharedForecast,
    reactors: Box<dyn Reactors>,
    spray: Box<dyn AudioChannel>,
    wheels: Box<dyn AudioChannel>,
    fog: FogEffectPool,
    machine: ObjectiveStateMachine,
    status: SharedStatus,
    elapsed: f32,
    pursuit_active: bool,
    actor_visible: bool,
    velocity_ratio: f32,
    calm_text: String,
}

impl PursuitController {
    pub fn builder(name: impl Into<String>) -> PursuitControllerBuilder {
        PursuitControllerBuilder::new(name)
    }

    /// Advance by one frame of `dt` seconds.
    ///
    /// A disabled robot ignores every call.
    pub fn update(&mut self, dt: f32, actor: ActorView) {
        if !self.features.enabled {
            return;
        }

        self.elapsed += dt;
        if self.elapsed >= self.config.tick_interval {
            self.elapsed = 0.0;
            self.evaluate(actor);
        }

        self.face_actor(dt, actor.position);

        let speed = self.navigator.speed();
        self.velocity_ratio = if speed > 0.0 {
            self.navigator.velocity().length() / speed
        } else {
            0.0
        };
        self.wheels.set_volume(self.velocity_ratio.clamp(0.0, 1.0));

        self.publish();
    }

    fn evaluate(&mut self, actor: ActorView) {
        self.pursuit_active = actor.pursuit_active;
        let robot = self.navigator.position();

        if self.pursuit_active {
            self.reactors_on();
            self.actor_visible = self.oracle.is_visible(robot, actor.position, self.eyes);
            self.smoke_screen();
        } else {
            self.refresh_calm_text();
        }

        let objective = self.machine.evaluate(self.pursuit_active, self.actor_visible);
        let target = self
            .machine
            .target(robot, actor.position, self.forecast.predicted_position());

        self.navigator.set_update_rotation(true);
        self.navigator
            .set_speed(target.speed_factor * self.config.max_speed);
        self.navigator.set_destination(target.destination);

        debug!(
            robot = %self.name,
            %objective,
            visible = self.actor_visible,
            destination = %target.destination,
            "pursuit tick"
        );
    }

    fn reactors_on(&mut self) {
        self.reactors.set_calm_screen(false);
        if self.features.distracting {
            self.reactors.alert();
        }
    }

    fn smoke_screen(&mut self) {
        if self.features.fog {
            self.spray.set_muted(false);
            self.spray.play();
        }
        self.fog.on_tick(self.actor_visible);
    }

    fn face_actor(&mut self, dt: f32, actor: Vec3) {
        if self.machine.current() == Objective::Rest {
            return;
        }
        let position = self.navigator.position();
        let arrived = position.distance(self.navigator.destination())
            < self.navigator.stopping_distance();
        if !arrived && self.navigator.path_status() != PathStatus::Partial {
            return;
        }

        self.navigator.set_update_rotation(false);
        if let Some(look) = Quaternion::look_rotation(actor - position) {
            let current = self.navigator.rotation();
            self.navigator
                .set_rotation(current.slerp(look, dt * self.config.rotate_speed));
        }
    }

    fn refresh_calm_text(&mut self) {
        self.calm_text = calm_screen_text(Local::now().time());
        self.reactors.set_calm_text(&self.calm_text);
    }

    fn publish(&self) {
        self.status.publish(RobotSnapshot {
            position: self.navigator.position(),
            objective: self.machine.current(),
            actor_visible: self.actor_visible,
            pursuit_active: self.pursuit_active,
            velocity_ratio: self.velocity_ratio,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objective(&self) -> Objective {
        self.machine.current()
    }

    pub fn actor_visible(&self) -> bool {
        self.actor_visible
    }

    pub fn pursuit_active(&self) -> bool {
        self.pursuit_active
    }

    pub fn velocity_ratio(&self) -> f32 {
        self.velocity_ratio
    }

    /// Text last written to the calm screen.
    pub fn calm_text(&self) -> &str {
        &self.calm_text
    }

    pub fn is_enabled(&self) -> bool {
        self.features.enabled
    }

    /// Handle to the status slot this controller publishes into.
    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn fog(&self) -> &FogEffectPool {
        &self.fog
    }
}

impl std::fmt::Debug for PursuitController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PursuitController")
            .field("name", &self.name)
            .field("features", &self.features)
            .field("objective", &self.machine.current())
            .field("actor_visible", &self.actor_visible)
            .field("fog", &self.fog)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Collects a controller's collaborators and settings.
pub struct PursuitControllerBuilder {
    name: String,
    features: Features,
    config: PursuitConfig,
    visibility: VisibilityConfig,
    fog_config: FogConfig,
    navigator: Option<Box<dyn Navigator>>,
    oracle: Option<LineOfSightOracle>,
    forecast: Option<SharedForecast>,
    reactors: Option<Box<dyn Reactors>>,
    spray: Option<Box<dyn AudioChannel>>,
    wheels: Option<Box<dyn AudioChannel>>,
    effects: Option<Box<dyn EffectSpawner>>,
    status: Option<SharedStatus>,
}

impl PursuitControllerBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Features::default(),
            config: PursuitConfig::default(),
            visibility: VisibilityConfig::default(),
            fog_config: FogConfig::default(),
            navigator: None,
            oracle: None,
            forecast: None,
            reactors: None,
            spray: None,
            wheels: None,
            effects: None,
            status: None,
        }
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn config(mut self, config: PursuitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn visibility(mut self, visibility: VisibilityConfig) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn fog_config(mut self, fog: FogConfig) -> Self {
        self.fog_config = fog;
        self
    }

    pub fn navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Box::new(navigator));
        self
    }

    pub fn oracle(mut self, oracle: LineOfSightOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Forecast shared with the prediction channel.
    pub fn forecast(mut self, forecast: SharedForecast) -> Self {
        self.forecast = Some(forecast);
        self
    }

    pub fn reactors(mut self, reactors: impl Reactors + 'static) -> Self {
        self.reactors = Some(Box::new(reactors));
        self
    }

    pub fn spray(mut self, spray: impl AudioChannel + 'static) -> Self {
        self.spray = Some(Box::new(spray));
        self
    }

    pub fn wheels(mut self, wheels: impl AudioChannel + 'static) -> Self {
        self.wheels = Some(Box::new(wheels));
        self
    }

    pub fn effects(mut self, effects: impl EffectSpawner + 'static) -> Self {
        self.effects = Some(Box::new(effects));
        self
    }

    /// Publish into an existing status slot instead of a fresh one.
    pub fn status(mut self, status: SharedStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Validate collaborators and put the robot into its resting state.
    pub fn build(self) -> Result<PursuitController, WardenError> {
        let mut navigator = self
            .navigator
            .ok_or(WardenError::MissingCollaborator("navigator"))?;
        let oracle = self
            .oracle
            .ok_or(WardenError::MissingCollaborator("line-of-sight oracle"))?;
        let forecast = self
            .forecast
            .ok_or(WardenError::MissingCollaborator("forecast"))?;
        let mut reactors = self
            .reactors
            .ok_or(WardenError::MissingCollaborator("reactors"))?;
        let mut spray = self
            .spray
            .ok_or(WardenError::MissingCollaborator("spray audio"))?;
        let wheels = self
            .wheels
            .ok_or(WardenError::MissingCollaborator("wheel audio"))?;
        let effects = self
            .effects
            .ok_or(WardenError::MissingCollaborator("effect spawner"))?;

        info!(
            robot = %self.name,
            enabled = self.features.enabled,
            aggressive = self.features.aggressive,
            distracting = self.features.distracting,
            fog = self.features.fog,
            "pursuit robot configured"
        );

        spray.set_muted(true);
        reactors.lights_off();
        reactors.set_calm_screen(true);
        navigator.set_stopping_distance(self.config.stop_distance);
        if !self.features.distracting {
            reactors.disable();
        }

        let mut controller = PursuitController {
            machine: ObjectiveStateMachine::new(
                self.features.aggressive,
                self.config.follow_distance,
            ),
            fog: FogEffectPool::new(effects, &self.fog_config, self.features.fog),
            eyes: EyeOffsets::robot_to_actor(&self.visibility),
            status: self.status.unwrap_or_else(RobotStatus::shared),
            name: self.name,
            features: self.features,
            config: self.config,
            navigator,
            oracle,
            forecast,
            reactors,
            spray,
            wheels,
            elapsed: 0.0,
            pursuit_active: false,
            actor_visible: false,
            velocity_ratio: 0.0,
            calm_text: String::new(),
        };
        controller.refresh_calm_text();
        controller.publish();
        Ok(controller)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
