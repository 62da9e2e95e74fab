//! [`TelemetryEmitter`] – periodic world-state snapshots for the forecaster.
//!
//! On every tick of its timer the emitter asks the [`Scene`] for the
//! actor, NPCs and doors, reads both robots' published status, works out
//! what the actor can see, and sends the resulting [`TelemetryFrame`]
//! through the channel's [`TelemetrySender`].  Send failures are logged and
//! the timer keeps running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_middleware::{
    ChannelConfig, NpcInfo, PlayerInfo, RobotInfo, TelemetryFrame, TelemetrySender, TimeInfo,
};
use warden_perception::{EyeOffsets, LineOfSightOracle, VisibilityConfig};
use warden_types::{Vec3, WardenError};

use crate::controller::SharedStatus;

// ────────────────────────────────────────────────────────────────────────────
// Scene seam
// ────────────────────────────────────────────────────────────────────────────

/// Session clocks, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SceneClock {
    pub total_time: f32,
    pub shoot_time: f32,
}

/// One tracked NPC as the scene reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpcState {
    pub position: Vec3,
    pub alive: bool,
}

/// Door positions, split by state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoorLayout {
    pub open: Vec<Vec3>,
    pub closed: Vec<Vec3>,
}

impl DoorLayout {
    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.closed.is_empty()
    }
}

/// Read-only access to the host world.
///
/// Called from the emitter's task, so implementations synchronise their
/// own state.
pub trait Scene: Send + Sync {
    fn clock(&self) -> SceneClock;

    /// Actor pose, weapon counters and eye data.  Without eye tracking the
    /// focus is `None` and both pupils are `0`.
    fn player(&self) -> PlayerInfo;

    fn npcs(&self) -> Vec<NpcState>;

    /// Door positions, or `None` while the scene's objects are still
    /// loading.
    fn doors(&self) -> Option<DoorLayout>;
}

// ────────────────────────────────────────────────────────────────────────────
// TelemetryEmitter
// ────────────────────────────────────────────────────────────────────────────

/// Gathers and sends one [`TelemetryFrame`] per timer tick.
pub struct TelemetryEmitter {
    oracle: LineOfSightOracle,
    eyes: EyeOffsets,
    sender: TelemetrySender,
    robots: [SharedStatus; 2],
    period: Duration,
    time_ahead: u32,
    doors: Option<DoorLayout>,
    frames_sent: u64,
}

impl TelemetryEmitter {
    pub fn builder() -> TelemetryEmitterBuilder {
        TelemetryEmitterBuilder::default()
    }

    /// Snapshot the world into a frame without sending it.
    ///
    /// The door layout is captured the first time the scene reports a
    /// non-empty one and reused afterwards.
    pub fn gather(&mut self, scene: &(impl Scene + ?Sized)) -> TelemetryFrame {
        if self.doors.is_none()
            && let Some(layout) = scene.doors().filter(|d| !d.is_empty())
        {
            info!(
                open = layout.open.len(),
                closed = layout.closed.len(),
                "door layout captured"
            );
            self.doors = Some(layout);
        }

        let clock = scene.clock();
        let player = scene.player();
        let viewer = player.position;
        let sees = |target: Vec3| self.oracle.is_visible(viewer, target, self.eyes);

        let npcs = scene
            .npcs()
            .into_iter()
            .map(|npc| NpcInfo {
                position: npc.position,
                visible: sees(npc.position),
                alive: npc.alive,
            })
            .collect();

        let (open_doors, closed_doors) = match &self.doors {
            Some(layout) => (
                layout.open.iter().map(|&d| sees(d)).collect(),
                layout.closed.iter().map(|&d| sees(d)).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let robots = [&self.robots[0], &self.robots[1]].map(|status| {
            let s = status.snapshot();
            RobotInfo {
                position: s.position,
                sees_actor: s.actor_visible,
            }
        });

        TelemetryFrame {
            time: TimeInfo {
                total_time: clock.total_time,
                shoot_time: clock.shoot_time,
                time_ahead: self.time_ahead,
            },
            player,
            npcs,
            open_doors,
            closed_doors,
            robots,
        }
    }

    /// Gather one frame and send it.
    pub async fn emit(&mut self, scene: &(impl Scene + ?Sized)) -> Result<usize, WardenError> {
        let frame = self.gather(scene);
        let sent = self.sender.send(&frame).await?;
        self.frames_sent += 1;
        Ok(sent)
    }

    /// Emit on a fixed timer until `shutdown` flips to `true` (or its
    /// sender is dropped).  Returns the number of frames sent.
    pub async fn run<S>(mut self, scene: Arc<S>, mut shutdown: watch::Receiver<bool>) -> u64
    where
        S: Scene + ?Sized,
    {
        let mut timer = tokio::time::interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            period_ms = self.period.as_millis() as u64,
            remote = %self.sender.remote_addr(),
            "telemetry emitter started"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    let result = self.emit(scene.as_ref()).await;
                    match result {
                        Ok(bytes) => debug!(bytes, frame = self.frames_sent, "telemetry sent"),
                        Err(e) => warn!(error = %e, "telemetry send failed"),
                    }
                }
            }
        }

        info!(frames = self.frames_sent, "telemetry emitter stopped");
        self.frames_sent
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the door layout has been captured yet.
    pub fn doors_captured(&self) -> bool {
        self.doors.is_some()
    }
}

impl std::fmt::Debug for TelemetryEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEmitter")
            .field("remote", &self.sender.remote_addr())
            .field("period", &self.period)
            .field("time_ahead", &self.time_ahead)
            .field("doors_captured", &self.doors.is_some())
            .field("frames_sent", &self.frames_sent)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct TelemetryEmitterBuilder {
    oracle: Option<LineOfSightOracle>,
    sender: Option<TelemetrySender>,
    robots: [Option<SharedStatus>; 2],
    visibility: VisibilityConfig,
    channel: ChannelConfig,
}

impl TelemetryEmitterBuilder {
    pub fn oracle(mut self, oracle: LineOfSightOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn sender(mut self, sender: TelemetrySender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Status slots of robot A and robot B, in wire order.
    pub fn robots(mut self, a: SharedStatus, b: SharedStatus) -> Self {
        self.robots = [Some(a), Some(b)];
        self
    }

    pub fn visibility(mut self, visibility: VisibilityConfig) -> Self {
        self.visibility = visibility;
        self
    }

    /// Send rate and forecast horizon.
    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn build(self) -> Result<TelemetryEmitter, WardenError> {
        let oracle = self
            .oracle
            .ok_or(WardenError::MissingCollaborator("line-of-sight oracle"))?;
        let sender = self
            .sender
            .ok_or(WardenError::MissingCollaborator("telemetry sender"))?;
        let [a, b] = self.robots;
        let a = a.ok_or(WardenError::MissingCollaborator("robot A status"))?;
        let b = b.ok_or(WardenError::MissingCollaborator("robot B status"))?;

        Ok(TelemetryEmitter {
            oracle,
            eyes: EyeOffsets::actor_to_object(&self.visibility),
            sender,
            robots: [a, b],
            period: self.channel.send_period(),
            time_ahead: self.channel.time_ahead,
            doors: None,
            frames_sent: 0,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
