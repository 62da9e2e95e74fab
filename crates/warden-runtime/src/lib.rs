//! `warden-runtime` – the pursuit robots' brains.
//!
//! # Modules
//!
//! - [`objective`] – [`ObjectiveStateMachine`]: Rest / Follow / Race /
//!   Search selection and the navigation target each implies.
//! - [`controller`] – [`PursuitController`]: the per-frame driver that
//!   ties the line-of-sight oracle, the forecast, the fog pool and the
//!   navigator together.
//! - [`fog_pool`] – [`FogEffectPool`]: the bounded FIFO of fog puffs.
//! - [`emitter`] – [`TelemetryEmitter`]: periodic world snapshots sent to
//!   the forecaster.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the
//!   `tracing` subscriber with an optional OTLP exporter.

pub mod controller;
pub mod emitter;
pub mod fog_pool;
pub mod objective;
pub mod telemetry;

pub use controller::{
    ActorView, Features, PursuitConfig, PursuitController, PursuitControllerBuilder,
    RobotSnapshot, RobotStatus, SharedStatus,
};
pub use emitter::{DoorLayout, NpcState, Scene, SceneClock, TelemetryEmitter};
pub use fog_pool::{FogConfig, FogEffectPool, FogTick};
pub use objective::{NavTarget, ObjectiveStateMachine};
