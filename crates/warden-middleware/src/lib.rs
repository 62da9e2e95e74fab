//! `warden-middleware` – the forecaster link.
//!
//! Carries world-state telemetry out to the external forecaster and the
//! predicted actor trajectory back in.
//!
//! # Modules
//!
//! - [`wire`] – Text codec for outbound [`TelemetryFrame`]s and inbound
//!   [`ForecastDatagram`]s.
//! - [`forecast`] – The mutex-guarded [`ForecastBuffer`] shared between the
//!   receive task and the pursuit controllers.
//! - [`channel`] – The UDP [`PredictionChannel`] and its receive task.
//! - [`link_monitor`] – Escalating forecaster-silence detection.

pub mod channel;
pub mod forecast;
pub mod link_monitor;
pub mod wire;

pub use channel::{ChannelConfig, PredictionChannel, TelemetrySender};
pub use forecast::{ForecastBuffer, SharedForecast, Trajectory};
pub use link_monitor::{LinkConfig, LinkHealth, LinkMonitor};
pub use wire::{
    ForecastDatagram, GazeFocus, NpcInfo, PlayerInfo, RobotInfo, TelemetryFrame, TimeInfo,
    WireError,
};
