//! [`LinkMonitor`] – forecaster liveness.
//!
//! The forecaster is expected to reply to every telemetry frame.  Once the
//! first forecast has arrived, silence is graded into three escalating
//! stages; each stage is logged once per outage and the monitor resets as
//! soon as a new forecast is accepted.
//!
//! Call [`LinkMonitor::check`] from a supervisor loop with the buffer's
//! [`updated_at`](crate::ForecastBuffer::updated_at) stamp.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Silence thresholds, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub warn_after_secs: f32,
    pub critical_after_secs: f32,
    pub end_after_secs: f32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            warn_after_secs: 5.0,
            critical_after_secs: 8.0,
            end_after_secs: 10.0,
        }
    }
}

/// How long the forecaster has been silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkHealth {
    /// No forecast has arrived yet.
    Waiting,
    Healthy,
    SignalLost,
    AboutToShutDown,
    /// The forecaster is presumed gone.
    Ended,
}

/// Grades forecaster silence and logs each escalation once.
#[derive(Debug)]
pub struct LinkMonitor {
    warn_after: Duration,
    critical_after: Duration,
    end_after: Duration,
    last_seen: Option<Instant>,
    reported: LinkHealth,
}

fn secs(s: f32) -> Duration {
    Duration::try_from_secs_f32(s.max(0.0)).unwrap_or(Duration::MAX)
}

impl LinkMonitor {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            warn_after: secs(config.warn_after_secs),
            critical_after: secs(config.critical_after_secs),
            end_after: secs(config.end_after_secs),
            last_seen: None,
            reported: LinkHealth::Waiting,
        }
    }

    /// Classify the link given when the latest forecast was accepted.
    pub fn check(&mut self, updated_at: Option<Instant>, now: Instant) -> LinkHealth {
        let Some(stamp) = updated_at else {
            return LinkHealth::Waiting;
        };

        if self.last_seen != Some(stamp) {
            if self.reported > LinkHealth::Healthy {
                info!("forecaster link restored");
            }
            self.last_seen = Some(stamp);
            self.reported = LinkHealth::Healthy;
        }

        let silent = now.saturating_duration_since(stamp);
        let health = if silent >= self.end_after {
            LinkHealth::Ended
        } else if silent >= self.critical_after {
            LinkHealth::AboutToShutDown
        } else if silent >= self.warn_after {
            LinkHealth::SignalLost
        } else {
            LinkHealth::Healthy
        };

        if health > self.reported {
            let silent_secs = silent.as_secs_f32();
            match health {
                LinkHealth::SignalLost => warn!(silent_secs, "forecaster signal lost"),
                LinkHealth::AboutToShutDown => {
                    warn!(silent_secs, "forecaster silent, link about to shut down")
                }
                LinkHealth::Ended => error!(silent_secs, "forecaster link ended"),
                LinkHealth::Waiting | LinkHealth::Healthy => {}
            }
            self.reported = health;
        }
        health
    }

    /// Most severe stage logged during the current outage.
    pub fn reported(&self) -> LinkHealth {
        self.reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, secs: f32) -> Instant {
        base + Duration::from_secs_f32(secs)
    }

    #[test]
    fn waiting_until_first_forecast() {
        let mut m = LinkMonitor::new(&LinkConfig::default());
        assert_eq!(m.check(None, Instant::now()), LinkHealth::Waiting);
        assert_eq!(m.reported(), LinkHealth::Waiting);
    }

    #[test]
    fn silence_escalates_through_stages() {
        let mut m = LinkMonitor::new(&LinkConfig::default());
        let t0 = Instant::now();
        assert_eq!(m.check(Some(t0), at(t0, 1.0)), LinkHealth::Healthy);
        assert_eq!(m.check(Some(t0), at(t0, 5.5)), LinkHealth::SignalLost);
        assert_eq!(m.check(Some(t0), at(t0, 8.5)), LinkHealth::AboutToShutDown);
        assert_eq!(m.check(Some(t0), at(t0, 12.0)), LinkHealth::Ended);
        assert_eq!(m.reported(), LinkHealth::Ended);
    }

    #[test]
    fn stage_is_recorded_once_per_outage() {
        let mut m = LinkMonitor::new(&LinkConfig::default());
        let t0 = Instant::now();
        m.check(Some(t0), at(t0, 6.0));
        assert_eq!(m.reported(), LinkHealth::SignalLost);
        m.check(Some(t0), at(t0, 7.0));
        assert_eq!(m.reported(), LinkHealth::SignalLost);
    }

    #[test]
    fn new_forecast_resets_the_outage() {
        let mut m = LinkMonitor::new(&LinkConfig::default());
        let t0 = Instant::now();
        m.check(Some(t0), at(t0, 9.0));
        assert_eq!(m.reported(), LinkHealth::AboutToShutDown);

        let t1 = at(t0, 9.5);
        assert_eq!(m.check(Some(t1), at(t0, 10.0)), LinkHealth::Healthy);
        assert_eq!(m.reported(), LinkHealth::Healthy);
    }

    #[test]
    fn custom_thresholds_apply() {
        let cfg = LinkConfig {
            warn_after_secs: 0.1,
            critical_after_secs: 0.2,
            end_after_secs: 0.3,
        };
        let mut m = LinkMonitor::new(&cfg);
        let t0 = Instant::now();
        assert_eq!(m.check(Some(t0), at(t0, 0.25)), LinkHealth::AboutToShutDown);
    }
}
