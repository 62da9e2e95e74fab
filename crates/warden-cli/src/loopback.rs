//! Constant-velocity stand-in for the external forecaster.
//!
//! Listens where the robots send telemetry, tracks the player's recent
//! positions and answers every frame with a straight-line extrapolation
//! in the forecaster's reply format.  Good enough to exercise the whole
//! loop without a trained model.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use warden_middleware::{ForecastDatagram, TelemetryFrame, Trajectory};
use warden_types::{Vec3, WardenError};

/// Displacements averaged into the velocity estimate.
pub const HISTORY: usize = 10;

/// Largest payload a UDP datagram can carry over IPv4.
const MAX_DATAGRAM: usize = 65_507;

/// Rolling window of player positions.
#[derive(Debug, Clone, Default)]
pub struct ConstantVelocity {
    positions: VecDeque<Vec3>,
}

impl ConstantVelocity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, position: Vec3) {
        if self.positions.len() == HISTORY + 1 {
            self.positions.pop_front();
        }
        self.positions.push_back(position);
    }

    /// Mean per-frame displacement over the window; zero with fewer than
    /// two observations.
    pub fn velocity(&self) -> Vec3 {
        let steps = self.positions.len().saturating_sub(1);
        if steps == 0 {
            return Vec3::ZERO;
        }
        let total = self
            .positions
            .iter()
            .zip(self.positions.iter().skip(1))
            .fold(Vec3::ZERO, |acc, (a, b)| acc + (*b - *a));
        total * (1.0 / steps as f32)
    }

    /// `2 × time_ahead` samples (at least one) continuing the latest
    /// position at the mean velocity.  `None` before the first observation.
    pub fn forecast(&self, time_ahead: u32) -> Option<Trajectory> {
        let current = *self.positions.back()?;
        let v = self.velocity();
        let steps = (2 * time_ahead).max(1);
        Some(Trajectory::new(
            (1..=steps).map(|i| current + v * i as f32).collect(),
        ))
    }
}

/// UDP endpoint that answers telemetry with forecasts.
#[derive(Debug)]
pub struct LoopbackForecaster {
    socket: UdpSocket,
    model: ConstantVelocity,
}

impl LoopbackForecaster {
    pub async fn bind(addr: SocketAddr) -> Result<Self, WardenError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| WardenError::io(format!("bind loopback forecaster on {addr}"), e))?;
        Ok(Self {
            socket,
            model: ConstantVelocity::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, WardenError> {
        self.socket
            .local_addr()
            .map_err(|e| WardenError::io("loopback forecaster address", e))
    }

    /// Feed one telemetry datagram to the model and build the reply.
    /// Undecodable input yields `None`.
    pub fn reply_to(&mut self, text: &str) -> Option<String> {
        let frame = match TelemetryFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "loopback: dropped telemetry");
                return None;
            }
        };
        self.model.observe(frame.player.position);
        let trajectory = self.model.forecast(frame.time.time_ahead)?;
        Some(
            ForecastDatagram {
                stamp: format!("{}", frame.time.total_time),
                trajectory,
            }
            .encode(),
        )
    }

    /// Serve until `shutdown` flips to `true`.  Returns the number of
    /// replies sent.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut replies = 0u64;
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "loopback forecaster listening");
        }

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "loopback: receive failed");
                            continue;
                        }
                    };
                    let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                        debug!(%peer, "loopback: non-UTF-8 datagram");
                        continue;
                    };
                    let Some(reply) = self.reply_to(text) else {
                        continue;
                    };
                    match self.socket.send_to(reply.as_bytes(), peer).await {
                        Ok(_) => replies += 1,
                        Err(e) => warn!(error = %e, %peer, "loopback: reply failed"),
                    }
                }
            }
        }

        debug!(replies, "loopback forecaster stopped");
        replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_middleware::{NpcInfo, PlayerInfo, TimeInfo};

    fn frame_at(position: Vec3, time_ahead: u32) -> String {
        TelemetryFrame {
            time: TimeInfo {
                total_time: 12.0,
                shoot_time: 0.0,
                time_ahead,
            },
            player: PlayerInfo {
                position,
                ..PlayerInfo::default()
            },
            ..TelemetryFrame::default()
        }
        .encode()
    }

    #[test]
    fn no_history_means_no_forecast() {
        assert!(ConstantVelocity::new().forecast(5).is_none());
    }

    #[test]
    fn single_observation_holds_position() {
        let mut cv = ConstantVelocity::new();
        cv.observe(Vec3::new(1.0, 0.0, 2.0));
        let t = cv.forecast(2).unwrap();
        assert_eq!(t.len(), 4);
        assert!(t.samples().iter().all(|p| *p == Vec3::new(1.0, 0.0, 2.0)));
    }

    #[test]
    fn extrapolates_mean_displacement() {
        let mut cv = ConstantVelocity::new();
        for i in 0..4 {
            cv.observe(Vec3::new(i as f32, 0.0, 0.0));
        }
        assert_eq!(cv.velocity(), Vec3::new(1.0, 0.0, 0.0));
        let t = cv.forecast(1).unwrap();
        assert_eq!(
            t.samples(),
            &[Vec3::new(4.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)]
        );
    }

    #[test]
    fn zero_time_ahead_still_yields_a_sample() {
        let mut cv = ConstantVelocity::new();
        cv.observe(Vec3::ZERO);
        cv.observe(Vec3::new(0.0, 0.0, 2.0));
        let t = cv.forecast(0).unwrap();
        assert_eq!(t.samples(), &[Vec3::new(0.0, 0.0, 4.0)]);
    }

    #[test]
    fn window_forgets_old_positions() {
        let mut cv = ConstantVelocity::new();
        cv.observe(Vec3::new(-1000.0, 0.0, 0.0));
        for _ in 0..=HISTORY {
            cv.observe(Vec3::new(3.0, 0.0, 0.0));
        }
        assert_eq!(cv.velocity(), Vec3::ZERO);
    }

    #[tokio::test]
    async fn reply_parses_as_forecast() {
        let mut lb = LoopbackForecaster::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        lb.reply_to(&frame_at(Vec3::new(0.0, 0.0, 0.0), 1));
        let reply = lb.reply_to(&frame_at(Vec3::new(2.0, 0.0, 0.0), 1)).unwrap();

        let parsed = ForecastDatagram::parse(&reply).unwrap();
        assert_eq!(parsed.trajectory.last(), Some(Vec3::new(6.0, 0.0, 0.0)));
        assert!(lb.reply_to("garbage").is_none());
    }

    #[tokio::test]
    async fn full_scene_frame_is_not_truncated() {
        let frame = TelemetryFrame {
            time: TimeInfo {
                total_time: 100.0,
                shoot_time: 80.0,
                time_ahead: 5,
            },
            player: PlayerInfo {
                position: Vec3::new(-123.4, 5.6, 789.0),
                ..PlayerInfo::default()
            },
            npcs: (0..200)
                .map(|i| NpcInfo {
                    position: Vec3::new(-1000.5 + i as f32, 12.3, 4567.8),
                    visible: i % 2 == 0,
                    alive: i % 3 != 0,
                })
                .collect(),
            open_doors: vec![true; 120],
            closed_doors: vec![false; 120],
            ..TelemetryFrame::default()
        }
        .encode();
        assert!(frame.len() > 4096, "frame is only {} bytes", frame.len());

        let lb = LoopbackForecaster::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = lb.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let server = tokio::spawn(lb.run(stop_rx));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(frame.as_bytes(), addr).await.unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("large frame answered")
            .unwrap();
        let reply = ForecastDatagram::parse(std::str::from_utf8(&buf[..len]).unwrap()).unwrap();
        assert_eq!(reply.trajectory.len(), 10);
        let last = reply.trajectory.last().unwrap();
        assert!(last.approx_eq(Vec3::new(-123.4, 5.6, 789.0), 1e-2), "{last:?}");

        stop_tx.send(true).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn answers_over_udp_and_stops() {
        let lb = LoopbackForecaster::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = lb.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let server = tokio::spawn(lb.run(stop_rx));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(frame_at(Vec3::new(1.0, 2.0, 3.0), 2).as_bytes(), addr)
            .await
            .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("reply in time")
            .unwrap();
        let reply = ForecastDatagram::parse(std::str::from_utf8(&buf[..len]).unwrap()).unwrap();
        assert_eq!(reply.trajectory.len(), 4);
        assert_eq!(reply.trajectory.last(), Some(Vec3::new(1.0, 2.0, 3.0)));

        stop_tx.send(true).unwrap();
        let sent = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server stops")
            .unwrap();
        assert_eq!(sent, 1);
    }
}
