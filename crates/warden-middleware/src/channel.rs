//! UDP link to the external forecaster.
//!
//! One socket, bound to the local receive port, carries both directions:
//! telemetry frames go out to the remote endpoint and forecast datagrams
//! come back in.  A background task owns the receive side and publishes
//! every valid forecast into the shared [`ForecastBuffer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_middleware::{ChannelConfig, PredictionChannel};
//!
//! # async fn demo() -> Result<(), warden_types::WardenError> {
//! let channel = PredictionChannel::bind(&ChannelConfig::default()).await?;
//! let target = channel.predicted_position();
//! # let _ = target;
//! channel.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use warden_types::{Vec3, WardenError};

use crate::forecast::{ForecastBuffer, SharedForecast};
use crate::wire::{ForecastDatagram, TelemetryFrame};

/// Largest payload a UDP datagram can carry over IPv4.
const MAX_DATAGRAM: usize = 65_507;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Endpoints and cadence of the forecaster link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Address of the forecaster.
    pub remote_ip: IpAddr,
    /// Local port forecasts arrive on.  `0` picks an ephemeral port.
    pub rx_port: u16,
    /// Remote port telemetry is sent to.
    pub tx_port: u16,
    /// Telemetry frames per second.
    pub send_hz: f32,
    /// Forecast horizon requested from the model, in seconds.
    pub time_ahead: u32,
    /// Log every accepted forecast polyline at debug level.
    pub show_path: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            remote_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            rx_port: 8000,
            tx_port: 8001,
            send_hz: 2.0,
            time_ahead: 5,
            show_path: false,
        }
    }
}

impl ChannelConfig {
    pub fn remote_addr(&self) -> SocketAddr {
        SocketAddr::new(self.remote_ip, self.tx_port)
    }

    /// Interval between telemetry frames.  Rates that do not yield a
    /// representable non-zero period fall back to one frame per second.
    pub fn send_period(&self) -> Duration {
        Duration::try_from_secs_f32(1.0 / self.send_hz)
            .ok()
            .filter(|p| !p.is_zero())
            .unwrap_or(Duration::from_secs(1))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TelemetrySender
// ────────────────────────────────────────────────────────────────────────────

/// Cheap cloneable handle for the send path.
///
/// Shares the channel's socket; holds no reference to the forecast buffer.
#[derive(Debug, Clone)]
pub struct TelemetrySender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
}

impl TelemetrySender {
    /// Encode `frame` and send it as a single datagram.
    pub async fn send(&self, frame: &TelemetryFrame) -> Result<usize, WardenError> {
        self.send_text(&frame.encode()).await
    }

    /// Send an already-encoded payload.
    pub async fn send_text(&self, text: &str) -> Result<usize, WardenError> {
        self.socket
            .send_to(text.as_bytes(), self.remote)
            .await
            .map_err(|e| WardenError::io(format!("send to {}", self.remote), e))
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PredictionChannel
// ────────────────────────────────────────────────────────────────────────────

/// The forecaster link: outbound telemetry, inbound forecasts.
///
/// Share it behind an `Arc` between every controller that chases the
/// forecast; the receive task lives until [`shutdown`][Self::shutdown] is
/// called or the channel is dropped.
#[derive(Debug)]
pub struct PredictionChannel {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    remote: SocketAddr,
    forecast: SharedForecast,
    stop: watch::Sender<bool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl PredictionChannel {
    /// Bind the receive port and start the receive task with a fresh
    /// forecast buffer.
    pub async fn bind(config: &ChannelConfig) -> Result<Self, WardenError> {
        Self::bind_with(config, ForecastBuffer::shared()).await
    }

    /// Bind the receive port and publish forecasts into `forecast`.
    pub async fn bind_with(
        config: &ChannelConfig,
        forecast: SharedForecast,
    ) -> Result<Self, WardenError> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.rx_port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| WardenError::io(format!("bind {bind_addr}"), e))?;
        let local = socket
            .local_addr()
            .map_err(|e| WardenError::io("query local address", e))?;
        let socket = Arc::new(socket);
        let remote = config.remote_addr();

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&forecast),
            stop_rx,
            config.show_path,
        ));

        info!(local = %local, remote = %remote, "prediction channel started");
        Ok(Self {
            socket,
            local,
            remote,
            forecast,
            stop,
            receiver: Mutex::new(Some(task)),
        })
    }

    /// Address the receive socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Handle to the shared forecast buffer.
    pub fn forecast(&self) -> SharedForecast {
        Arc::clone(&self.forecast)
    }

    /// Last sample of the latest accepted forecast (origin before the first).
    pub fn predicted_position(&self) -> Vec3 {
        self.forecast.predicted_position()
    }

    /// Send-path handle sharing this channel's socket.
    pub fn sender(&self) -> TelemetrySender {
        TelemetrySender {
            socket: Arc::clone(&self.socket),
            remote: self.remote,
        }
    }

    /// Whether the receive task is still running.
    pub fn is_running(&self) -> bool {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the receive task and wait for it to exit.
    ///
    /// Safe to call any number of times, from any number of holders.
    ///
    /// The socket itself is not closed here: it is shared with every
    /// [`TelemetrySender`] handed out by [`sender`][Self::sender], so
    /// `rx_port` stays bound until the channel and all of those senders
    /// are dropped.  Sends keep working after shutdown; only inbound
    /// forecasts stop.
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);
        let handle = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "receive task ended abnormally");
                }
            }
            info!(local = %self.local, "prediction channel stopped");
        }
    }
}

impl Drop for PredictionChannel {
    fn drop(&mut self) {
        // The task exits on its own once it sees the flag.
        let _ = self.stop.send(true);
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    forecast: SharedForecast,
    mut stop: watch::Receiver<bool>,
    show_path: bool,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => handle_datagram(&buf[..len], peer, &forecast, show_path),
                Err(e) => {
                    if *stop.borrow() {
                        break;
                    }
                    warn!(error = %e, "forecast receive failed");
                }
            },
        }
    }
    debug!("receive loop exited");
}

fn handle_datagram(payload: &[u8], peer: SocketAddr, forecast: &ForecastBuffer, show_path: bool) {
    let Ok(text) = std::str::from_utf8(payload) else {
        debug!(peer = %peer, len = payload.len(), "dropping non-UTF-8 datagram");
        return;
    };
    match ForecastDatagram::parse(text) {
        Ok(datagram) => {
            if show_path {
                for (i, (a, b)) in datagram.trajectory.segments().enumerate() {
                    debug!(segment = i, from = %a, to = %b, "forecast path");
                }
            }
            let samples = datagram.trajectory.len();
            forecast.replace(datagram.trajectory);
            trace!(peer = %peer, samples, "forecast accepted");
        }
        Err(e) => debug!(peer = %peer, error = %e, "dropping malformed forecast"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config(tx_port: u16) -> ChannelConfig {
        ChannelConfig {
            rx_port: 0,
            tx_port,
            ..ChannelConfig::default()
        }
    }

    async fn wait_for_updates(forecast: &ForecastBuffer, n: u64) {
        for _ in 0..200 {
            if forecast.updates() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("forecast never reached {n} updates");
    }

    #[test]
    fn default_config_matches_forecaster_ports() {
        let c = ChannelConfig::default();
        assert_eq!(c.rx_port, 8000);
        assert_eq!(c.tx_port, 8001);
        assert_eq!(c.remote_addr().to_string(), "127.0.0.1:8001");
        assert_eq!(c.send_period(), Duration::from_millis(500));
    }

    #[test]
    fn bad_send_rate_falls_back_to_one_hertz() {
        for send_hz in [0.0, -3.0, f32::NAN, f32::INFINITY, 1e-30, f32::MIN_POSITIVE, 1e30] {
            let c = ChannelConfig {
                send_hz,
                ..ChannelConfig::default()
            };
            assert_eq!(c.send_period(), Duration::from_secs(1), "send_hz = {send_hz}");
        }
    }

    #[test]
    fn slow_send_rate_keeps_long_period() {
        let c = ChannelConfig {
            send_hz: 0.25,
            ..ChannelConfig::default()
        };
        assert_eq!(c.send_period(), Duration::from_secs(4));
    }

    #[test]
    fn handle_datagram_keeps_previous_on_garbage() {
        let buf = ForecastBuffer::new();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        handle_datagram(b"t;1;2;3", peer, &buf, true);
        handle_datagram(b"t;1;2", peer, &buf, false);
        handle_datagram(b"t;a;b;c", peer, &buf, false);
        handle_datagram(&[0xff, 0xfe, b';'], peer, &buf, false);
        assert_eq!(buf.predicted_position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(buf.updates(), 1);
    }

    #[tokio::test]
    async fn inbound_forecast_updates_predicted_position() {
        let channel = PredictionChannel::bind(&loopback_config(9)).await.unwrap();
        let port = channel.local_addr().port();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        peer.send_to(b"t;1.0,2.0,3.0;4.0,5.0,6.0;7.0,8.0,9.0", ("127.0.0.1", port))
            .await
            .unwrap();
        wait_for_updates(&channel.forecast(), 1).await;
        assert_eq!(channel.predicted_position(), Vec3::new(3.0, 6.0, 9.0));

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn telemetry_reaches_remote() {
        let model = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tx_port = model.local_addr().unwrap().port();
        let channel = PredictionChannel::bind(&loopback_config(tx_port)).await.unwrap();

        let frame = TelemetryFrame::default();
        let sent = channel.sender().send(&frame).await.unwrap();

        let mut buf = [0u8; 1024];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), model.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, sent);
        let text = std::str::from_utf8(&buf[..n]).unwrap();
        assert_eq!(TelemetryFrame::decode(text).unwrap(), frame);

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let channel = PredictionChannel::bind(&loopback_config(9)).await.unwrap();
        assert!(channel.is_running());
        channel.shutdown().await;
        assert!(!channel.is_running());
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_shutdowns_do_not_deadlock() {
        let channel = Arc::new(PredictionChannel::bind(&loopback_config(9)).await.unwrap());
        let a = tokio::spawn({
            let c = Arc::clone(&channel);
            async move { c.shutdown().await }
        });
        let b = tokio::spawn({
            let c = Arc::clone(&channel);
            async move { c.shutdown().await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
        assert!(!channel.is_running());
    }

    #[tokio::test]
    async fn bind_conflict_is_an_io_error() {
        let first = PredictionChannel::bind(&loopback_config(9)).await.unwrap();
        let taken = ChannelConfig {
            rx_port: first.local_addr().port(),
            ..loopback_config(9)
        };
        let err = PredictionChannel::bind(&taken).await.unwrap_err();
        assert!(matches!(err, WardenError::Io { .. }));
        first.shutdown().await;
    }

    #[tokio::test]
    async fn port_stays_bound_until_every_sender_drops() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let channel = PredictionChannel::bind(&loopback_config(sink.local_addr().unwrap().port()))
            .await
            .unwrap();
        let rx_port = channel.local_addr().port();
        let same_port = ChannelConfig {
            rx_port,
            ..loopback_config(9)
        };
        let sender = channel.sender();

        channel.shutdown().await;
        assert!(!channel.is_running());
        sender.send_text("still sending").await.unwrap();
        let mut buf = [0u8; 64];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), sink.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"still sending");

        drop(channel);
        assert!(PredictionChannel::bind(&same_port).await.is_err());

        drop(sender);
        let rebound = PredictionChannel::bind(&same_port).await.unwrap();
        assert_eq!(rebound.local_addr().port(), rx_port);
        rebound.shutdown().await;
    }
}
