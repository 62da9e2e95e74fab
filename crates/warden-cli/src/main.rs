//! `warden` – headless driver for the pursuit stack.
//!
//! This binary:
//!
//! 1. Loads `~/.warden/config.toml` (or `--config`), writing the defaults
//!    there on first run.  Applies environment overrides and, outside
//!    immersive mode, the desktop feature set.
//! 2. Binds the prediction channel and, with `--loopback`, starts a
//!    constant-velocity forecaster on the far end of it.
//! 3. Runs two pursuit robots and the telemetry emitter against a small
//!    simulated scene until `--duration` elapses or Ctrl-C is pressed.

mod config;
mod loopback;
mod sim_scene;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use warden_middleware::{LinkHealth, LinkMonitor, PredictionChannel};
use warden_perception::LineOfSightOracle;
use warden_runtime::{PursuitController, TelemetryEmitter, telemetry};
use warden_types::{Vec3, WardenError};

use crate::config::Config;
use crate::loopback::LoopbackForecaster;
use crate::sim_scene::{SimRobot, SimScene};

const FRAME_HZ: f32 = 30.0;
const STATUS_EVERY: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Pursuit robots with a forecast link")]
struct Args {
    /// Config file to load instead of ~/.warden/config.toml.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Immersive mode: keep the configured feature flags.
    #[arg(long)]
    vr: bool,

    /// Stop after this many seconds.  Runs until Ctrl-C otherwise.
    #[arg(long, value_name = "SECS")]
    duration: Option<f32>,

    /// Answer telemetry with a built-in constant-velocity forecaster.
    #[arg(long)]
    loopback: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let _tracing = telemetry::init_tracing("warden");
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!(error = %e, "warden stopped");
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), WardenError> {
    let cfg = load_config(&args)?;

    if args.print_config {
        let raw = toml::to_string_pretty(&cfg)
            .map_err(|e| WardenError::Config(format!("failed to serialize config: {e}")))?;
        println!("{raw}");
        return Ok(());
    }

    print_banner(&cfg, &args);

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        running_ctrlc.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; only --duration will stop the run");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| WardenError::io("start tokio runtime", e))?;
    rt.block_on(session(cfg, args, running))
}

fn load_config(args: &Args) -> Result<Config, WardenError> {
    let path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path)? {
        Some(cfg) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        None if args.config.is_some() => {
            return Err(WardenError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        None => {
            let cfg = Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => info!(path = %path.display(), "wrote default config"),
                Err(e) => warn!(error = %e, "could not write default config; continuing"),
            }
            cfg
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg.apply_mode(args.vr);
    Ok(cfg)
}

async fn session(cfg: Config, args: Args, running: Arc<AtomicBool>) -> Result<(), WardenError> {
    let (stop_tx, stop_rx) = watch::channel(false);

    let forecaster = if args.loopback {
        let addr = SocketAddr::new(cfg.channel.remote_ip, cfg.channel.tx_port);
        let lb = LoopbackForecaster::bind(addr).await?;
        Some(tokio::spawn(lb.run(stop_rx.clone())))
    } else {
        None
    };

    let channel = PredictionChannel::bind(&cfg.channel).await?;
    let scene = Arc::new(SimScene::new());

    let rigs = [
        ("robot-a", SimRobot::at(Vec3::new(-45.0, 0.0, 0.0))),
        ("robot-b", SimRobot::at(Vec3::new(45.0, 0.0, 30.0))),
    ];
    let mut robots = Vec::with_capacity(rigs.len());
    for (name, rig) in &rigs {
        let controller = PursuitController::builder(*name)
            .features(cfg.features.clone())
            .config(cfg.movement.clone())
            .visibility(cfg.visibility.clone())
            .fog_config(cfg.fog.clone())
            .navigator(rig.navigator.clone())
            .oracle(LineOfSightOracle::from_config(scene.occluder(), &cfg.visibility))
            .forecast(channel.forecast())
            .reactors(rig.reactors.clone())
            .spray(rig.spray.clone())
            .wheels(rig.wheels.clone())
            .effects(rig.effects.clone())
            .build()?;
        robots.push((controller, rig.clone()));
    }

    let emitter = TelemetryEmitter::builder()
        .oracle(LineOfSightOracle::from_config(scene.occluder(), &cfg.visibility))
        .sender(channel.sender())
        .robots(robots[0].0.status(), robots[1].0.status())
        .visibility(cfg.visibility.clone())
        .channel(cfg.channel.clone())
        .build()?;
    let emitter_task = tokio::spawn(emitter.run(scene.clone(), stop_rx.clone()));

    let mut link = LinkMonitor::new(&cfg.link);
    let forecast = channel.forecast();
    let deadline = args
        .duration
        .map(|secs| {
            Duration::try_from_secs_f32(secs)
                .map_err(|e| WardenError::Config(format!("invalid --duration {secs}: {e}")))
        })
        .transpose()?;
    let started = Instant::now();
    let mut last_frame = started;
    let mut last_status = started;

    let mut frames = tokio::time::interval(Duration::from_secs_f32(1.0 / FRAME_HZ));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while running.load(Ordering::SeqCst) {
        frames.tick().await;
        let now = Instant::now();
        if deadline.is_some_and(|d| now.duration_since(started) >= d) {
            break;
        }
        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        scene.advance(dt);
        let actor = scene.actor();
        for (controller, rig) in robots.iter_mut() {
            rig.step(dt);
            controller.update(dt, actor);
        }

        let health = link.check(forecast.updated_at(), now);
        if now.duration_since(last_status) >= STATUS_EVERY {
            last_status = now;
            for (controller, _) in &robots {
                let snap = controller.status().snapshot();
                debug!(
                    robot = controller.name(),
                    objective = %snap.objective,
                    position = %snap.position,
                    sees_actor = snap.actor_visible,
                    fog = controller.fog().len(),
                    "robot status"
                );
            }
            debug!(
                actor = %actor.position,
                predicted = %forecast.predicted_position(),
                link = ?health,
                "world status"
            );
        }
    }

    let _ = stop_tx.send(true);
    let sent = emitter_task
        .await
        .map_err(|e| WardenError::Channel(format!("telemetry task failed: {e}")))?;
    channel.shutdown().await;
    let replies = match forecaster {
        Some(task) => Some(
            task.await
                .map_err(|e| WardenError::Channel(format!("loopback task failed: {e}")))?,
        ),
        None => None,
    };

    print_summary(&robots, sent, forecast.updates(), replies, link.reported());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(cfg: &Config, args: &Args) {
    println!();
    println!("  {} {}",
        "Warden".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pursuit robots with a forecast link");
    println!();
    println!(
        "  Telemetry → {}   Forecasts ← :{}   {}",
        cfg.channel.remote_addr().to_string().bold(),
        cfg.channel.rx_port.to_string().bold(),
        if args.loopback { "(loopback forecaster)".green() } else { "(external forecaster)".dimmed() }
    );
    println!(
        "  Mode: {}   aggressive={} distracting={} fog={}",
        if args.vr { "immersive".bold() } else { "desktop".bold() },
        cfg.features.aggressive,
        cfg.features.distracting,
        cfg.features.fog
    );
    println!();
}

fn print_summary(
    robots: &[(PursuitController, SimRobot)],
    frames_sent: u64,
    forecasts: u64,
    replies: Option<u64>,
    link: LinkHealth,
) {
    println!();
    println!("{}", "  Session summary".bold());
    println!("    Telemetry frames sent : {frames_sent}");
    println!("    Forecasts accepted    : {forecasts}");
    if let Some(replies) = replies {
        println!("    Loopback replies      : {replies}");
    }
    let link_label = match link {
        LinkHealth::Healthy => "healthy".green(),
        LinkHealth::Waiting => "never connected".yellow(),
        other => format!("{other:?}").red(),
    };
    println!("    Link                  : {link_label}");
    for (controller, rig) in robots {
        println!(
            "    {:<8} objective={:<7} fog puffs={} alerts={}",
            controller.name().bold(),
            controller.objective().to_string(),
            rig.effects.spawned(),
            rig.reactors.snapshot().alerts
        );
    }
    println!("{}", "  ✓ Exiting Warden.".green());
}
