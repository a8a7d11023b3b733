use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::time::{interval, sleep, Duration, Instant};

use geo_anchor_rs::coords;
use geo_anchor_rs::live_status::LiveStatus;
use geo_anchor_rs::sensors::{self, SimulatedWalk};
use geo_anchor_rs::{
    spawn_locator, EstimateMethod, GeoCoordinate, LocatorConfig, PlacementNode, SceneLocator, Translation,
};

#[derive(Parser, Debug)]
#[command(about = "Geo-anchored placement against a simulated walk")]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// JSON config file; missing fields fall back to defaults
    #[arg(long)]
    config: Option<String>,

    /// Start latitude in degrees
    #[arg(long, default_value = "37.7749", allow_hyphen_values = true)]
    lat: f64,

    /// Start longitude in degrees
    #[arg(long, default_value = "-122.4194", allow_hyphen_values = true)]
    lon: f64,

    /// Walking speed towards east (m/s)
    #[arg(long, default_value = "1.4", allow_hyphen_values = true)]
    east_speed: f64,

    /// Walking speed towards north (m/s)
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    north_speed: f64,

    /// Trust raw geo-fixes only, skip scene fusion
    #[arg(long)]
    fixes_only: bool,

    /// Override the compression radius (metres)
    #[arg(long)]
    placement_radius: Option<f64>,

    /// Geo-fix period in milliseconds
    #[arg(long, default_value = "1000")]
    fix_interval_ms: u64,

    /// Write a live status JSON file here every second
    #[arg(long)]
    status_file: Option<String>,
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn load_config(args: &Args) -> Result<LocatorConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => LocatorConfig::from_json_file(path).with_context(|| format!("loading {}", path))?,
        None => LocatorConfig::default(),
    };
    if args.fixes_only {
        config.estimate_method = EstimateMethod::FixesOnly;
    }
    if let Some(radius) = args.placement_radius {
        config.placement_radius = radius;
    }
    config.validate()?;
    Ok(config)
}

/// Landmarks around the start point: (tag, metres north, metres east, annotation).
const LANDMARKS: [(&str, f64, f64, bool); 4] = [
    ("fountain", 40.0, 15.0, false),
    ("tower", 1200.0, -300.0, true),
    ("harbour", -4500.0, 2000.0, true),
    ("kiosk", -20.0, 60.0, false),
];

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    println!("[{}] Geo Anchor Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Start: {:.6}, {:.6}", args.lat, args.lon);
    println!("  Velocity: {:.2} m/s east, {:.2} m/s north", args.east_speed, args.north_speed);
    println!("  Estimate method: {:?}", config.estimate_method);
    println!("  Placement radius: {:.1} m", config.placement_radius);

    let origin = GeoCoordinate::new(args.lat, args.lon, 0.0);
    let walk = Arc::new(SimulatedWalk::new(origin.clone(), args.east_speed, args.north_speed));

    let locator = SceneLocator::new(config)?;
    let (handle, task) = spawn_locator(locator, walk.clone());

    let fix_period = Duration::from_millis(args.fix_interval_ms.max(1));
    let _fix_handle = tokio::spawn(sensors::fix_loop(walk.clone(), handle.clone(), fix_period));
    let _frame_handle = tokio::spawn(sensors::frame_loop(handle.clone(), Duration::from_millis(33)));

    // Wait for a located viewer before anchoring anything
    let mut located = false;
    for _ in 0..50 {
        if handle.current_location().await?.is_some() {
            located = true;
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    if !located {
        log::warn!("no viewer location after 5s; landmarks may be skipped");
    }

    for (tag, north, east, annotation) in LANDMARKS {
        let coordinate = coords::apply(&origin, &Translation::new(north, east, 0.0));
        let mut node = PlacementNode::with_coordinate(coordinate).tagged(tag);
        if annotation {
            node = node.as_annotation(false);
        }
        match handle.add_node_with_confirmed_location(node).await? {
            Some(id) => println!("[{}] Placed {} ({})", ts_now(), tag, id),
            None => log::warn!("landmark {} rejected", tag),
        }
    }
    match handle
        .add_node_at_current_position(PlacementNode::unanchored().tagged("start"))
        .await?
    {
        Some(id) => println!("[{}] Dropped start marker ({})", ts_now(), id),
        None => log::warn!("could not drop start marker: viewer not located"),
    }

    handle.start().await?;

    let started = Instant::now();
    let mut status_ticker = interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
            _ = status_ticker.tick() => {
                let uptime = started.elapsed().as_secs();
                let snapshot = handle.snapshot().await?;
                let status = LiveStatus::from_snapshot(&snapshot, uptime);
                log::info!("{}", status.summary_line());
                if let Some(path) = args.status_file.as_ref() {
                    if let Err(e) = status.save(path) {
                        log::warn!("failed to write {}: {}", path, e);
                    }
                }
                if args.duration > 0 && uptime >= args.duration {
                    println!("[{}] Duration reached, stopping...", ts_now());
                    break;
                }
            }
        }
    }

    handle.stop().await?;
    let final_snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    let locator = task.await.context("locator task panicked")?;

    println!("[{}] Final placements after {} ticks:", ts_now(), locator.ticks());
    for node in &final_snapshot.nodes {
        let p = node.position();
        println!(
            "  {:<10} {:<8} confirmed={:<5} pos=({:>8.2}, {:>6.2}, {:>8.2}) scale={:.4}",
            node.tag().unwrap_or("-"),
            node.id().to_string(),
            node.is_confirmed(),
            p.x,
            p.y,
            p.z,
            node.scale().x
        );
    }

    Ok(())
}
