use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use geo_anchor_rs::{
    EstimateMethod, GeoCoordinate, HeadingReading, LocatorConfig, LocatorEvent, PlacementNode, SceneLocator,
    ScenePosition,
};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a session_*.json[.gz] recording
    #[arg(long, conflicts_with = "session_dir")]
    session: Option<PathBuf>,

    /// Directory of recordings to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Force fixes-only resolution regardless of the recorded config
    #[arg(long, default_value_t = false)]
    fixes_only: bool,

    /// Override the compression radius (metres)
    #[arg(long)]
    placement_radius: Option<f64>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SessionEvent {
    /// Tracking pose; stays current until the next one
    Pose { x: f64, y: f64, z: f64 },
    /// Pose lost
    PoseLost,
    Fix {
        /// Unix seconds
        timestamp: f64,
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        altitude: f64,
        horizontal_accuracy: f64,
        #[serde(default)]
        vertical_accuracy: f64,
    },
    Heading { heading: f64, accuracy: f64 },
    Frame,
    Tick,
    AddNode {
        tag: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        #[serde(default)]
        altitude: f64,
        #[serde(default)]
        annotation: bool,
        #[serde(default)]
        scale_relative_to_distance: bool,
    },
    RemoveTag { tag: String },
}

#[derive(Deserialize)]
struct Session {
    #[serde(default)]
    config: Option<LocatorConfig>,
    events: Vec<SessionEvent>,
}

fn load_session(path: &Path) -> anyhow::Result<Session> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn unix_to_utc(timestamp: f64) -> DateTime<Utc> {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    Utc.timestamp_opt(secs as i64, nanos).single().unwrap_or_else(Utc::now)
}

fn event_kind(event: &LocatorEvent) -> &'static str {
    match event {
        LocatorEvent::EstimateAdded { .. } => "estimate_added",
        LocatorEvent::EstimateRemoved { .. } => "estimate_removed",
        LocatorEvent::NodeConfirmed(_) => "node_confirmed",
        LocatorEvent::NodePlacementUpdated(_) => "node_placement_updated",
        LocatorEvent::SceneRootReady => "scene_root_ready",
        LocatorEvent::SceneHeadingReset => "scene_heading_reset",
    }
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let session = load_session(path)?;

    let mut config = session.config.unwrap_or_default();
    if args.fixes_only {
        config.estimate_method = EstimateMethod::FixesOnly;
    }
    if let Some(radius) = args.placement_radius {
        config.placement_radius = radius;
    }
    let mut locator = SceneLocator::new(config)?;

    let mut pose: Option<ScenePosition> = None;
    let mut event_counts: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut rejected_nodes = 0u64;

    for event in session.events {
        let emitted = match event {
            SessionEvent::Pose { x, y, z } => {
                pose = Some(ScenePosition::new(x, y, z));
                Vec::new()
            }
            SessionEvent::PoseLost => {
                pose = None;
                Vec::new()
            }
            SessionEvent::Fix {
                timestamp,
                latitude,
                longitude,
                altitude,
                horizontal_accuracy,
                vertical_accuracy,
            } => {
                let captured_at = unix_to_utc(timestamp);
                let fix = GeoCoordinate::new(latitude, longitude, altitude)
                    .with_accuracy(horizontal_accuracy, vertical_accuracy)
                    .with_timestamp(captured_at);
                locator.feed_fix_at(fix, pose, captured_at)
            }
            SessionEvent::Heading { heading, accuracy } => locator.feed_heading(HeadingReading { heading, accuracy }),
            SessionEvent::Frame => locator.on_frame(pose),
            SessionEvent::Tick => locator.tick(pose),
            SessionEvent::AddNode {
                tag,
                latitude,
                longitude,
                altitude,
                annotation,
                scale_relative_to_distance,
            } => {
                let coordinate = match (latitude, longitude) {
                    (Some(lat), Some(lon)) => Some(GeoCoordinate::new(lat, lon, altitude)),
                    _ => None,
                };
                let located = coordinate.is_some();
                let mut node = PlacementNode::new(coordinate);
                if let Some(tag) = tag {
                    node = node.tagged(tag);
                }
                if annotation {
                    node = node.as_annotation(scale_relative_to_distance);
                }
                let added = if located {
                    locator.add_node_with_confirmed_location(node, pose)
                } else {
                    locator.add_node_at_current_position(node, pose)
                };
                if added.is_none() {
                    rejected_nodes += 1;
                }
                Vec::new()
            }
            SessionEvent::RemoveTag { tag } => {
                let ids: Vec<_> = locator.find_nodes(&tag).iter().map(|n| n.id()).collect();
                for id in ids {
                    locator.remove_node(id);
                }
                Vec::new()
            }
        };

        for e in &emitted {
            *event_counts.entry(event_kind(e)).or_insert(0) += 1;
        }
    }

    let snapshot = locator.snapshot(pose);
    Ok(json!({
        "session": path.display().to_string(),
        "ticks": snapshot.ticks,
        "estimate_count": snapshot.estimate_count,
        "viewer_location": snapshot.viewer_location,
        "scene_heading_offset_deg": snapshot.scene_heading_offset_deg,
        "rejected_nodes": rejected_nodes,
        "events": event_counts,
        "nodes": snapshot.nodes,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => log::error!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(session) = args.session.as_ref() {
        results.push(run_once(session, &args)?);
    } else {
        anyhow::bail!("Provide --session or --session-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
