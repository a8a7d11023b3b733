use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::scene_locator::LocatorSnapshot;

/// One-line-per-field status the CLI rewrites every second for external viewers.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub ticks: u64,
    pub scene_root_ready: bool,
    // Estimate window
    pub estimate_count: usize,
    pub best_accuracy: Option<f64>,
    // Viewer
    pub viewer_lat: Option<f64>,
    pub viewer_lon: Option<f64>,
    pub viewer_x: Option<f64>,
    pub viewer_z: Option<f64>,
    pub heading_deg: Option<f64>,
    pub scene_heading_offset_deg: f64,
    // Nodes
    pub node_count: usize,
    pub confirmed_nodes: usize,
    pub compressed_nodes: usize,
}

impl LiveStatus {
    pub fn from_snapshot(snapshot: &LocatorSnapshot, uptime_seconds: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds,
            ticks: snapshot.ticks,
            scene_root_ready: snapshot.scene_root_ready,
            estimate_count: snapshot.estimate_count,
            best_accuracy: snapshot
                .best_estimate
                .as_ref()
                .map(|e| e.coordinate.horizontal_accuracy),
            viewer_lat: snapshot.viewer_location.as_ref().map(|c| c.latitude),
            viewer_lon: snapshot.viewer_location.as_ref().map(|c| c.longitude),
            viewer_x: snapshot.viewer_position.map(|p| p.x),
            viewer_z: snapshot.viewer_position.map(|p| p.z),
            heading_deg: snapshot.latest_heading.map(|h| h.heading),
            scene_heading_offset_deg: snapshot.scene_heading_offset_deg,
            node_count: snapshot.nodes.len(),
            confirmed_nodes: snapshot.nodes.iter().filter(|n| n.is_confirmed()).count(),
            // Compressed nodes are the only ones scaled below 1
            compressed_nodes: snapshot.nodes.iter().filter(|n| n.scale().x < 1.0).count(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn summary_line(&self) -> String {
        let viewer = match (self.viewer_lat, self.viewer_lon) {
            (Some(lat), Some(lon)) => format!("{:.6},{:.6}", lat, lon),
            _ => "unlocated".to_string(),
        };
        format!(
            "[{:>4}s] ticks={} estimates={} best_acc={} viewer={} nodes={} confirmed={} compressed={}",
            self.uptime_seconds,
            self.ticks,
            self.estimate_count,
            self.best_accuracy
                .map(|a| format!("{:.1}m", a))
                .unwrap_or_else(|| "-".to_string()),
            viewer,
            self.node_count,
            self.confirmed_nodes,
            self.compressed_nodes,
        )
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
