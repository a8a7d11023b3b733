// scene_locator.rs - Pure computation core of the geo anchor engine
//
// Nothing in here knows about tokio, timers, or where poses and fixes come
// from. Fixes, headings and frames go in, node transforms and events come
// out. The scheduler serializes calls; replay drives it directly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confirmation::{confirm_distant_nodes, EstimateMethod, LocationResolver};
use crate::error::{LocatorError, LocatorResult};
use crate::estimates::{EstimateStore, LocationEstimate};
use crate::node::{NodeId, PlacementNode};
use crate::observer::{LocatorEvent, LocatorObserver, ObserverSlot};
use crate::placement::{place_node, Viewer};
use crate::types::{GeoCoordinate, HeadingReading, Orientation, ScenePosition};

/// Headings closer than this to 0° count as "facing true north".
const NORTH_HEADING_EPS: f64 = 1e-9;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub estimate_method: EstimateMethod,

    // ── Estimate window ──
    pub estimate_capacity: usize,
    pub confirmation_radius: f64,

    // ── Placement ──
    pub placement_radius: f64,
    pub tick_interval_ms: u64,

    // ── Annotation labels ──
    pub annotation_scale_factor: f64,
    pub far_distance: f64,
    pub far_scale_damping: f64,
    pub annotation_pivot_factor: f64,
    pub draw_order_factor: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            estimate_method: EstimateMethod::default(),
            estimate_capacity: 30,
            confirmation_radius: 100.0,
            placement_radius: 100.0,
            tick_interval_ms: 100,
            annotation_scale_factor: 0.181,
            far_distance: 3000.0,
            far_scale_damping: 0.75,
            annotation_pivot_factor: 1.1,
            draw_order_factor: 100.0,
        }
    }
}

impl LocatorConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> LocatorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LocatorError::ConfigIo(format!("{}: {}", path.display(), e)))?;
        let config: LocatorConfig = serde_json::from_str(&text)
            .map_err(|e| LocatorError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LocatorResult<()> {
        if self.estimate_capacity == 0 {
            return Err(LocatorError::InvalidConfig("estimate_capacity must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(LocatorError::InvalidConfig("tick_interval_ms must be positive".into()));
        }
        for (name, value) in [
            ("confirmation_radius", self.confirmation_radius),
            ("placement_radius", self.placement_radius),
            ("far_distance", self.far_distance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(LocatorError::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }
        for (name, value) in [
            ("annotation_scale_factor", self.annotation_scale_factor),
            ("far_scale_damping", self.far_scale_damping),
            ("annotation_pivot_factor", self.annotation_pivot_factor),
            ("draw_order_factor", self.draw_order_factor),
        ] {
            if !value.is_finite() {
                return Err(LocatorError::InvalidConfig(format!("{} must be finite", name)));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocatorSnapshot {
    pub estimate_method: EstimateMethod,
    pub estimate_count: usize,
    pub best_estimate: Option<LocationEstimate>,
    pub viewer_position: Option<ScenePosition>,
    pub viewer_location: Option<GeoCoordinate>,
    pub viewer_orientation: Option<Orientation>,
    pub latest_heading: Option<HeadingReading>,
    pub scene_heading_offset_deg: f64,
    pub scene_root_ready: bool,
    pub ticks: u64,
    pub nodes: Vec<PlacementNode>,
}

// ─── The locator ─────────────────────────────────────────────────────────────

pub struct SceneLocator {
    config: LocatorConfig,
    estimates: EstimateStore,
    nodes: Vec<PlacementNode>,

    // Inputs
    latest_fix: Option<GeoCoordinate>,
    latest_heading: Option<HeadingReading>,

    // Scene root
    scene_root_ready: bool,
    did_fetch_initial_location: bool,
    scene_heading_offset_deg: f64,

    ticks: u64,
    observer: ObserverSlot,
}

impl SceneLocator {
    pub fn new(config: LocatorConfig) -> LocatorResult<Self> {
        config.validate()?;
        Ok(Self {
            estimates: EstimateStore::new(config.estimate_capacity),
            nodes: Vec::new(),
            latest_fix: None,
            latest_heading: None,
            scene_root_ready: false,
            did_fetch_initial_location: false,
            scene_heading_offset_deg: 0.0,
            ticks: 0,
            observer: ObserverSlot::default(),
            config,
        })
    }

    pub fn set_observer(&mut self, observer: &Arc<dyn LocatorObserver>) {
        self.observer.set(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer.clear();
    }

    pub fn set_estimate_method(&mut self, method: EstimateMethod) {
        if self.config.estimate_method != method {
            log::info!("estimate method {:?} -> {:?}", self.config.estimate_method, method);
        }
        self.config.estimate_method = method;
    }

    // ── Inputs ───────────────────────────────────────────────────────────

    /// New geo-fix. Paired into the estimate window when the viewer's scene
    /// position is known.
    pub fn feed_fix(&mut self, fix: GeoCoordinate, position: Option<ScenePosition>) -> Vec<LocatorEvent> {
        self.feed_fix_at(fix, position, Utc::now())
    }

    /// `feed_fix` with an explicit capture time, for recorded sessions.
    pub fn feed_fix_at(
        &mut self,
        fix: GeoCoordinate,
        position: Option<ScenePosition>,
        captured_at: DateTime<Utc>,
    ) -> Vec<LocatorEvent> {
        self.latest_fix = Some(fix.clone());

        let mut events = Vec::new();
        if let Some(position) = position {
            events.push(self.add_estimate(fix, position, captured_at));
        }
        self.emit(events)
    }

    pub fn feed_heading(&mut self, reading: HeadingReading) -> Vec<LocatorEvent> {
        let mut events = Vec::new();
        if reading.accuracy < 0.0 || !reading.heading.is_finite() {
            return events;
        }
        self.latest_heading = Some(reading);

        if reading.heading.abs() < NORTH_HEADING_EPS {
            self.scene_heading_offset_deg = 0.0;
            events.push(LocatorEvent::SceneHeadingReset);
        }
        self.emit(events)
    }

    /// Per-rendered-frame callback. Only the first calls do anything.
    pub fn on_frame(&mut self, position: Option<ScenePosition>) -> Vec<LocatorEvent> {
        let mut events = Vec::new();

        if !self.scene_root_ready {
            self.scene_root_ready = true;
            for node in self.nodes.iter_mut() {
                node.set_attached(true);
            }
            log::info!("scene root ready, attached {} pending nodes", self.nodes.len());
            events.push(LocatorEvent::SceneRootReady);
        }

        if !self.did_fetch_initial_location {
            if let (Some(position), Some(fix)) = (position, self.latest_fix.clone()) {
                self.did_fetch_initial_location = true;
                events.push(self.add_estimate(fix, position, Utc::now()));
            }
        }

        self.emit(events)
    }

    // ── Per-tick ─────────────────────────────────────────────────────────

    /// Prune, confirm, then re-place every continually updated node.
    pub fn tick(&mut self, position: Option<ScenePosition>) -> Vec<LocatorEvent> {
        self.ticks += 1;
        let mut events = Vec::new();

        let position = match position {
            Some(position) => position,
            None => return events,
        };

        for removed in self.estimates.prune_outside_radius(&position, self.config.confirmation_radius) {
            events.push(LocatorEvent::EstimateRemoved {
                position: removed.scene_position,
                coordinate: removed.coordinate,
            });
        }

        let resolver = LocationResolver::new(self.config.estimate_method, &self.estimates);
        events.extend(confirm_distant_nodes(
            &mut self.nodes,
            &position,
            self.config.confirmation_radius,
            &resolver,
        ));

        if let Some(location) = resolver.viewer_location(Some(position), self.latest_fix.as_ref()) {
            let viewer = Viewer { position, location };
            for node in self.nodes.iter_mut().filter(|n| n.continually_update()) {
                if let Some(event) = update_node(node, &viewer, &resolver, &self.config, false) {
                    events.push(event);
                }
            }
        }

        self.emit(events)
    }

    // ── Node collection ──────────────────────────────────────────────────

    /// Anchor `node` where the viewer stands now.
    ///
    /// Returns `None` (and drops the node) when neither the viewer's scene
    /// position nor its location is known yet.
    pub fn add_node_at_current_position(
        &mut self,
        mut node: PlacementNode,
        position: Option<ScenePosition>,
    ) -> Option<NodeId> {
        let position = position?;
        let location = self.current_location(Some(position))?;
        let confirmed = self.config.estimate_method == EstimateMethod::FixesOnly;

        node.anchor_at(location, position, confirmed);
        node.set_attached(self.scene_root_ready);
        let id = node.id();
        log::debug!("added {} at current position (confirmed: {})", id, confirmed);
        self.nodes.push(node);
        Some(id)
    }

    /// Add a node whose coordinate is already authoritative. Rejected unless
    /// it carries a coordinate and is confirmed.
    pub fn add_node_with_confirmed_location(
        &mut self,
        mut node: PlacementNode,
        position: Option<ScenePosition>,
    ) -> Option<NodeId> {
        if node.geo_coordinate().is_none() || !node.is_confirmed() {
            log::warn!("rejected {}: no confirmed coordinate", node.id());
            return None;
        }

        let mut events = Vec::new();
        let resolver = LocationResolver::new(self.config.estimate_method, &self.estimates);
        if let Some(position) = position {
            if let Some(location) = resolver.viewer_location(Some(position), self.latest_fix.as_ref()) {
                let viewer = Viewer { position, location };
                if let Some(event) = update_node(&mut node, &viewer, &resolver, &self.config, true) {
                    events.push(event);
                }
            }
        }

        node.set_attached(self.scene_root_ready);
        let id = node.id();
        self.nodes.push(node);
        self.emit(events);
        Some(id)
    }

    /// Idempotent; the detached node is handed back if it was present.
    pub fn remove_node(&mut self, id: NodeId) -> Option<PlacementNode> {
        let index = self.nodes.iter().position(|n| n.id() == id)?;
        let mut node = self.nodes.remove(index);
        node.set_attached(false);
        Some(node)
    }

    pub fn remove_all_nodes(&mut self) -> usize {
        let count = self.nodes.len();
        for node in self.nodes.iter_mut() {
            node.set_attached(false);
        }
        self.nodes.clear();
        count
    }

    pub fn find_nodes(&self, tag: &str) -> Vec<&PlacementNode> {
        self.nodes.iter().filter(|n| n.has_tag(tag)).collect()
    }

    pub fn contains_node_with_tag(&self, tag: &str) -> bool {
        self.nodes.iter().any(|n| n.has_tag(tag))
    }

    pub fn node(&self, id: NodeId) -> Option<&PlacementNode> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn nodes(&self) -> &[PlacementNode] {
        &self.nodes
    }

    // ── Scene heading ────────────────────────────────────────────────────

    /// Nudge the scene's yaw. Ignored until the scene root exists.
    pub fn rotate_scene_heading(&mut self, degrees: f64) -> bool {
        if !self.scene_root_ready || !degrees.is_finite() {
            return false;
        }
        let offset = (self.scene_heading_offset_deg + degrees).rem_euclid(360.0);
        self.scene_heading_offset_deg = if offset > 180.0 { offset - 360.0 } else { offset };
        true
    }

    pub fn move_scene_heading_clockwise(&mut self) -> bool {
        self.rotate_scene_heading(-1.0)
    }

    pub fn move_scene_heading_anticlockwise(&mut self) -> bool {
        self.rotate_scene_heading(1.0)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Best resolved location of a viewer standing at `position`.
    pub fn current_location(&self, position: Option<ScenePosition>) -> Option<GeoCoordinate> {
        LocationResolver::new(self.config.estimate_method, &self.estimates)
            .viewer_location(position, self.latest_fix.as_ref())
    }

    pub fn snapshot(&self, position: Option<ScenePosition>) -> LocatorSnapshot {
        LocatorSnapshot {
            estimate_method: self.config.estimate_method,
            estimate_count: self.estimates.len(),
            best_estimate: self.estimates.best().cloned(),
            viewer_position: position,
            viewer_location: self.current_location(position),
            viewer_orientation: None,
            latest_heading: self.latest_heading,
            scene_heading_offset_deg: self.scene_heading_offset_deg,
            scene_root_ready: self.scene_root_ready,
            ticks: self.ticks,
            nodes: self.nodes.clone(),
        }
    }

    pub fn estimates(&self) -> &EstimateStore {
        &self.estimates
    }

    pub fn latest_fix(&self) -> Option<&GeoCoordinate> {
        self.latest_fix.as_ref()
    }

    pub fn scene_root_ready(&self) -> bool {
        self.scene_root_ready
    }

    pub fn scene_heading_offset_deg(&self) -> f64 {
        self.scene_heading_offset_deg
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn add_estimate(&mut self, fix: GeoCoordinate, position: ScenePosition, captured_at: DateTime<Utc>) -> LocatorEvent {
        self.estimates.add_at(fix.clone(), position, captured_at);
        LocatorEvent::EstimateAdded {
            position,
            coordinate: fix,
        }
    }

    fn emit(&self, events: Vec<LocatorEvent>) -> Vec<LocatorEvent> {
        self.observer.dispatch(&events);
        events
    }
}

fn update_node(
    node: &mut PlacementNode,
    viewer: &Viewer,
    resolver: &LocationResolver<'_>,
    config: &LocatorConfig,
    initial: bool,
) -> Option<LocatorEvent> {
    let location = match resolver.resolve(node) {
        Ok(Some(location)) => location,
        Ok(None) => return None,
        Err(e) => {
            log::warn!("skipping placement of {}: {}", node.id(), e);
            return None;
        }
    };

    place_node(node, &location, viewer, config, initial);
    Some(LocatorEvent::NodePlacementUpdated(node.clone()))
}
