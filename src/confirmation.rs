//! When does a node's geography become authoritative?
//!
//! An unconfirmed node rides along with the best fused estimate, carried
//! through the scene, until the viewer has moved far enough away from it.
//! At that point its coordinate is resolved one last time and frozen.

use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, LocatorResult};
use crate::estimates::EstimateStore;
use crate::node::PlacementNode;
use crate::observer::LocatorEvent;
use crate::types::{GeoCoordinate, ScenePosition};

/// Where geographic positions come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMethod {
    /// Fuse geo-fixes with scene positions and use the best one.
    #[default]
    MostRelevantEstimate,
    /// Trust raw geo-fixes directly, no scene fusion.
    FixesOnly,
}

/// Applies the location-resolution policy against the current estimate window.
pub struct LocationResolver<'a> {
    method: EstimateMethod,
    estimates: &'a EstimateStore,
}

impl<'a> LocationResolver<'a> {
    pub fn new(method: EstimateMethod, estimates: &'a EstimateStore) -> Self {
        Self { method, estimates }
    }

    pub fn method(&self) -> EstimateMethod {
        self.method
    }

    /// Authoritative coordinate of `node` right now.
    ///
    /// `Ok(None)` means nothing is known yet. Asking for a coordinate-less
    /// node in fixes-only mode is a caller error.
    pub fn resolve(&self, node: &PlacementNode) -> LocatorResult<Option<GeoCoordinate>> {
        if self.method == EstimateMethod::FixesOnly {
            return match node.geo_coordinate() {
                Some(coordinate) => Ok(Some(coordinate.clone())),
                None => Err(LocatorError::MissingFixCoordinate { node: node.id() }),
            };
        }

        if node.is_confirmed() {
            return Ok(node.geo_coordinate().cloned());
        }

        if let Some(best) = self.estimates.best() {
            let improves = match node.geo_coordinate() {
                None => true,
                Some(current) => best.coordinate.horizontal_accuracy < current.horizontal_accuracy,
            };
            if improves {
                return Ok(Some(best.translated_location(&node.position())));
            }
        }

        Ok(node.geo_coordinate().cloned())
    }

    /// Where the viewer standing at `position` is, geographically.
    pub fn viewer_location(
        &self,
        position: Option<ScenePosition>,
        latest_fix: Option<&GeoCoordinate>,
    ) -> Option<GeoCoordinate> {
        match self.method {
            EstimateMethod::FixesOnly => latest_fix.cloned(),
            EstimateMethod::MostRelevantEstimate => {
                let position = position?;
                let best = self.estimates.best()?;
                Some(best.translated_location(&position))
            }
        }
    }
}

/// Confirm every unconfirmed node that is now more than `radius` from the viewer.
pub fn confirm_distant_nodes(
    nodes: &mut [PlacementNode],
    current: &ScenePosition,
    radius: f64,
    resolver: &LocationResolver<'_>,
) -> Vec<LocatorEvent> {
    let mut events = Vec::new();

    for node in nodes.iter_mut().filter(|n| !n.is_confirmed()) {
        if current.within_horizontal_radius(&node.position(), radius) {
            continue;
        }

        match resolver.resolve(node) {
            Ok(Some(coordinate)) => {
                log::info!(
                    "confirmed {} at ({:.6}, {:.6}) after viewer moved {:.1} units away",
                    node.id(),
                    coordinate.latitude,
                    coordinate.longitude,
                    current.horizontal_distance(&node.position())
                );
                node.confirm(coordinate);
                events.push(LocatorEvent::NodeConfirmed(node.clone()));
            }
            Ok(None) => {
                log::debug!("{} out of range but has no coordinate yet", node.id());
            }
            Err(e) => {
                log::warn!("cannot confirm {}: {}", node.id(), e);
            }
        }
    }

    events
}
