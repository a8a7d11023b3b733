//! Outbound notifications.
//!
//! The locator never owns its observer: it keeps a `Weak` reference and
//! silently stops notifying once the observer has been dropped.

use std::sync::{Arc, Weak};

use crate::node::PlacementNode;
use crate::types::{GeoCoordinate, ScenePosition};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum LocatorEvent {
    EstimateAdded { position: ScenePosition, coordinate: GeoCoordinate },
    EstimateRemoved { position: ScenePosition, coordinate: GeoCoordinate },
    NodeConfirmed(PlacementNode),
    NodePlacementUpdated(PlacementNode),
    SceneRootReady,
    SceneHeadingReset,
}

// ─── Observer ────────────────────────────────────────────────────────────────

/// Receives locator notifications. Every method defaults to a no-op.
pub trait LocatorObserver: Send + Sync {
    fn estimate_added(&self, _position: &ScenePosition, _coordinate: &GeoCoordinate) {}

    fn estimate_removed(&self, _position: &ScenePosition, _coordinate: &GeoCoordinate) {}

    fn node_confirmed(&self, _node: &PlacementNode) {}

    fn node_placement_updated(&self, _node: &PlacementNode) {}

    fn scene_root_ready(&self) {}

    fn scene_heading_reset(&self) {}
}

/// Non-owning observer reference.
#[derive(Default)]
pub struct ObserverSlot {
    observer: Option<Weak<dyn LocatorObserver>>,
}

impl ObserverSlot {
    pub fn set(&mut self, observer: &Arc<dyn LocatorObserver>) {
        self.observer = Some(Arc::downgrade(observer));
    }

    pub fn clear(&mut self) {
        self.observer = None;
    }

    pub fn is_alive(&self) -> bool {
        self.observer
            .as_ref()
            .map(|w| w.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn dispatch(&self, events: &[LocatorEvent]) {
        let observer = match self.observer.as_ref().and_then(Weak::upgrade) {
            Some(observer) => observer,
            None => return,
        };

        for event in events {
            match event {
                LocatorEvent::EstimateAdded { position, coordinate } => {
                    observer.estimate_added(position, coordinate)
                }
                LocatorEvent::EstimateRemoved { position, coordinate } => {
                    observer.estimate_removed(position, coordinate)
                }
                LocatorEvent::NodeConfirmed(node) => observer.node_confirmed(node),
                LocatorEvent::NodePlacementUpdated(node) => observer.node_placement_updated(node),
                LocatorEvent::SceneRootReady => observer.scene_root_ready(),
                LocatorEvent::SceneHeadingReset => observer.scene_heading_reset(),
            }
        }
    }
}
