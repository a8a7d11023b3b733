use std::cmp::Ordering;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coords;
use crate::types::{GeoCoordinate, ScenePosition, Translation};

/// A geo-fix paired with the scene position observed when it arrived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationEstimate {
    pub coordinate: GeoCoordinate,
    pub scene_position: ScenePosition,
    pub captured_at: DateTime<Utc>,
}

impl LocationEstimate {
    /// Offset from this estimate's scene position to `to`, as a geographic translation.
    pub fn translation_to(&self, to: &ScenePosition) -> Translation {
        Translation::between_scene_positions(&self.scene_position, to)
    }

    /// Geographic coordinate of `to`, carried through the scene from this estimate.
    pub fn translated_location(&self, to: &ScenePosition) -> GeoCoordinate {
        coords::apply(&self.coordinate, &self.translation_to(to))
    }
}

/// Bounded, insertion-ordered window of location estimates.
pub struct EstimateStore {
    window: VecDeque<LocationEstimate>,
    capacity: usize,
}

impl EstimateStore {
    pub fn new(capacity: usize) -> Self {
        EstimateStore {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append an estimate stamped with the current time.
    pub fn add(&mut self, coordinate: GeoCoordinate, scene_position: ScenePosition) -> &LocationEstimate {
        self.add_at(coordinate, scene_position, Utc::now())
    }

    /// Append an estimate; the oldest entry is evicted once over capacity.
    pub fn add_at(
        &mut self,
        coordinate: GeoCoordinate,
        scene_position: ScenePosition,
        captured_at: DateTime<Utc>,
    ) -> &LocationEstimate {
        self.window.push_back(LocationEstimate {
            coordinate,
            scene_position,
            captured_at,
        });

        while self.window.len() > self.capacity.max(1) {
            if let Some(evicted) = self.window.pop_front() {
                log::debug!(
                    "estimate window full, evicted fix captured at {}",
                    evicted.captured_at
                );
            }
        }

        &self.window[self.window.len() - 1]
    }

    /// Drop every estimate further than `radius` from `current` in the x/z plane.
    /// Returns the removed estimates in their original order.
    pub fn prune_outside_radius(&mut self, current: &ScenePosition, radius: f64) -> Vec<LocationEstimate> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.window.len());

        for estimate in self.window.drain(..) {
            if current.within_horizontal_radius(&estimate.scene_position, radius) {
                kept.push_back(estimate);
            } else {
                removed.push(estimate);
            }
        }
        self.window = kept;

        if !removed.is_empty() {
            log::debug!("pruned {} estimates outside {:.1} units", removed.len(), radius);
        }
        removed
    }

    /// Most accurate estimate, newest first on ties.
    ///
    /// Estimates with a negative or non-finite horizontal accuracy are
    /// never selected.
    pub fn best(&self) -> Option<&LocationEstimate> {
        self.window
            .iter()
            .filter(|e| e.coordinate.has_trusted_horizontal_accuracy())
            .fold(None, |best: Option<&LocationEstimate>, candidate| match best {
                None => Some(candidate),
                Some(current) => match compare_estimates(candidate, current) {
                    // Later entries win exact ties
                    Ordering::Less | Ordering::Equal => Some(candidate),
                    Ordering::Greater => Some(current),
                },
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationEstimate> {
        self.window.iter()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// `Less` means `a` is the better estimate.
fn compare_estimates(a: &LocationEstimate, b: &LocationEstimate) -> Ordering {
    a.coordinate
        .horizontal_accuracy
        .total_cmp(&b.coordinate.horizontal_accuracy)
        .then_with(|| b.captured_at.cmp(&a.captured_at))
}
