pub mod linalg;

pub use linalg::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One absolute position sample from the device location subsystem.
///
/// Accuracies are radii in metres; smaller is better and a negative value
/// means the subsystem does not trust the reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            horizontal_accuracy: 0.0,
            vertical_accuracy: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal_accuracy = horizontal;
        self.vertical_accuracy = vertical;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Horizontal accuracy usable for "smaller is better" comparisons.
    pub fn has_trusted_horizontal_accuracy(&self) -> bool {
        self.horizontal_accuracy.is_finite() && self.horizontal_accuracy >= 0.0
    }
}

/// Position in the tracking space.
///
/// Axis convention: +X is east, +Y is up, -Z is north. Only X and Z take
/// part in horizontal radius checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ScenePosition {
    pub const ORIGIN: ScenePosition = ScenePosition { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(self) -> SceneVec {
        SceneVec::new(self.x, self.y, self.z)
    }

    pub fn from_vector(v: &SceneVec) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }

    /// Distance in the x/z plane, ignoring height.
    pub fn horizontal_distance(&self, other: &ScenePosition) -> f64 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn within_horizontal_radius(&self, other: &ScenePosition, radius: f64) -> bool {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        dx * dx + dz * dz <= radius * radius
    }
}

/// Metric offset between two coordinates.
///
/// Positive `north_south` means the target lies north of the source,
/// positive `east_west` means it lies east.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub north_south: f64,
    pub east_west: f64,
    pub altitude: f64,
}

impl Translation {
    pub fn new(north_south: f64, east_west: f64, altitude: f64) -> Self {
        Self { north_south, east_west, altitude }
    }

    /// Offset from `from` to `to` read off the scene axes.
    pub fn between_scene_positions(from: &ScenePosition, to: &ScenePosition) -> Self {
        Self {
            north_south: from.z - to.z,
            east_west: to.x - from.x,
            altitude: to.y - from.y,
        }
    }

    /// Same offset expressed on the scene axes (east, up, -north).
    pub fn to_scene_offset(&self) -> SceneVec {
        SceneVec::new(self.east_west, self.altitude, -self.north_south)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            north_south: self.north_south * factor,
            east_west: self.east_west * factor,
            altitude: self.altitude * factor,
        }
    }
}

/// Viewer orientation as Euler angles in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Compass heading pushed alongside geo-fixes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadingReading {
    /// Degrees clockwise from true north.
    pub heading: f64,
    /// Degrees; negative means the reading is magnetic-only and untrusted.
    pub accuracy: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = ScenePosition::new(0.0, 0.0, 0.0);
        let b = ScenePosition::new(3.0, 100.0, 4.0);
        assert!((a.horizontal_distance(&b) - 5.0).abs() < 1e-12);
        assert!(a.within_horizontal_radius(&b, 5.0));
        assert!(!a.within_horizontal_radius(&b, 4.99));
    }

    #[test]
    fn test_scene_translation_axes() {
        let from = ScenePosition::new(1.0, 2.0, 3.0);
        let to = ScenePosition::new(4.0, 1.0, -7.0);
        let t = Translation::between_scene_positions(&from, &to);
        // Moving towards -Z is moving north
        assert_eq!(t, Translation::new(10.0, 3.0, -1.0));
        assert_eq!(t.to_scene_offset(), to.to_vector() - from.to_vector());
    }

    #[test]
    fn test_untrusted_accuracy() {
        let fix = GeoCoordinate::new(10.0, 10.0, 0.0).with_accuracy(-1.0, 5.0);
        assert!(!fix.has_trusted_horizontal_accuracy());
        let fix = fix.with_accuracy(f64::NAN, 5.0);
        assert!(!fix.has_trusted_horizontal_accuracy());
        let fix = fix.with_accuracy(0.0, 5.0);
        assert!(fix.has_trusted_horizontal_accuracy());
    }
}
