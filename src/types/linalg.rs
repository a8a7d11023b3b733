//! Linear algebra aliases for scene-space math.
//!
//! Scene offsets and node scales are plain nalgebra vectors so the
//! placement code can lean on `norm`, scalar products and friends.

use nalgebra::Vector3;

// ===== Geodesy =====
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ===== Scene Types =====
pub type SceneVec = Vector3<f64>;
pub type NodeScale = Vector3<f64>;

/// Uniform scale on all three axes.
pub fn uniform_scale(s: f64) -> NodeScale {
    NodeScale::new(s, s, s)
}

pub fn unit_scale() -> NodeScale {
    uniform_scale(1.0)
}
