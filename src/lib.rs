//! Geospatial-to-scene fusion and placement.
//!
//! Pairs noisy geo-fixes with positions in a drifting tracking space, keeps
//! the best pairing as a live anchor and places geographically anchored
//! nodes in the scene every tick.

pub mod confirmation;
pub mod coords;
pub mod error;
pub mod estimates;
pub mod live_status;
pub mod node;
pub mod observer;
pub mod placement;
pub mod scene_locator;
pub mod scheduler;
pub mod sensors;
pub mod types;

pub use confirmation::{EstimateMethod, LocationResolver};
pub use error::{LocatorError, LocatorResult};
pub use estimates::{EstimateStore, LocationEstimate};
pub use node::{Annotation, Confirmation, NodeId, PlacementNode};
pub use observer::{LocatorEvent, LocatorObserver};
pub use scene_locator::{LocatorConfig, LocatorSnapshot, SceneLocator};
pub use scheduler::{spawn_locator, LocatorHandle};
pub use sensors::PoseSource;
pub use types::{GeoCoordinate, HeadingReading, Orientation, ScenePosition, Translation};
