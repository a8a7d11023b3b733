use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::{unit_scale, GeoCoordinate, NodeScale, ScenePosition};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle for a placed object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Whether a node's geography is still riding the live anchor.
///
/// One-way once the node is owned by a locator: ticks only ever move a node
/// from `Unconfirmed` to `Confirmed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    Unconfirmed,
    Confirmed,
}

/// Billboard label state carried by annotation nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Scale like a regular node instead of keeping a constant on-screen size.
    pub scale_relative_to_distance: bool,
    /// Scale of the content sub-node.
    pub content_scale: NodeScale,
    /// Vertical pivot offset so the label grows from its base.
    pub pivot_offset_y: f64,
    /// Paint order for depth-test-free materials; farther is lower.
    pub rendering_order: i32,
}

impl Annotation {
    pub fn new(scale_relative_to_distance: bool) -> Self {
        Self {
            scale_relative_to_distance,
            content_scale: unit_scale(),
            pivot_offset_y: 0.0,
            rendering_order: 0,
        }
    }
}

/// Authoritative record of one placed object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementNode {
    id: NodeId,
    geo_coordinate: Option<GeoCoordinate>,
    confirmation: Confirmation,
    position: ScenePosition,
    scale: NodeScale,
    tag: Option<String>,
    continually_adjust: bool,
    continually_update: bool,
    annotation: Option<Annotation>,
    attached: bool,
}

impl PlacementNode {
    /// A node with a known coordinate starts confirmed; one without starts unconfirmed.
    pub fn new(geo_coordinate: Option<GeoCoordinate>) -> Self {
        let confirmation = if geo_coordinate.is_some() {
            Confirmation::Confirmed
        } else {
            Confirmation::Unconfirmed
        };
        Self {
            id: NodeId::next(),
            geo_coordinate,
            confirmation,
            position: ScenePosition::ORIGIN,
            scale: unit_scale(),
            tag: None,
            continually_adjust: true,
            continually_update: true,
            annotation: None,
            attached: false,
        }
    }

    pub fn with_coordinate(coordinate: GeoCoordinate) -> Self {
        Self::new(Some(coordinate))
    }

    /// A node that will be anchored wherever the viewer currently stands.
    pub fn unanchored() -> Self {
        Self::new(None)
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn as_annotation(mut self, scale_relative_to_distance: bool) -> Self {
        self.annotation = Some(Annotation::new(scale_relative_to_distance));
        self
    }

    pub fn continually_adjusting(mut self, enabled: bool) -> Self {
        self.continually_adjust = enabled;
        self
    }

    pub fn continually_updating(mut self, enabled: bool) -> Self {
        self.continually_update = enabled;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn geo_coordinate(&self) -> Option<&GeoCoordinate> {
        self.geo_coordinate.as_ref()
    }

    pub fn confirmation(&self) -> Confirmation {
        self.confirmation
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmation == Confirmation::Confirmed
    }

    pub fn position(&self) -> ScenePosition {
        self.position
    }

    pub fn scale(&self) -> NodeScale {
        self.scale
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }

    pub fn continually_adjust(&self) -> bool {
        self.continually_adjust
    }

    pub fn continually_update(&self) -> bool {
        self.continually_update
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub fn is_annotation(&self) -> bool {
        self.annotation.is_some()
    }

    /// Attached to the scene root (and so visible to the renderer).
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // ── Engine-side mutation ─────────────────────────────────────────────

    pub(crate) fn anchor_at(&mut self, coordinate: GeoCoordinate, position: ScenePosition, confirmed: bool) {
        self.geo_coordinate = Some(coordinate);
        self.position = position;
        self.confirmation = if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::Unconfirmed
        };
    }

    /// Freeze the node's geography.
    pub(crate) fn confirm(&mut self, coordinate: GeoCoordinate) {
        self.geo_coordinate = Some(coordinate);
        self.confirmation = Confirmation::Confirmed;
    }

    pub(crate) fn set_position(&mut self, position: ScenePosition) {
        self.position = position;
    }

    pub(crate) fn set_scale(&mut self, scale: NodeScale) {
        self.scale = scale;
    }

    pub(crate) fn annotation_mut(&mut self) -> Option<&mut Annotation> {
        self.annotation.as_mut()
    }

    pub(crate) fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }
}
