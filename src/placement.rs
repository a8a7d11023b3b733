//! Per-tick scene transform of a node from its geography.
//!
//! Nodes farther than the placement radius are pulled in to sit exactly on
//! the radius and shrunk by the same factor, so they keep their apparent
//! size without pushing the renderer's depth range.

use crate::coords;
use crate::node::PlacementNode;
use crate::scene_locator::LocatorConfig;
use crate::types::{uniform_scale, unit_scale, GeoCoordinate, ScenePosition};

/// Where the viewer is, in both spaces, for one update pass.
#[derive(Clone, Debug)]
pub struct Viewer {
    pub position: ScenePosition,
    pub location: GeoCoordinate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementBranch {
    /// Placed at its true metric offset from the viewer.
    Geographic,
    /// Pulled in to the placement radius and scaled down.
    Compressed,
    /// Left where it is in the scene; geography not trusted yet.
    SceneLocal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementOutcome {
    /// Real-world distance to the viewer, metres.
    pub distance: f64,
    /// Distance the node is shown at after compression.
    pub adjusted_distance: f64,
    pub branch: PlacementBranch,
}

/// Recompute `node`'s position, scale and annotation state.
///
/// `node_location` is the node's resolved coordinate; `initial` is set for
/// the synchronous placement done when a node is first added.
pub fn place_node(
    node: &mut PlacementNode,
    node_location: &GeoCoordinate,
    viewer: &Viewer,
    config: &LocatorConfig,
    initial: bool,
) -> PlacementOutcome {
    let translation = coords::translation(&viewer.location, node_location);
    let distance = coords::distance(&viewer.location, node_location);
    let radius = config.placement_radius;

    let geographic = node.is_confirmed()
        && (distance > radius || node.continually_adjust() || initial);

    let (adjusted_distance, branch) = if geographic && distance > radius {
        let scale = radius / distance;
        let offset = translation.scaled(scale).to_scene_offset();
        node.set_position(ScenePosition::from_vector(&(viewer.position.to_vector() + offset)));
        node.set_scale(uniform_scale(scale));
        (distance * scale, PlacementBranch::Compressed)
    } else if geographic {
        let offset = translation.to_scene_offset();
        node.set_position(ScenePosition::from_vector(&(viewer.position.to_vector() + offset)));
        node.set_scale(unit_scale());
        (distance, PlacementBranch::Geographic)
    } else {
        node.set_scale(unit_scale());
        (viewer.position.horizontal_distance(&node.position()), PlacementBranch::SceneLocal)
    };

    if node.is_annotation() {
        scale_annotation(node, distance, adjusted_distance, config);
    }

    PlacementOutcome {
        distance,
        adjusted_distance,
        branch,
    }
}

/// Paint priority for depth-test-free materials: farther paints first.
pub fn draw_order(distance: f64, factor: f64) -> i32 {
    let order = -distance * factor;
    if order.is_nan() {
        return 0;
    }
    order.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Billboard constraints ignore the owning node's scale, so the scale is
/// moved onto the content sub-node and the outer node is reset.
fn scale_annotation(node: &mut PlacementNode, distance: f64, adjusted_distance: f64, config: &LocatorConfig) {
    let applied = node.scale();
    node.set_scale(unit_scale());

    let annotation = match node.annotation_mut() {
        Some(annotation) => annotation,
        None => return,
    };

    annotation.rendering_order = draw_order(distance, config.draw_order_factor);

    let scale = if annotation.scale_relative_to_distance {
        annotation.content_scale = applied;
        applied.y
    } else {
        let mut scale = adjusted_distance * config.annotation_scale_factor;
        if distance > config.far_distance {
            scale *= config.far_scale_damping;
        }
        annotation.content_scale = uniform_scale(scale);
        scale
    };

    annotation.pivot_offset_y = -config.annotation_pivot_factor * scale;
}
