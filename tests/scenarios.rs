use std::sync::{Arc, Mutex};

use approx::{assert_abs_diff_eq, assert_relative_eq};
use chrono::{Duration, TimeZone, Utc};

use geo_anchor_rs::coords;
use geo_anchor_rs::placement::{place_node, PlacementBranch, Viewer};
use geo_anchor_rs::sensors::SharedPose;
use geo_anchor_rs::types::EARTH_RADIUS_M;
use geo_anchor_rs::{
    spawn_locator, EstimateMethod, EstimateStore, GeoCoordinate, LocationResolver, LocatorConfig, LocatorError,
    LocatorEvent, LocatorObserver, PlacementNode, SceneLocator, ScenePosition,
};

fn metres_to_degrees(m: f64) -> f64 {
    (m / EARTH_RADIUS_M).to_degrees()
}

fn fix(lat: f64, lon: f64, accuracy: f64) -> GeoCoordinate {
    GeoCoordinate::new(lat, lon, 0.0).with_accuracy(accuracy, accuracy)
}

#[derive(Default)]
struct Recorder {
    added: Mutex<Vec<ScenePosition>>,
    removed: Mutex<Vec<ScenePosition>>,
    confirmed: Mutex<Vec<PlacementNode>>,
    updated: Mutex<u32>,
}

impl LocatorObserver for Recorder {
    fn estimate_added(&self, position: &ScenePosition, _coordinate: &GeoCoordinate) {
        self.added.lock().unwrap().push(*position);
    }

    fn estimate_removed(&self, position: &ScenePosition, _coordinate: &GeoCoordinate) {
        self.removed.lock().unwrap().push(*position);
    }

    fn node_confirmed(&self, node: &PlacementNode) {
        self.confirmed.lock().unwrap().push(node.clone());
    }

    fn node_placement_updated(&self, _node: &PlacementNode) {
        *self.updated.lock().unwrap() += 1;
    }
}

#[test]
fn scenario_a_one_km_north_of_null_island() {
    let (lat, lon) = coords::offset_by_bearing(0.0, 0.0, 0.0, 1000.0);
    assert_abs_diff_eq!(lat, 0.008993, epsilon = 1e-6);
    assert_abs_diff_eq!(lat, 1000.0 / 6_371_000.0 * 180.0 / std::f64::consts::PI, epsilon = 1e-12);
    assert_abs_diff_eq!(lon, 0.0, epsilon = 1e-12);
}

#[test]
fn scenario_b_node_east_of_viewer() {
    let viewer = GeoCoordinate::new(0.0, 0.0, 0.0);
    let node = GeoCoordinate::new(0.0, 0.001, 0.0);

    let t = coords::translation(&viewer, &node);
    assert_abs_diff_eq!(t.east_west, 111.19, epsilon = 0.01);
    assert_abs_diff_eq!(t.north_south, 0.0, epsilon = 1e-9);
}

#[test]
fn scenario_c_thirty_one_adds_evict_the_first() {
    let mut store = EstimateStore::new(30);
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for i in 0..31 {
        store.add_at(
            fix(0.0, i as f64 * 1e-5, 5.0),
            ScenePosition::new(i as f64, 0.0, 0.0),
            base + Duration::seconds(i),
        );
    }

    assert_eq!(store.len(), 30);
    let xs: Vec<f64> = store.iter().map(|e| e.scene_position.x).collect();
    let expected: Vec<f64> = (1..31).map(|i| i as f64).collect();
    assert_eq!(xs, expected);
}

#[test]
fn scenario_d_node_confirms_after_viewer_walks_away() {
    let mut locator = SceneLocator::new(LocatorConfig::default()).unwrap();
    locator.on_frame(None);
    locator.feed_fix(fix(10.0, 10.0, 12.0), Some(ScenePosition::ORIGIN));

    let id = locator
        .add_node_at_current_position(PlacementNode::unanchored(), Some(ScenePosition::ORIGIN))
        .unwrap();
    assert!(!locator.node(id).unwrap().is_confirmed());

    // Still inside the radius: nothing happens
    let near = ScenePosition::new(90.0, 0.0, 0.0);
    locator.tick(Some(near));
    assert!(!locator.node(id).unwrap().is_confirmed());

    let away = ScenePosition::new(150.0, 0.0, 0.0);
    let best_fix = fix(10.0, 10.0 + metres_to_degrees(150.0) / 10f64.to_radians().cos(), 3.0);
    locator.feed_fix(best_fix, Some(away));
    locator.tick(Some(away));

    let node = locator.node(id).unwrap();
    assert!(node.is_confirmed());
    let coordinate = node.geo_coordinate().unwrap();
    // Resolved through the 3 m estimate, carried 150 m back west
    assert_eq!(coordinate.horizontal_accuracy, 3.0);
    assert_abs_diff_eq!(coordinate.latitude, 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(coordinate.longitude, 10.0, epsilon = 1e-6);
}

#[test]
fn window_never_exceeds_capacity() {
    let mut locator = SceneLocator::new(LocatorConfig::default()).unwrap();
    for i in 0..200 {
        locator.feed_fix(fix(0.0, 0.0, 5.0), Some(ScenePosition::new((i % 7) as f64, 0.0, 0.0)));
        assert!(locator.estimates().len() <= 30);
    }
    assert_eq!(locator.estimates().len(), 30);
}

#[test]
fn prune_notifies_once_per_removed_estimate() {
    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn LocatorObserver> = recorder.clone();
    let mut locator = SceneLocator::new(LocatorConfig::default()).unwrap();
    locator.set_observer(&observer);

    let positions = [
        ScenePosition::new(0.0, 0.0, 0.0),
        ScenePosition::new(60.0, 0.0, 80.0),
        ScenePosition::new(100.0, 50.0, 0.0),
        ScenePosition::new(-20.0, 0.0, 10.0),
        ScenePosition::new(0.0, 0.0, -70.0),
    ];
    for p in positions {
        locator.feed_fix(fix(0.0, 0.0, 5.0), Some(p));
    }
    assert_eq!(recorder.added.lock().unwrap().len(), 5);

    let current = ScenePosition::new(80.0, 0.0, 0.0);
    locator.tick(Some(current));

    let removed = recorder.removed.lock().unwrap().clone();
    assert_eq!(removed, vec![ScenePosition::new(-20.0, 0.0, 10.0), ScenePosition::new(0.0, 0.0, -70.0)]);
    for remaining in locator.estimates().iter() {
        assert!(current.horizontal_distance(&remaining.scene_position) <= 100.0);
    }
    let kept: Vec<ScenePosition> = locator.estimates().iter().map(|e| e.scene_position).collect();
    assert_eq!(kept, positions[..3].to_vec());
}

#[test]
fn best_prefers_later_estimate_on_equal_accuracy() {
    let mut store = EstimateStore::new(30);
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    store.add_at(fix(1.0, 0.0, 4.0), ScenePosition::new(0.0, 0.0, 0.0), t0 + Duration::seconds(5));
    store.add_at(fix(2.0, 0.0, 4.0), ScenePosition::new(1.0, 0.0, 0.0), t0);
    store.add_at(fix(3.0, 0.0, 9.0), ScenePosition::new(2.0, 0.0, 0.0), t0 + Duration::seconds(9));

    let best = store.best().unwrap();
    assert_eq!(best.coordinate.latitude, 1.0);
}

#[test]
fn confirmation_is_monotonic() {
    let mut locator = SceneLocator::new(LocatorConfig::default()).unwrap();
    locator.feed_fix(fix(0.0, 0.0, 5.0), Some(ScenePosition::ORIGIN));
    let id = locator
        .add_node_at_current_position(PlacementNode::unanchored(), Some(ScenePosition::ORIGIN))
        .unwrap();

    let mut was_confirmed = false;
    for step in 0..60 {
        // Walk out to 300 units and back again
        let x = if step < 30 { step as f64 * 10.0 } else { (60 - step) as f64 * 10.0 };
        let p = ScenePosition::new(x, 0.0, 0.0);
        locator.feed_fix(fix(0.0, metres_to_degrees(x), 5.0), Some(p));
        locator.tick(Some(p));

        let confirmed = locator.node(id).unwrap().is_confirmed();
        assert!(!(was_confirmed && !confirmed), "confirmation reverted at step {}", step);
        was_confirmed |= confirmed;
    }
    assert!(was_confirmed);
}

#[test]
fn compression_keeps_far_nodes_on_the_radius() {
    let config = LocatorConfig::default();
    let viewer = Viewer {
        position: ScenePosition::new(3.0, 1.5, -7.0),
        location: GeoCoordinate::new(48.8566, 2.3522, 35.0),
    };

    for (north, east) in [(500.0, 0.0), (0.0, -2500.0), (3000.0, 4000.0), (-12000.0, 800.0)] {
        let target = coords::apply(&viewer.location, &geo_anchor_rs::Translation::new(north, east, 0.0));
        let mut node = PlacementNode::with_coordinate(target.clone());

        let outcome = place_node(&mut node, &target, &viewer, &config, false);
        assert_eq!(outcome.branch, PlacementBranch::Compressed);

        let offset = node.position().to_vector() - viewer.position.to_vector();
        let translation = coords::translation(&viewer.location, &target);
        let unscaled = translation.to_scene_offset().norm();
        // Offset magnitude lands on the radius whenever the offset is horizontal
        assert_relative_eq!(offset.norm(), 100.0 * unscaled / outcome.distance, max_relative = 1e-9);
        let expected_scale = 100.0 / outcome.distance;
        assert_relative_eq!(node.scale().x, expected_scale, max_relative = 1e-12);
        assert_relative_eq!(node.scale().y, expected_scale, max_relative = 1e-12);
        assert_relative_eq!(node.scale().z, expected_scale, max_relative = 1e-12);
    }

    let due_east = GeoCoordinate::new(
        viewer.location.latitude,
        viewer.location.longitude + 0.05,
        viewer.location.altitude,
    );
    let mut node = PlacementNode::with_coordinate(due_east.clone());
    place_node(&mut node, &due_east, &viewer, &config, false);
    let offset = node.position().to_vector() - viewer.position.to_vector();
    assert_abs_diff_eq!(offset.norm(), 100.0, epsilon = 1e-9);
}

#[test]
fn round_trip_within_a_metre() {
    let origins = [(0.0, 0.0), (51.5074, -0.1278), (-33.8688, 151.2093), (60.1699, 24.9384)];
    let offsets = [(0.001, 0.001), (-0.05, 0.08), (0.2, -0.3), (-0.1, -0.1)];

    for (lat, lon) in origins {
        let a = GeoCoordinate::new(lat, lon, 10.0);
        for (dlat, dlon) in offsets {
            let b = GeoCoordinate::new(lat + dlat, lon + dlon, 25.0);
            if coords::distance(&a, &b) > 50_000.0 {
                continue;
            }
            let back = coords::apply(&a, &coords::translation(&a, &b));
            assert!(
                coords::distance(&back, &b) < 1.0,
                "round trip from ({}, {}) by ({}, {}) off by {} m",
                lat,
                lon,
                dlat,
                dlon,
                coords::distance(&back, &b)
            );
            assert_abs_diff_eq!(back.altitude, 25.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn fixes_only_resolution_of_unlocated_node_is_an_error() {
    let store = EstimateStore::new(30);
    let node = PlacementNode::unanchored();
    let resolver = LocationResolver::new(EstimateMethod::FixesOnly, &store);

    match resolver.resolve(&node) {
        Err(LocatorError::MissingFixCoordinate { node: id }) => assert_eq!(id, node.id()),
        other => panic!("expected MissingFixCoordinate, got {:?}", other),
    }
}

#[test]
fn observer_sees_confirmation_and_updates() {
    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn LocatorObserver> = recorder.clone();
    let mut locator = SceneLocator::new(LocatorConfig::default()).unwrap();
    locator.set_observer(&observer);

    locator.feed_fix(fix(0.0, 0.0, 8.0), Some(ScenePosition::ORIGIN));
    let id = locator
        .add_node_at_current_position(PlacementNode::unanchored(), Some(ScenePosition::ORIGIN))
        .unwrap();
    locator
        .add_node_with_confirmed_location(
            PlacementNode::with_coordinate(fix(0.001, 0.0, 5.0)),
            Some(ScenePosition::ORIGIN),
        )
        .unwrap();
    assert_eq!(*recorder.updated.lock().unwrap(), 1);

    let away = ScenePosition::new(0.0, 0.0, -120.0);
    locator.feed_fix(fix(metres_to_degrees(120.0), 0.0, 4.0), Some(away));
    let events = locator.tick(Some(away));

    let confirmed = recorder.confirmed.lock().unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].id(), id);
    assert!(events.contains(&LocatorEvent::NodeConfirmed(confirmed[0].clone())));
    assert_eq!(*recorder.updated.lock().unwrap(), 3);

    drop(confirmed);
    drop(observer);
    drop(recorder);
    // No observer left; ticking still works
    assert!(!locator.tick(Some(away)).is_empty());
}

#[tokio::test]
async fn scheduler_serializes_fix_and_node_traffic() {
    let pose = SharedPose::new(Some(ScenePosition::ORIGIN));
    let locator = SceneLocator::new(LocatorConfig::default()).unwrap();
    let (handle, task) = spawn_locator(locator, pose.clone());

    let mut producers = Vec::new();
    for worker in 0..4 {
        let handle = handle.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..25 {
                let lon = (worker * 25 + i) as f64 * 1e-6;
                handle.push_fix(fix(0.0, lon, 5.0)).await.unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    handle.frame().await.unwrap();
    handle
        .add_node_with_confirmed_location(PlacementNode::with_coordinate(fix(0.0, 0.01, 5.0)).tagged("far"))
        .await
        .unwrap()
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.estimate_count, 30);
    assert!(snapshot.scene_root_ready);
    let far = &snapshot.nodes[0];
    assert!(far.is_attached());
    assert!(far.scale().x < 0.1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(handle.tick_now().await.err(), Some(LocatorError::SchedulerClosed));
}
