//! Single-task scheduler around a [`SceneLocator`].
//!
//! Fixes, frames, API calls and the periodic tick all funnel into one tokio
//! task, so nothing touches the estimate window or the node list
//! concurrently. Stopping only drops the timer; a tick already running
//! always completes because the task handles one input at a time.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::confirmation::EstimateMethod;
use crate::error::{LocatorError, LocatorResult};
use crate::node::{NodeId, PlacementNode};
use crate::observer::LocatorEvent;
use crate::scene_locator::{LocatorSnapshot, SceneLocator};
use crate::sensors::PoseSource;
use crate::types::{GeoCoordinate, HeadingReading};

const COMMAND_QUEUE_DEPTH: usize = 256;

pub enum LocatorCommand {
    PushFix(GeoCoordinate),
    PushHeading(HeadingReading),
    Frame,
    AddNodeAtCurrentPosition {
        node: PlacementNode,
        reply: oneshot::Sender<Option<NodeId>>,
    },
    AddNodeWithConfirmedLocation {
        node: PlacementNode,
        reply: oneshot::Sender<Option<NodeId>>,
    },
    RemoveNode {
        id: NodeId,
        reply: oneshot::Sender<Option<PlacementNode>>,
    },
    RemoveAllNodes {
        reply: oneshot::Sender<usize>,
    },
    FindNodes {
        tag: String,
        reply: oneshot::Sender<Vec<PlacementNode>>,
    },
    ContainsNodeWithTag {
        tag: String,
        reply: oneshot::Sender<bool>,
    },
    CurrentLocation {
        reply: oneshot::Sender<Option<GeoCoordinate>>,
    },
    Snapshot {
        reply: oneshot::Sender<LocatorSnapshot>,
    },
    SetEstimateMethod(EstimateMethod),
    RotateSceneHeading {
        degrees: f64,
        reply: oneshot::Sender<bool>,
    },
    TickNow {
        reply: oneshot::Sender<Vec<LocatorEvent>>,
    },
    Start,
    Stop,
    Shutdown,
}

/// Cloneable front door to a running locator task.
#[derive(Clone)]
pub struct LocatorHandle {
    tx: mpsc::Sender<LocatorCommand>,
}

impl LocatorHandle {
    async fn send(&self, command: LocatorCommand) -> LocatorResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| LocatorError::SchedulerClosed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> LocatorCommand) -> LocatorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| LocatorError::SchedulerClosed)
    }

    pub async fn push_fix(&self, fix: GeoCoordinate) -> LocatorResult<()> {
        self.send(LocatorCommand::PushFix(fix)).await
    }

    pub async fn push_heading(&self, reading: HeadingReading) -> LocatorResult<()> {
        self.send(LocatorCommand::PushHeading(reading)).await
    }

    pub async fn frame(&self) -> LocatorResult<()> {
        self.send(LocatorCommand::Frame).await
    }

    pub async fn add_node_at_current_position(&self, node: PlacementNode) -> LocatorResult<Option<NodeId>> {
        self.request(|reply| LocatorCommand::AddNodeAtCurrentPosition { node, reply })
            .await
    }

    pub async fn add_node_with_confirmed_location(&self, node: PlacementNode) -> LocatorResult<Option<NodeId>> {
        self.request(|reply| LocatorCommand::AddNodeWithConfirmedLocation { node, reply })
            .await
    }

    pub async fn remove_node(&self, id: NodeId) -> LocatorResult<Option<PlacementNode>> {
        self.request(|reply| LocatorCommand::RemoveNode { id, reply }).await
    }

    pub async fn remove_all_nodes(&self) -> LocatorResult<usize> {
        self.request(|reply| LocatorCommand::RemoveAllNodes { reply }).await
    }

    pub async fn find_nodes(&self, tag: impl Into<String>) -> LocatorResult<Vec<PlacementNode>> {
        let tag = tag.into();
        self.request(|reply| LocatorCommand::FindNodes { tag, reply }).await
    }

    pub async fn contains_node_with_tag(&self, tag: impl Into<String>) -> LocatorResult<bool> {
        let tag = tag.into();
        self.request(|reply| LocatorCommand::ContainsNodeWithTag { tag, reply })
            .await
    }

    pub async fn current_location(&self) -> LocatorResult<Option<GeoCoordinate>> {
        self.request(|reply| LocatorCommand::CurrentLocation { reply }).await
    }

    pub async fn snapshot(&self) -> LocatorResult<LocatorSnapshot> {
        self.request(|reply| LocatorCommand::Snapshot { reply }).await
    }

    pub async fn set_estimate_method(&self, method: EstimateMethod) -> LocatorResult<()> {
        self.send(LocatorCommand::SetEstimateMethod(method)).await
    }

    pub async fn rotate_scene_heading(&self, degrees: f64) -> LocatorResult<bool> {
        self.request(|reply| LocatorCommand::RotateSceneHeading { degrees, reply })
            .await
    }

    /// Run one tick right away, independent of the timer.
    pub async fn tick_now(&self) -> LocatorResult<Vec<LocatorEvent>> {
        self.request(|reply| LocatorCommand::TickNow { reply }).await
    }

    pub async fn start(&self) -> LocatorResult<()> {
        self.send(LocatorCommand::Start).await
    }

    pub async fn stop(&self) -> LocatorResult<()> {
        self.send(LocatorCommand::Stop).await
    }

    pub async fn shutdown(&self) -> LocatorResult<()> {
        self.send(LocatorCommand::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Move `locator` and `pose` into their own task. The task hands the
/// locator back when it shuts down.
pub fn spawn_locator<P>(locator: SceneLocator, pose: P) -> (LocatorHandle, JoinHandle<SceneLocator>)
where
    P: PoseSource + 'static,
{
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let task = tokio::spawn(run(locator, pose, rx));
    (LocatorHandle { tx }, task)
}

async fn run<P: PoseSource>(mut locator: SceneLocator, pose: P, mut rx: mpsc::Receiver<LocatorCommand>) -> SceneLocator {
    let mut ticker: Option<Interval> = None;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(LocatorCommand::Shutdown) | None => break,
                Some(command) => handle_command(&mut locator, &pose, &mut ticker, command),
            },
            _ = next_tick(&mut ticker) => {
                locator.tick(pose.current_scene_position());
            }
        }
    }

    log::info!("locator task stopped after {} ticks", locator.ticks());
    locator
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn handle_command<P: PoseSource>(
    locator: &mut SceneLocator,
    pose: &P,
    ticker: &mut Option<Interval>,
    command: LocatorCommand,
) {
    // A dropped reply receiver just means the caller stopped waiting
    match command {
        LocatorCommand::PushFix(fix) => {
            locator.feed_fix(fix, pose.current_scene_position());
        }
        LocatorCommand::PushHeading(reading) => {
            locator.feed_heading(reading);
        }
        LocatorCommand::Frame => {
            locator.on_frame(pose.current_scene_position());
        }
        LocatorCommand::AddNodeAtCurrentPosition { node, reply } => {
            let _ = reply.send(locator.add_node_at_current_position(node, pose.current_scene_position()));
        }
        LocatorCommand::AddNodeWithConfirmedLocation { node, reply } => {
            let _ = reply.send(locator.add_node_with_confirmed_location(node, pose.current_scene_position()));
        }
        LocatorCommand::RemoveNode { id, reply } => {
            let _ = reply.send(locator.remove_node(id));
        }
        LocatorCommand::RemoveAllNodes { reply } => {
            let _ = reply.send(locator.remove_all_nodes());
        }
        LocatorCommand::FindNodes { tag, reply } => {
            let found = locator.find_nodes(&tag).into_iter().cloned().collect();
            let _ = reply.send(found);
        }
        LocatorCommand::ContainsNodeWithTag { tag, reply } => {
            let _ = reply.send(locator.contains_node_with_tag(&tag));
        }
        LocatorCommand::CurrentLocation { reply } => {
            let _ = reply.send(locator.current_location(pose.current_scene_position()));
        }
        LocatorCommand::Snapshot { reply } => {
            let mut snapshot = locator.snapshot(pose.current_scene_position());
            snapshot.viewer_orientation = pose.current_orientation();
            let _ = reply.send(snapshot);
        }
        LocatorCommand::SetEstimateMethod(method) => locator.set_estimate_method(method),
        LocatorCommand::RotateSceneHeading { degrees, reply } => {
            let _ = reply.send(locator.rotate_scene_heading(degrees));
        }
        LocatorCommand::TickNow { reply } => {
            let _ = reply.send(locator.tick(pose.current_scene_position()));
        }
        LocatorCommand::Start => {
            if ticker.is_none() {
                let mut timer = interval(locator.config().tick_interval());
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                *ticker = Some(timer);
                log::info!("tick scheduler started ({} ms)", locator.config().tick_interval_ms);
            }
        }
        LocatorCommand::Stop => {
            if ticker.take().is_some() {
                log::info!("tick scheduler stopped");
            }
        }
        LocatorCommand::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_locator::LocatorConfig;
    use crate::sensors::SharedPose;
    use crate::types::ScenePosition;
    use std::time::Duration;

    fn spawn(pose: SharedPose) -> (LocatorHandle, JoinHandle<SceneLocator>) {
        let locator = SceneLocator::new(LocatorConfig::default()).expect("valid config");
        spawn_locator(locator, pose)
    }

    fn fix(lat: f64, lon: f64) -> GeoCoordinate {
        GeoCoordinate::new(lat, lon, 0.0).with_accuracy(5.0, 5.0)
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order() {
        let pose = SharedPose::new(Some(ScenePosition::ORIGIN));
        let (handle, task) = spawn(pose.clone());

        handle.push_fix(fix(10.0, 20.0)).await.expect("running");
        handle.frame().await.expect("running");
        let id = handle
            .add_node_at_current_position(PlacementNode::unanchored().tagged("start"))
            .await
            .expect("running")
            .expect("anchored");

        assert!(handle.contains_node_with_tag("start").await.expect("running"));
        let found = handle.find_nodes("start").await.expect("running");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), id);
        assert!(found[0].is_attached());

        let here = handle.current_location().await.expect("running").expect("located");
        assert!((here.latitude - 10.0).abs() < 1e-9);

        assert!(handle.remove_node(id).await.expect("running").is_some());
        assert!(handle.remove_node(id).await.expect("running").is_none());

        handle.shutdown().await.expect("running");
        let locator = task.await.expect("task joins");
        assert_eq!(locator.estimates().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_now_uses_current_pose() {
        let pose = SharedPose::new(Some(ScenePosition::ORIGIN));
        let (handle, task) = spawn(pose.clone());

        handle.push_fix(fix(0.0, 0.0)).await.expect("running");
        pose.set(Some(ScenePosition::new(200.0, 0.0, 0.0)));

        let events = handle.tick_now().await.expect("running");
        assert!(events
            .iter()
            .any(|e| matches!(e, LocatorEvent::EstimateRemoved { .. })));

        handle.shutdown().await.expect("running");
        task.await.expect("task joins");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_control_ticks() {
        let (handle, task) = spawn(SharedPose::new(Some(ScenePosition::ORIGIN)));

        handle.start().await.expect("running");
        tokio::time::sleep(Duration::from_millis(1050)).await;
        let running = handle.snapshot().await.expect("running").ticks;
        assert!(running >= 10, "expected ~11 ticks, got {}", running);

        handle.stop().await.expect("running");
        let stopped = handle.snapshot().await.expect("running").ticks;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.snapshot().await.expect("running").ticks, stopped);

        handle.shutdown().await.expect("running");
        task.await.expect("task joins");
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let (handle, task) = spawn(SharedPose::default());
        handle.shutdown().await.expect("running");
        task.await.expect("task joins");

        assert!(handle.is_closed());
        assert_eq!(handle.push_fix(fix(0.0, 0.0)).await, Err(LocatorError::SchedulerClosed));
        assert_eq!(handle.snapshot().await.err(), Some(LocatorError::SchedulerClosed));
    }
}
