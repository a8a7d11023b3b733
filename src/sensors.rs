use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::coords;
use crate::error::LocatorError;
use crate::scheduler::LocatorHandle;
use crate::types::{GeoCoordinate, HeadingReading, Orientation, ScenePosition, Translation};

/// Pull-side view of the tracking subsystem.
pub trait PoseSource: Send {
    fn current_scene_position(&self) -> Option<ScenePosition>;

    fn current_orientation(&self) -> Option<Orientation> {
        None
    }
}

impl PoseSource for ScenePosition {
    fn current_scene_position(&self) -> Option<ScenePosition> {
        Some(*self)
    }
}

impl PoseSource for Option<ScenePosition> {
    fn current_scene_position(&self) -> Option<ScenePosition> {
        *self
    }
}

impl<P: PoseSource + Sync + ?Sized> PoseSource for Arc<P> {
    fn current_scene_position(&self) -> Option<ScenePosition> {
        (**self).current_scene_position()
    }

    fn current_orientation(&self) -> Option<Orientation> {
        (**self).current_orientation()
    }
}

/// Pose that can be moved from outside the locator task.
#[derive(Clone, Default)]
pub struct SharedPose {
    inner: Arc<Mutex<Option<ScenePosition>>>,
}

impl SharedPose {
    pub fn new(position: Option<ScenePosition>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(position)),
        }
    }

    pub fn set(&self, position: Option<ScenePosition>) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = position;
        }
    }
}

impl PoseSource for SharedPose {
    fn current_scene_position(&self) -> Option<ScenePosition> {
        self.inner.lock().ok().and_then(|guard| *guard)
    }
}

// ─── Simulated walk ──────────────────────────────────────────────────────────

/// Constant-velocity walker. The tracking space starts at the origin and
/// the geo-fixes wobble around the true track.
pub struct SimulatedWalk {
    origin: GeoCoordinate,
    east_speed: f64,
    north_speed: f64,
    started: Instant,
    fix_count: AtomicU64,
}

impl SimulatedWalk {
    pub fn new(origin: GeoCoordinate, east_speed: f64, north_speed: f64) -> Self {
        Self {
            origin,
            east_speed,
            north_speed,
            started: Instant::now(),
            fix_count: AtomicU64::new(0),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn position_at(&self, elapsed_secs: f64) -> ScenePosition {
        ScenePosition::new(self.east_speed * elapsed_secs, 0.0, -self.north_speed * elapsed_secs)
    }

    /// Noisy fix for the walker's true position at `elapsed_secs`.
    pub fn fix_at(&self, elapsed_secs: f64, seq: u64) -> GeoCoordinate {
        let s = seq as f64;
        let wobble_north = (s * 0.7).sin() * 2.0;
        let wobble_east = (s * 1.3).cos() * 2.0;
        let track = Translation::new(
            self.north_speed * elapsed_secs + wobble_north,
            self.east_speed * elapsed_secs + wobble_east,
            0.0,
        );
        let accuracy = 5.0 + (s * 0.1).sin() * 2.0;
        coords::apply(&self.origin, &track)
            .with_accuracy(accuracy, accuracy * 1.5)
            .with_timestamp(chrono::Utc::now())
    }

    pub fn next_fix(&self) -> GeoCoordinate {
        let seq = self.fix_count.fetch_add(1, Ordering::Relaxed);
        self.fix_at(self.elapsed_secs(), seq)
    }

    pub fn heading(&self) -> HeadingReading {
        let heading = self.east_speed.atan2(self.north_speed).to_degrees().rem_euclid(360.0);
        HeadingReading { heading, accuracy: 10.0 }
    }

    pub fn fixes_sent(&self) -> u64 {
        self.fix_count.load(Ordering::Relaxed)
    }
}

impl PoseSource for SimulatedWalk {
    fn current_scene_position(&self) -> Option<ScenePosition> {
        Some(self.position_at(self.elapsed_secs()))
    }

    fn current_orientation(&self) -> Option<Orientation> {
        Some(Orientation {
            pitch: 0.0,
            yaw: -self.east_speed.atan2(self.north_speed),
            roll: 0.0,
        })
    }
}

// ─── Producer loops ──────────────────────────────────────────────────────────

/// Push a geo-fix and heading from `walk` every `period` until the locator stops.
pub async fn fix_loop(walk: Arc<SimulatedWalk>, handle: LocatorHandle, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let fix = walk.next_fix();
        if let Err(LocatorError::SchedulerClosed) = handle.push_fix(fix).await {
            log::info!("[fix] locator closed after {} fixes", walk.fixes_sent());
            break;
        }
        if handle.push_heading(walk.heading()).await.is_err() {
            break;
        }
        if walk.fixes_sent() % 10 == 0 {
            log::debug!("[fix] {} fixes", walk.fixes_sent());
        }
    }
}

/// Stand-in for the renderer's per-frame callback.
pub async fn frame_loop(handle: LocatorHandle, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if handle.frame().await.is_err() {
            break;
        }
    }
}
