//! Face-alignment controller: bang-bang corrections that keep the detected
//! subject inside a tolerance window around the frame center.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nalgebra::Point2;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

use crate::command::{Command, CommandChannel};
use crate::config::{AlignmentConfig, MotionConfig};
use crate::error::TelloError;
use crate::published::Lifeline;
use crate::supervise::{spawn_on, Activity};
use crate::video::VideoFeed;

pub fn is_in_interval(x: i32, center: i32, size: i32) -> bool {
    center - size < x && x < center + size
}

/// Where a coordinate sits relative to `center ± size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deviation {
    Below,
    Within,
    Above,
}

impl Deviation {
    /// The window edges themselves count as within tolerance.
    pub fn of(x: i32, center: i32, size: i32) -> Self {
        if x < center - size {
            Deviation::Below
        } else if x > center + size {
            Deviation::Above
        } else {
            Deviation::Within
        }
    }
}

pub fn is_centered(frame_center: Point2<i32>, target: Point2<i32>, tolerance: i32) -> bool {
    is_in_interval(target.x, frame_center.x, tolerance)
        && is_in_interval(target.y, frame_center.y, tolerance)
}

/// Commands for one controller iteration, at most one per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Correction {
    pub horizontal: Option<Command>,
    pub vertical: Option<Command>,
}

/// Subject left of center turns counter-clockwise toward it; above center
/// (smaller y) climbs.
pub fn plan(
    frame_center: Point2<i32>,
    target: Point2<i32>,
    tolerance: i32,
    motion: &MotionConfig,
) -> Correction {
    let horizontal = match Deviation::of(target.x, frame_center.x, tolerance) {
        Deviation::Below => Some(Command::Ccw(motion.angle_deg)),
        Deviation::Above => Some(Command::Cw(motion.angle_deg)),
        Deviation::Within => None,
    };
    let vertical = match Deviation::of(target.y, frame_center.y, tolerance) {
        Deviation::Below => Some(Command::Up(motion.distance_cm)),
        Deviation::Above => Some(Command::Down(motion.distance_cm)),
        Deviation::Within => None,
    };
    Correction {
        horizontal,
        vertical,
    }
}

/// The controller activity. Lives only while alignment is engaged.
pub struct AlignLoop {
    channel: Arc<CommandChannel>,
    feed: Arc<VideoFeed>,
    stop: Arc<AtomicBool>,
    tolerance: i32,
    pause: Duration,
    idle: Duration,
    motion: MotionConfig,
}

impl AlignLoop {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Current frame center and subject center, if a subject is in view.
    fn sample(&self) -> Option<(Point2<i32>, Point2<i32>)> {
        let center = self.feed.frame_center()?;
        let detection = self.feed.latest_detection()?;
        Some((center, detection.center))
    }
}

#[async_trait]
impl Activity for AlignLoop {
    fn name(&self) -> &'static str {
        "face alignment"
    }

    async fn step(&mut self) -> Result<(), TelloError> {
        let Some((center, target)) = self.sample() else {
            // no subject in the current frame: hold position
            tokio::time::sleep(self.idle).await;
            return Ok(());
        };

        let mut correction = plan(center, target, self.tolerance, &self.motion);
        trace!(?correction, "alignment sample");
        if let Some(command) = correction.horizontal {
            self.channel.send(command).await?;
            tokio::time::sleep(self.pause).await;
            if self.stopped() {
                return Ok(());
            }
            // the subject may have moved or left the frame during the pause
            let Some((center, target)) = self.sample() else {
                return Ok(());
            };
            correction.vertical = plan(center, target, self.tolerance, &self.motion).vertical;
        }
        if let Some(command) = correction.vertical {
            self.channel.send(command).await?;
            tokio::time::sleep(self.pause).await;
        }
        if correction == Correction::default() {
            tokio::time::sleep(self.idle).await;
        }
        Ok(())
    }

    fn should_continue(&self) -> bool {
        !self.stopped()
    }
}

struct Engagement {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<AlignLoop>,
}

/// Engaged/disengaged switch owning at most one controller activity.
pub struct Aligner {
    runtime: Handle,
    lifeline: Lifeline,
    channel: Arc<CommandChannel>,
    feed: Arc<VideoFeed>,
    config: AlignmentConfig,
    motion: MotionConfig,
    engagement: Mutex<Option<Engagement>>,
}

impl Aligner {
    pub fn new(
        runtime: Handle,
        lifeline: Lifeline,
        channel: Arc<CommandChannel>,
        feed: Arc<VideoFeed>,
        config: AlignmentConfig,
        motion: MotionConfig,
    ) -> Self {
        Self {
            runtime,
            lifeline,
            channel,
            feed,
            config,
            motion,
            engagement: Mutex::new(None),
        }
    }

    /// Start the controller. Returns false if it was already running.
    pub async fn engage(&self) -> Result<bool, TelloError> {
        if !self.lifeline.is_alive() {
            return Err(TelloError::ShutDown);
        }
        let mut engagement = self.engagement.lock().await;
        // shutdown may have disengaged while this call waited for the lock
        if !self.lifeline.is_alive() {
            return Err(TelloError::ShutDown);
        }
        if engagement.is_some() {
            return Ok(false);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let controller = AlignLoop {
            channel: self.channel.clone(),
            feed: self.feed.clone(),
            stop: stop.clone(),
            tolerance: self.config.max_dist,
            pause: self.config.pause(),
            idle: self.config.idle(),
            motion: self.motion,
        };
        let handle = spawn_on(&self.runtime, controller, self.lifeline.clone());
        *engagement = Some(Engagement { stop, handle });
        info!("Align with face");
        Ok(true)
    }

    /// Stop the controller and wait until it has exited. Returns false if it
    /// was not running.
    pub async fn disengage(&self) -> bool {
        let mut engagement = self.engagement.lock().await;
        let Some(Engagement { stop, handle }) = engagement.take() else {
            return false;
        };
        stop.store(true, Ordering::SeqCst);
        if let Err(err) = handle.await {
            error!(error = %err, "alignment controller did not exit cleanly");
        }
        info!("Stop alignment");
        true
    }

    pub async fn is_engaged(&self) -> bool {
        self.engagement.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HandshakeConfig;
    use crate::transport::DatagramTransport;

    fn center() -> Point2<i32> {
        Point2::new(480, 360)
    }

    fn correction(x: i32, y: i32) -> Correction {
        plan(center(), Point2::new(x, y), 10, &MotionConfig::default())
    }

    #[test]
    fn test_interval_is_strict() {
        assert!(is_in_interval(100, 100, 10));
        assert!(is_in_interval(91, 100, 10));
        assert!(is_in_interval(109, 100, 10));
        assert!(!is_in_interval(90, 100, 10));
        assert!(!is_in_interval(110, 100, 10));
        assert!(!is_in_interval(100, 100, 0));
    }

    #[test]
    fn test_deviation() {
        assert_eq!(Deviation::of(89, 100, 10), Deviation::Below);
        assert_eq!(Deviation::of(90, 100, 10), Deviation::Within);
        assert_eq!(Deviation::of(110, 100, 10), Deviation::Within);
        assert_eq!(Deviation::of(111, 100, 10), Deviation::Above);
    }

    #[test]
    fn test_centered_subject_needs_nothing() {
        assert_eq!(correction(480, 360), Correction::default());
        assert!(is_centered(center(), center(), 10));
    }

    #[test]
    fn test_boundary_issues_no_command() {
        for (x, y) in [(470, 360), (490, 360), (480, 350), (480, 370), (470, 370)] {
            assert_eq!(correction(x, y), Correction::default(), "at ({x}, {y})");
        }
    }

    #[test]
    fn test_one_past_boundary_issues_one_command() {
        assert_eq!(
            correction(469, 360),
            Correction {
                horizontal: Some(Command::Ccw(30)),
                vertical: None
            }
        );
        assert_eq!(
            correction(491, 360),
            Correction {
                horizontal: Some(Command::Cw(30)),
                vertical: None
            }
        );
        assert_eq!(
            correction(480, 349),
            Correction {
                horizontal: None,
                vertical: Some(Command::Up(30))
            }
        );
        assert_eq!(
            correction(480, 371),
            Correction {
                horizontal: None,
                vertical: Some(Command::Down(30))
            }
        );
    }

    #[test]
    fn test_both_axes_corrected() {
        assert_eq!(
            correction(100, 700),
            Correction {
                horizontal: Some(Command::Ccw(30)),
                vertical: Some(Command::Down(30))
            }
        );
        assert!(!is_centered(center(), Point2::new(100, 700), 10));
    }

    #[tokio::test]
    async fn test_engage_waiting_on_shutdown_stays_disengaged() {
        let lifeline = Lifeline::new();
        let transport = DatagramTransport::bind(
            "command",
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        let channel = Arc::new(CommandChannel::new(
            Arc::new(transport),
            "127.0.0.1:9".parse().unwrap(),
            lifeline.clone(),
            &HandshakeConfig::default(),
            MotionConfig::default(),
        ));
        let aligner = Arc::new(Aligner::new(
            Handle::current(),
            lifeline.clone(),
            channel,
            Arc::new(VideoFeed::new()),
            AlignmentConfig::default(),
            MotionConfig::default(),
        ));

        // hold the lock the way a running disengage does
        let held = aligner.engagement.lock().await;
        let pending = tokio::spawn({
            let aligner = aligner.clone();
            async move { aligner.engage().await }
        });
        tokio::task::yield_now().await;
        lifeline.cut();
        drop(held);

        assert!(matches!(pending.await.unwrap(), Err(TelloError::ShutDown)));
        assert!(!aligner.is_engaged().await);
    }

    #[test]
    fn test_magnitudes_follow_motion_config() {
        let motion = MotionConfig {
            distance_cm: 20,
            angle_deg: 15,
        };
        let correction = plan(center(), Point2::new(900, 0), 10, &motion);
        assert_eq!(correction.horizontal, Some(Command::Cw(15)));
        assert_eq!(correction.vertical, Some(Command::Up(20)));
    }
}
