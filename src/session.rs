//! The controller session: owns the sockets, the background activities and
//! the alive flag, and tears everything down in order on shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::align::{is_centered, Aligner};
use crate::command::CommandChannel;
use crate::config::TelloConfig;
use crate::data::{Detection, SessionStatus, TelemetryState};
use crate::error::TelloError;
use crate::published::{Lifeline, Published};
use crate::supervise::{spawn_on, spawn_unit_on};
use crate::telemetry::TelemetryListener;
use crate::transport::DatagramTransport;
use crate::video::{Detector, Frame, FrameSource, VideoFeed, VideoIngest};

pub struct Session {
    config: TelloConfig,
    runtime: Handle,
    lifeline: Lifeline,
    command_transport: Arc<DatagramTransport>,
    state_transport: Arc<DatagramTransport>,
    channel: Arc<CommandChannel>,
    telemetry: Arc<Published<TelemetryState>>,
    feed: Arc<VideoFeed>,
    aligner: Aligner,
    listeners: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    video: Mutex<Option<JoinHandle<VideoIngest>>>,
    video_started: AtomicBool,
    capture_held: AtomicBool,
}

impl Session {
    /// Bind both sockets and start the response and telemetry listeners.
    /// Must be called from within a tokio runtime.
    pub async fn open(config: TelloConfig) -> Result<Self, TelloError> {
        let runtime = Handle::current();
        let lifeline = Lifeline::new();
        let read_timeout = config.read_timeout();

        let command_transport = Arc::new(
            DatagramTransport::bind("command", config.command_bind_addr(), read_timeout).await?,
        );
        let state_transport = Arc::new(
            DatagramTransport::bind("state", config.state_bind_addr(), read_timeout).await?,
        );

        let channel = Arc::new(CommandChannel::new(
            command_transport.clone(),
            config.vehicle_addr(),
            lifeline.clone(),
            &config.handshake,
            config.motion,
        ));
        let telemetry = Arc::new(Published::new());
        let feed = Arc::new(VideoFeed::new());
        let aligner = Aligner::new(
            runtime.clone(),
            lifeline.clone(),
            channel.clone(),
            feed.clone(),
            config.alignment.clone(),
            config.motion,
        );

        let listeners = vec![
            (
                "command response listener",
                spawn_unit_on(&runtime, channel.listener(), lifeline.clone()),
            ),
            (
                "telemetry listener",
                spawn_unit_on(
                    &runtime,
                    TelemetryListener::new(state_transport.clone(), telemetry.clone()),
                    lifeline.clone(),
                ),
            ),
        ];

        info!(
            command = %command_transport.local_addr(),
            state = %state_transport.local_addr(),
            vehicle = %config.vehicle_addr(),
            "session opened"
        );

        Ok(Self {
            config,
            runtime,
            lifeline,
            command_transport,
            state_transport,
            channel,
            telemetry,
            feed,
            aligner,
            listeners: Mutex::new(listeners),
            video: Mutex::new(None),
            video_started: AtomicBool::new(false),
            capture_held: AtomicBool::new(false),
        })
    }

    /// Open the session, run the handshake and `streamon` unless
    /// `manual_connect` is set, then start video ingestion.
    pub async fn launch(
        config: TelloConfig,
        source: Box<dyn FrameSource>,
        detector: Arc<dyn Detector>,
    ) -> Result<Self, TelloError> {
        let manual = config.manual_connect;
        let session = Self::open(config).await?;
        if !manual {
            let connected = async {
                session.connect().await?;
                session.channel.streamon().await
            }
            .await;
            if let Err(err) = connected {
                session.shutdown().await;
                return Err(err);
            }
        }
        session.start_video(source, detector)?;
        Ok(session)
    }

    pub async fn connect(&self) -> Result<(), TelloError> {
        info!("connecting to {}", self.config.vehicle_addr());
        self.channel.connect().await
    }

    /// Hand the capture to a new ingestion activity. Only once per session.
    pub fn start_video(
        &self,
        source: Box<dyn FrameSource>,
        detector: Arc<dyn Detector>,
    ) -> Result<(), TelloError> {
        if !self.lifeline.is_alive() {
            return Err(TelloError::ShutDown);
        }
        if self.video_started.swap(true, Ordering::SeqCst) {
            return Err(TelloError::VideoAlreadyStarted);
        }
        let ingest = VideoIngest::new(source, detector, self.feed.clone());
        let handle = spawn_on(&self.runtime, ingest, self.lifeline.clone());
        *self.video.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.capture_held.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn config(&self) -> &TelloConfig {
        &self.config
    }

    pub fn is_alive(&self) -> bool {
        self.lifeline.is_alive()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn command_addr(&self) -> SocketAddr {
        self.command_transport.local_addr()
    }

    pub fn state_addr(&self) -> SocketAddr {
        self.state_transport.local_addr()
    }

    pub fn telemetry(&self) -> Option<TelemetryState> {
        self.telemetry.latest()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.feed.latest_frame()
    }

    pub fn latest_detection(&self) -> Option<Detection> {
        self.feed.latest_detection()
    }

    pub async fn engage_alignment(&self) -> Result<bool, TelloError> {
        self.aligner.engage().await
    }

    pub async fn disengage_alignment(&self) -> bool {
        self.aligner.disengage().await
    }

    pub async fn is_aligning(&self) -> bool {
        self.aligner.is_engaged().await
    }

    pub async fn status(&self) -> SessionStatus {
        let detection = self.latest_detection();
        let frame_center = self.feed.frame_center();
        let centered = match (frame_center, detection) {
            (Some(center), Some(detection)) => {
                is_centered(center, detection.center, self.config.alignment.max_dist)
            }
            _ => false,
        };
        SessionStatus {
            alive: self.is_alive(),
            connected: self.is_connected(),
            aligning: self.is_aligning().await,
            centered,
            last_response: self.channel.last_response(),
            telemetry: self.telemetry(),
            detection,
            frame_center,
        }
    }

    pub fn transports_released(&self) -> bool {
        self.command_transport.is_closed() && self.state_transport.is_closed()
    }

    /// True when no capture is held, either never started or released.
    pub fn capture_released(&self) -> bool {
        !self.capture_held.load(Ordering::SeqCst)
    }

    /// Stop every activity, then release the sockets and the capture.
    /// Only the first call does anything.
    pub async fn shutdown(&self) {
        if !self.lifeline.cut() {
            return;
        }
        info!("disconnecting");

        self.aligner.disengage().await;

        let listeners = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (name, handle) in listeners {
            match handle.await {
                Ok(()) => info!("{name} joined successfully"),
                Err(err) => error!(activity = name, error = %err, "join failed"),
            }
        }

        let video = self
            .video
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let source = match video {
            Some(handle) => match handle.await {
                Ok(ingest) => {
                    info!("video ingestion joined successfully");
                    Some(ingest.into_source())
                }
                Err(err) => {
                    error!(activity = "video ingestion", error = %err, "join failed");
                    None
                }
            },
            None => None,
        };

        self.command_transport.close();
        self.state_transport.close();

        if let Some(mut source) = source {
            match source.release().await {
                Ok(()) => {
                    self.capture_held.store(false, Ordering::SeqCst);
                    info!("Video released successfully");
                }
                Err(err) => error!(error = %err, "video capture release failed"),
            }
        }

        info!("Tello disconnected");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // activities still running notice on their next iteration
        self.lifeline.cut();
    }
}
