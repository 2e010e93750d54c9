//! Host-side controller for a Tello-class quadcopter: command session,
//! telemetry feed, video ingestion and face-alignment control.

pub mod align;
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod http;
pub mod published;
pub mod session;
pub mod supervise;
pub mod telemetry;
pub mod transport;
pub mod video;

pub use align::{is_in_interval, Aligner, Correction};
pub use command::{Command, CommandChannel};
pub use config::TelloConfig;
pub use data::{Detection, Region, SessionStatus, TelemetryState};
pub use error::{ErrorClass, TelloError};
pub use published::{Lifeline, Published};
pub use session::Session;
pub use supervise::{supervise, Activity};
pub use video::{Detector, Frame, FrameSource, NullDetector, PipeSource, VideoFeed};
