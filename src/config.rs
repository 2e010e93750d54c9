use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TelloError;

pub const TELLO_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 1);
pub const COMMAND_PORT: u16 = 8889;
pub const STATE_PORT: u16 = 8890;
pub const VIDEO_PORT: u16 = 11111;

/// Everything the session needs to reach the vehicle and drive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelloConfig {
    /// Address of the vehicle on the local wireless link.
    pub vehicle_ip: IpAddr,
    /// Vehicle port that accepts text commands.
    pub command_port: u16,
    /// Local address the sockets bind to.
    pub bind_ip: IpAddr,
    /// Local port for the command socket (0 lets the OS pick one).
    pub bind_command_port: u16,
    /// Local port the vehicle broadcasts telemetry to.
    pub state_port: u16,
    /// Read timeout for both datagram sockets, in milliseconds.
    pub read_timeout_ms: u64,
    /// Leave the handshake to the caller instead of running it at launch.
    pub manual_connect: bool,
    pub handshake: HandshakeConfig,
    pub motion: MotionConfig,
    pub alignment: AlignmentConfig,
    pub video: VideoConfig,
    /// Address the HTTP control surface listens on.
    pub http_bind: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Delay between two "command" directives, in milliseconds.
    pub retry_interval_ms: u64,
    /// Give up after this many directives. 0 retries forever.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Magnitude of up/down/forward/back/left/right, in cm.
    pub distance_cm: u32,
    /// Magnitude of cw/ccw, in degrees.
    pub angle_deg: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Half-width of the tolerance window around the frame center, in pixels.
    pub max_dist: i32,
    /// Pause after each corrective command, in milliseconds.
    pub pause_ms: u64,
    /// Wait before re-sampling when no subject is in frame, in milliseconds.
    pub idle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub port: u16,
    pub width: u32,
    pub height: u32,
    /// Decoder process writing raw rgb24 frames to stdout. Empty means
    /// the default ffmpeg invocation on `port`.
    pub decoder: Vec<String>,
}

impl Default for TelloConfig {
    fn default() -> Self {
        Self {
            vehicle_ip: IpAddr::V4(TELLO_IP),
            command_port: COMMAND_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_command_port: COMMAND_PORT,
            state_port: STATE_PORT,
            read_timeout_ms: 3000,
            manual_connect: false,
            handshake: HandshakeConfig::default(),
            motion: MotionConfig::default(),
            alignment: AlignmentConfig::default(),
            video: VideoConfig::default(),
            http_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 3000,
            max_attempts: 10,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            distance_cm: 30,
            angle_deg: 30,
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            max_dist: 10,
            pause_ms: 1000,
            idle_ms: 50,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            port: VIDEO_PORT,
            width: 960,
            height: 720,
            decoder: Vec::new(),
        }
    }
}

impl TelloConfig {
    /// Read a JSON config file. Keys left out keep their default value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TelloError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| TelloError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, TelloError> {
        serde_json::from_str(raw).map_err(|e| TelloError::Config(format!("JSON parse error: {e}")))
    }

    pub fn vehicle_addr(&self) -> SocketAddr {
        SocketAddr::new(self.vehicle_ip, self.command_port)
    }

    pub fn command_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.bind_command_port)
    }

    pub fn state_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.state_port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl HandshakeConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn attempt_limit(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }
}

impl AlignmentConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

impl VideoConfig {
    /// The decoder command line, falling back to ffmpeg on the video port.
    pub fn decoder_command(&self) -> Vec<String> {
        if !self.decoder.is_empty() {
            return self.decoder.clone();
        }
        let url = format!(
            "udp://@0.0.0.0:{}?overrun_nonfatal=1&fifo_size=50000000",
            self.port
        );
        [
            "ffmpeg", "-loglevel", "quiet", "-i", url.as_str(), "-f", "rawvideo", "-pix_fmt", "rgb24",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([format!("{}x{}", self.width, self.height), "-".to_string()])
        .collect()
    }
}
