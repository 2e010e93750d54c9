use std::io;

/// Errors raised by the controller and its background activities.
#[derive(Debug, thiserror::Error)]
pub enum TelloError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No handshake response after {attempts} attempts")]
    ConnectionTimeout { attempts: u32 },

    #[error("Malformed telemetry: {0}")]
    MalformedTelemetry(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Capture not ready")]
    CaptureNotReady,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0} transport is closed")]
    Closed(&'static str),

    #[error("Session has shut down")]
    ShutDown,

    #[error("Video ingestion already started")]
    VideoAlreadyStarted,

    #[error("Failed to release {resource}: {reason}")]
    Release {
        resource: &'static str,
        reason: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// How a supervised loop reacts to an error returned by one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts and failed pulls: skip the iteration.
    Transient,
    /// Bad input from the wire: log and skip.
    Malformed,
    /// The activity cannot make progress anymore and exits.
    Fatal,
}

impl TelloError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TelloError::Io(_) | TelloError::CaptureNotReady | TelloError::Capture(_) => {
                ErrorClass::Transient
            }
            TelloError::MalformedTelemetry(_)
            | TelloError::MalformedResponse(_)
            | TelloError::InvalidFrame(_)
            | TelloError::Image(_)
            | TelloError::UnknownCommand(_) => ErrorClass::Malformed,
            TelloError::ConnectionTimeout { .. }
            | TelloError::Closed(_)
            | TelloError::ShutDown
            | TelloError::VideoAlreadyStarted
            | TelloError::Release { .. }
            | TelloError::Config(_) => ErrorClass::Fatal,
        }
    }
}
