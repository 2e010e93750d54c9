//! Text command channel to the vehicle and its connection handshake.
//!
//! Responses are not correlated with commands: the listener keeps only the
//! most recent datagram, so a command sent faster than the round trip may
//! observe the response to an earlier one.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::info;

use crate::config::{HandshakeConfig, MotionConfig};
use crate::error::TelloError;
use crate::published::Lifeline;
use crate::supervise::Activity;
use crate::transport::{DatagramTransport, RECV_BUF_LEN};

/// Payload the vehicle answers with once it accepts a command.
pub const OK_RESPONSE: &str = "ok";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Command {
    /// Enter SDK command mode; the handshake directive.
    Command,
    StreamOn,
    TakeOff,
    Land,
    Cw(u32),
    Ccw(u32),
    Up(u32),
    Down(u32),
    Forward(u32),
    Back(u32),
    Left(u32),
    Right(u32),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Command => f.write_str("command"),
            Command::StreamOn => f.write_str("streamon"),
            Command::TakeOff => f.write_str("takeoff"),
            Command::Land => f.write_str("land"),
            Command::Cw(deg) => write!(f, "cw {deg}"),
            Command::Ccw(deg) => write!(f, "ccw {deg}"),
            Command::Up(cm) => write!(f, "up {cm}"),
            Command::Down(cm) => write!(f, "down {cm}"),
            Command::Forward(cm) => write!(f, "forward {cm}"),
            Command::Back(cm) => write!(f, "back {cm}"),
            Command::Left(cm) => write!(f, "left {cm}"),
            Command::Right(cm) => write!(f, "right {cm}"),
        }
    }
}

impl FromStr for Command {
    type Err = TelloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TelloError::UnknownCommand(s.trim().to_string());
        let mut words = s.split_whitespace();
        let verb = words.next().ok_or_else(unknown)?;
        let magnitude = words.next().map(str::parse::<u32>);
        if words.next().is_some() {
            return Err(unknown());
        }

        let command = match (verb, magnitude) {
            ("command", None) => Command::Command,
            ("streamon", None) => Command::StreamOn,
            ("takeoff", None) => Command::TakeOff,
            ("land", None) => Command::Land,
            ("cw", Some(Ok(deg))) => Command::Cw(deg),
            ("ccw", Some(Ok(deg))) => Command::Ccw(deg),
            ("up", Some(Ok(cm))) => Command::Up(cm),
            ("down", Some(Ok(cm))) => Command::Down(cm),
            ("forward", Some(Ok(cm))) => Command::Forward(cm),
            ("back", Some(Ok(cm))) => Command::Back(cm),
            ("left", Some(Ok(cm))) => Command::Left(cm),
            ("right", Some(Ok(cm))) => Command::Right(cm),
            _ => return Err(unknown()),
        };
        Ok(command)
    }
}

/// Sends commands to the vehicle's fixed address and tracks the handshake.
#[derive(Debug)]
pub struct CommandChannel {
    transport: Arc<DatagramTransport>,
    vehicle: SocketAddr,
    lifeline: Lifeline,
    responses: Arc<watch::Sender<Option<String>>>,
    connected: AtomicBool,
    retry_interval: Duration,
    max_attempts: Option<u32>,
    motion: MotionConfig,
}

impl CommandChannel {
    pub fn new(
        transport: Arc<DatagramTransport>,
        vehicle: SocketAddr,
        lifeline: Lifeline,
        handshake: &HandshakeConfig,
        motion: MotionConfig,
    ) -> Self {
        let (responses, _) = watch::channel(None);
        Self {
            transport,
            vehicle,
            lifeline,
            responses: Arc::new(responses),
            connected: AtomicBool::new(false),
            retry_interval: handshake.retry_interval(),
            max_attempts: handshake.attempt_limit(),
            motion,
        }
    }

    /// The activity that fills the response slot. Exactly one should run.
    pub fn listener(&self) -> ResponseListener {
        ResponseListener {
            transport: self.transport.clone(),
            responses: self.responses.clone(),
            buf: vec![0u8; RECV_BUF_LEN],
        }
    }

    /// Best-effort write; fails once the session has shut down.
    pub async fn send(&self, command: Command) -> Result<(), TelloError> {
        if !self.lifeline.is_alive() {
            return Err(TelloError::ShutDown);
        }
        let text = command.to_string();
        self.transport.send_to(text.as_bytes(), self.vehicle).await?;
        info!("sent : {text}");
        Ok(())
    }

    pub fn last_response(&self) -> Option<String> {
        self.responses.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Resend the handshake directive every retry interval until an "ok"
    /// response shows up, the attempt limit runs out, or the session dies.
    pub async fn connect(&self) -> Result<(), TelloError> {
        let mut responses = self.responses.subscribe();
        let mut attempts = 0u32;
        loop {
            if !self.lifeline.is_alive() {
                return Err(TelloError::ShutDown);
            }
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                info!("no handshake response after {attempts} attempts");
                return Err(TelloError::ConnectionTimeout { attempts });
            }

            self.send(Command::Command).await?;
            attempts += 1;
            info!(attempt = attempts, "waiting for handshake response");

            let acknowledgement = async {
                responses
                    .wait_for(|response| response.as_deref() == Some(OK_RESPONSE))
                    .await
                    .map(|_| ())
            };
            let acknowledged = match timeout(self.retry_interval, acknowledgement).await {
                Ok(Ok(())) => true,
                Ok(Err(_)) => return Err(TelloError::ShutDown),
                Err(_) => false,
            };

            if acknowledged {
                self.connected.store(true, Ordering::SeqCst);
                info!("Tello connected");
                return Ok(());
            }
        }
    }

    pub async fn streamon(&self) -> Result<(), TelloError> {
        self.send(Command::StreamOn).await
    }

    pub async fn takeoff(&self) -> Result<(), TelloError> {
        self.send(Command::TakeOff).await
    }

    pub async fn land(&self) -> Result<(), TelloError> {
        self.send(Command::Land).await
    }

    pub async fn turn_right(&self) -> Result<(), TelloError> {
        self.send(Command::Cw(self.motion.angle_deg)).await
    }

    pub async fn turn_left(&self) -> Result<(), TelloError> {
        self.send(Command::Ccw(self.motion.angle_deg)).await
    }

    pub async fn up(&self) -> Result<(), TelloError> {
        self.send(Command::Up(self.motion.distance_cm)).await
    }

    pub async fn down(&self) -> Result<(), TelloError> {
        self.send(Command::Down(self.motion.distance_cm)).await
    }

    pub async fn forward(&self) -> Result<(), TelloError> {
        self.send(Command::Forward(self.motion.distance_cm)).await
    }

    pub async fn back(&self) -> Result<(), TelloError> {
        self.send(Command::Back(self.motion.distance_cm)).await
    }

    pub async fn left(&self) -> Result<(), TelloError> {
        self.send(Command::Left(self.motion.distance_cm)).await
    }

    pub async fn right(&self) -> Result<(), TelloError> {
        self.send(Command::Right(self.motion.distance_cm)).await
    }
}

/// Receives command responses and keeps the most recent one.
pub struct ResponseListener {
    transport: Arc<DatagramTransport>,
    responses: Arc<watch::Sender<Option<String>>>,
    buf: Vec<u8>,
}

#[async_trait]
impl Activity for ResponseListener {
    fn name(&self) -> &'static str {
        "command response listener"
    }

    async fn step(&mut self) -> Result<(), TelloError> {
        let Some((len, _from)) = self.transport.recv(&mut self.buf).await? else {
            return Ok(());
        };
        let raw = &self.buf[..len];
        let text = std::str::from_utf8(raw)
            .map_err(|_| TelloError::MalformedResponse(String::from_utf8_lossy(raw).into_owned()))?;
        info!("received : {text:?}");
        self.responses.send_replace(Some(text.to_string()));
        Ok(())
    }
}
