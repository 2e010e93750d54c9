use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;
use tracing::info;

use super::{Frame, FrameSource};
use crate::config::VideoConfig;
use crate::error::TelloError;

/// Frames produced by an external decoder writing raw rgb24 to stdout.
#[derive(Debug)]
pub struct PipeSource {
    child: Option<(Child, ChildStdout)>,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    filled: usize,
    read_timeout: Duration,
}

impl PipeSource {
    pub fn spawn(video: &VideoConfig, read_timeout: Duration) -> Result<Self, TelloError> {
        let argv = video.decoder_command();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TelloError::Config("empty decoder command".into()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TelloError::Capture(format!("cannot start {program}: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TelloError::Capture("decoder has no stdout".into()))?;
        info!("video decoder started: {}", argv.join(" "));

        Ok(Self {
            child: Some((child, stdout)),
            width: video.width,
            height: video.height,
            buf: vec![0; video.width as usize * video.height as usize * 3],
            filled: 0,
            read_timeout,
        })
    }
}

#[async_trait]
impl FrameSource for PipeSource {
    /// Partial frames survive a timeout and are completed on the next call.
    async fn read_frame(&mut self) -> Result<Option<Frame>, TelloError> {
        let Some((_, stdout)) = self.child.as_mut() else {
            return Err(TelloError::Capture("decoder released".into()));
        };
        while self.filled < self.buf.len() {
            let pending = stdout.read(&mut self.buf[self.filled..]);
            let read = match timeout(self.read_timeout, pending).await {
                Ok(read) => read?,
                Err(_) => return Ok(None),
            };
            if read == 0 {
                return Err(TelloError::Capture("decoder stream ended".into()));
            }
            self.filled += read;
        }
        self.filled = 0;
        let (width, height) = (self.width, self.height);
        let image = RgbImage::from_raw(width, height, self.buf.clone())
            .ok_or_else(|| TelloError::InvalidFrame(format!("{width}x{height} decoder frame")))?;
        Ok(Some(Frame::from(image)))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn release(&mut self) -> Result<(), TelloError> {
        let Some((mut child, _stdout)) = self.child.take() else {
            return Ok(());
        };
        match child.kill().await {
            Ok(()) => Ok(()),
            // already exited on its own
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(TelloError::Release {
                resource: "video capture",
                reason: e.to_string(),
            }),
        }
    }
}
