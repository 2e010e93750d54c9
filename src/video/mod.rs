//! Video ingestion: pull a frame, hand it to the detector, mark it up and
//! publish it. Only the latest frame and detection are kept.

mod overlay;
mod pipe;

pub use overlay::{draw_crosshair, draw_rect, draw_ring, COLOR_UI};
pub use pipe::PipeSource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use nalgebra::Point2;
use tracing::trace;

use crate::data::{Detection, Region};
use crate::error::TelloError;
use crate::published::Published;
use crate::supervise::Activity;

/// Wait before pulling again when the capture had nothing to give.
const CAPTURE_BACKOFF: Duration = Duration::from_millis(20);

/// One decoded RGB24 picture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. The length must match the dimensions exactly.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, TelloError> {
        let expected = width as usize * height as usize * 3;
        let len = pixels.len();
        if len != expected {
            return Err(TelloError::InvalidFrame(format!(
                "{width}x{height} needs {expected} bytes, got {len}"
            )));
        }
        RgbImage::from_raw(width, height, pixels)
            .map(Self::from)
            .ok_or_else(|| TelloError::InvalidFrame(format!("{width}x{height} from {len} bytes")))
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::from(RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb<u8>> {
        let (x, y) = self.within(x, y)?;
        Some(*self.image.get_pixel(x, y))
    }

    /// Writes outside the frame are dropped.
    pub fn put_pixel(&mut self, x: i32, y: i32, color: Rgb<u8>) {
        if let Some((x, y)) = self.within(x, y) {
            self.image.put_pixel(x, y, color);
        }
    }

    fn within(&self, x: i32, y: i32) -> Option<(u32, u32)> {
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        (x < self.width() && y < self.height()).then_some((x, y))
    }

    /// PNG encoding of the frame, for the control surface.
    pub fn encode_png(&self) -> Result<Vec<u8>, TelloError> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(
            self.image.as_raw(),
            self.width(),
            self.height(),
            ColorType::Rgb8,
        )?;
        Ok(out)
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self { image }
    }
}

pub fn frame_center(width: u32, height: u32) -> Point2<i32> {
    Point2::new((width / 2) as i32, (height / 2) as i32)
}

/// Where frames come from. Owned exclusively by the ingestion activity.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when the capture is not ready yet.
    async fn read_frame(&mut self) -> Result<Option<Frame>, TelloError>;

    /// Width and height of the frames this source yields.
    fn dimensions(&self) -> (u32, u32);

    async fn release(&mut self) -> Result<(), TelloError>;
}

/// Locates subjects of interest in a frame. The first region is the primary one.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<Region>;
}

/// Finds nothing, ever.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &Frame) -> Vec<Region> {
        Vec::new()
    }
}

/// What the ingestion activity publishes for the controller and the UI.
#[derive(Debug, Default)]
pub struct VideoFeed {
    frame: Published<Arc<Frame>>,
    detection: Published<Detection>,
    center: Published<Point2<i32>>,
}

impl VideoFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frame.latest()
    }

    /// `None` when the last processed frame had no subject in it.
    pub fn latest_detection(&self) -> Option<Detection> {
        self.detection.latest()
    }

    /// Reference point the controller centers on. Known once ingestion starts.
    pub fn frame_center(&self) -> Option<Point2<i32>> {
        self.center.latest()
    }

    pub fn publish_detection(&self, detection: Option<Detection>) {
        match detection {
            Some(detection) => self.detection.publish(detection),
            None => self.detection.clear(),
        }
    }
}

pub struct VideoIngest {
    source: Box<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    feed: Arc<VideoFeed>,
    center: Point2<i32>,
}

impl VideoIngest {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn Detector>,
        feed: Arc<VideoFeed>,
    ) -> Self {
        let (width, height) = source.dimensions();
        let center = frame_center(width, height);
        feed.center.publish(center);
        Self {
            source,
            detector,
            feed,
            center,
        }
    }

    /// Give the capture back so it can be released.
    pub fn into_source(self) -> Box<dyn FrameSource> {
        self.source
    }
}

#[async_trait]
impl Activity for VideoIngest {
    fn name(&self) -> &'static str {
        "video ingestion"
    }

    async fn step(&mut self) -> Result<(), TelloError> {
        let mut frame = match self.source.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tokio::time::sleep(CAPTURE_BACKOFF).await;
                return Err(TelloError::CaptureNotReady);
            }
            Err(err) => {
                tokio::time::sleep(CAPTURE_BACKOFF).await;
                return Err(err);
            }
        };

        let detection = self
            .detector
            .detect(&frame)
            .first()
            .copied()
            .map(Detection::from);
        if let Some(detection) = &detection {
            trace!(x = detection.center.x, y = detection.center.y, "subject found");
            draw_rect(&mut frame, &detection.region, COLOR_UI, 2);
            draw_crosshair(&mut frame, detection.center, 10, COLOR_UI);
        }
        self.feed.publish_detection(detection);

        draw_ring(&mut frame, self.center, 10, 2, COLOR_UI);
        self.feed.frame.publish(Arc::new(frame));
        Ok(())
    }
}
