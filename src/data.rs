use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Last telemetry datagram the vehicle broadcast, replaced wholesale on every parse.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TelemetryState {
    pub battery: u8, // percent
    pub barometer: f64, // barometric altitude reading
    pub height_cm: Option<i32>,
    pub time_of_flight_cm: Option<i32>,
    pub flight_time_s: Option<u32>, // motors-on time
    pub temperature_c: Option<(i32, i32)>, // (low, high)
    pub attitude: Option<Attitude>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Attitude {
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
}

/// Axis-aligned bounding box in pixel coordinates, origin top-left.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point2<i32> {
        Point2::new(
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }
}

/// The primary subject found in the most recent frame.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Detection {
    pub region: Region,
    pub center: Point2<i32>,
}

impl From<Region> for Detection {
    fn from(region: Region) -> Self {
        Self {
            region,
            center: region.center(),
        }
    }
}

/// Snapshot of the session served to the control surface.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SessionStatus {
    pub alive: bool,
    pub connected: bool,
    pub aligning: bool,
    pub centered: bool,
    pub last_response: Option<String>,
    pub telemetry: Option<TelemetryState>,
    pub detection: Option<Detection>,
    pub frame_center: Option<Point2<i32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_center_truncates() {
        assert_eq!(Region::new(10, 20, 30, 41).center(), Point2::new(25, 40));
    }

    #[test]
    fn test_region_center_saturates() {
        let huge = Region::new(i32::MAX - 1, 10, i32::MAX, 4);
        assert_eq!(huge.center(), Point2::new(i32::MAX, 12));
        let low = Region::new(i32::MIN, i32::MIN, -10, -10);
        assert_eq!(low.center(), Point2::new(i32::MIN, i32::MIN));
    }

    #[test]
    fn test_detection_from_region() {
        let detection = Detection::from(Region::new(0, 0, 100, 50));
        assert_eq!(detection.center, Point2::new(50, 25));
        assert_eq!(detection.region.width, 100);
    }
}
