//! Telemetry listener for the vehicle's periodic `key:value;` status datagrams.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::data::{Attitude, TelemetryState};
use crate::error::TelloError;
use crate::published::Published;
use crate::supervise::Activity;
use crate::transport::{DatagramTransport, RECV_BUF_LEN};

/// Split one status datagram into its fields.
///
/// The wrapper (surrounding whitespace, CR-LF, leading and trailing `;`) is
/// stripped, then every `key:value` pair is split on its first `:`.
pub fn parse_fields(datagram: &str) -> Result<BTreeMap<String, String>, TelloError> {
    let body = datagram.trim().trim_matches(';');
    if body.is_empty() {
        return Err(TelloError::MalformedTelemetry("empty datagram".into()));
    }

    let mut fields = BTreeMap::new();
    for pair in body.split(';').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| TelloError::MalformedTelemetry(format!("no ':' in {pair:?}")))?;
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(fields)
}

fn required<T: FromStr>(fields: &BTreeMap<String, String>, key: &str) -> Result<T, TelloError> {
    let raw = fields
        .get(key)
        .ok_or_else(|| TelloError::MalformedTelemetry(format!("missing {key}")))?;
    raw.parse()
        .map_err(|_| TelloError::MalformedTelemetry(format!("bad {key}: {raw:?}")))
}

fn optional<T: FromStr>(fields: &BTreeMap<String, String>, key: &str) -> Option<T> {
    fields.get(key).and_then(|raw| raw.parse().ok())
}

impl TelemetryState {
    /// Pick the fields of interest. `bat` and `baro` must be present.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, TelloError> {
        let temperature_c = optional(fields, "templ").zip(optional(fields, "temph"));
        let attitude = match (
            optional(fields, "pitch"),
            optional(fields, "roll"),
            optional(fields, "yaw"),
        ) {
            (Some(pitch), Some(roll), Some(yaw)) => Some(Attitude { pitch, roll, yaw }),
            _ => None,
        };

        Ok(Self {
            battery: required(fields, "bat")?,
            barometer: required(fields, "baro")?,
            height_cm: optional(fields, "h"),
            time_of_flight_cm: optional(fields, "tof"),
            flight_time_s: optional(fields, "time"),
            temperature_c,
            attitude,
        })
    }
}

impl FromStr for TelemetryState {
    type Err = TelloError;

    fn from_str(datagram: &str) -> Result<Self, Self::Err> {
        Self::from_fields(&parse_fields(datagram)?)
    }
}

/// Background activity replacing the published [`TelemetryState`] on every
/// well-formed datagram.
pub struct TelemetryListener {
    transport: Arc<DatagramTransport>,
    state: Arc<Published<TelemetryState>>,
    buf: Vec<u8>,
}

impl TelemetryListener {
    pub fn new(transport: Arc<DatagramTransport>, state: Arc<Published<TelemetryState>>) -> Self {
        Self {
            transport,
            state,
            buf: vec![0u8; RECV_BUF_LEN],
        }
    }
}

#[async_trait]
impl Activity for TelemetryListener {
    fn name(&self) -> &'static str {
        "telemetry listener"
    }

    async fn step(&mut self) -> Result<(), TelloError> {
        let Some((len, _from)) = self.transport.recv(&mut self.buf).await? else {
            return Ok(());
        };
        let raw = &self.buf[..len];
        let datagram = std::str::from_utf8(raw)
            .map_err(|_| TelloError::MalformedTelemetry("datagram is not UTF-8".into()))?;
        trace!("state : {}", datagram.trim_end());
        let state = datagram.parse::<TelemetryState>()?;
        self.state.publish(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::published::Lifeline;
    use crate::supervise::supervise;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    const TELLO_STATE: &str = "pitch:0;roll:-1;yaw:12;vgx:0;vgy:0;vgz:0;templ:62;temph:65;\
                               tof:10;h:0;bat:87;baro:123.40;time:0;agx:-4.00;agy:15.00;agz:-999.00;\r\n";

    #[test]
    fn test_parse_fields_strips_wrapper() {
        let fields = parse_fields(";bat:87;baro:123.4;").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["bat"], "87");
        assert_eq!(fields["baro"], "123.4");
    }

    #[test]
    fn test_parse_fields_splits_on_first_colon() {
        let fields = parse_fields("mid:-1;mpry:0,0,0;x:a:b;").unwrap();
        assert_eq!(fields["mpry"], "0,0,0");
        assert_eq!(fields["x"], "a:b");
    }

    #[test]
    fn test_parse_fields_rejects_garbage() {
        assert!(matches!(
            parse_fields("bat:87;garbage;"),
            Err(TelloError::MalformedTelemetry(_))
        ));
        assert!(matches!(
            parse_fields(" ;;\r\n"),
            Err(TelloError::MalformedTelemetry(_))
        ));
    }

    #[test]
    fn test_state_from_minimal_datagram() {
        let state: TelemetryState = ";bat:87;baro:123.4;".parse().unwrap();
        assert_eq!(state.battery, 87);
        assert!((state.barometer - 123.4).abs() < 1e-9);
        assert_eq!(state.height_cm, None);
        assert_eq!(state.attitude, None);
    }

    #[test]
    fn test_state_from_full_datagram() {
        let state: TelemetryState = TELLO_STATE.parse().unwrap();
        assert_eq!(state.battery, 87);
        assert!((state.barometer - 123.4).abs() < 1e-9);
        assert_eq!(state.height_cm, Some(0));
        assert_eq!(state.time_of_flight_cm, Some(10));
        assert_eq!(state.flight_time_s, Some(0));
        assert_eq!(state.temperature_c, Some((62, 65)));
        assert_eq!(
            state.attitude,
            Some(Attitude {
                pitch: 0,
                roll: -1,
                yaw: 12
            })
        );
    }

    #[test]
    fn test_missing_baro_is_malformed() {
        let err = "bat:87;h:10;".parse::<TelemetryState>().unwrap_err();
        assert!(matches!(err, TelloError::MalformedTelemetry(ref m) if m.contains("baro")));
    }

    #[test]
    fn test_unparseable_battery_is_malformed() {
        let err = "bat:lots;baro:1.0;".parse::<TelemetryState>().unwrap_err();
        assert!(matches!(err, TelloError::MalformedTelemetry(_)));
    }

    #[tokio::test]
    async fn test_listener_survives_malformed_datagram() {
        let transport = Arc::new(
            DatagramTransport::bind(
                "state",
                "127.0.0.1:0".parse().unwrap(),
                Duration::from_millis(20),
            )
            .await
            .unwrap(),
        );
        let state = Arc::new(Published::new());
        let lifeline = Lifeline::new();
        let listener = tokio::spawn(supervise(
            TelemetryListener::new(transport.clone(), state.clone()),
            lifeline.clone(),
        ));

        let vehicle = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = transport.local_addr();
        vehicle.send_to(b"bat:50;h:3;\r\n", target).await.unwrap();
        vehicle.send_to(b";bat:87;baro:123.4;\r\n", target).await.unwrap();

        let mut published = None;
        for _ in 0..100 {
            published = state.latest();
            if published.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let published = published.expect("listener published nothing");
        assert_eq!(published.battery, 87);

        lifeline.cut();
        let listener = tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listener.name(), "telemetry listener");
    }
}
