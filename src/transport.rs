//! Connectionless socket with a read timeout, shared by the command channel
//! and the telemetry listener.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::info;

use crate::error::TelloError;

/// Largest datagram the vehicle sends on either port.
pub const RECV_BUF_LEN: usize = 1024;

#[derive(Debug)]
pub struct DatagramTransport {
    name: &'static str,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    local_addr: SocketAddr,
    read_timeout: Duration,
}

impl DatagramTransport {
    pub async fn bind(
        name: &'static str,
        addr: SocketAddr,
        read_timeout: Duration,
    ) -> Result<Self, TelloError> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            TelloError::Io(io::Error::new(
                e.kind(),
                format!("failed to bind {name} socket on {addr}: {e}"),
            ))
        })?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            name,
            socket: Mutex::new(Some(Arc::new(socket))),
            local_addr,
            read_timeout,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn socket(&self) -> Result<Arc<UdpSocket>, TelloError> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TelloError::Closed(self.name))
    }

    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<usize, TelloError> {
        let socket = self.socket()?;
        Ok(socket.send_to(payload, target).await?)
    }

    /// Wait up to the read timeout for one datagram. `None` means nothing
    /// arrived this cycle.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, TelloError> {
        let socket = self.socket()?;
        match timeout(self.read_timeout, socket.recv_from(buf)).await {
            Ok(Ok(received)) => Ok(Some(received)),
            Ok(Err(e)) => Err(TelloError::Io(e)),
            Err(_) => Ok(None),
        }
    }

    /// Drop the socket. Returns false if it was already released.
    pub fn close(&self) -> bool {
        let released = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if released {
            info!("{} socket on {} closed", self.name, self.local_addr);
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback(name: &'static str) -> DatagramTransport {
        DatagramTransport::bind(name, "127.0.0.1:0".parse().unwrap(), Duration::from_millis(50))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_recv_timeout_is_empty() {
        let transport = loopback("state").await;
        let mut buf = [0u8; RECV_BUF_LEN];
        assert!(transport.recv(&mut buf).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_loopback_roundtrip() {
        let a = loopback("a").await;
        let b = loopback("b").await;
        a.send_to(b"takeoff", b.local_addr()).await.unwrap();

        let mut buf = [0u8; RECV_BUF_LEN];
        let (len, from) = b.recv(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..len], b"takeoff");
        assert_eq!(from, a.local_addr());
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_io() {
        let transport = loopback("command").await;
        assert!(transport.close());
        assert!(transport.is_closed());
        assert!(!transport.close());

        let err = transport
            .send_to(b"land", "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TelloError::Closed("command")));

        let mut buf = [0u8; 8];
        assert!(matches!(
            transport.recv(&mut buf).await,
            Err(TelloError::Closed("command"))
        ));
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let first = loopback("command").await;
        let second =
            DatagramTransport::bind("command", first.local_addr(), Duration::from_millis(50)).await;
        assert!(matches!(second, Err(TelloError::Io(_))));
    }
}
