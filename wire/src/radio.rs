//! Radio link: the transceiver abstraction both the node scheduler and the
//! hub's RX task drive, plus a UDP-socket realization standing in for the
//! physical LoRa transceiver (no SX127x/embedded-hal driver exists in this
//! workspace's dependency stack; the link is modeled as a narrow trait so
//! a real driver can be dropped in without touching callers).

use std::net::UdpSocket;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const CARRIER_MHZ: f32 = 915.0;
pub const BANDWIDTH_KHZ: f32 = 125.0;
pub const SPREADING_FACTOR: u8 = 10;
pub const CODING_RATE: &str = "4/5";
pub const PREAMBLE_SYMBOLS: u8 = 8;
pub const SYNC_WORD: u8 = 0x12;
pub const TX_POWER_DBM: i8 = 14;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("transmit failed")]
    TxError,
    #[error("receive failed")]
    RxError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    Idle,
    PreambleDetected,
}

/// A received packet's raw bytes plus the link-quality metrics the
/// reassembler records alongside it.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub bytes: Vec<u8>,
    pub rssi: i16,
    pub snr: f32,
}

/// Lifecycle state the link enters on any I/O error; the owner must
/// re-initialize before issuing another operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Ready,
    NeedsReset,
}

/// Blocking radio operations. One endpoint, one exclusive owner: the node
/// scheduler on the node, the Radio RX task on the hub.
pub trait RadioLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), RadioError>;
    fn receive(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, RadioError>;
    fn scan_channel(&mut self) -> ScanResult;
    fn sleep(&mut self);
    fn standby(&mut self);
}

/// UDP-socket realization of the link: each endpoint is a socket bound to
/// a known port, `send_to`/`recv_from` standing in for the SX127x's
/// `transmit`/`receive`. RSSI/SNR are synthesized since there is no real
/// RF front end to sample.
pub struct UdpRadioLink {
    socket: UdpSocket,
    peer: std::net::SocketAddr,
    state: LinkState,
}

impl UdpRadioLink {
    pub fn bind(local: impl std::net::ToSocketAddrs, peer: std::net::SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(Duration::from_millis(1)))?;
        Ok(Self {
            socket,
            peer,
            state: LinkState::Ready,
        })
    }

    fn reinit(&mut self) {
        self.state = LinkState::Ready;
    }
}

impl RadioLink for UdpRadioLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        if self.state == LinkState::NeedsReset {
            self.reinit();
        }
        self.socket.send_to(bytes, self.peer).map_err(|_| {
            self.state = LinkState::NeedsReset;
            RadioError::TxError
        })?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, RadioError> {
        if self.state == LinkState::NeedsReset {
            self.reinit();
        }
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, _from)) => {
                    return Ok(Some(ReceivedFrame {
                        bytes: buf[..n].to_vec(),
                        rssi: synthesize_rssi(n),
                        snr: 9.5,
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Err(_) => {
                    self.state = LinkState::NeedsReset;
                    return Err(RadioError::RxError);
                }
            }
        }
    }

    fn scan_channel(&mut self) -> ScanResult {
        ScanResult::Idle
    }

    fn sleep(&mut self) {}

    fn standby(&mut self) {}
}

/// Deterministic RSSI stand-in: stronger (less negative) for larger
/// frames, within the -120..-40 dBm range a real SX127x would report.
pub fn synthesize_rssi(frame_len: usize) -> i16 {
    let boost = (frame_len.min(200) / 4) as i16;
    -110 + boost
}

/// An in-memory loopback pair for node/hub tests that don't need a real
/// socket, modeled after the mock-transport idiom used for other hardware
/// seams in this workspace.
pub struct LoopbackLink {
    inbox: std::collections::VecDeque<ReceivedFrame>,
    pub sent: Vec<Vec<u8>>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self {
            inbox: std::collections::VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn deliver(&mut self, bytes: Vec<u8>, rssi: i16) {
        self.inbox.push_back(ReceivedFrame { bytes, rssi, snr: 9.0 });
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioLink for LoopbackLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<ReceivedFrame>, RadioError> {
        Ok(self.inbox.pop_front())
    }

    fn scan_channel(&mut self) -> ScanResult {
        if self.inbox.is_empty() {
            ScanResult::Idle
        } else {
            ScanResult::PreambleDetected
        }
    }

    fn sleep(&mut self) {}
    fn standby(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trips_a_frame() {
        let mut link = LoopbackLink::new();
        link.transmit(b"hello").unwrap();
        assert_eq!(link.sent, vec![b"hello".to_vec()]);

        link.deliver(b"world".to_vec(), -70);
        let frame = link.receive(Duration::from_millis(0)).unwrap().unwrap();
        assert_eq!(frame.bytes, b"world");
        assert_eq!(frame.rssi, -70);
    }

    #[test]
    fn scan_reflects_pending_inbox() {
        let mut link = LoopbackLink::new();
        assert_eq!(link.scan_channel(), ScanResult::Idle);
        link.deliver(vec![1, 2, 3], -80);
        assert_eq!(link.scan_channel(), ScanResult::PreambleDetected);
    }
}
