//! Packet reassembly: the hub-side counterpart to the node's
//! `transmit_spectrogram`. Owns the in-flight session table exclusively;
//! nothing outside this module ever reads or writes `sessions` directly.

use crate::error::ReassemblyError;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use wire::{Packet, PacketBody, PacketType, SpecEndMetadata};

pub const DEFAULT_MAX_SESSIONS: usize = 32;

/// Sequence numbers are one byte wide but only the low half is valid data
/// index space; anything above this is a corrupt or adversarial frame.
const MAX_DATA_SEQUENCE: u8 = 127;

type SessionKey = (u16, u16);

struct SessionState {
    node_id: Option<String>,
    data_count: Option<u8>,
    payload_len: Option<u16>,
    chunks: HashMap<u8, Vec<u8>>,
    metadata: Option<SpecEndMetadata>,
    opened_at: Instant,
    last_packet_at: Instant,
    max_rssi: i32,
}

impl SessionState {
    fn pending(now: Instant) -> Self {
        Self {
            node_id: None,
            data_count: None,
            payload_len: None,
            chunks: HashMap::new(),
            metadata: None,
            opened_at: now,
            last_packet_at: now,
            max_rssi: i32::MIN,
        }
    }

    fn is_complete(&self) -> bool {
        match self.data_count {
            Some(count) => self.chunks.len() == count as usize && self.metadata.is_some(),
            None => false,
        }
    }

    fn assembled_payload(&self, count: u8) -> Vec<u8> {
        let mut out = Vec::new();
        for seq in 0..count {
            if let Some(chunk) = self.chunks.get(&seq) {
                out.extend_from_slice(chunk);
            }
        }
        out
    }
}

#[derive(Debug)]
pub enum ReassemblyOutcome {
    Completed {
        node_id: String,
        grid: wire::Grid,
        metadata: SpecEndMetadata,
        rssi_max: i32,
        session_key: SessionKey,
        truncated: bool,
    },
    DecodeFailed {
        session_key: SessionKey,
        raw: Vec<u8>,
        error: wire::CodecError,
    },
    JsonMessage {
        message: wire::JsonMessage,
        rssi: i32,
    },
    SessionAbandoned {
        session_key: SessionKey,
        received: usize,
        expected: Option<u8>,
    },
}

pub struct Reassembler {
    sessions: HashMap<SessionKey, SessionState>,
    session_timeout: Duration,
    max_sessions: usize,
}

impl Reassembler {
    pub fn new(session_timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            session_timeout,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Parse and fold one radio frame into the session table. Malformed or
    /// unknown-type frames are dropped silently (counted by the caller);
    /// everything else returns at most one outcome.
    pub fn on_frame(&mut self, bytes: &[u8], rssi: i32, now: Instant) -> Option<ReassemblyOutcome> {
        let packet = Packet::parse(bytes).ok()?;
        let key = (packet.header.node_hash, packet.header.session_id);

        match packet.body {
            PacketBody::Json(message) => return Some(ReassemblyOutcome::JsonMessage { message, rssi }),
            PacketBody::SpecStart { data_count, payload_len, node_id } => {
                // A repeated START for the same key discards whatever partial
                // state was there; the prior packets are unrecoverable.
                self.ensure_capacity(&key, now);
                if let Some(existing) = self.sessions.get(&key) {
                    if !existing.chunks.is_empty() || existing.metadata.is_some() {
                        tracing::warn!(
                            error = %ReassemblyError::SessionOverwritten { node_hash: key.0, session_id: key.1 },
                        );
                    }
                }
                let session = self.sessions.entry(key).or_insert_with(|| SessionState::pending(now));
                session.node_id = Some(node_id);
                session.data_count = Some(data_count);
                session.payload_len = Some(payload_len);
                session.last_packet_at = now;
                session.max_rssi = session.max_rssi.max(rssi);
            }
            PacketBody::SpecData { chunk } => {
                if packet.header.sequence > MAX_DATA_SEQUENCE {
                    return None;
                }
                self.ensure_capacity(&key, now);
                let session = self.sessions.entry(key).or_insert_with(|| SessionState::pending(now));
                session.chunks.insert(packet.header.sequence, chunk);
                session.last_packet_at = now;
                session.max_rssi = session.max_rssi.max(rssi);
            }
            PacketBody::SpecEnd(metadata) => {
                self.ensure_capacity(&key, now);
                let session = self.sessions.entry(key).or_insert_with(|| SessionState::pending(now));
                session.metadata = Some(metadata);
                session.last_packet_at = now;
                session.max_rssi = session.max_rssi.max(rssi);
            }
        }

        let session = self.sessions.get(&key)?;
        if !session.is_complete() {
            return None;
        }

        let session = self.sessions.remove(&key).expect("just checked present");
        let data_count = session.data_count.expect("complete implies data_count");
        let payload = session.assembled_payload(data_count);
        let node_id = session.node_id.unwrap_or_else(|| format!("unknown-{:04x}", key.0));
        let metadata = session.metadata.expect("complete implies metadata");

        let truncated = match session.payload_len {
            Some(expected) if expected as usize != payload.len() => {
                tracing::warn!(
                    error = %ReassemblyError::PayloadLengthMismatch { expected: expected as usize, actual: payload.len() },
                );
                true
            }
            _ => false,
        };

        match wire::decode(&payload) {
            Ok(grid) => Some(ReassemblyOutcome::Completed {
                node_id,
                grid,
                metadata,
                rssi_max: session.max_rssi,
                session_key: key,
                truncated,
            }),
            Err(error) => Some(ReassemblyOutcome::DecodeFailed { session_key: key, raw: payload, error }),
        }
    }

    /// Drop sessions that have been silent past the timeout, reporting
    /// each as abandoned so operators can observe loss instead of it
    /// vanishing unexplained.
    pub fn evict_timeouts(&mut self, now: Instant) -> Vec<ReassemblyOutcome> {
        let timeout = self.session_timeout;
        let expired: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_packet_at) > timeout)
            .map(|(k, _)| *k)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let session = self.sessions.remove(&key)?;
                Some(ReassemblyOutcome::SessionAbandoned {
                    session_key: key,
                    received: session.chunks.len(),
                    expected: session.data_count,
                })
            })
            .collect()
    }

    fn ensure_capacity(&mut self, key: &SessionKey, _now: Instant) {
        if self.sessions.contains_key(key) || self.sessions.len() < self.max_sessions {
            return;
        }
        if let Some(oldest_key) = self
            .sessions
            .iter()
            .min_by_key(|(_, s)| s.opened_at)
            .map(|(k, _)| *k)
        {
            self.sessions.remove(&oldest_key);
        }
    }
}

#[allow(dead_code)]
pub fn packet_type_label(packet_type: PacketType) -> &'static str {
    match packet_type {
        PacketType::Json => "json",
        PacketType::SpecStart => "spec_start",
        PacketType::SpecData => "spec_data",
        PacketType::SpecEnd => "spec_end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::{PacketHeader, PacketType};

    fn start(node_hash: u16, session_id: u16, data_count: u8, payload_len: u16) -> Vec<u8> {
        Packet {
            header: PacketHeader { node_hash, packet_type: PacketType::SpecStart, session_id, sequence: 0 },
            body: PacketBody::SpecStart { data_count, payload_len, node_id: "GUARDIAN_001".into() },
        }
        .serialize()
        .unwrap()
    }

    fn data(node_hash: u16, session_id: u16, seq: u8, chunk: Vec<u8>) -> Vec<u8> {
        Packet {
            header: PacketHeader { node_hash, packet_type: PacketType::SpecData, session_id, sequence: seq },
            body: PacketBody::SpecData { chunk },
        }
        .serialize()
        .unwrap()
    }

    fn end(node_hash: u16, session_id: u16, seq: u8) -> Vec<u8> {
        Packet {
            header: PacketHeader { node_hash, packet_type: PacketType::SpecEnd, session_id, sequence: seq },
            body: PacketBody::SpecEnd(SpecEndMetadata { confidence: 84, lat: 27.7172, lon: 85.3240, battery: 78 }),
        }
        .serialize()
        .unwrap()
    }

    fn sample_grid_payload() -> Vec<u8> {
        let grid = wire::Grid::zeroed();
        wire::encode(&grid)
    }

    #[test]
    fn happy_path_completes_exactly_once() {
        let payload = sample_grid_payload();
        let chunks = wire::packet::split_payload(&payload);
        let mut reassembler = Reassembler::new(Duration::from_secs(30));
        let now = Instant::now();

        assert!(reassembler.on_frame(&start(1, 42, chunks.len() as u8, payload.len() as u16), -60, now).is_none());
        for (seq, chunk) in chunks.iter().enumerate() {
            let outcome = reassembler.on_frame(&data(1, 42, seq as u8, chunk.to_vec()), -58, now);
            assert!(outcome.is_none());
        }
        let outcome = reassembler.on_frame(&end(1, 42, chunks.len() as u8), -55, now);
        match outcome {
            Some(ReassemblyOutcome::Completed { node_id, rssi_max, .. }) => {
                assert_eq!(node_id, "GUARDIAN_001");
                assert_eq!(rssi_max, -55);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(reassembler.session_count(), 0);
    }

    #[test]
    fn out_of_order_delivery_still_completes_once() {
        let payload = sample_grid_payload();
        let chunks = wire::packet::split_payload(&payload);
        let mut reassembler = Reassembler::new(Duration::from_secs(30));
        let now = Instant::now();

        reassembler.on_frame(&start(2, 7, chunks.len() as u8, payload.len() as u16), -60, now);
        reassembler.on_frame(&data(2, 7, 1, chunks[1].to_vec()), -60, now);
        reassembler.on_frame(&data(2, 7, 0, chunks[0].to_vec()), -60, now);
        let outcome = reassembler.on_frame(&end(2, 7, chunks.len() as u8), -60, now);
        assert!(matches!(outcome, Some(ReassemblyOutcome::Completed { .. })));
    }

    #[test]
    fn lost_data_packet_times_out_as_abandoned() {
        let payload = sample_grid_payload();
        let chunks = wire::packet::split_payload(&payload);
        let mut reassembler = Reassembler::new(Duration::from_millis(10));
        let now = Instant::now();

        reassembler.on_frame(&start(3, 1, chunks.len() as u8, payload.len() as u16), -60, now);
        reassembler.on_frame(&data(3, 1, 0, chunks[0].to_vec()), -60, now);
        // DATA(1) never arrives.
        reassembler.on_frame(&end(3, 1, chunks.len() as u8), -60, now);

        let later = now + Duration::from_millis(50);
        let outcomes = reassembler.evict_timeouts(later);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            ReassemblyOutcome::SessionAbandoned { received, expected, .. } => {
                assert_eq!(*received, 1);
                assert_eq!(*expected, Some(chunks.len() as u8));
            }
            other => panic!("expected abandonment, got {other:?}"),
        }
    }

    #[test]
    fn data_count_zero_completes_on_start_and_end_alone() {
        let mut reassembler = Reassembler::new(Duration::from_secs(30));
        let now = Instant::now();
        reassembler.on_frame(&start(4, 9, 0, 0), -60, now);
        let outcome = reassembler.on_frame(&end(4, 9, 0), -60, now);
        assert!(matches!(outcome, Some(ReassemblyOutcome::Completed { .. })));
    }

    #[test]
    fn session_cap_evicts_oldest_session() {
        let mut reassembler = Reassembler::new(Duration::from_secs(30));
        let now = Instant::now();
        for i in 0..DEFAULT_MAX_SESSIONS {
            reassembler.on_frame(&start(i as u16, 0, 5, 100), -60, now + Duration::from_millis(i as u64));
        }
        assert_eq!(reassembler.session_count(), DEFAULT_MAX_SESSIONS);
        reassembler.on_frame(&start(999, 0, 5, 100), -60, now + Duration::from_secs(1));
        assert_eq!(reassembler.session_count(), DEFAULT_MAX_SESSIONS);
    }
}
