//! Node scheduler: the cooperative single-threaded state machine that
//! drives audio capture, the anomaly gate, and the radio link. One `tick`
//! call does one bounded unit of work and returns, matching the
//! firmware's original no-threads, watchdog-friendly loop.

use crate::audio::{AudioCapture, AudioError, I2sDriver};
use crate::gate::AnomalyGate;
use crate::spectrogram::SpectrogramEngine;
use std::time::{Duration, Instant};
use wire::{
    node_hash, JsonMessage, JsonMessageType, Packet, PacketBody, PacketHeader, PacketType, RadioError,
    RadioLink, SpecEndMetadata,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Boot,
    Init,
    Listening,
    AnomalyPending,
    Transmitting,
    Heartbeat,
    LowBattery,
    Error,
    Sleep,
}

const ACK_WAIT: Duration = Duration::from_secs(2);
const HUB_SILENCE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const LOW_BATTERY_PERCENT: u8 = 5;
const ACK_SUBSTRINGS: [&str; 4] = ["ack", "ACK", "hub", ""]; // node id spliced in at runtime

pub struct NodeSchedulerConfig {
    pub node_id: String,
    pub pcm_window_len: usize,
    pub heartbeat_interval: Duration,
    pub lat: f32,
    pub lon: f32,
}

pub struct NodeScheduler<D: I2sDriver, R: RadioLink> {
    config: NodeSchedulerConfig,
    node_hash: u16,
    state: SchedulerState,
    capture: AudioCapture<D>,
    engine: SpectrogramEngine,
    gate: AnomalyGate,
    radio: R,
    session_counter: u16,
    battery_percent: u8,
    hub_connected: bool,
    last_ack_at: Option<Instant>,
    last_heartbeat_at: Option<Instant>,
    pending_grid: Option<wire::Grid>,
}

impl<D: I2sDriver, R: RadioLink> NodeScheduler<D, R> {
    pub fn new(config: NodeSchedulerConfig, driver: D, gate: AnomalyGate, radio: R) -> Self {
        let node_hash = node_hash(&config.node_id);
        Self {
            node_hash,
            state: SchedulerState::Boot,
            capture: AudioCapture::new(driver),
            engine: SpectrogramEngine::new(),
            gate,
            radio,
            session_counter: 0,
            battery_percent: 100,
            hub_connected: false,
            last_ack_at: None,
            last_heartbeat_at: None,
            pending_grid: None,
            config,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn set_battery_percent(&mut self, percent: u8) {
        self.battery_percent = percent.min(100);
    }

    /// One cooperative step of the loop. Callers must invoke this at
    /// least every few seconds to keep the (simulated) watchdog happy.
    pub fn tick(&mut self, now: Instant) -> SchedulerState {
        let previous = self.state;
        let already_low = matches!(
            self.state,
            SchedulerState::LowBattery | SchedulerState::Sleep
        );
        if self.battery_percent < LOW_BATTERY_PERCENT && !already_low {
            self.state = SchedulerState::LowBattery;
            tracing::warn!(battery_percent = self.battery_percent, ?previous, "battery critical, forcing low-battery state");
            return self.state;
        }

        self.state = match self.state {
            SchedulerState::Boot => SchedulerState::Init,
            SchedulerState::Init => SchedulerState::Listening,
            SchedulerState::Listening => self.tick_listening(now),
            SchedulerState::AnomalyPending => self.tick_anomaly_pending(),
            SchedulerState::Transmitting => self.tick_transmitting(now),
            SchedulerState::Heartbeat => self.tick_heartbeat(now),
            SchedulerState::LowBattery => SchedulerState::Sleep,
            SchedulerState::Sleep => {
                self.radio.sleep();
                SchedulerState::Sleep
            }
            SchedulerState::Error => {
                tracing::warn!(?previous, "recovering from error state");
                SchedulerState::Init
            }
        };
        if self.state != previous {
            tracing::debug!(?previous, next = ?self.state, "scheduler state transition");
        }
        self.state
    }

    fn tick_listening(&mut self, now: Instant) -> SchedulerState {
        if self
            .last_heartbeat_at
            .map(|t| now.duration_since(t) >= self.config.heartbeat_interval)
            .unwrap_or(true)
        {
            return SchedulerState::Heartbeat;
        }

        let mut pcm = vec![0i16; self.config.pcm_window_len];
        match self.capture.read(&mut pcm) {
            Ok(_) => {}
            Err(AudioError::AudioUnavailable) => return SchedulerState::Listening,
        }

        let grid = match self.engine.compute(&pcm) {
            Ok(grid) => grid,
            Err(_) => return SchedulerState::Listening,
        };

        if self.gate.evaluate(&grid, now) {
            self.pending_grid = Some(grid);
            SchedulerState::AnomalyPending
        } else {
            SchedulerState::Listening
        }
    }

    fn tick_anomaly_pending(&mut self) -> SchedulerState {
        if self.pending_grid.is_some() {
            SchedulerState::Transmitting
        } else {
            SchedulerState::Listening
        }
    }

    fn tick_transmitting(&mut self, now: Instant) -> SchedulerState {
        let grid = match self.pending_grid.take() {
            Some(g) => g,
            None => return SchedulerState::Listening,
        };

        let confidence = self.gate.last_fire_confidence();
        if let Err(error) = self.transmit_spectrogram(&grid, confidence) {
            tracing::warn!(?error, confidence, "spectrogram transmit failed, falling back to JSON alert");
            if let Err(error) = self.transmit_json_alert(confidence, now) {
                tracing::warn!(?error, "JSON alert fallback also failed");
            }
        }

        SchedulerState::Listening
    }

    fn tick_heartbeat(&mut self, now: Instant) -> SchedulerState {
        self.last_heartbeat_at = Some(now);
        let msg = JsonMessage {
            node_id: self.config.node_id.clone(),
            message_type: JsonMessageType::Heartbeat,
            confidence: None,
            lat: Some(self.config.lat as f64),
            lon: Some(self.config.lon as f64),
            battery: Some(self.battery_percent),
            timestamp: None,
        };
        let packet = Packet {
            header: PacketHeader {
                node_hash: self.node_hash,
                packet_type: PacketType::Json,
                session_id: 0,
                sequence: 0,
            },
            body: PacketBody::Json(msg),
        };
        if let Ok(bytes) = packet.serialize() {
            let _ = self.radio.transmit(&bytes);
        }

        self.await_ack(now);
        SchedulerState::Listening
    }

    fn await_ack(&mut self, now: Instant) {
        if let Ok(Some(frame)) = self.radio.receive(ACK_WAIT) {
            if frame_carries_ack(&frame.bytes, &self.config.node_id) {
                self.hub_connected = true;
                self.last_ack_at = Some(now);
            }
        }
        if let Some(last) = self.last_ack_at {
            if now.duration_since(last) > HUB_SILENCE_TIMEOUT && self.hub_connected {
                self.hub_connected = false;
                tracing::warn!("hub silent past timeout, marking disconnected");
            }
        }
    }

    fn transmit_spectrogram(&mut self, grid: &wire::Grid, confidence: u8) -> Result<(), RadioError> {
        let session_id = self.session_counter;
        self.session_counter = self.session_counter.wrapping_add(1);

        let payload = wire::encode(grid);
        let chunks = wire::packet::split_payload(&payload);

        let start = Packet {
            header: PacketHeader {
                node_hash: self.node_hash,
                packet_type: PacketType::SpecStart,
                session_id,
                sequence: 0,
            },
            body: PacketBody::SpecStart {
                data_count: chunks.len() as u8,
                payload_len: payload.len() as u16,
                node_id: self.config.node_id.clone(),
            },
        };
        self.send(&start)?;

        for (seq, chunk) in chunks.iter().enumerate() {
            let data = Packet {
                header: PacketHeader {
                    node_hash: self.node_hash,
                    packet_type: PacketType::SpecData,
                    session_id,
                    sequence: seq as u8,
                },
                body: PacketBody::SpecData {
                    chunk: chunk.to_vec(),
                },
            };
            self.send(&data)?;
        }

        let end = Packet {
            header: PacketHeader {
                node_hash: self.node_hash,
                packet_type: PacketType::SpecEnd,
                session_id,
                sequence: chunks.len() as u8,
            },
            body: PacketBody::SpecEnd(SpecEndMetadata {
                confidence,
                lat: self.config.lat,
                lon: self.config.lon,
                battery: self.battery_percent,
            }),
        };
        self.send(&end)?;

        Ok(())
    }

    fn transmit_json_alert(&mut self, confidence: u8, _now: Instant) -> Result<(), RadioError> {
        let msg = JsonMessage {
            node_id: self.config.node_id.clone(),
            message_type: JsonMessageType::Alert,
            confidence: Some(confidence),
            lat: Some(self.config.lat as f64),
            lon: Some(self.config.lon as f64),
            battery: Some(self.battery_percent),
            timestamp: None,
        };
        let packet = Packet {
            header: PacketHeader {
                node_hash: self.node_hash,
                packet_type: PacketType::Json,
                session_id: 0,
                sequence: 0,
            },
            body: PacketBody::Json(msg),
        };
        self.send(&packet)
    }

    fn send(&mut self, packet: &Packet) -> Result<(), RadioError> {
        let bytes = packet.serialize().map_err(|_| RadioError::TxError)?;
        self.radio.transmit(&bytes)
    }
}

fn frame_carries_ack(bytes: &[u8], node_id: &str) -> bool {
    let text = String::from_utf8_lossy(bytes);
    ACK_SUBSTRINGS
        .iter()
        .filter(|s| !s.is_empty())
        .any(|needle| text.contains(needle))
        || text.contains(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SimulatedDriver;
    use crate::gate::GateConfig;
    use wire::LoopbackLink;

    fn test_config() -> NodeSchedulerConfig {
        NodeSchedulerConfig {
            node_id: "GUARDIAN_001".into(),
            pcm_window_len: 16_000,
            heartbeat_interval: Duration::from_secs(30),
            lat: 27.7172,
            lon: 85.3240,
        }
    }

    #[test]
    fn boot_sequence_reaches_listening() {
        let driver = SimulatedDriver::silence(100_000);
        let scheduler = NodeScheduler::new(
            test_config(),
            driver,
            AnomalyGate::new(GateConfig::production()),
            LoopbackLink::new(),
        );
        let mut scheduler = scheduler;
        let now = Instant::now();
        assert_eq!(scheduler.tick(now), SchedulerState::Init);
        assert_eq!(scheduler.tick(now), SchedulerState::Listening);
    }

    #[test]
    fn low_battery_forces_sleep() {
        let driver = SimulatedDriver::silence(100_000);
        let mut scheduler = NodeScheduler::new(
            test_config(),
            driver,
            AnomalyGate::new(GateConfig::production()),
            LoopbackLink::new(),
        );
        scheduler.set_battery_percent(2);
        let now = Instant::now();
        assert_eq!(scheduler.tick(now), SchedulerState::LowBattery);
        assert_eq!(scheduler.tick(now), SchedulerState::Sleep);
    }

    #[test]
    fn heartbeat_fires_on_first_listening_tick() {
        let driver = SimulatedDriver::silence(100_000);
        let mut scheduler = NodeScheduler::new(
            test_config(),
            driver,
            AnomalyGate::new(GateConfig::production()),
            LoopbackLink::new(),
        );
        let now = Instant::now();
        scheduler.tick(now); // Boot -> Init
        scheduler.tick(now); // Init -> Listening
        let state = scheduler.tick(now); // Listening -> Heartbeat (never sent one)
        assert_eq!(state, SchedulerState::Heartbeat);
        let state = scheduler.tick(now); // Heartbeat -> Listening, transmits
        assert_eq!(state, SchedulerState::Listening);
        assert_eq!(scheduler.radio.sent.len(), 1);
    }
}
