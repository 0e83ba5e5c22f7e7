//! Packet framing: the fixed 8-byte header shared by every on-air packet,
//! plus the four type-specific bodies.

use crate::error::WireError;
use serde::{Deserialize, Serialize};

pub const MAGIC: [u8; 2] = [0x46, 0x47];
pub const HEADER_LEN: usize = 8;
pub const MAX_PACKET_LEN: usize = 200;
pub const MAX_BODY_LEN: usize = MAX_PACKET_LEN - HEADER_LEN;

/// Maximum spectrogram-payload bytes carried by one `SPEC_DATA` packet.
/// Also the chunk size used to split a payload across packets.
pub const LORA_MAX_PAYLOAD: usize = MAX_BODY_LEN;
pub const LORA_PACKET_DATA: usize = LORA_MAX_PAYLOAD;

const MAX_NODE_ID_CSTR: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Json,
    SpecStart,
    SpecData,
    SpecEnd,
}

impl PacketType {
    fn to_byte(self) -> u8 {
        match self {
            PacketType::Json => 0x01,
            PacketType::SpecStart => 0x10,
            PacketType::SpecData => 0x11,
            PacketType::SpecEnd => 0x12,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, WireError> {
        match byte {
            0x01 => Ok(PacketType::Json),
            0x10 => Ok(PacketType::SpecStart),
            0x11 => Ok(PacketType::SpecData),
            0x12 => Ok(PacketType::SpecEnd),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    pub node_hash: u16,
    pub packet_type: PacketType,
    pub session_id: u16,
    pub sequence: u8,
}

/// JSON-framed telemetry message: boot/heartbeat/alert/low_battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonMessage {
    pub node_id: String,
    #[serde(rename = "type")]
    pub message_type: JsonMessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonMessageType {
    Boot,
    Heartbeat,
    Alert,
    LowBattery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpecEndMetadata {
    pub confidence: u8,
    pub lat: f32,
    pub lon: f32,
    pub battery: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    Json(JsonMessage),
    SpecStart {
        data_count: u8,
        payload_len: u16,
        node_id: String,
    },
    SpecData {
        chunk: Vec<u8>,
    },
    SpecEnd(SpecEndMetadata),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: PacketBody,
}

impl Packet {
    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        let mut body_bytes = Vec::new();
        let packet_type;

        match &self.body {
            PacketBody::Json(msg) => {
                packet_type = PacketType::Json;
                let json = serde_json::to_vec(msg).map_err(|e| WireError::InvalidJson(e.to_string()))?;
                body_bytes.extend_from_slice(&json);
            }
            PacketBody::SpecStart {
                data_count,
                payload_len,
                node_id,
            } => {
                packet_type = PacketType::SpecStart;
                body_bytes.push(*data_count);
                body_bytes.extend_from_slice(&payload_len.to_be_bytes());
                let mut id_bytes = node_id.as_bytes().to_vec();
                id_bytes.truncate(MAX_NODE_ID_CSTR - 1);
                body_bytes.extend_from_slice(&id_bytes);
                body_bytes.push(0);
            }
            PacketBody::SpecData { chunk } => {
                packet_type = PacketType::SpecData;
                body_bytes.extend_from_slice(chunk);
            }
            PacketBody::SpecEnd(meta) => {
                packet_type = PacketType::SpecEnd;
                let json = serde_json::json!({
                    "conf": meta.confidence,
                    "lat": meta.lat,
                    "lon": meta.lon,
                    "bat": meta.battery,
                });
                body_bytes.extend_from_slice(json.to_string().as_bytes());
            }
        }

        if HEADER_LEN + body_bytes.len() > MAX_PACKET_LEN {
            return Err(WireError::PacketTooLarge { max: MAX_PACKET_LEN });
        }

        let mut out = Vec::with_capacity(HEADER_LEN + body_bytes.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.header.node_hash.to_be_bytes());
        out.push(packet_type.to_byte());
        out.extend_from_slice(&self.header.session_id.to_be_bytes());
        out.push(self.header.sequence);
        out.extend_from_slice(&body_bytes);
        Ok(out)
    }

    pub fn parse(bytes: &[u8]) -> Result<Packet, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::MalformedBody {
                need: HEADER_LEN,
                got: bytes.len(),
            });
        }

        if bytes[0..2] != MAGIC {
            let got = u16::from_be_bytes([bytes[0], bytes[1]]);
            return Err(WireError::MagicMismatch(got));
        }

        let node_hash = u16::from_be_bytes([bytes[2], bytes[3]]);
        let packet_type = PacketType::from_byte(bytes[4])?;
        let session_id = u16::from_be_bytes([bytes[5], bytes[6]]);
        let sequence = bytes[7];
        let body_bytes = &bytes[HEADER_LEN..];

        let body = match packet_type {
            PacketType::Json => {
                let msg: JsonMessage = serde_json::from_slice(body_bytes)
                    .map_err(|e| WireError::InvalidJson(e.to_string()))?;
                PacketBody::Json(msg)
            }
            PacketType::SpecStart => {
                if body_bytes.len() < 3 {
                    return Err(WireError::MalformedBody {
                        need: 3,
                        got: body_bytes.len(),
                    });
                }
                let data_count = body_bytes[0];
                let payload_len = u16::from_be_bytes([body_bytes[1], body_bytes[2]]);
                let rest = &body_bytes[3..];
                let nul_pos = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
                let node_id = String::from_utf8_lossy(&rest[..nul_pos]).into_owned();
                PacketBody::SpecStart {
                    data_count,
                    payload_len,
                    node_id,
                }
            }
            PacketType::SpecData => PacketBody::SpecData {
                chunk: body_bytes.to_vec(),
            },
            PacketType::SpecEnd => {
                let value: serde_json::Value = serde_json::from_slice(body_bytes)
                    .map_err(|e| WireError::InvalidJson(e.to_string()))?;
                let confidence = value
                    .get("conf")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    .min(100) as u8;
                let lat = value.get("lat").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
                let lon = value.get("lon").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
                let battery = value
                    .get("bat")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    .min(100) as u8;
                PacketBody::SpecEnd(SpecEndMetadata {
                    confidence,
                    lat,
                    lon,
                    battery,
                })
            }
        };

        Ok(Packet {
            header: PacketHeader {
                node_hash,
                packet_type,
                session_id,
                sequence,
            },
            body,
        })
    }
}

/// Split an encoded spectrogram payload into the `SPEC_DATA` chunks that
/// will ride one packet each. Never emits a zero-length trailing chunk.
pub fn split_payload(payload: &[u8]) -> Vec<&[u8]> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload.chunks(LORA_MAX_PAYLOAD).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_packet() -> Packet {
        Packet {
            header: PacketHeader {
                node_hash: 0xbeef,
                packet_type: PacketType::SpecStart,
                session_id: 42,
                sequence: 0,
            },
            body: PacketBody::SpecStart {
                data_count: 3,
                payload_len: 500,
                node_id: "GUARDIAN_001".to_string(),
            },
        }
    }

    #[test]
    fn parse_of_serialize_is_identity() {
        let packet = start_packet();
        let bytes = packet.serialize().unwrap();
        let parsed = Packet::parse(&bytes).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0u8; 8];
        assert!(matches!(Packet::parse(&bytes), Err(WireError::MagicMismatch(_))));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut bytes = vec![0x46, 0x47, 0, 0, 0xff, 0, 0, 0];
        bytes.extend_from_slice(&[]);
        assert!(matches!(Packet::parse(&bytes), Err(WireError::UnknownType(0xff))));
    }

    #[test]
    fn split_payload_has_no_empty_trailing_chunk() {
        let payload = vec![0u8; LORA_MAX_PAYLOAD * 2];
        let chunks = split_payload(&payload);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == LORA_MAX_PAYLOAD));
    }

    #[test]
    fn split_payload_last_chunk_is_remainder() {
        let payload = vec![0u8; LORA_MAX_PAYLOAD + 10];
        let chunks = split_payload(&payload);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 10);
    }

    #[test]
    fn json_message_round_trips_through_serde() {
        let msg = JsonMessage {
            node_id: "GUARDIAN_001".into(),
            message_type: JsonMessageType::Heartbeat,
            confidence: None,
            lat: Some(27.7172),
            lon: Some(85.3240),
            battery: Some(78),
            timestamp: None,
        };
        let packet = Packet {
            header: PacketHeader {
                node_hash: 1,
                packet_type: PacketType::Json,
                session_id: 0,
                sequence: 0,
            },
            body: PacketBody::Json(msg.clone()),
        };
        let bytes = packet.serialize().unwrap();
        let parsed = Packet::parse(&bytes).unwrap();
        assert_eq!(parsed.body, PacketBody::Json(msg));
    }
}
