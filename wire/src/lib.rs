//! Binary wire protocol shared by the sensor node and the hub: packet
//! framing, the spectrogram payload codec, and the node-id hash used to
//! key reassembly sessions.

pub mod codec;
pub mod error;
pub mod grid;
pub mod hash;
pub mod packet;
pub mod radio;

pub use codec::{decode, encode};
pub use error::{CodecError, WireError};
pub use grid::{Grid, GRID_DIM};
pub use hash::node_hash;
pub use packet::{
    JsonMessage, JsonMessageType, Packet, PacketBody, PacketHeader, PacketType, SpecEndMetadata,
    HEADER_LEN, LORA_MAX_PAYLOAD, LORA_PACKET_DATA, MAGIC, MAX_BODY_LEN, MAX_PACKET_LEN,
};
pub use radio::{synthesize_rssi, LoopbackLink, RadioError, RadioLink, ReceivedFrame, ScanResult, UdpRadioLink};
