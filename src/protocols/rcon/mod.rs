//! Source RCON: packet framing, the authentication/command state machine and
//! an async TCP client.

pub mod client;
pub mod codec;
pub mod packet;
pub mod session;

pub use client::RconClient;
pub use codec::RconCodec;
pub use packet::{
    decode_packet, DecodeMode, DecodeOptions, Direction, RconPacket, RconPacketType,
    TERMINATOR_ID,
};
pub use session::{RconSession, SessionEvent, SessionState};

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub decode_mode: DecodeMode,
    /// Follow every command with a terminator packet so multi-packet
    /// responses can be told apart from the next reply.
    pub terminator_packets: bool,
    pub max_packet_size: usize,
    pub timeout_ms: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            decode_mode: DecodeMode::Strict,
            terminator_packets: true,
            max_packet_size: packet::DEFAULT_MAX_PACKET_SIZE,
            timeout_ms: 5000,
        }
    }
}

impl RconConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn decode_options(&self, direction: Direction) -> DecodeOptions {
        DecodeOptions {
            direction,
            mode: self.decode_mode,
            max_packet_size: self.max_packet_size,
        }
    }
}

/// Positive request ids, wrapping back to 1.
#[derive(Clone, Debug)]
pub struct RequestIds {
    next: i32,
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::starting_at(rand::thread_rng().gen_range(1..=0xFFFF))
    }
}

impl RequestIds {
    pub fn starting_at(first: i32) -> Self {
        Self {
            next: first.max(1),
        }
    }

    pub fn next_id(&mut self) -> i32 {
        let id = self.next;
        self.next = if id == i32::MAX { 1 } else { id + 1 };
        id
    }
}
