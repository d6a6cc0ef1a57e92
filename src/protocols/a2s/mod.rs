//! Source engine UDP server queries (`A2S_*`).
//!
//! Responses arrive either as one datagram prefixed with `FF FF FF FF`, or
//! split across several `FE FF FF FF` datagrams that are collected by a
//! [`SplitPacketReassembler`] and optionally bzip2 compressed.

pub mod client;
pub mod codec;
pub mod packet;
pub mod reassembly;
pub mod response;

pub use self::{
    client::QueryClient,
    codec::QueryCodec,
    packet::{decode_datagram, QueryPacket, SplitPacketFragment},
    reassembly::SplitPacketReassembler,
    response::{parse_response, QueryResponse},
};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SINGLE_PACKET_HEADER: i32 = -1;
pub const SPLIT_PACKET_HEADER: i32 = -2;

pub const A2S_INFO: u8 = 0x54;
pub const A2S_PLAYER: u8 = 0x55;
pub const A2S_RULES: u8 = 0x56;

pub const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";

/// Challenge value that asks the server to issue a real one.
pub const CHALLENGE_REQUEST: i32 = -1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub timeout_ms: u64,
    /// Upper bound on a declared decompressed response size.
    pub max_decompressed_size: usize,
    /// Run bzip2 decompression on the blocking thread pool.
    pub offload_decompression: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            max_decompressed_size: 1 << 20,
            offload_decompression: true,
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryRequest {
    Info { challenge: Option<i32> },
    Players { challenge: i32 },
    Rules { challenge: i32 },
}

impl QueryRequest {
    pub fn info() -> Self {
        QueryRequest::Info { challenge: None }
    }

    pub fn players() -> Self {
        QueryRequest::Players {
            challenge: CHALLENGE_REQUEST,
        }
    }

    pub fn rules() -> Self {
        QueryRequest::Rules {
            challenge: CHALLENGE_REQUEST,
        }
    }

    /// Same request, answering a server issued challenge.
    pub fn with_challenge(self, challenge: i32) -> Self {
        match self {
            QueryRequest::Info { .. } => QueryRequest::Info {
                challenge: Some(challenge),
            },
            QueryRequest::Players { .. } => QueryRequest::Players { challenge },
            QueryRequest::Rules { .. } => QueryRequest::Rules { challenge },
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(4 + 1 + INFO_PAYLOAD.len() + 4);
        dst.put_i32_le(SINGLE_PACKET_HEADER);
        match *self {
            QueryRequest::Info { challenge } => {
                dst.put_u8(A2S_INFO);
                dst.put_slice(INFO_PAYLOAD);
                if let Some(challenge) = challenge {
                    dst.put_i32_le(challenge);
                }
            }
            QueryRequest::Players { challenge } => {
                dst.put_u8(A2S_PLAYER);
                dst.put_i32_le(challenge);
            }
            QueryRequest::Rules { challenge } => {
                dst.put_u8(A2S_RULES);
                dst.put_i32_le(challenge);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode(&mut out);
        out.freeze()
    }
}
