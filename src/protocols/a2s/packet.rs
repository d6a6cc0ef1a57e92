use super::{SINGLE_PACKET_HEADER, SPLIT_PACKET_HEADER};
use crate::{
    errors::{DecodeError, DecodeResult},
    util::ByteCursor,
};

use bytes::Bytes;
use tracing::trace;

/// Bit 31 of a split packet request id marks a bzip2 compressed response.
pub const COMPRESSION_FLAG: u32 = 0x8000_0000;

/// Default split size for Source servers, used when the fragment header omits it.
pub const DEFAULT_SPLIT_SIZE: u16 = 1248;

/// One numbered piece of a split response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitPacketFragment {
    pub request_id: i32,
    pub packet_number: u8,
    pub packet_count: u8,
    pub max_packet_size: u16,
    pub compressed: bool,
    pub decompressed_size: Option<i32>,
    pub crc32: Option<u32>,
    pub payload: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryPacket {
    /// Payload of a single packet response, starting at its type byte.
    Single(Bytes),
    Split(SplitPacketFragment),
}

/// Decodes one datagram.
///
/// Datagrams carrying neither the single nor the split header are noise and
/// yield `Ok(None)`.
pub fn decode_datagram(datagram: &Bytes) -> DecodeResult<Option<QueryPacket>> {
    let mut cur = ByteCursor::new(datagram);
    let header = cur.read_i32_le()?;

    match header {
        SINGLE_PACKET_HEADER => Ok(Some(QueryPacket::Single(
            datagram.slice(cur.position()..),
        ))),
        SPLIT_PACKET_HEADER => decode_fragment(datagram, cur).map(|f| Some(QueryPacket::Split(f))),
        other => {
            trace!("Discarding datagram with header 0x{:08x}", other as u32);
            Ok(None)
        }
    }
}

fn decode_fragment(datagram: &Bytes, mut cur: ByteCursor) -> DecodeResult<SplitPacketFragment> {
    let raw_id = cur.read_u32_le()?;
    let compressed = raw_id & COMPRESSION_FLAG != 0;
    let request_id = (raw_id & !COMPRESSION_FLAG) as i32;

    let packet_count = cur.read_u8()?;
    let packet_number = cur.read_u8()?;
    if packet_count == 0 {
        return Err(DecodeError::MalformedPacket("split packet count is zero"));
    }
    if packet_number >= packet_count {
        return Err(DecodeError::MalformedPacket("split packet number out of range"));
    }

    let (max_packet_size, decompressed_size, crc32) = if compressed {
        let size = cur.read_i32_le()?;
        if size < 0 {
            return Err(DecodeError::MalformedPacket("negative decompressed size"));
        }
        let crc = cur.read_u32_le()?;
        (DEFAULT_SPLIT_SIZE, Some(size), Some(crc))
    } else {
        (cur.read_u16_le()?, None, None)
    };

    Ok(SplitPacketFragment {
        request_id,
        packet_number,
        packet_count,
        max_packet_size,
        compressed,
        decompressed_size,
        crc32,
        payload: datagram.slice(cur.position()..),
    })
}
