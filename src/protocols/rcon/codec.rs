use super::{
    packet::{
        decode_packet, DecodeOptions, Direction, RconPacket, MAX_BODY_SIZE, SIZE_FIELD_LEN,
    },
    RconConfig,
};
use crate::{
    errors::{DecodeError, RconError},
    util::hex_dump,
};

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Stream codec for Source RCON frames.
///
/// A partial frame leaves the buffer untouched and yields `Ok(None)`.
#[derive(Clone, Debug)]
pub struct RconCodec {
    options: DecodeOptions,
}

impl Default for RconCodec {
    fn default() -> Self {
        Self::client(&RconConfig::default())
    }
}

impl RconCodec {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Decodes server responses.
    pub fn client(config: &RconConfig) -> Self {
        Self::new(config.decode_options(Direction::Response))
    }

    /// Decodes client requests.
    pub fn server(config: &RconConfig) -> Self {
        Self::new(config.decode_options(Direction::Request))
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }
}

impl Decoder for RconCodec {
    type Item = RconPacket;
    type Error = RconError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match decode_packet(buf, &self.options) {
                Ok(Some((packet, used))) => {
                    trace!("Decoded RCON frame: {}", hex_dump(&buf[..used]));
                    buf.advance(used);
                    return Ok(Some(packet));
                }
                Ok(None) => {
                    trace!("Skipping empty RCON size field");
                    buf.advance(SIZE_FIELD_LEN);
                }
                Err(DecodeError::InsufficientBytes {
                    declared,
                    available,
                }) => {
                    buf.reserve(declared - available);
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Encoder<RconPacket> for RconCodec {
    type Error = RconError;

    fn encode(&mut self, item: RconPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.body.len() > MAX_BODY_SIZE {
            return Err(RconError::BodyTooLarge(item.body.len()));
        }
        let start = dst.len();
        item.encode(dst);
        trace!("Encoded RCON frame: {}", hex_dump(&dst[start..]));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::rcon::packet::RconPacketType;

    #[test]
    fn decodes_frames_split_across_reads() {
        let mut codec = RconCodec::default();
        let first = RconPacket::new(4, RconPacketType::ResponseValue, "hostname: a");
        let second = RconPacket::terminator();

        let mut wire = BytesMut::new();
        codec.encode(first.clone(), &mut wire).unwrap();
        codec.encode(second.clone(), &mut wire).unwrap();

        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in wire.chunks(3) {
            buf.extend_from_slice(chunk);
            while let Some(packet) = codec.decode(&mut buf).unwrap() {
                out.push(packet);
            }
        }

        assert_eq!(out, vec![first, second]);
        assert!(buf.is_empty());
    }

    #[test]
    fn skips_empty_size_fields() {
        let mut codec = RconCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        buf.extend_from_slice(&RconPacket::new(2, RconPacketType::AuthResponse, "").to_bytes());

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.id, 2);
        assert_eq!(packet.kind, RconPacketType::AuthResponse);
        assert!(buf.is_empty());
    }

    #[test]
    fn server_codec_reads_requests() {
        let mut codec = RconCodec::server(&RconConfig::default());
        let mut buf = BytesMut::new();
        codec.encode(RconPacket::auth(9, "hunter2"), &mut buf).unwrap();

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.kind, RconPacketType::Auth);
        assert_eq!(packet.body_str(), "hunter2");
    }

    #[test]
    fn malformed_frames_are_errors() {
        let mut codec = RconCodec::default();
        let mut buf = BytesMut::from(&RconPacket::auth(9, "x").to_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(RconError::Decode(DecodeError::InvalidPacketType(3)))
        ));
    }

    #[test]
    fn oversized_bodies_are_rejected() {
        let mut codec = RconCodec::default();
        let mut buf = BytesMut::new();
        let body = vec![b'a'; MAX_BODY_SIZE + 1];
        assert!(matches!(
            codec.encode(RconPacket::command(1, body), &mut buf),
            Err(RconError::BodyTooLarge(_))
        ));
        assert!(buf.is_empty());
    }
}
