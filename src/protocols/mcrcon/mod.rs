//! Minecraft RCON.
//!
//! Same little-endian `size | id | type | body | 0x00 0x00` layout as Source
//! RCON, but a rejected login is signalled by a response id of `-1` rather
//! than by a dedicated packet type, and bodies are UTF-8 text.

use crate::{
    errors::{DecodeError, DecodeResult, RconError},
    util::{hex_dump, ByteCursor},
};

use bytes::{Buf, BufMut, BytesMut};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Smallest complete frame: size, id, type and two null bytes.
pub const MIN_FRAME_LEN: usize = 14;
pub const MIN_PACKET_SIZE: i32 = 10;
pub const MAX_REQUEST_BODY: usize = 1446;
pub const MAX_RESPONSE_BODY: usize = 4096;
pub const AUTH_FAILED_ID: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Primitive)]
pub enum McRequestType {
    Login = 3,
    Command = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Primitive)]
pub enum McResponseType {
    Response = 0,
    AuthResponse = 2,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McRequest {
    pub id: i32,
    pub kind: McRequestType,
    pub body: String,
}

impl McRequest {
    pub fn login(id: i32, password: &str) -> Self {
        Self {
            id,
            kind: McRequestType::Login,
            body: password.to_owned(),
        }
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self {
            id,
            kind: McRequestType::Command,
            body: command.to_owned(),
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), RconError> {
        if self.body.len() > MAX_REQUEST_BODY {
            return Err(RconError::BodyTooLarge(self.body.len()));
        }
        dst.reserve(MIN_FRAME_LEN + self.body.len());
        dst.put_i32_le(self.body.len() as i32 + MIN_PACKET_SIZE);
        dst.put_i32_le(self.id);
        dst.put_i32_le(self.kind as i32);
        dst.put_slice(self.body.as_bytes());
        dst.put_slice(&[0, 0]);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McResponse {
    pub id: i32,
    pub kind: McResponseType,
    pub body: String,
}

impl McResponse {
    pub fn is_auth_failure(&self) -> bool {
        self.id == AUTH_FAILED_ID
    }
}

/// Decodes one response from the front of `buf`, returning it with the
/// number of bytes it occupied.
pub fn decode_response(buf: &[u8]) -> DecodeResult<(McResponse, usize)> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(DecodeError::InsufficientBytes {
            declared: MIN_FRAME_LEN,
            available: buf.len(),
        });
    }

    let mut cur = ByteCursor::new(buf);
    let size = cur.read_i32_le()?;
    if size < MIN_PACKET_SIZE || size as usize > MAX_RESPONSE_BODY + MIN_PACKET_SIZE as usize {
        return Err(DecodeError::InvalidPacketSize(size));
    }
    let declared = size as usize;
    if cur.remaining() < declared {
        return Err(DecodeError::InsufficientBytes {
            declared,
            available: cur.remaining(),
        });
    }

    let id = cur.read_i32_le()?;
    let raw_type = cur.read_i32_le()?;
    let kind = McResponseType::from_i32(raw_type).ok_or(DecodeError::InvalidPacketType(raw_type))?;

    let payload = cur.read_bytes(declared - 8)?;
    let (body, padding) = payload.split_at(payload.len() - 2);
    if padding != [0, 0] {
        return Err(DecodeError::MalformedPacket("missing null padding"));
    }

    Ok((
        McResponse {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        },
        cur.position(),
    ))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MinecraftRconCodec;

impl Decoder for MinecraftRconCodec {
    type Item = McResponse;
    type Error = RconError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_response(buf) {
            Ok((response, used)) => {
                trace!("Decoded Minecraft RCON frame: {}", hex_dump(&buf[..used]));
                buf.advance(used);
                Ok(Some(response))
            }
            Err(DecodeError::InsufficientBytes {
                declared,
                available,
            }) => {
                buf.reserve(declared - available);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Encoder<McRequest> for MinecraftRconCodec {
    type Error = RconError;

    fn encode(&mut self, item: McRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst)
    }
}
