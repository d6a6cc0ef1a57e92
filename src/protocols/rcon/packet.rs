//! Source RCON packet framing.
//!
//! | Field      | Type     | Size    |
//! | ---------- | -------- | ------- |
//! | Size       | i32 (LE) | 4 bytes |
//! | ID         | i32 (LE) | 4 bytes |
//! | Type       | i32 (LE) | 4 bytes |
//! | Body       | bytes    | 1+      |
//! | Terminator | u8       | 1 byte  |
//!
//! `size` counts everything after itself, so an empty body yields 10.

use crate::{
    errors::{DecodeError, DecodeResult},
    util::ByteCursor,
};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Id of terminator packets and of rejected auth responses.
pub const TERMINATOR_ID: i32 = -1;
/// Terminator byte of the companion packet a server sends after echoing a terminator.
pub const COMPANION_TERMINATOR: u8 = 0x01;

pub const SIZE_FIELD_LEN: usize = 4;
/// Bytes counted by `size` besides the null-terminated body: id, type, terminator.
pub const HEADER_OVERHEAD: usize = 9;
pub const MIN_PACKET_SIZE: i32 = 10;
pub const MAX_BODY_SIZE: usize = 4096;
pub const DEFAULT_MAX_PACKET_SIZE: usize = MAX_BODY_SIZE + MIN_PACKET_SIZE as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RconPacketType {
    Auth,
    AuthResponse,
    ExecCommand,
    ResponseValue,
}

/// Which side of the conversation produced the bytes being decoded.
///
/// `SERVERDATA_AUTH_RESPONSE` and `SERVERDATA_EXECCOMMAND` share a value, so
/// the type field only has meaning relative to a direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Server to client.
    Response,
    /// Client to server.
    Request,
}

impl RconPacketType {
    pub fn to_i32(self) -> i32 {
        match self {
            RconPacketType::Auth => SERVERDATA_AUTH,
            RconPacketType::AuthResponse => SERVERDATA_AUTH_RESPONSE,
            RconPacketType::ExecCommand => SERVERDATA_EXECCOMMAND,
            RconPacketType::ResponseValue => SERVERDATA_RESPONSE_VALUE,
        }
    }

    pub fn from_wire(value: i32, direction: Direction) -> DecodeResult<Self> {
        match (direction, value) {
            (Direction::Response, SERVERDATA_RESPONSE_VALUE) => Ok(RconPacketType::ResponseValue),
            (Direction::Response, SERVERDATA_AUTH_RESPONSE) => Ok(RconPacketType::AuthResponse),
            (Direction::Request, SERVERDATA_AUTH) => Ok(RconPacketType::Auth),
            (Direction::Request, SERVERDATA_EXECCOMMAND) => Ok(RconPacketType::ExecCommand),
            (Direction::Request, SERVERDATA_RESPONSE_VALUE) => Ok(RconPacketType::ResponseValue),
            (_, other) => Err(DecodeError::InvalidPacketType(other)),
        }
    }
}

/// How to treat a body that carries no null terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Reject the packet.
    Strict,
    /// Take `size - 9` bytes as the body.
    Lenient,
}

impl Default for DecodeMode {
    fn default() -> Self {
        DecodeMode::Strict
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    pub direction: Direction,
    pub mode: DecodeMode,
    pub max_packet_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Response,
            mode: DecodeMode::Strict,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: RconPacketType,
    /// Payload without its null terminator.
    pub body: Bytes,
    /// Trailing byte as read from the wire; always written as `0x00`.
    pub terminator: u8,
}

impl RconPacket {
    pub fn new(id: i32, kind: RconPacketType, body: impl Into<Bytes>) -> Self {
        let mut body = body.into();
        if body.last() == Some(&0) {
            body.truncate(body.len() - 1);
        }
        Self {
            id,
            kind,
            body,
            terminator: 0,
        }
    }

    pub fn auth(id: i32, password: impl Into<Bytes>) -> Self {
        Self::new(id, RconPacketType::Auth, password)
    }

    pub fn command(id: i32, command: impl Into<Bytes>) -> Self {
        Self::new(id, RconPacketType::ExecCommand, command)
    }

    /// Empty response-value packet a client appends after a command. The server
    /// echoes it once the command output has been sent in full.
    pub fn terminator() -> Self {
        Self::new(TERMINATOR_ID, RconPacketType::ResponseValue, Bytes::new())
    }

    pub fn is_terminator(&self) -> bool {
        self.id == TERMINATOR_ID
            && self.kind == RconPacketType::ResponseValue
            && self.terminator != COMPANION_TERMINATOR
    }

    pub fn is_companion(&self) -> bool {
        self.id == TERMINATOR_ID
            && self.kind == RconPacketType::ResponseValue
            && self.terminator == COMPANION_TERMINATOR
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    fn needs_body_null(&self) -> bool {
        self.body.last() != Some(&0)
    }

    /// Value of the size field this packet encodes to.
    pub fn size(&self) -> i32 {
        (self.body.len() + usize::from(self.needs_body_null()) + HEADER_OVERHEAD) as i32
    }

    pub fn encoded_len(&self) -> usize {
        SIZE_FIELD_LEN + self.size() as usize
    }

    /// Writes the frame. A body that already ends in a null is written
    /// verbatim; any other body, including an empty one, gets a null appended
    /// before the trailing terminator.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_i32_le(self.size());
        dst.put_i32_le(self.id);
        dst.put_i32_le(self.kind.to_i32());
        dst.put_slice(&self.body);
        if self.needs_body_null() {
            dst.put_u8(0);
        }
        dst.put_u8(0);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out.freeze()
    }
}

pub fn is_valid_request_id(id: i32) -> bool {
    id == TERMINATOR_ID || id > 0
}

/// Decodes one frame from the front of `buf`.
///
/// Returns the packet and the number of bytes it occupied, or `None` when the
/// size field is zero or negative, which marks the end of useful data.
pub fn decode_packet(
    buf: &[u8],
    options: &DecodeOptions,
) -> DecodeResult<Option<(RconPacket, usize)>> {
    if buf.len() < SIZE_FIELD_LEN {
        return Err(DecodeError::InsufficientBytes {
            declared: SIZE_FIELD_LEN,
            available: buf.len(),
        });
    }

    let mut cur = ByteCursor::new(buf);
    let size = cur.read_i32_le()?;
    if size <= 0 {
        return Ok(None);
    }

    let declared = size as usize;
    if declared > options.max_packet_size {
        return Err(DecodeError::InvalidPacketSize(size));
    }
    if cur.remaining() < declared {
        return Err(DecodeError::InsufficientBytes {
            declared,
            available: cur.remaining(),
        });
    }
    if size < MIN_PACKET_SIZE {
        return Err(DecodeError::InvalidPacketSize(size));
    }

    let frame_len = SIZE_FIELD_LEN + declared;
    let mut frame = ByteCursor::new(&buf[SIZE_FIELD_LEN..frame_len]);

    let id = frame.read_i32_le()?;
    if !is_valid_request_id(id) {
        return Err(DecodeError::InvalidRequestId(id));
    }

    let kind = RconPacketType::from_wire(frame.read_i32_le()?, options.direction)?;

    let body = match frame.bytes_before(0) {
        Some(len) => {
            let body = frame.read_bytes(len)?;
            // In lenient mode a lone trailing null is the packet terminator.
            if options.mode == DecodeMode::Strict || frame.remaining() != 1 {
                frame.skip(1)?;
            }
            body
        }
        None => match options.mode {
            DecodeMode::Strict => {
                return Err(DecodeError::MalformedPacket("body is not null-terminated"))
            }
            DecodeMode::Lenient => frame.read_bytes(declared - HEADER_OVERHEAD)?,
        },
    };

    let terminator = frame
        .read_u8()
        .map_err(|_| DecodeError::MalformedPacket("missing packet terminator"))?;
    if terminator != 0x00 && terminator != COMPANION_TERMINATOR {
        return Err(DecodeError::MalformedPacket("invalid packet terminator"));
    }

    Ok(Some((
        RconPacket {
            id,
            kind,
            body: Bytes::copy_from_slice(body),
            terminator,
        },
        frame_len,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixtures() -> (RconPacket, Vec<u8>) {
        let packet = RconPacket::command(5, "status");
        let data = vec![
            0x10, 0x00, 0x00, 0x00, // size
            0x05, 0x00, 0x00, 0x00, // id
            0x02, 0x00, 0x00, 0x00, // type
            b's', b't', b'a', b't', b'u', b's', 0x00, // body
            0x00, // terminator
        ];
        (packet, data)
    }

    fn request_options() -> DecodeOptions {
        DecodeOptions {
            direction: Direction::Request,
            ..DecodeOptions::default()
        }
    }

    #[test]
    fn encodes_command() {
        let (packet, data) = fixtures();
        assert_eq!(packet.to_bytes().as_ref(), data.as_slice());
        assert_eq!(packet.size(), 16);
        assert_eq!(packet.encoded_len(), 20);
    }

    #[test]
    fn body_with_own_null_is_written_verbatim() {
        let mut packet = RconPacket::command(5, "status");
        packet.body = Bytes::from_static(b"status\0");
        let (_, data) = fixtures();
        assert_eq!(packet.to_bytes().as_ref(), data.as_slice());
    }

    #[test]
    fn decodes_command_as_request() {
        let (packet, data) = fixtures();
        let (decoded, used) = decode_packet(&data, &request_options()).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.body_str(), "status");
        assert_eq!(used, data.len());
    }

    // Quirk kept for wire compatibility: an empty body still carries a
    // placeholder null, so the frame has two trailing zero bytes.
    #[test]
    fn empty_body_frame() {
        let packet = RconPacket::terminator();
        let data = packet.to_bytes();
        assert_eq!(
            data.as_ref(),
            &[
                0x0a, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00
            ]
        );
        assert_eq!(packet.size(), 10);

        let (decoded, _) = decode_packet(&data, &DecodeOptions::default())
            .unwrap()
            .unwrap();
        assert!(decoded.body.is_empty());
        assert!(decoded.is_terminator());
    }

    #[test]
    fn round_trips_responses() {
        for (id, kind, body) in [
            (1, RconPacketType::ResponseValue, &b"hostname: test"[..]),
            (7, RconPacketType::AuthResponse, &b""[..]),
            (i32::MAX, RconPacketType::ResponseValue, &b"x"[..]),
        ] {
            let packet = RconPacket::new(id, kind, Bytes::copy_from_slice(body));
            let (decoded, _) = decode_packet(&packet.to_bytes(), &DecodeOptions::default())
                .unwrap()
                .unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn truncated_frames_are_insufficient() {
        let (_, data) = fixtures();
        for len in 0..data.len() {
            let err = decode_packet(&data[..len], &request_options()).unwrap_err();
            assert!(
                matches!(err, DecodeError::InsufficientBytes { .. }),
                "len {}: {:?}",
                len,
                err
            );
        }
    }

    #[test]
    fn non_positive_size_is_end_of_data() {
        assert_eq!(decode_packet(&[0, 0, 0, 0], &DecodeOptions::default()), Ok(None));
        assert_eq!(
            decode_packet(&[0xff, 0xff, 0xff, 0xff, 1, 2], &DecodeOptions::default()),
            Ok(None)
        );
    }

    #[test]
    fn rejects_bad_fields() {
        let mut data = RconPacket::new(3, RconPacketType::ResponseValue, "ok").to_bytes().to_vec();

        data[4..8].copy_from_slice(&(-5i32).to_le_bytes());
        assert_eq!(
            decode_packet(&data, &DecodeOptions::default()),
            Err(DecodeError::InvalidRequestId(-5))
        );

        data[4..8].copy_from_slice(&3i32.to_le_bytes());
        data[8..12].copy_from_slice(&3i32.to_le_bytes());
        assert_eq!(
            decode_packet(&data, &DecodeOptions::default()),
            Err(DecodeError::InvalidPacketType(3))
        );

        data[8..12].copy_from_slice(&0i32.to_le_bytes());
        let last = data.len() - 1;
        data[last] = 0x07;
        assert!(matches!(
            decode_packet(&data, &DecodeOptions::default()),
            Err(DecodeError::MalformedPacket(_))
        ));
    }

    #[test]
    fn size_bounds() {
        let mut small = vec![0x09, 0, 0, 0];
        small.extend_from_slice(&[0; 9]);
        assert_eq!(
            decode_packet(&small, &DecodeOptions::default()),
            Err(DecodeError::InvalidPacketSize(9))
        );

        let huge = (DEFAULT_MAX_PACKET_SIZE as i32 + 1).to_le_bytes();
        assert_eq!(
            decode_packet(&huge, &DecodeOptions::default()),
            Err(DecodeError::InvalidPacketSize(DEFAULT_MAX_PACKET_SIZE as i32 + 1))
        );
    }

    #[test]
    fn missing_body_null_depends_on_mode() {
        // id, type, "abcd" and a companion terminator, no body null.
        let mut data = vec![0x0d, 0, 0, 0, 0x02, 0, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(b"abcd");
        data.push(0x01);
        assert_eq!(
            decode_packet(&data, &DecodeOptions::default()),
            Err(DecodeError::MalformedPacket("body is not null-terminated"))
        );

        let lenient = DecodeOptions {
            mode: DecodeMode::Lenient,
            ..DecodeOptions::default()
        };
        let (packet, used) = decode_packet(&data, &lenient).unwrap().unwrap();
        assert_eq!(packet.body.as_ref(), b"abcd");
        assert_eq!(packet.terminator, COMPANION_TERMINATOR);
        assert_eq!(used, data.len());
    }

    #[test]
    fn lenient_accepts_single_trailing_null() {
        // "abcd" followed by just one null: size 13.
        let mut data = vec![0x0d, 0, 0, 0, 0x02, 0, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(b"abcd\0");

        assert_eq!(
            decode_packet(&data, &DecodeOptions::default()),
            Err(DecodeError::MalformedPacket("missing packet terminator"))
        );

        let lenient = DecodeOptions {
            mode: DecodeMode::Lenient,
            ..DecodeOptions::default()
        };
        let (packet, _) = decode_packet(&data, &lenient).unwrap().unwrap();
        assert_eq!(packet.body_str(), "abcd");
    }

    #[test]
    fn companion_packet_is_tolerated() {
        let data = [
            0x0c, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00,
        ];
        let (packet, used) = decode_packet(&data, &DecodeOptions::default())
            .unwrap()
            .unwrap();
        assert!(packet.body.is_empty());
        assert!(packet.is_companion());
        assert!(!packet.is_terminator());
        assert_eq!(used, data.len());
    }

    fn kinds() -> impl Strategy<Value = (Direction, RconPacketType)> {
        prop_oneof![
            Just((Direction::Response, RconPacketType::ResponseValue)),
            Just((Direction::Response, RconPacketType::AuthResponse)),
            Just((Direction::Request, RconPacketType::Auth)),
            Just((Direction::Request, RconPacketType::ExecCommand)),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(body in "[ -~]{0,200}", id in 1i32..=i32::MAX, (direction, kind) in kinds()) {
            let packet = RconPacket::new(id, kind, body);
            let wire = packet.to_bytes();
            let options = DecodeOptions { direction, ..DecodeOptions::default() };

            let (decoded, used) = decode_packet(&wire, &options).unwrap().unwrap();
            prop_assert_eq!(decoded, packet);
            prop_assert_eq!(used, wire.len());
        }

        #[test]
        fn prefixes_of_a_frame_wait_for_more(body in "[ -~]{0,64}", id in 1i32..1000, cut in 0usize..100) {
            let wire = RconPacket::new(id, RconPacketType::ResponseValue, body).to_bytes();
            let cut = cut % wire.len();
            let err = decode_packet(&wire[..cut], &DecodeOptions::default()).unwrap_err();
            prop_assert!(err.is_recoverable());
        }

        #[test]
        fn arbitrary_input_never_overreads(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            for mode in [DecodeMode::Strict, DecodeMode::Lenient] {
                let options = DecodeOptions { mode, ..DecodeOptions::default() };
                if let Ok(Some((_, used))) = decode_packet(&data, &options) {
                    prop_assert!(used <= data.len());
                }
            }
        }
    }
}
