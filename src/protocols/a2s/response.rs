use crate::{
    errors::{DecodeError, DecodeResult},
    models::{Environment, Player, Rules, ServerInfo, ServerType, TheShip},
    util::ByteCursor,
};

use derive_more::From;
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;

/// App id of The Ship, whose info responses carry three extra bytes.
const THE_SHIP_APP_ID: u16 = 2400;

const EDF_PORT: u8 = 0x80;
const EDF_STEAM_ID: u8 = 0x10;
const EDF_SPECTATOR: u8 = 0x40;
const EDF_KEYWORDS: u8 = 0x20;
const EDF_GAME_ID: u8 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Primitive)]
pub enum ResponseHeader {
    Challenge = 0x41,
    Info = 0x49,
    Players = 0x44,
    Rules = 0x45,
}

#[derive(Clone, Debug, PartialEq, From)]
pub enum QueryResponse {
    Challenge(i32),
    Info(ServerInfo),
    Players(Vec<Player>),
    Rules(Rules),
}

/// Parses a reassembled single packet payload, dispatching on its first byte.
pub fn parse_response(payload: &[u8]) -> DecodeResult<QueryResponse> {
    let mut cur = ByteCursor::new(payload);
    let raw = cur.read_u8()?;
    let header = ResponseHeader::from_u8(raw).ok_or(DecodeError::UnknownResponseHeader(raw))?;

    Ok(match header {
        ResponseHeader::Challenge => cur.read_i32_le()?.into(),
        ResponseHeader::Info => parse_info(&mut cur)?.into(),
        ResponseHeader::Players => parse_players(&mut cur)?.into(),
        ResponseHeader::Rules => parse_rules(&mut cur)?.into(),
    })
}

fn parse_info(cur: &mut ByteCursor) -> DecodeResult<ServerInfo> {
    let protocol = cur.read_u8()?;
    let name = cur.read_cstring()?;
    let map = cur.read_cstring()?;
    let folder = cur.read_cstring()?;
    let game = cur.read_cstring()?;
    let app_id = cur.read_u16_le()?;
    let players = cur.read_u8()?;
    let max_players = cur.read_u8()?;
    let bots = cur.read_u8()?;
    let server_type = ServerType::from(cur.read_u8()?);
    let environment = Environment::from(cur.read_u8()?);
    let need_pass = cur.read_u8()? != 0;
    let vac = cur.read_u8()? != 0;

    let the_ship = if app_id == THE_SHIP_APP_ID {
        Some(TheShip {
            mode: cur.read_u8()?,
            witnesses: cur.read_u8()?,
            duration: cur.read_u8()?,
        })
    } else {
        None
    };

    let version = cur.read_cstring()?;

    let mut info = ServerInfo {
        protocol,
        name,
        map,
        folder,
        game,
        app_id,
        players,
        max_players,
        bots,
        server_type,
        environment,
        need_pass,
        vac,
        version,
        the_ship,
        port: None,
        steam_id: None,
        spectator_port: None,
        spectator_name: None,
        keywords: None,
        game_id: None,
    };

    if cur.is_empty() {
        return Ok(info);
    }

    let edf = cur.read_u8()?;
    if edf & EDF_PORT != 0 {
        info.port = Some(cur.read_u16_le()?);
    }
    if edf & EDF_STEAM_ID != 0 {
        info.steam_id = Some(cur.read_u64_le()?);
    }
    if edf & EDF_SPECTATOR != 0 {
        info.spectator_port = Some(cur.read_u16_le()?);
        info.spectator_name = Some(cur.read_cstring()?);
    }
    if edf & EDF_KEYWORDS != 0 {
        info.keywords = Some(cur.read_cstring()?);
    }
    if edf & EDF_GAME_ID != 0 {
        info.game_id = Some(cur.read_u64_le()?);
    }

    Ok(info)
}

fn parse_players(cur: &mut ByteCursor) -> DecodeResult<Vec<Player>> {
    let count = cur.read_u8()?;
    (0..count)
        .map(|_| {
            Ok(Player {
                index: cur.read_u8()?,
                name: cur.read_cstring()?,
                score: cur.read_i32_le()?,
                duration: cur.read_f32_le()?,
            })
        })
        .collect()
}

fn parse_rules(cur: &mut ByteCursor) -> DecodeResult<Rules> {
    let count = cur.read_u16_le()?;
    let mut rules = Rules::new();
    for _ in 0..count {
        let name = cur.read_cstring()?;
        let value = cur.read_cstring()?;
        rules.insert(name, value);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_fixtures() -> (Vec<u8>, ServerInfo) {
        let mut data = vec![0x49, 0x11];
        data.extend_from_slice(b"Test Server\0de_dust2\0csgo\0Counter-Strike: Global Offensive\0");
        data.extend_from_slice(&[
            0xda, 0x02, // app id 730
            0x03, 0x18, 0x01, // players, max, bots
            b'd', b'l', 0x00, 0x01,
        ]);
        data.extend_from_slice(b"1.38.7.9\0");
        data.extend_from_slice(&[0xa0, 0x87, 0x69]);
        data.extend_from_slice(b"secure\0");

        let info = ServerInfo {
            protocol: 17,
            name: "Test Server".into(),
            map: "de_dust2".into(),
            folder: "csgo".into(),
            game: "Counter-Strike: Global Offensive".into(),
            app_id: 730,
            players: 3,
            max_players: 24,
            bots: 1,
            server_type: ServerType::Dedicated,
            environment: Environment::Linux,
            need_pass: false,
            vac: true,
            version: "1.38.7.9".into(),
            the_ship: None,
            port: Some(27015),
            steam_id: None,
            spectator_port: None,
            spectator_name: None,
            keywords: Some("secure".into()),
            game_id: None,
        };

        (data, info)
    }

    #[test]
    fn challenge() {
        assert_eq!(
            parse_response(&[0x41, 0x4b, 0xa1, 0xd5, 0x22]).unwrap(),
            QueryResponse::Challenge(0x22d5_a14b)
        );
    }

    #[test]
    fn info_with_extra_data() {
        let (data, expectation) = info_fixtures();
        assert_eq!(
            parse_response(&data).unwrap(),
            QueryResponse::Info(expectation)
        );
    }

    #[test]
    fn info_without_extra_data() {
        let (mut data, mut expectation) = info_fixtures();
        data.truncate(data.len() - 10);
        expectation.port = None;
        expectation.keywords = None;
        assert_eq!(
            parse_response(&data).unwrap(),
            QueryResponse::Info(expectation)
        );
    }

    #[test]
    fn truncated_info() {
        let (data, _) = info_fixtures();
        assert!(parse_response(&data[..20]).unwrap_err().is_recoverable());
    }

    #[test]
    fn players() {
        let mut data = vec![0x44, 0x02];
        data.push(0);
        data.extend_from_slice(b"alice\0");
        data.extend_from_slice(&12i32.to_le_bytes());
        data.extend_from_slice(&90.5f32.to_le_bytes());
        data.push(1);
        data.extend_from_slice(b"bob\0");
        data.extend_from_slice(&(-1i32).to_le_bytes());
        data.extend_from_slice(&3.0f32.to_le_bytes());

        assert_eq!(
            parse_response(&data).unwrap(),
            QueryResponse::Players(vec![
                Player {
                    index: 0,
                    name: "alice".into(),
                    score: 12,
                    duration: 90.5,
                },
                Player {
                    index: 1,
                    name: "bob".into(),
                    score: -1,
                    duration: 3.0,
                },
            ])
        );
    }

    #[test]
    fn rules() {
        let mut data = vec![0x45, 0x02, 0x00];
        data.extend_from_slice(b"mp_timelimit\x0030\0sv_cheats\x000\0");

        let rules = match parse_response(&data).unwrap() {
            QueryResponse::Rules(rules) => rules,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(rules.len(), 2);
        assert_eq!(rules["mp_timelimit"], "30");
        assert_eq!(rules["sv_cheats"], "0");
    }

    #[test]
    fn unknown_header() {
        assert_eq!(
            parse_response(&[0x6d, 0x00]),
            Err(DecodeError::UnknownResponseHeader(0x6d))
        );
    }
}
