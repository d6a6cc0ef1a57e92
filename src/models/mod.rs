use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server rules (console variables) as reported by `A2S_RULES`.
pub type Rules = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerType {
    Dedicated,
    NonDedicated,
    SourceTv,
    Other(u8),
}

impl From<u8> for ServerType {
    fn from(v: u8) -> Self {
        match v {
            b'd' | b'D' => ServerType::Dedicated,
            b'l' | b'L' => ServerType::NonDedicated,
            b'p' | b'P' => ServerType::SourceTv,
            other => ServerType::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Linux,
    Windows,
    Mac,
    Other(u8),
}

impl From<u8> for Environment {
    fn from(v: u8) -> Self {
        match v {
            b'l' | b'L' => Environment::Linux,
            b'w' | b'W' => Environment::Windows,
            b'm' | b'o' => Environment::Mac,
            other => Environment::Other(other),
        }
    }
}

/// Extra `A2S_INFO` fields sent by The Ship servers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheShip {
    pub mode: u8,
    pub witnesses: u8,
    pub duration: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub protocol: u8,
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub app_id: u16,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub server_type: ServerType,
    pub environment: Environment,
    pub need_pass: bool,
    pub vac: bool,
    pub version: String,

    // Optional fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub the_ship: Option<TheShip>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectator_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectator_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub index: u8,
    pub name: String,
    pub score: i32,
    /// Seconds connected.
    pub duration: f32,
}
