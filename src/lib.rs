//!
//! Asynchronous utilities for querying and controlling game servers.
//!
//! The `gsq` crate implements the binary framing of Source RCON, Minecraft
//! RCON, the Source UDP query protocol (including split and compressed
//! responses) and the Steam master server address list, together with
//! `tokio` clients built on top of them.

pub mod errors;
pub mod models;
pub mod protocols;
pub mod util;

pub use crate::{
    errors::{DecodeError, Error, QueryError, RconError, ReassemblyError, Result},
    models::*,
    protocols::{
        a2s::{QueryClient, QueryConfig},
        rcon::{RconClient, RconConfig},
    },
};
