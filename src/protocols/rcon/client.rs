use super::{
    codec::RconCodec,
    session::{RconSession, SessionEvent},
    RconConfig,
};
use crate::errors::RconError;

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{
    net::{TcpStream, ToSocketAddrs},
    time::timeout,
};
use tokio_util::codec::Framed;
use tracing::debug;

/// Source RCON client over a single TCP connection.
#[derive(Debug)]
pub struct RconClient {
    framed: Framed<TcpStream, RconCodec>,
    session: RconSession,
    timeout: Duration,
}

impl RconClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: RconConfig) -> Result<Self, RconError> {
        let stream = timeout(config.timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| RconError::Timeout)??;
        stream.set_nodelay(true)?;
        debug!("Connected to RCON server {}", stream.peer_addr()?);

        Ok(Self::from_stream(stream, config))
    }

    pub fn from_stream(stream: TcpStream, config: RconConfig) -> Self {
        Self {
            framed: Framed::new(stream, RconCodec::client(&config)),
            session: RconSession::new(&config),
            timeout: config.timeout(),
        }
    }

    pub fn session(&self) -> &RconSession {
        &self.session
    }

    /// Drops authentication locally; later commands fail until re-authenticated.
    pub fn invalidate(&mut self) {
        self.session.invalidate();
    }

    pub async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let packet = self.session.authenticate(password)?;
        self.framed.send(packet).await?;

        match self.next_event().await? {
            SessionEvent::Authenticated => Ok(()),
            SessionEvent::Response { .. } => Err(RconError::NotAuthenticated),
        }
    }

    /// Runs a command and returns its complete output.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        let packets = self.session.command(command)?;
        for packet in packets {
            self.framed.feed(packet).await?;
        }
        self.framed.flush().await?;

        match self.next_event().await? {
            SessionEvent::Response { body, .. } => Ok(String::from_utf8_lossy(&body).into_owned()),
            SessionEvent::Authenticated => Err(RconError::NotAuthenticated),
        }
    }

    async fn next_event(&mut self) -> Result<SessionEvent, RconError> {
        let result = timeout(
            self.timeout,
            recv_event(&mut self.framed, &mut self.session),
        )
        .await;

        match result {
            Ok(event) => event,
            Err(_) => {
                if let Some(id) = self.session.abandon() {
                    debug!("RCON request {} timed out", id);
                }
                Err(RconError::Timeout)
            }
        }
    }

    pub async fn close(mut self) -> Result<(), RconError> {
        self.session.close();
        self.framed.close().await
    }
}

async fn recv_event(
    framed: &mut Framed<TcpStream, RconCodec>,
    session: &mut RconSession,
) -> Result<SessionEvent, RconError> {
    loop {
        let packet = framed.next().await.ok_or(RconError::Closed)??;
        if let Some(event) = session.handle_packet(packet)? {
            return Ok(event);
        }
    }
}
