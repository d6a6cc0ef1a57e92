use super::{
    packet::{RconPacket, RconPacketType, MAX_BODY_SIZE, TERMINATOR_ID},
    RconConfig, RequestIds,
};
use crate::errors::{AuthFailureReason, RconError};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Authenticated,
    Response { request_id: i32, body: Bytes },
}

#[derive(Debug)]
enum Pending {
    Auth {
        id: i32,
    },
    Command {
        id: i32,
        terminated: bool,
        body: BytesMut,
    },
}

impl Pending {
    fn id(&self) -> i32 {
        match self {
            Pending::Auth { id } | Pending::Command { id, .. } => *id,
        }
    }
}

/// Per-connection RCON state. Source RCON is strictly request/response, so at
/// most one request is outstanding at any time.
///
/// The session never touches a transport: it hands back the packets to write
/// and consumes the packets read.
#[derive(Debug)]
pub struct RconSession {
    state: SessionState,
    pending: Option<Pending>,
    ids: RequestIds,
    terminator_packets: bool,
    /// Terminator echoes still due for abandoned commands.
    owed_terminators: usize,
}

impl Default for RconSession {
    fn default() -> Self {
        Self::new(&RconConfig::default())
    }
}

impl RconSession {
    pub fn new(config: &RconConfig) -> Self {
        Self::with_ids(config, RequestIds::default())
    }

    pub fn with_ids(config: &RconConfig, ids: RequestIds) -> Self {
        Self {
            state: SessionState::Unauthenticated,
            pending: None,
            ids,
            terminator_packets: config.terminator_packets,
            owed_terminators: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn pending_request_id(&self) -> Option<i32> {
        self.pending.as_ref().map(Pending::id)
    }

    fn ensure_idle(&self) -> Result<(), RconError> {
        if self.state == SessionState::Closed {
            return Err(RconError::Closed);
        }
        match &self.pending {
            Some(pending) => Err(RconError::RequestInFlight(pending.id())),
            None => Ok(()),
        }
    }

    /// Starts authentication and returns the packet to send.
    pub fn authenticate(&mut self, password: &str) -> Result<RconPacket, RconError> {
        self.ensure_idle()?;
        if password.len() > MAX_BODY_SIZE {
            return Err(RconError::BodyTooLarge(password.len()));
        }

        let id = self.ids.next_id();
        self.pending = Some(Pending::Auth { id });
        self.state = SessionState::Authenticating;
        debug!("RCON session authenticating with request id {}", id);

        Ok(RconPacket::auth(id, password.to_owned()))
    }

    /// Queues a command and returns the packets to send, in order.
    ///
    /// Fails without producing any packet unless the session is authenticated.
    pub fn command(&mut self, command: &str) -> Result<Vec<RconPacket>, RconError> {
        self.ensure_idle()?;
        if !self.is_authenticated() {
            return Err(RconError::NotAuthenticated);
        }
        if command.len() > MAX_BODY_SIZE {
            return Err(RconError::BodyTooLarge(command.len()));
        }

        let id = self.ids.next_id();
        self.pending = Some(Pending::Command {
            id,
            terminated: self.terminator_packets,
            body: BytesMut::new(),
        });

        let mut out = vec![RconPacket::command(id, command.to_owned())];
        if self.terminator_packets {
            out.push(RconPacket::terminator());
        }
        Ok(out)
    }

    /// Feeds one decoded packet. Returns an event once a pending request
    /// completes; packets that complete nothing yield `Ok(None)`.
    pub fn handle_packet(&mut self, packet: RconPacket) -> Result<Option<SessionEvent>, RconError> {
        if self.state == SessionState::Closed {
            return Err(RconError::Closed);
        }
        if packet.is_companion() {
            trace!("Ignoring terminator companion packet");
            return Ok(None);
        }
        if packet.is_terminator() && self.owed_terminators > 0 {
            self.owed_terminators -= 1;
            trace!("Swallowing terminator echo of an abandoned command");
            return Ok(None);
        }

        match (self.pending.take(), packet.kind) {
            (Some(Pending::Auth { id }), RconPacketType::AuthResponse) => {
                if packet.id == id && packet.id != TERMINATOR_ID {
                    debug!("RCON session authenticated");
                    self.state = SessionState::Authenticated;
                    Ok(Some(SessionEvent::Authenticated))
                } else {
                    debug!(
                        "RCON authentication rejected: expected id {}, got {}",
                        id, packet.id
                    );
                    self.state = SessionState::Unauthenticated;
                    Err(RconError::AuthFailure(AuthFailureReason::BadPassword))
                }
            }
            (Some(Pending::Auth { id }), RconPacketType::ResponseValue) => {
                // Servers echo an empty response value ahead of the auth response.
                trace!("Ignoring response value while authenticating");
                self.pending = Some(Pending::Auth { id });
                Ok(None)
            }
            (pending, RconPacketType::AuthResponse) if packet.id == TERMINATOR_ID => {
                if let Some(pending) = pending {
                    debug!("Dropping request {} after auth revocation", pending.id());
                }
                self.invalidate();
                Err(RconError::AuthFailure(AuthFailureReason::Invalidated))
            }
            (
                Some(Pending::Command {
                    id,
                    terminated,
                    mut body,
                }),
                RconPacketType::ResponseValue,
            ) => {
                if !self.is_authenticated() {
                    return Err(RconError::NotAuthenticated);
                }

                if packet.id == id {
                    body.extend_from_slice(&packet.body);
                    if terminated {
                        self.pending = Some(Pending::Command {
                            id,
                            terminated,
                            body,
                        });
                        return Ok(None);
                    }
                } else if !(terminated && packet.is_terminator()) {
                    debug!(
                        "Ignoring response for request {} while awaiting {}",
                        packet.id, id
                    );
                    self.pending = Some(Pending::Command {
                        id,
                        terminated,
                        body,
                    });
                    return Ok(None);
                }

                Ok(Some(SessionEvent::Response {
                    request_id: id,
                    body: body.freeze(),
                }))
            }
            (pending, kind) => {
                debug!("Ignoring unsolicited {:?} packet {}", kind, packet.id);
                self.pending = pending;
                Ok(None)
            }
        }
    }

    /// Marks the session as no longer authenticated, e.g. after the server
    /// password changed. A command still in flight fails when its response
    /// arrives.
    pub fn invalidate(&mut self) {
        if self.state != SessionState::Closed {
            debug!("RCON session invalidated");
            self.state = SessionState::Unauthenticated;
        }
    }

    /// Forgets the outstanding request, e.g. after a timeout. The terminator
    /// echo of an abandoned command is still expected and will be discarded.
    pub fn abandon(&mut self) -> Option<i32> {
        let pending = self.pending.take()?;
        if let Pending::Command {
            terminated: true, ..
        } = pending
        {
            self.owed_terminators += 1;
        }
        if self.state == SessionState::Authenticating {
            self.state = SessionState::Unauthenticated;
        }
        Some(pending.id())
    }

    /// Releases any partially collected response.
    pub fn close(&mut self) {
        self.pending = None;
        self.owed_terminators = 0;
        self.state = SessionState::Closed;
    }
}
