use super::{
    codec::QueryCodec,
    packet::{decode_datagram, QueryPacket},
    reassembly::SplitPacketReassembler,
    response::{parse_response, QueryResponse},
    QueryConfig, QueryRequest,
};
use crate::{
    errors::{QueryError, ReassemblyError},
    models::{Player, Rules, ServerInfo},
    util::to_v4,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};
use tokio::{
    net::{lookup_host, ToSocketAddrs, UdpSocket},
    task,
    time::timeout,
};
use tokio_util::udp::UdpFramed;
use tracing::{debug, trace};

/// Challenge rounds tolerated before a request is abandoned.
const MAX_CHALLENGES: usize = 2;

/// Source query client bound to one server.
pub struct QueryClient {
    framed: UdpFramed<QueryCodec>,
    server: SocketAddr,
    config: QueryConfig,
}

impl QueryClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: QueryConfig) -> Result<Self, QueryError> {
        let server = lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
        })?;
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        debug!("Querying {} from {}", server, socket.local_addr()?);

        Ok(Self {
            framed: UdpFramed::new(socket, QueryCodec),
            server,
            config,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub async fn info(&mut self) -> Result<ServerInfo, QueryError> {
        match self.request(QueryRequest::info()).await? {
            QueryResponse::Info(info) => Ok(info),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn players(&mut self) -> Result<Vec<Player>, QueryError> {
        match self.request(QueryRequest::players()).await? {
            QueryResponse::Players(players) => Ok(players),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn rules(&mut self) -> Result<Rules, QueryError> {
        match self.request(QueryRequest::rules()).await? {
            QueryResponse::Rules(rules) => Ok(rules),
            other => Err(unexpected(&other)),
        }
    }

    /// Sends `request`, answering challenges, and waits for the response
    /// within the configured timeout.
    pub async fn request(&mut self, request: QueryRequest) -> Result<QueryResponse, QueryError> {
        let result = timeout(self.config.timeout(), self.exchange(request)).await;

        match result {
            Ok(response) => response,
            Err(_) => {
                debug!("Query to {} timed out", self.server);
                Err(QueryError::Timeout)
            }
        }
    }

    async fn exchange(&mut self, mut request: QueryRequest) -> Result<QueryResponse, QueryError> {
        for _ in 0..=MAX_CHALLENGES {
            self.framed.send((request, self.server)).await?;

            let payload = self.receive().await?;
            match parse_response(&payload)? {
                QueryResponse::Challenge(challenge) => {
                    debug!("{} issued challenge {}", self.server, challenge);
                    request = request.with_challenge(challenge);
                }
                response => return Ok(response),
            }
        }

        Err(QueryError::UnexpectedResponse(
            "server kept issuing challenges".into(),
        ))
    }

    /// Waits for one logical response, collecting split packets as needed.
    ///
    /// A fragment with a new request id replaces the group being collected;
    /// later fragments of the replaced group are ignored.
    async fn receive(&mut self) -> Result<Bytes, QueryError> {
        let mut reassembler = SplitPacketReassembler::new(self.config.max_decompressed_size);
        let mut discarded = Vec::new();

        loop {
            let (packet, from) = self
                .framed
                .next()
                .await
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))??;
            if to_v4(from) != to_v4(self.server) {
                trace!("Ignoring datagram from {}", from);
                continue;
            }

            let fragment = match packet {
                QueryPacket::Single(payload) => return Ok(payload),
                QueryPacket::Split(fragment) => fragment,
            };

            if discarded.contains(&fragment.request_id) {
                trace!(
                    "Ignoring fragment {} of discarded split response {}",
                    fragment.packet_number,
                    fragment.request_id
                );
                continue;
            }
            if let Some(id) = reassembler.request_id() {
                if id != fragment.request_id {
                    debug!("Dropping stale split response {}", id);
                    discarded.push(id);
                    reassembler.reset();
                }
            }

            match reassembler.add(fragment) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(ReassemblyError::DuplicatePacket(number)) => {
                    trace!("Ignoring repeated fragment {}", number);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let assembled = if reassembler.is_compressed() && self.config.offload_decompression {
                let complete = std::mem::take(&mut reassembler);
                task::spawn_blocking(move || complete.get_buffer())
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??
            } else {
                let assembled = reassembler.get_buffer();
                reassembler.reset();
                assembled?
            };

            return match decode_datagram(&assembled)? {
                Some(QueryPacket::Single(payload)) => Ok(payload),
                _ => Err(QueryError::UnexpectedResponse(
                    "reassembled response lacks a single packet header".into(),
                )),
            };
        }
    }
}

fn unexpected(response: &QueryResponse) -> QueryError {
    QueryError::UnexpectedResponse(format!("{:?}", response))
}
