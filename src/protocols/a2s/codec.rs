use super::{
    packet::{decode_datagram, QueryPacket},
    QueryRequest,
};
use crate::{errors::QueryError, util::hex_dump};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Datagram codec for [`tokio_util::udp::UdpFramed`].
///
/// Each call to `decode` consumes the whole datagram. Noise and datagrams
/// too malformed to decode are dropped and yield `Ok(None)`, so a stray
/// sender cannot end the stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryCodec;

impl Decoder for QueryCodec {
    type Item = QueryPacket;
    type Error = QueryError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        let datagram = buf.split().freeze();
        trace!("Received datagram: {}", hex_dump(&datagram));
        match decode_datagram(&datagram) {
            Ok(packet) => Ok(packet),
            Err(e) => {
                debug!("Discarding undecodable datagram: {}", e);
                Ok(None)
            }
        }
    }
}

impl Encoder<QueryRequest> for QueryCodec {
    type Error = QueryError;

    fn encode(&mut self, item: QueryRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        item.encode(dst);
        trace!("Sending datagram: {}", hex_dump(&dst[start..]));
        Ok(())
    }
}
