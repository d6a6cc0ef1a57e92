//! Steam master server browsing.
//!
//! A response page is the header `FF FF FF FF 66 0A` followed by 6-byte
//! entries (IPv4 address, big-endian port). The list ends with `0.0.0.0:0`;
//! a page without it is continued by sending the last address as seed.

use crate::{
    errors::{DecodeError, DecodeResult},
    util::{hex_dump, ByteCursor},
};

use bytes::{BufMut, Bytes, BytesMut};
use enum_primitive_derive::Primitive;
use std::{
    collections::HashSet,
    net::{Ipv4Addr, SocketAddrV4},
};
use tracing::{debug, trace};

pub const MASTER_QUERY: u8 = 0x31;
pub const RESPONSE_HEADER: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0x66, 0x0a];
pub const ENTRY_LEN: usize = 6;

/// Marks the end of the list, and seeds the first page.
pub const SENTINEL: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Primitive)]
pub enum Region {
    UsEast = 0x00,
    UsWest = 0x01,
    SouthAmerica = 0x02,
    Europe = 0x03,
    Asia = 0x04,
    Australia = 0x05,
    MiddleEast = 0x06,
    Africa = 0x07,
    World = 0xff,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterQuery {
    pub region: Region,
    pub seed: SocketAddrV4,
    /// Filter string such as `\appid\440\empty\1`.
    pub filter: String,
}

impl MasterQuery {
    pub fn new(region: Region, filter: impl Into<String>) -> Self {
        Self {
            region,
            seed: SENTINEL,
            filter: filter.into(),
        }
    }

    /// Request for the page that follows `seed`.
    pub fn next_page(&self, seed: SocketAddrV4) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let seed = self.seed.to_string();
        dst.reserve(2 + seed.len() + 1 + self.filter.len() + 1);
        dst.put_u8(MASTER_QUERY);
        dst.put_u8(self.region as u8);
        dst.put_slice(seed.as_bytes());
        dst.put_u8(0);
        dst.put_slice(self.filter.as_bytes());
        dst.put_u8(0);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode(&mut out);
        out.freeze()
    }
}

/// Strips the response header, returning the address entries.
pub fn response_entries(datagram: &[u8]) -> DecodeResult<&[u8]> {
    if datagram.len() < RESPONSE_HEADER.len() {
        return Err(DecodeError::Truncated {
            needed: RESPONSE_HEADER.len(),
            available: datagram.len(),
        });
    }
    let (header, entries) = datagram.split_at(RESPONSE_HEADER.len());
    if header != RESPONSE_HEADER {
        return Err(DecodeError::MalformedPacket("not a master server response"));
    }
    Ok(entries)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MasterStatus {
    /// The list continues; request the next page seeded with this address.
    More(SocketAddrV4),
    /// The sentinel was seen.
    Complete,
}

/// Accumulates the unique addresses of one listing.
#[derive(Debug)]
pub struct MasterAddressSet {
    seen: HashSet<SocketAddrV4>,
    addresses: Vec<SocketAddrV4>,
    last: SocketAddrV4,
    complete: bool,
}

impl Default for MasterAddressSet {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            addresses: Vec::new(),
            last: SENTINEL,
            complete: false,
        }
    }
}

impl MasterAddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a page of entries, calling `on_new` for each address not
    /// seen before.
    ///
    /// Decoding stops at the sentinel; bytes after it are ignored, as is any
    /// page fed once the listing is complete.
    pub fn feed<F>(&mut self, entries: &[u8], mut on_new: F) -> DecodeResult<MasterStatus>
    where
        F: FnMut(SocketAddrV4),
    {
        if self.complete {
            return Ok(MasterStatus::Complete);
        }
        trace!("Master server entries: {}", hex_dump(entries));

        let mut cur = ByteCursor::new(entries);
        while !cur.is_empty() {
            let raw = cur.read_bytes(ENTRY_LEN)?;
            let addr = SocketAddrV4::new(
                Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]),
                u16::from_be_bytes([raw[4], raw[5]]),
            );

            if addr == SENTINEL {
                debug!("Master server list complete, {} servers", self.addresses.len());
                self.complete = true;
                return Ok(MasterStatus::Complete);
            }

            self.last = addr;
            if self.seen.insert(addr) {
                self.addresses.push(addr);
                on_new(addr);
            }
        }

        Ok(MasterStatus::More(self.last))
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddrV4) -> bool {
        self.seen.contains(addr)
    }

    /// Addresses in the order they were first seen.
    pub fn addresses(&self) -> &[SocketAddrV4] {
        &self.addresses
    }

    pub fn into_addresses(self) -> Vec<SocketAddrV4> {
        self.addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(addr: &str) -> Vec<u8> {
        let addr: SocketAddrV4 = addr.parse().unwrap();
        let mut out = addr.ip().octets().to_vec();
        out.extend_from_slice(&addr.port().to_be_bytes());
        out
    }

    #[test]
    fn request() {
        let query = MasterQuery::new(Region::Europe, "\\appid\\440");
        let mut expectation = vec![0x31, 0x03];
        expectation.extend_from_slice(b"0.0.0.0:0\0\\appid\\440\0");
        assert_eq!(query.to_bytes().as_ref(), &expectation[..]);

        let next = query.next_page("1.2.3.4:27015".parse().unwrap());
        assert!(next.to_bytes().starts_with(b"\x31\x031.2.3.4:27015\0"));
    }

    #[test]
    fn header_check() {
        let mut data = RESPONSE_HEADER.to_vec();
        data.extend(entry("1.2.3.4:27015"));
        assert_eq!(response_entries(&data).unwrap(), &entry("1.2.3.4:27015")[..]);

        data[5] = 0x0b;
        assert!(matches!(
            response_entries(&data),
            Err(DecodeError::MalformedPacket(_))
        ));
        assert!(response_entries(&data[..3]).unwrap_err().is_recoverable());
    }

    #[test]
    fn stops_at_sentinel() {
        let mut data = Vec::new();
        for addr in ["1.2.3.4:27015", "5.6.7.8:27016", "0.0.0.0:0", "9.9.9.9:1"] {
            data.extend(entry(addr));
        }

        let mut delivered = Vec::new();
        let mut set = MasterAddressSet::new();
        let status = set.feed(&data, |addr| delivered.push(addr)).unwrap();

        let expectation: Vec<SocketAddrV4> = vec![
            "1.2.3.4:27015".parse().unwrap(),
            "5.6.7.8:27016".parse().unwrap(),
        ];
        assert_eq!(status, MasterStatus::Complete);
        assert!(set.is_complete());
        assert_eq!(delivered, expectation);
        assert_eq!(set.into_addresses(), expectation);
    }

    #[test]
    fn pages_are_deduplicated() {
        let mut set = MasterAddressSet::new();
        let mut delivered = 0;

        let first = [entry("1.2.3.4:27015"), entry("5.6.7.8:27016")].concat();
        let status = set.feed(&first, |_| delivered += 1).unwrap();
        assert_eq!(status, MasterStatus::More("5.6.7.8:27016".parse().unwrap()));

        let second = [entry("5.6.7.8:27016"), entry("10.0.0.1:27015")].concat();
        set.feed(&second, |_| delivered += 1).unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(set.len(), 3);
        assert!(set.contains(&"10.0.0.1:27015".parse().unwrap()));

        assert_eq!(
            set.feed(&entry("0.0.0.0:0"), |_| delivered += 1).unwrap(),
            MasterStatus::Complete
        );
        assert_eq!(
            set.feed(&entry("8.8.8.8:1"), |_| delivered += 1).unwrap(),
            MasterStatus::Complete
        );
        assert_eq!(delivered, 3);
    }

    #[test]
    fn partial_entry_is_truncated() {
        let mut data = entry("1.2.3.4:27015");
        data.extend_from_slice(&[1, 2, 3]);

        let mut set = MasterAddressSet::new();
        assert_eq!(
            set.feed(&data, |_| {}),
            Err(DecodeError::Truncated {
                needed: 6,
                available: 3
            })
        );
        assert_eq!(set.len(), 1);
    }
}
