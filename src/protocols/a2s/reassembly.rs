use super::packet::SplitPacketFragment;
use crate::{errors::ReassemblyError, util::hex_dump_lines};

use bytes::{Bytes, BytesMut};
use bzip2::read::BzDecoder;
use std::io::Read;
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, ReassemblyError>;

#[derive(Debug)]
struct Group {
    request_id: i32,
    packet_count: u8,
    max_packet_size: u16,
    slots: Vec<Option<SplitPacketFragment>>,
}

impl Group {
    fn received(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Collects the fragments of one split response.
///
/// The container is filled with [`add`](Self::add) until it reports
/// completion, read with [`get_buffer`](Self::get_buffer), and must then be
/// [`reset`](Self::reset) before it accepts fragments of another response.
#[derive(Debug)]
pub struct SplitPacketReassembler {
    group: Option<Group>,
    completed: bool,
    max_decompressed_size: usize,
}

impl Default for SplitPacketReassembler {
    fn default() -> Self {
        Self::new(1 << 20)
    }
}

impl SplitPacketReassembler {
    pub fn new(max_decompressed_size: usize) -> Self {
        Self {
            group: None,
            completed: false,
            max_decompressed_size,
        }
    }

    /// Stores a fragment and returns whether the response is now complete.
    ///
    /// A rejected fragment leaves the container unchanged.
    pub fn add(&mut self, fragment: SplitPacketFragment) -> Result<bool> {
        if self.completed {
            return Err(ReassemblyError::AlreadyCompleted);
        }
        if fragment.packet_number >= fragment.packet_count {
            return Err(ReassemblyError::PacketNumberOutOfRange {
                number: fragment.packet_number,
                count: fragment.packet_count,
            });
        }

        let group = self.group.get_or_insert_with(|| Group {
            request_id: fragment.request_id,
            packet_count: fragment.packet_count,
            max_packet_size: fragment.max_packet_size,
            slots: vec![None; usize::from(fragment.packet_count)],
        });

        if group.request_id != fragment.request_id {
            return Err(ReassemblyError::RequestIdMismatch {
                expected: group.request_id,
                found: fragment.request_id,
            });
        }
        if group.packet_count != fragment.packet_count {
            return Err(ReassemblyError::PacketCountMismatch {
                expected: group.packet_count,
                found: fragment.packet_count,
            });
        }

        let number = fragment.packet_number;
        let slot = &mut group.slots[usize::from(number)];
        if slot.is_some() {
            return Err(ReassemblyError::DuplicatePacket(number));
        }
        *slot = Some(fragment);

        let received = group.received();
        trace!(
            "Split response {}: fragment {} ({}/{})",
            group.request_id,
            number,
            received,
            group.packet_count
        );
        if received == usize::from(group.packet_count) {
            self.completed = true;
        }

        Ok(self.completed)
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn received_count(&self) -> usize {
        self.group.as_ref().map_or(0, Group::received)
    }

    /// Request id of the response being collected, if any fragment arrived.
    pub fn request_id(&self) -> Option<i32> {
        self.group.as_ref().map(|g| g.request_id)
    }

    pub fn is_compressed(&self) -> bool {
        self.group.as_ref().map_or(false, |g| {
            g.slots.iter().flatten().any(|f| f.compressed)
        })
    }

    /// Concatenates the fragments in packet number order, decompressing and
    /// checksumming compressed ones.
    pub fn get_buffer(&self) -> Result<Bytes> {
        let group = match &self.group {
            Some(group) if self.completed => group,
            Some(group) => {
                return Err(ReassemblyError::Incomplete {
                    received: group.received(),
                    expected: usize::from(group.packet_count),
                })
            }
            None => {
                return Err(ReassemblyError::Incomplete {
                    received: 0,
                    expected: 0,
                })
            }
        };

        let fragments = group
            .slots
            .iter()
            .map(|slot| {
                slot.as_ref().ok_or(ReassemblyError::Incomplete {
                    received: group.received(),
                    expected: usize::from(group.packet_count),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let size = fragments.iter().map(|f| f.payload.len()).sum::<usize>();
        let limit = usize::from(group.max_packet_size) * usize::from(group.packet_count);
        if size > limit {
            return Err(ReassemblyError::Oversized { size, limit });
        }

        let mut out = BytesMut::with_capacity(size);
        for fragment in fragments {
            if fragment.compressed {
                out.extend_from_slice(&decompress(fragment, self.max_decompressed_size)?);
            } else {
                out.extend_from_slice(&fragment.payload);
            }
        }

        debug!(
            "Reassembled split response {} from {} packets, {} bytes",
            group.request_id,
            group.packet_count,
            out.len()
        );
        trace!("Reassembled payload:\n{}", hex_dump_lines(&out));
        Ok(out.freeze())
    }

    pub fn reset(&mut self) {
        self.group = None;
        self.completed = false;
    }
}

fn decompress(fragment: &SplitPacketFragment, limit: usize) -> Result<Vec<u8>> {
    let declared = fragment
        .decompressed_size
        .and_then(|size| usize::try_from(size).ok())
        .ok_or_else(|| ReassemblyError::Decompression("missing decompressed size".into()))?;
    if declared > limit {
        return Err(ReassemblyError::DecompressedSizeLimit { declared, limit });
    }

    // One extra byte is enough to notice output beyond the declared size.
    let mut out = Vec::with_capacity(declared);
    BzDecoder::new(fragment.payload.as_ref())
        .take(declared as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ReassemblyError::Decompression(e.to_string()))?;
    if out.len() != declared {
        return Err(ReassemblyError::DecompressedSizeMismatch {
            declared,
            actual: out.len(),
        });
    }

    let actual = crc32fast::hash(&out);
    let expected = fragment.crc32.unwrap_or_default();
    if actual != expected {
        return Err(ReassemblyError::Checksum { expected, actual });
    }

    Ok(out)
}
