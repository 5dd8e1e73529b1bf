//! Splitting packets into GATT sized fragments and putting them back together.
//!
//! The first fragment of a packet starts with a two byte header holding the length of the packet payload in its low
//! 12 bits (big endian). The remaining fragments carry payload only, so a receiver knows a packet is complete once it
//! has accumulated the advertised number of bytes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::PacketReceivedCallback;
use crate::error::ErrorKind;
use crate::{Error, Result};

/// Length of the fragmentation header.
pub const HEADER_LENGTH: usize = 2;

/// Largest payload the 12-bit length field can describe.
pub const MAX_PAYLOAD_LENGTH: usize = 0x0fff;

/// Size of a single GATT write or notification when the link MTU has not been negotiated.
pub const DEFAULT_MTU: usize = 20;

/// Builds the header announcing a payload of `len` bytes.
pub fn encode_header(len: usize) -> Result<[u8; HEADER_LENGTH]> {
    if len == 0 || len > MAX_PAYLOAD_LENGTH {
        return Err(Error::with_message(
            ErrorKind::InvalidParameter,
            format!("payload length {len} cannot be encoded in a fragment header"),
        ));
    }

    Ok([(len >> 8) as u8 & 0x0f, len as u8])
}

/// Reads the payload length out of the header at the start of `fragment`.
pub fn decode_header(fragment: &[u8]) -> Result<usize> {
    let [hi, lo] = match fragment {
        [hi, lo, ..] => [*hi, *lo],
        _ => {
            return Err(Error::with_message(
                ErrorKind::InvalidParameter,
                "fragment too short to hold a header",
            ))
        }
    };

    match (usize::from(hi & 0x0f) << 8) | usize::from(lo) {
        0 => Err(Error::with_message(
            ErrorKind::InvalidParameter,
            "fragment header announces an empty packet",
        )),
        len => Ok(len),
    }
}

/// Splits `data` into fragments of at most `mtu` bytes, the first of which carries the header.
pub fn split(data: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>> {
    if mtu <= HEADER_LENGTH {
        return Err(Error::with_message(
            ErrorKind::InvalidParameter,
            format!("MTU of {mtu} bytes leaves no room for payload"),
        ));
    }

    let header = encode_header(data.len())?;
    let mut packet = Vec::with_capacity(HEADER_LENGTH + data.len());
    packet.extend_from_slice(&header);
    packet.extend_from_slice(data);

    Ok(packet.chunks(mtu).map(<[u8]>::to_vec).collect())
}

#[derive(Debug)]
struct Partial {
    total: usize,
    data: Vec<u8>,
}

/// Per-peer reassembly of fragmented packets.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: Mutex<HashMap<String, Partial>>,
}

impl Reassembler {
    /// Creates a reassembler with no partial packets.
    pub fn new() -> Self {
        Default::default()
    }

    /// Feeds a fragment received from `peer`.
    ///
    /// Returns the packet payload once its last fragment has arrived. A fragment that would grow the packet past the
    /// length announced in its header discards everything received from `peer` so far, and the next fragment from
    /// that peer is expected to start a new packet.
    pub fn push(&self, peer: &str, fragment: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut partial = self.partial.lock();
        match partial.entry(peer.to_owned()) {
            Entry::Vacant(entry) => {
                let total = decode_header(fragment)?;
                let body = &fragment[HEADER_LENGTH..];
                if body.len() > total {
                    return Err(overflow(peer, body.len(), total));
                }

                if body.len() == total {
                    Ok(Some(body.to_vec()))
                } else {
                    let mut data = Vec::with_capacity(total);
                    data.extend_from_slice(body);
                    entry.insert(Partial { total, data });
                    Ok(None)
                }
            }
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                let received = state.data.len() + fragment.len();
                if received > state.total {
                    let total = state.total;
                    entry.remove();
                    return Err(overflow(peer, received, total));
                }

                state.data.extend_from_slice(fragment);
                debug!("received {} of {} bytes from {}", received, state.total, peer);
                if received == state.total {
                    Ok(Some(entry.remove().data))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Drops any partial packet received from `peer`.
    pub fn reset(&self, peer: &str) {
        self.partial.lock().remove(peer);
    }

    /// Returns `true` if a packet from `peer` is partially received.
    pub fn is_pending(&self, peer: &str) -> bool {
        self.partial.lock().contains_key(peer)
    }

    /// Wraps the reassembler into a packet-received callback which hands every complete packet to `deliver`.
    ///
    /// The callback consumes every fragment it accepts in full and fails on malformed fragments.
    pub fn into_callback<F>(self, deliver: F) -> PacketReceivedCallback
    where
        F: Fn(&str, Vec<u8>) + Send + Sync + 'static,
    {
        Arc::new(move |peer: &str, fragment: &[u8]| {
            if let Some(packet) = self.push(peer, fragment)? {
                deliver(peer, packet);
            }
            Ok(fragment.len())
        })
    }
}

fn overflow(peer: &str, received: usize, total: usize) -> Error {
    warn!("dropping packet from {}: received {} bytes of a {} byte packet", peer, received, total);
    Error::with_message(
        ErrorKind::InvalidParameter,
        format!("received {received} bytes of a {total} byte packet"),
    )
}
