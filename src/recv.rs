//! Delivery of received fragments to the layer above the transport.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::context::{Context, PacketReceivedCallback};

/// Where fragments received from one peer are delivered.
#[derive(Clone, Default)]
pub struct RecvInfo {
    peer: Option<String>,
    on_packet_received: Option<PacketReceivedCallback>,
    context: Weak<Context>,
}

impl std::fmt::Debug for RecvInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvInfo")
            .field("peer", &self.peer)
            .field("on_packet_received", &self.on_packet_received.is_some())
            .finish()
    }
}

impl RecvInfo {
    /// Creates the receive information of `peer`.
    ///
    /// The context is only referenced weakly, so delivery fails once it is dropped.
    pub fn new(
        peer: impl Into<String>,
        on_packet_received: Option<PacketReceivedCallback>,
        context: &Arc<Context>,
    ) -> Self {
        RecvInfo {
            peer: Some(peer.into()),
            on_packet_received,
            context: Arc::downgrade(context),
        }
    }

    /// The peer fragments are attributed to.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Returns `true` if no peer is associated with this information.
    pub fn is_empty(&self) -> bool {
        self.peer.is_none()
    }
}

/// Hands `data` received from the peer described by `info` to its packet-received callback.
///
/// The callback runs while the context lock is held, so it must not call back into the context. Returns `true` if the
/// callback succeeded and consumed all of `data`.
pub fn recv(info: &RecvInfo, data: &[u8]) -> bool {
    let (Some(peer), Some(context)) = (info.peer.as_deref(), info.context.upgrade()) else {
        warn!("dropping {} bytes received from an unknown peer", data.len());
        return false;
    };

    let Some(callback) = info.on_packet_received.as_ref() else {
        warn!("no packet-received callback set, dropping {} bytes from {}", data.len(), peer);
        return false;
    };

    let _guard = context.lock();
    match callback(peer, data) {
        Ok(sent) if sent == data.len() => true,
        Ok(sent) => {
            debug!("only {} of {} bytes from {} consumed", sent, data.len(), peer);
            false
        }
        Err(err) => {
            warn!("failed to handle {} bytes from {}: {:?}", data.len(), peer, err);
            false
        }
    }
}
