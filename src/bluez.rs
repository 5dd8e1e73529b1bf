//! The [`Bus`][crate::bus::Bus] implementation talking to BlueZ on the D-Bus system bus.
//!
//! Adapters, devices and remote characteristics are reached through [`bluer`]. The objects the transport exports
//! (the GATT services and the advertisement) are served with [`dbus_crossroads`] on a dedicated connection, which
//! also owns the well-known bus name and the discovery sessions.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::ErrorKind;
use crate::{Error, Result};

mod adapter;
mod characteristic;
mod device;
mod error;
mod export;
mod manager;
mod session;

pub use session::{BluezBus, SystemBus};

const TIMEOUT: Duration = Duration::from_secs(30);

fn dbus_path(path: &str) -> Result<dbus::Path<'static>> {
    dbus::Path::new(path.to_owned())
        .map_err(|err| Error::with_message(ErrorKind::InvalidParameter, format!("invalid object path: {err}")))
}

fn device_path(adapter: &str, address: bluer::Address) -> String {
    format!("/org/bluez/{}/dev_{}", adapter, address.to_string().replace(':', "_"))
}

/// Items forwarded by background tasks, which are aborted when the stream is dropped.
struct Forwarded<T> {
    receiver: UnboundedReceiverStream<T>,
    _tasks: JoinSet<()>,
}

impl<T> Forwarded<T> {
    fn new(receiver: mpsc::UnboundedReceiver<T>, tasks: JoinSet<()>) -> Self {
        Forwarded {
            receiver: UnboundedReceiverStream::new(receiver),
            _tasks: tasks,
        }
    }
}

impl<T> Unpin for Forwarded<T> {}

impl<T> Stream for Forwarded<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}
