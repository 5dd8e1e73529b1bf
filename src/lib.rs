#![warn(missing_docs)]

//! Gattlink is a Bluetooth Low Energy transport for [Rust] on Linux. It turns a pair of GATT characteristics into a
//! bidirectional byte channel between GATT clients and GATT servers, using [BlueZ] over D-Bus.
//!
//! [Rust]: https://www.rust-lang.org/
//! [BlueZ]: http://www.bluez.org/
//!
//! # Usage
//!
//! ```rust,no_run
//!# use std::sync::Arc;
//!# use gattlink::context::PacketReceivedCallback;
//!# use gattlink::{Config, LeAdapter};
//!# #[tokio::main]
//!# async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!let adapter = LeAdapter::new(Config::default());
//!let on_request: PacketReceivedCallback = Arc::new(|peer: &str, data: &[u8]| {
//!    println!("{} bytes from {}", data.len(), peer);
//!    Ok(data.len())
//!});
//!adapter.set_server_packet_received_callback(Some(on_request));
//!
//!adapter.start().await?;
//!println!("local address {}", adapter.address().await?);
//!adapter.start_gatt_server().await?;
//!#
//!#    Ok(())
//!# }
//! ```
//!
//! # Overview
//!
//! Each local adapter exports one transport service holding two characteristics:
//!
//! - the *request* characteristic, which GATT clients write fragments to without response, and
//! - the *response* characteristic, which the GATT server notifies fragments on.
//!
//! The primary functions provided by Gattlink are:
//!
//! - The GATT server role:
//!   - [Exporting and advertising][LeAdapter::start_gatt_server] the transport service
//!   - [Notifying][LeAdapter::send_to_gatt_client] a subscribed client
//! - The GATT client role:
//!   - [Discovering][LeAdapter::start_gatt_client] devices publishing the transport service
//!   - [Writing][LeAdapter::send_to_gatt_server] to a connected server, or to
//!     [every server][LeAdapter::send_to_all_gatt_servers] around
//! - [Fragmenting][fragment::split] packets to the size of a GATT write and [reassembling][fragment::Reassembler]
//!   them on the receiving side
//!
//! # Asynchronous runtimes
//!
//! Gattlink requires the Tokio runtime. Each role spawns its tasks on a runtime handle, which defaults to the
//! runtime current when the [`LeAdapter`] was created and may be changed with
//! [`set_client_runtime`][LeAdapter::set_client_runtime] and [`set_server_runtime`][LeAdapter::set_server_runtime].
//!
//! # Peers
//!
//! GATT servers are identified by their Bluetooth address. BlueZ does not tell a GATT server which client wrote to
//! or subscribed to a characteristic, so a client is identified by an address derived from the local service it
//! subscribed to (see [`GattService::peer_address`][gatt::GattService::peer_address]). This only distinguishes
//! clients as long as at most one client is connected to each local adapter.
//!
//! # Feature flags
//!
//! The `serde` feature is available to enable serializing/deserializing the [`Config`].

pub mod advertisement;
pub mod btuuid;
pub mod bus;
pub mod central;
pub mod client;
pub mod context;
pub mod error;
pub mod fragment;
pub mod gatt;
pub mod peripheral;
pub mod recv;
pub mod server;

mod adapter;
mod config;
mod event_loop;

#[cfg(target_os = "linux")]
pub mod bluez;

pub use adapter::LeAdapter;
pub use btuuid::BluetoothUuidExt;
pub use config::Config;
pub use context::Context;
pub use error::Error;
pub use uuid::Uuid;

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Power state of the local Bluetooth adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdapterState {
    /// The adapter is powered on
    Enabled,
    /// The adapter is powered off
    Disabled,
}
