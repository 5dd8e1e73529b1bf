//! The GATT client role: discovering, connecting to and subscribing to transport GATT servers.

use std::sync::Arc;

use futures_lite::StreamExt;
use tracing::{debug, info, warn};

use crate::bus::{DeviceProxy, DiscoveryFilter, DiscoveryTransport, NotificationStream};
use crate::context::{Context, Role};
use crate::error::ErrorKind;
use crate::recv::{recv, RecvInfo};
use crate::{Error, Result};

fn no_hardware() -> Error {
    warn!("No bluetooth hardware found.");
    Error::with_message(ErrorKind::NoHardware, "no bluetooth hardware found")
}

/// Starts scanning for devices advertising the transport service on every local adapter.
///
/// Adapters already scanning are left alone. Others are powered on and restricted to LE devices publishing the
/// transport service before discovery starts.
pub async fn start(context: &Context) -> Result<()> {
    let adapters = context.adapters();
    if adapters.is_empty() {
        return Err(no_hardware());
    }

    let filter = DiscoveryFilter {
        uuids: vec![context.config().service_uuid],
        transport: DiscoveryTransport::Le,
    };

    for adapter in adapters {
        if adapter.is_discovering().await? {
            continue;
        }

        adapter.set_powered(true).await?;
        adapter.set_discovery_filter(&filter).await?;
        adapter.start_discovery().await?;
        info!("discovery started on {}", adapter.name());
    }

    Ok(())
}

/// Starts discovery on every local adapter not discovering yet.
pub async fn start_discovery(context: &Context) -> Result<()> {
    for adapter in context.adapters() {
        if !adapter.is_discovering().await? {
            adapter.start_discovery().await?;
            debug!("discovery started on {}", adapter.name());
        }
    }
    Ok(())
}

/// Stops discovery on every local adapter still discovering.
pub async fn stop_discovery(context: &Context) -> Result<()> {
    for adapter in context.adapters() {
        if adapter.is_discovering().await? {
            adapter.stop_discovery().await?;
            debug!("discovery stopped on {}", adapter.name());
        }
    }
    Ok(())
}

/// Connects to `device` unless already connected, then subscribes to its response characteristic.
///
/// Notified values are delivered to the client packet-received callback.
pub async fn connect(context: &Arc<Context>, device: &Arc<dyn DeviceProxy>) -> Result<()> {
    if !device.is_connected().await? {
        device.connect().await?;
        info!("connected to {}", device.object_path());
    }

    subscribe(context, device).await
}

/// Connects to every discovered device.
///
/// Attempts continue past failures and established connections are kept. Returns the first failure, if any.
pub async fn connect_to_all(context: &Arc<Context>) -> Result<()> {
    let mut res = Ok(());
    for device in context.devices() {
        if let Err(err) = connect(context, &device).await {
            warn!("failed to connect to {}: {:?}", device.object_path(), err);
            if res.is_ok() {
                res = Err(err);
            }
        }
    }
    res
}

/// Stops discovery and disconnects from every connected device.
///
/// Disconnections run in the background; this does not wait for them to complete.
pub async fn stop(context: &Context) -> Result<()> {
    let res = stop_discovery(context).await;

    for (peer, _) in context.request_characteristics() {
        context.remove_request_characteristic(&peer);
    }

    let runtime = context.runtime(Role::Client)?;
    for device in context.devices() {
        match device.is_connected().await {
            Ok(true) => {
                runtime.spawn(async move {
                    if let Err(err) = device.disconnect().await {
                        warn!("failed to disconnect from {}: {:?}", device.object_path(), err);
                    }
                });
            }
            Ok(false) => (),
            Err(err) => debug!("skipping {}: {:?}", device.object_path(), err),
        }
    }

    res
}

async fn subscribe(context: &Arc<Context>, device: &Arc<dyn DeviceProxy>) -> Result<()> {
    let peer = device.address().await?;
    if context.request_characteristic(&peer).is_some() {
        return Ok(());
    }

    let transport = device.transport_characteristics(context.config()).await?.ok_or_else(|| {
        Error::with_message(
            ErrorKind::NotFound,
            format!("{peer} does not publish the transport service"),
        )
    })?;

    let notifications = transport.response.notifications().await?;
    let task = context
        .runtime(Role::Client)?
        .spawn(forward_notifications(context.clone(), peer.clone(), notifications));

    context.insert_request_characteristic(&peer, transport.request);
    context.insert_notification_task(&peer, task);
    debug!("subscribed to responses from {}", peer);
    Ok(())
}

async fn forward_notifications(context: Arc<Context>, peer: String, mut notifications: NotificationStream) {
    while let Some(value) = notifications.next().await {
        let callback = context.callbacks().client_packet_received;
        let info = RecvInfo::new(peer.clone(), callback, &context);
        if !recv(&info, &value) {
            warn!("dropped {} byte response from {}", value.len(), peer);
        }
    }

    debug!("responses from {} ended", peer);
}
