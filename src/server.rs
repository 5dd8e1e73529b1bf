//! Sending responses from the GATT server role.

use tracing::debug;

use crate::context::Context;
use crate::error::ErrorKind;
use crate::{Error, Result};

/// Notifies `data` to the GATT client known as `peer`.
///
/// Fails without touching the response characteristic if `peer` is not subscribed to notifications, since BlueZ
/// would silently drop the value. Failures are also reported to the server error callback.
pub async fn send_response(context: &Context, peer: &str, data: &[u8]) -> Result<()> {
    let service = match context.lookup_peer(peer) {
        Some(service) if service.response().is_notifying() => service,
        _ => {
            let message = format!("{peer} is not subscribed to notifications");
            let err = Error::with_message(ErrorKind::NotSubscribed, message);
            context.report_server_error(Some(peer), data, &err);
            return Err(err);
        }
    };

    let res = match context.bus() {
        Ok(bus) => bus.set_characteristic_value(service.response().object_path(), data).await,
        Err(err) => Err(err),
    };

    match res {
        Ok(()) => {
            debug!("notified {} bytes to {}", data.len(), peer);
            Ok(())
        }
        Err(err) => {
            context.report_server_error(Some(peer), data, &err);
            Err(err)
        }
    }
}

/// Notifies `data` to every subscribed GATT client.
///
/// Stops at the first client that cannot be notified.
pub async fn send_response_to_all(context: &Context, data: &[u8]) -> Result<()> {
    let mut peers = context.subscribed_peers();
    if peers.is_empty() {
        let err = Error::with_message(ErrorKind::NotSubscribed, "no GATT client is subscribed to notifications");
        context.report_server_error(None, data, &err);
        return Err(err);
    }

    peers.sort();
    for peer in peers {
        send_response(context, &peer, data).await?;
    }
    Ok(())
}
