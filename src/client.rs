//! Sending requests from the GATT client role.

use tracing::debug;

use crate::context::Context;
use crate::error::ErrorKind;
use crate::{Error, Result};

/// Writes `data` to the request characteristic of the GATT server `peer`.
///
/// Failures are also reported to the client error callback.
pub async fn send_data(context: &Context, peer: &str, data: &[u8]) -> Result<()> {
    let Some(characteristic) = context.request_characteristic(peer) else {
        let err = Error::with_message(ErrorKind::NotFound, format!("not connected to a GATT server at {peer}"));
        context.report_client_error(Some(peer), data, &err);
        return Err(err);
    };

    match characteristic.write_value(data).await {
        Ok(()) => {
            debug!("wrote {} bytes to {}", data.len(), peer);
            Ok(())
        }
        Err(err) => {
            context.report_client_error(Some(peer), data, &err);
            Err(err)
        }
    }
}

/// Writes `data` to the request characteristic of every connected GATT server, in connection order.
///
/// Stops at the first failing write; the remaining servers are not written to.
pub async fn send_data_to_all(context: &Context, data: &[u8]) -> Result<()> {
    let targets = context.request_characteristics();
    if targets.is_empty() {
        let err = Error::with_message(ErrorKind::NotFound, "not connected to any GATT server");
        context.report_client_error(None, data, &err);
        return Err(err);
    }

    for (peer, characteristic) in targets {
        if let Err(err) = characteristic.write_value(data).await {
            context.report_client_error(Some(&peer), data, &err);
            return Err(err);
        }
        debug!("wrote {} bytes to {}", data.len(), peer);
    }
    Ok(())
}
