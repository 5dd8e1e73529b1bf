use async_trait::async_trait;
use bluer::gatt::remote::CharacteristicWriteRequest;
use bluer::gatt::WriteOp;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::debug;

use super::Forwarded;
use crate::bus::{NotificationStream, RemoteCharacteristic};
use crate::Result;

/// A characteristic of a remote GATT server.
#[derive(Debug, Clone)]
pub struct BluezCharacteristic {
    inner: bluer::gatt::remote::Characteristic,
    path: String,
}

impl BluezCharacteristic {
    pub(super) fn new(inner: bluer::gatt::remote::Characteristic, service_path: &str) -> Self {
        let path = format!("{}/char{:04x}", service_path, inner.id());
        BluezCharacteristic { inner, path }
    }
}

#[async_trait]
impl RemoteCharacteristic for BluezCharacteristic {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn write_value(&self, value: &[u8]) -> Result<()> {
        self.inner
            .write_ext(
                value,
                &CharacteristicWriteRequest {
                    op_type: WriteOp::Command,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let characteristic = self.inner.clone();
        let path = self.path.clone();

        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            let notifications = match characteristic.notify().await {
                Ok(notifications) => {
                    let _ = ready_tx.send(Ok(()));
                    notifications
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            let mut notifications = Box::pin(notifications);
            while let Some(value) = notifications.next().await {
                if tx.send(value).is_err() {
                    break;
                }
            }
            debug!("notifications from {} ended", path);
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::pin(Forwarded::new(rx, tasks))),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(crate::Error::with_message(
                crate::error::ErrorKind::Internal,
                "notification task ended early",
            )),
        }
    }
}
