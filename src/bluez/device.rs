use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::characteristic::BluezCharacteristic;
use super::device_path;
use crate::bus::{DeviceProxy, TransportCharacteristics};
use crate::{Config, Result, Uuid};

/// A remote Bluetooth device.
#[derive(Debug, Clone)]
pub struct BluezDevice {
    inner: bluer::Device,
    path: String,
}

impl BluezDevice {
    pub(super) fn new(inner: bluer::Device) -> Self {
        let path = device_path(inner.adapter_name(), inner.address());
        BluezDevice { inner, path }
    }
}

#[async_trait]
impl DeviceProxy for BluezDevice {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn address(&self) -> Result<String> {
        Ok(self.inner.address().to_string())
    }

    async fn uuids(&self) -> Result<Vec<Uuid>> {
        Ok(self.inner.uuids().await?.unwrap_or_default().into_iter().collect())
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(self.inner.is_connected().await?)
    }

    async fn connect(&self) -> Result<()> {
        Ok(self.inner.connect().await?)
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(self.inner.disconnect().await?)
    }

    async fn transport_characteristics(&self, config: &Config) -> Result<Option<TransportCharacteristics>> {
        for service in self.inner.services().await? {
            if service.uuid().await? != config.service_uuid {
                continue;
            }

            let service_path = format!("{}/service{:04x}", self.path, service.id());
            let mut request = None;
            let mut response = None;
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                trace!("{} has characteristic {}", service_path, uuid);
                if uuid == config.request_uuid {
                    request = Some(characteristic);
                } else if uuid == config.response_uuid {
                    response = Some(characteristic);
                }
            }

            if let (Some(request), Some(response)) = (request, response) {
                return Ok(Some(TransportCharacteristics {
                    request: Arc::new(BluezCharacteristic::new(request, &service_path)),
                    response: Arc::new(BluezCharacteristic::new(response, &service_path)),
                }));
            }
        }

        Ok(None)
    }
}
