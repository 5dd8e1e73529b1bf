use std::sync::Arc;

use async_trait::async_trait;
use dbus::arg::{AppendAll, PropMap, Variant};
use dbus::nonblock::{MethodReply, Proxy, SyncConnection};
use tracing::debug;

use super::{dbus_path, TIMEOUT};
use crate::btuuid::BluetoothUuidExt;
use crate::bus::{AdapterProxy, DiscoveryFilter, DiscoveryTransport, Interface, BLUEZ_SERVICE};
use crate::Result;

/// A local Bluetooth adapter.
///
/// Properties go through [`bluer`]. Discovery is driven on the transport's own connection, since BlueZ ties the
/// discovery filter and the discovery session to the client which set them.
#[derive(Clone)]
pub struct BluezAdapter {
    inner: bluer::Adapter,
    path: String,
    connection: Arc<SyncConnection>,
}

impl std::fmt::Debug for BluezAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluezAdapter").field("path", &self.path).finish()
    }
}

impl BluezAdapter {
    pub(super) fn new(inner: bluer::Adapter, connection: Arc<SyncConnection>) -> Self {
        let path = format!("/org/bluez/{}", inner.name());
        BluezAdapter { inner, path, connection }
    }

    pub(super) fn inner(&self) -> &bluer::Adapter {
        &self.inner
    }

    fn call<A: AppendAll>(&self, method: &str, args: A) -> Result<MethodReply<()>> {
        let proxy = Proxy::new(BLUEZ_SERVICE, dbus_path(&self.path)?, TIMEOUT, self.connection.clone());
        Ok(proxy.method_call(Interface::Adapter.name(), method, args))
    }
}

#[async_trait]
impl AdapterProxy for BluezAdapter {
    fn object_path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn address(&self) -> Result<String> {
        Ok(self.inner.address().await?.to_string())
    }

    async fn is_powered(&self) -> Result<bool> {
        Ok(self.inner.is_powered().await?)
    }

    async fn set_powered(&self, powered: bool) -> Result<()> {
        Ok(self.inner.set_powered(powered).await?)
    }

    async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        Ok(self.inner.set_discoverable(discoverable).await?)
    }

    async fn is_discovering(&self) -> Result<bool> {
        Ok(self.inner.is_discovering().await?)
    }

    async fn set_discovery_filter(&self, filter: &DiscoveryFilter) -> Result<()> {
        debug!("setting discovery filter on {}: {:?}", self.path, filter);
        let reply = {
            let mut args = PropMap::new();
            let uuids: Vec<String> = filter.uuids.iter().map(|x| x.to_bluez_string()).collect();
            args.insert("UUIDs".to_owned(), Variant(Box::new(uuids)));
            let transport = match filter.transport {
                DiscoveryTransport::Auto => "auto",
                DiscoveryTransport::BrEdr => "bredr",
                DiscoveryTransport::Le => "le",
            };
            args.insert("Transport".to_owned(), Variant(Box::new(transport.to_owned())));
            self.call("SetDiscoveryFilter", (args,))?
        };
        Ok(reply.await?)
    }

    async fn start_discovery(&self) -> Result<()> {
        let reply = self.call("StartDiscovery", ())?;
        Ok(reply.await?)
    }

    async fn stop_discovery(&self) -> Result<()> {
        let reply = self.call("StopDiscovery", ())?;
        Ok(reply.await?)
    }
}
