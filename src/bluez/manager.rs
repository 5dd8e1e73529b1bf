use std::sync::Arc;

use async_trait::async_trait;
use dbus::arg::PropMap;
use dbus::nonblock::{MethodReply, Proxy, SyncConnection};

use super::{dbus_path, TIMEOUT};
use crate::bus::{AdvertisingManagerProxy, GattManagerProxy, Interface, BLUEZ_SERVICE};
use crate::Result;

/// Calls a method of one of the BlueZ managers taking an object path and an empty options dictionary.
async fn register(
    connection: &Arc<SyncConnection>,
    manager: &str,
    interface: Interface,
    method: &str,
    object: &str,
) -> Result<()> {
    let reply: MethodReply<()> = {
        let proxy = Proxy::new(BLUEZ_SERVICE, dbus_path(manager)?, TIMEOUT, connection.clone());
        proxy.method_call(interface.name(), method, (dbus_path(object)?, PropMap::new()))
    };
    Ok(reply.await?)
}

async fn unregister(
    connection: &Arc<SyncConnection>,
    manager: &str,
    interface: Interface,
    method: &str,
    object: &str,
) -> Result<()> {
    let reply: MethodReply<()> = {
        let proxy = Proxy::new(BLUEZ_SERVICE, dbus_path(manager)?, TIMEOUT, connection.clone());
        proxy.method_call(interface.name(), method, (dbus_path(object)?,))
    };
    Ok(reply.await?)
}

/// `org.bluez.GattManager1` of a local adapter.
#[derive(Clone)]
pub struct BluezGattManager {
    path: String,
    connection: Arc<SyncConnection>,
}

impl std::fmt::Debug for BluezGattManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluezGattManager").field("path", &self.path).finish()
    }
}

impl BluezGattManager {
    pub(super) fn new(path: String, connection: Arc<SyncConnection>) -> Self {
        BluezGattManager { path, connection }
    }
}

#[async_trait]
impl GattManagerProxy for BluezGattManager {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn register_service(&self, service_path: &str) -> Result<()> {
        register(
            &self.connection,
            &self.path,
            Interface::GattManager,
            "RegisterApplication",
            service_path,
        )
        .await
    }

    async fn unregister_service(&self, service_path: &str) -> Result<()> {
        unregister(
            &self.connection,
            &self.path,
            Interface::GattManager,
            "UnregisterApplication",
            service_path,
        )
        .await
    }
}

/// `org.bluez.LEAdvertisingManager1` of a local adapter.
#[derive(Clone)]
pub struct BluezAdvertisingManager {
    path: String,
    connection: Arc<SyncConnection>,
}

impl std::fmt::Debug for BluezAdvertisingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluezAdvertisingManager").field("path", &self.path).finish()
    }
}

impl BluezAdvertisingManager {
    pub(super) fn new(path: String, connection: Arc<SyncConnection>) -> Self {
        BluezAdvertisingManager { path, connection }
    }
}

#[async_trait]
impl AdvertisingManagerProxy for BluezAdvertisingManager {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn register_advertisement(&self, advertisement_path: &str) -> Result<()> {
        register(
            &self.connection,
            &self.path,
            Interface::AdvertisingManager,
            "RegisterAdvertisement",
            advertisement_path,
        )
        .await
    }

    async fn unregister_advertisement(&self, advertisement_path: &str) -> Result<()> {
        unregister(
            &self.connection,
            &self.path,
            Interface::AdvertisingManager,
            "UnregisterAdvertisement",
            advertisement_path,
        )
        .await
    }
}
