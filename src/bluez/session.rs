use std::sync::Arc;

use async_trait::async_trait;
use dbus::arg::{PropMap, Variant};
use dbus::channel::{MatchingReceiver, Sender};
use dbus::message::{MatchRule, SignalArgs};
use dbus::nonblock::stdintf::org_freedesktop_dbus::{
    ObjectManager, PropertiesPropertiesChanged, ReleaseNameReply, RequestNameReply,
};
use dbus::nonblock::{Proxy, SyncConnection};
use dbus_crossroads::Crossroads;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tracing::{debug, error, trace, warn};

use super::adapter::BluezAdapter;
use super::device::BluezDevice;
use super::export::Tokens;
use super::manager::{BluezAdvertisingManager, BluezGattManager};
use super::{dbus_path, device_path, Forwarded, TIMEOUT};
use crate::advertisement::Advertisement;
use crate::bus::{
    AdapterProxy, AdvertisingManagerProxy, Bus, BusEvent, BusEventStream, Connector, DeviceProxy, GattManagerProxy,
    Interface, BLUEZ_SERVICE,
};
use crate::error::ErrorKind;
use crate::gatt::GattService;
use crate::{Error, Result};

/// Connects to BlueZ on the D-Bus system bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBus;

#[async_trait]
impl Connector for SystemBus {
    async fn connect(&self) -> Result<Arc<dyn Bus>> {
        Ok(Arc::new(BluezBus::new().await?))
    }
}

/// A connection to BlueZ on the D-Bus system bus.
pub struct BluezBus {
    session: bluer::Session,
    connection: Arc<SyncConnection>,
    crossroads: Arc<Mutex<Crossroads>>,
    tokens: Tokens,
    resource: JoinHandle<()>,
}

impl std::fmt::Debug for BluezBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluezBus")
            .field("unique_name", &self.connection.unique_name().to_string())
            .finish()
    }
}

impl Drop for BluezBus {
    fn drop(&mut self) {
        self.resource.abort();
    }
}

impl BluezBus {
    /// Opens a connection to the system bus and starts serving the objects exported on it.
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;

        let (resource, connection) = dbus_tokio::connection::new_system_sync()?;
        let resource = tokio::spawn(async move {
            let err = resource.await;
            error!("lost connection to D-Bus: {}", err);
        });

        let mut cr = Crossroads::new();
        let tokens = Tokens::register(&mut cr);
        let crossroads = Arc::new(Mutex::new(cr));

        {
            let crossroads = crossroads.clone();
            connection.start_receive(
                MatchRule::new_method_call(),
                Box::new(move |msg, conn| {
                    if crossroads.lock().handle_message(msg, conn).is_err() {
                        trace!("method call not handled");
                    }
                    true
                }),
            );
        }

        debug!("connected to D-Bus as {}", connection.unique_name());
        Ok(BluezBus {
            session,
            connection,
            crossroads,
            tokens,
            resource,
        })
    }

    fn adapter(&self, name: &str) -> Result<BluezAdapter> {
        Ok(BluezAdapter::new(self.session.adapter(name)?, self.connection.clone()))
    }

    /// Paths of the objects implementing `interface`.
    async fn managers(&self, interface: Interface) -> Result<Vec<String>> {
        let proxy = Proxy::new(BLUEZ_SERVICE, "/", TIMEOUT, self.connection.clone());
        let objects = proxy.get_managed_objects().await?;

        let mut paths: Vec<String> = objects
            .into_iter()
            .filter(|(_, interfaces)| interfaces.contains_key(interface.name()))
            .map(|(path, _)| path.to_string())
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl Bus for BluezBus {
    async fn adapters(&self) -> Result<Vec<Arc<dyn AdapterProxy>>> {
        let mut adapters: Vec<Arc<dyn AdapterProxy>> = Vec::new();
        for name in self.session.adapter_names().await? {
            adapters.push(Arc::new(self.adapter(&name)?));
        }
        Ok(adapters)
    }

    async fn devices(&self) -> Result<Vec<Arc<dyn DeviceProxy>>> {
        let mut devices: Vec<Arc<dyn DeviceProxy>> = Vec::new();
        for name in self.session.adapter_names().await? {
            let adapter = self.session.adapter(&name)?;
            for address in adapter.device_addresses().await? {
                devices.push(Arc::new(BluezDevice::new(adapter.device(address)?)));
            }
        }
        Ok(devices)
    }

    async fn gatt_managers(&self) -> Result<Vec<Arc<dyn GattManagerProxy>>> {
        Ok(self
            .managers(Interface::GattManager)
            .await?
            .into_iter()
            .map(|path| Arc::new(BluezGattManager::new(path, self.connection.clone())) as Arc<dyn GattManagerProxy>)
            .collect())
    }

    async fn advertising_managers(&self) -> Result<Vec<Arc<dyn AdvertisingManagerProxy>>> {
        Ok(self
            .managers(Interface::AdvertisingManager)
            .await?
            .into_iter()
            .map(|path| {
                let manager = BluezAdvertisingManager::new(path, self.connection.clone());
                Arc::new(manager) as Arc<dyn AdvertisingManagerProxy>
            })
            .collect())
    }

    async fn events(&self) -> Result<BusEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for name in self.session.adapter_names().await? {
            let (ready_tx, ready_rx) = oneshot::channel();
            tasks.spawn(forward_adapter_events(self.adapter(&name)?, tx.clone(), Some(ready_tx)));
            ready_rx.await.unwrap_or_else(|_| Err(ErrorKind::Internal.into()))?;
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        tasks.spawn(forward_session_events(
            self.session.clone(),
            self.connection.clone(),
            tx,
            ready_tx,
        ));
        ready_rx.await.unwrap_or_else(|_| Err(ErrorKind::Internal.into()))?;

        Ok(Box::pin(Forwarded::new(rx, tasks)))
    }

    async fn request_name(&self, name: &str) -> Result<()> {
        match self.connection.request_name(name, false, true, true).await? {
            RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => Ok(()),
            reply => Err(Error::with_message(
                ErrorKind::DBus,
                format!("could not become the owner of {name}: {reply:?}"),
            )),
        }
    }

    async fn release_name(&self, name: &str) -> Result<()> {
        match self.connection.release_name(name).await? {
            ReleaseNameReply::Released => Ok(()),
            reply => Err(Error::with_message(
                ErrorKind::DBus,
                format!("could not release {name}: {reply:?}"),
            )),
        }
    }

    async fn export_service(&self, service: &Arc<GattService>) -> Result<()> {
        self.tokens.insert_service(&mut self.crossroads.lock(), service)
    }

    async fn unexport_service(&self, service: &GattService) -> Result<()> {
        self.tokens.remove_service(&mut self.crossroads.lock(), service)
    }

    async fn export_advertisement(&self, advertisement: &Arc<Advertisement>) -> Result<()> {
        self.tokens.insert_advertisement(&mut self.crossroads.lock(), advertisement)
    }

    async fn unexport_advertisement(&self, advertisement: &Advertisement) -> Result<()> {
        self.tokens.remove_advertisement(&mut self.crossroads.lock(), advertisement)
    }

    async fn set_characteristic_value(&self, characteristic_path: &str, value: &[u8]) -> Result<()> {
        let msg = {
            let mut changed_properties = PropMap::new();
            changed_properties.insert("Value".to_owned(), Variant(Box::new(value.to_vec())));
            let signal = PropertiesPropertiesChanged {
                interface_name: Interface::GattCharacteristic.name().to_owned(),
                changed_properties,
                invalidated_properties: Vec::new(),
            };
            signal.to_emit_message(&dbus_path(characteristic_path)?)
        };

        self.connection
            .send(msg)
            .map_err(|()| Error::with_message(ErrorKind::DBus, format!("failed to notify {characteristic_path}")))?;
        trace!("notified {} bytes on {}", value.len(), characteristic_path);
        Ok(())
    }
}

/// Forwards device and power changes of one adapter until the receiving side goes away.
async fn forward_adapter_events(
    adapter: BluezAdapter,
    tx: mpsc::UnboundedSender<BusEvent>,
    ready: Option<oneshot::Sender<Result<()>>>,
) {
    let events = match adapter.inner().events().await {
        Ok(events) => {
            if let Some(ready) = ready {
                let _ = ready.send(Ok(()));
            }
            events
        }
        Err(err) => {
            warn!("cannot watch {}: {:?}", adapter.object_path(), err);
            if let Some(ready) = ready {
                let _ = ready.send(Err(err.into()));
            }
            return;
        }
    };

    let name = adapter.name().to_owned();
    let mut events = Box::pin(events);
    while let Some(event) = events.next().await {
        let event = match event {
            bluer::AdapterEvent::DeviceAdded(address) => match adapter.inner().device(address) {
                Ok(device) => BusEvent::DeviceAdded(Arc::new(BluezDevice::new(device))),
                Err(err) => {
                    warn!("cannot reach device {} on {}: {:?}", address, name, err);
                    continue;
                }
            },
            bluer::AdapterEvent::DeviceRemoved(address) => BusEvent::InterfacesRemoved {
                path: device_path(&name, address),
                interfaces: vec![Interface::Device.name().to_owned()],
            },
            bluer::AdapterEvent::PropertyChanged(bluer::AdapterProperty::Powered(powered)) => {
                let address = match adapter.address().await {
                    Ok(address) => address,
                    Err(err) => {
                        warn!("cannot read the address of {}: {:?}", name, err);
                        String::new()
                    }
                };
                BusEvent::AdapterPowered {
                    path: adapter.object_path().to_owned(),
                    address,
                    powered,
                }
            }
            _ => continue,
        };

        if tx.send(event).is_err() {
            break;
        }
    }

    debug!("stopped watching {}", name);
}

/// Forwards adapters coming and going, watching each new adapter, until the receiving side goes away.
async fn forward_session_events(
    session: bluer::Session,
    connection: Arc<SyncConnection>,
    tx: mpsc::UnboundedSender<BusEvent>,
    ready: oneshot::Sender<Result<()>>,
) {
    let events = match session.events().await {
        Ok(events) => {
            let _ = ready.send(Ok(()));
            events
        }
        Err(err) => {
            let _ = ready.send(Err(err.into()));
            return;
        }
    };

    let mut adapters = JoinSet::new();
    let mut events = Box::pin(events);
    while let Some(event) = events.next().await {
        let event = match event {
            bluer::SessionEvent::AdapterAdded(name) => {
                let adapter = match session.adapter(&name) {
                    Ok(adapter) => BluezAdapter::new(adapter, connection.clone()),
                    Err(err) => {
                        warn!("cannot reach adapter {}: {:?}", name, err);
                        continue;
                    }
                };
                adapters.spawn(forward_adapter_events(adapter.clone(), tx.clone(), None));
                BusEvent::AdapterAdded(Arc::new(adapter))
            }
            bluer::SessionEvent::AdapterRemoved(name) => BusEvent::InterfacesRemoved {
                path: format!("/org/bluez/{name}"),
                interfaces: vec![Interface::Adapter.name().to_owned()],
            },
        };

        if tx.send(event).is_err() {
            break;
        }
    }

    debug!("stopped watching adapters");
}
