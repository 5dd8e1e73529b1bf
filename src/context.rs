//! State shared by the GATT server and GATT client roles.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bus::{AdapterProxy, Bus, BusEvent, BusEventStream, DeviceProxy, Interface, RemoteCharacteristic};
use crate::error::ErrorKind;
use crate::event_loop::EventLoop;
use crate::gatt::GattService;
use crate::{AdapterState, Config, Error, Result};

/// Receives a fragment sent by a peer.
///
/// Returns the number of bytes consumed, which must equal the length of the fragment for the fragment to be
/// acknowledged.
pub type PacketReceivedCallback = Arc<dyn Fn(&str, &[u8]) -> Result<usize> + Send + Sync>;

/// Receives changes of the local adapter power state.
pub type AdapterStateCallback = Arc<dyn Fn(AdapterState) + Send + Sync>;

/// Receives send failures along with the peer, if known, and the payload that could not be sent.
pub type ErrorCallback = Arc<dyn Fn(Option<&str>, &[u8], &Error) + Send + Sync>;

/// Callbacks into the layer above the transport.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Fragments written by GATT clients to the request characteristic.
    pub server_packet_received: Option<PacketReceivedCallback>,
    /// Fragments notified by GATT servers on the response characteristic.
    pub client_packet_received: Option<PacketReceivedCallback>,
    /// Local adapter power state changes.
    pub adapter_state_changed: Option<AdapterStateCallback>,
    /// Failed request writes.
    pub client_error: Option<ErrorCallback>,
    /// Failed response notifications.
    pub server_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("server_packet_received", &self.server_packet_received.is_some())
            .field("client_packet_received", &self.client_packet_received.is_some())
            .field("adapter_state_changed", &self.adapter_state_changed.is_some())
            .field("client_error", &self.client_error.is_some())
            .field("server_error", &self.server_error.is_some())
            .finish()
    }
}

/// Which role a runtime handle is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The GATT client role, which also runs the base event loop.
    Client,
    /// The GATT server role.
    Server,
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) bus: Option<Arc<dyn Bus>>,
    pub(crate) adapters: Vec<Arc<dyn AdapterProxy>>,
    pub(crate) devices: Vec<Arc<dyn DeviceProxy>>,
    /// Subscribed GATT clients, keyed by their synthesized address.
    pub(crate) characteristic_map: HashMap<String, Arc<GattService>>,
    /// Request characteristics of connected GATT servers, in connection order.
    pub(crate) request_characteristics: Vec<(String, Arc<dyn RemoteCharacteristic>)>,
    /// Characteristic object path to peer address.
    pub(crate) address_map: HashMap<String, String>,
    pub(crate) notification_tasks: HashMap<String, JoinHandle<()>>,
    pub(crate) callbacks: Callbacks,
    pub(crate) event_loop: Option<EventLoop>,
    pub(crate) client_runtime: Option<Handle>,
    pub(crate) server_runtime: Option<Handle>,
}

/// The transport context.
///
/// A single `Context` is shared by every role of one transport instance. All of its state lives behind one mutex,
/// which is never held across an `.await`.
pub struct Context {
    config: Config,
    state: Mutex<State>,
    changed: Notify,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("attached", &state.bus.is_some())
            .field("adapters", &state.adapters.len())
            .field("devices", &state.devices.len())
            .field("subscribed_peers", &state.characteristic_map.len())
            .field("connected_peers", &state.request_characteristics.len())
            .field("callbacks", &state.callbacks)
            .finish()
    }
}

impl Context {
    /// Creates a context which is not yet attached to a bus.
    ///
    /// Both roles use the Tokio runtime current at construction until told otherwise.
    pub fn new(config: Config) -> Arc<Self> {
        let runtime = Handle::try_current().ok();
        Arc::new(Context {
            config,
            state: Mutex::new(State {
                client_runtime: runtime.clone(),
                server_runtime: runtime,
                ..Default::default()
            }),
            changed: Notify::new(),
        })
    }

    /// The transport configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    /// The bus the context is attached to.
    pub fn bus(&self) -> Result<Arc<dyn Bus>> {
        self.lock()
            .bus
            .clone()
            .ok_or_else(|| Error::with_message(ErrorKind::AdapterNotEnabled, "not connected to BlueZ"))
    }

    /// Returns `true` if the context is attached to a bus.
    pub fn is_attached(&self) -> bool {
        self.lock().bus.is_some()
    }

    /// Local adapters known to the context.
    pub fn adapters(&self) -> Vec<Arc<dyn AdapterProxy>> {
        self.lock().adapters.clone()
    }

    /// Remote devices publishing the transport service.
    pub fn devices(&self) -> Vec<Arc<dyn DeviceProxy>> {
        self.lock().devices.clone()
    }

    /// A snapshot of the registered callbacks.
    pub fn callbacks(&self) -> Callbacks {
        self.lock().callbacks.clone()
    }

    /// Updates the registered callbacks.
    pub fn set_callbacks(&self, f: impl FnOnce(&mut Callbacks)) {
        f(&mut self.lock().callbacks)
    }

    /// Sets the runtime the given role spawns its tasks on.
    pub fn set_runtime(&self, role: Role, runtime: Handle) {
        let mut state = self.lock();
        match role {
            Role::Client => state.client_runtime = Some(runtime),
            Role::Server => state.server_runtime = Some(runtime),
        }
    }

    /// The runtime the given role spawns its tasks on.
    pub fn runtime(&self, role: Role) -> Result<Handle> {
        let state = self.lock();
        let runtime = match role {
            Role::Client => state.client_runtime.clone(),
            Role::Server => state.server_runtime.clone(),
        };
        runtime.ok_or_else(|| {
            Error::with_message(ErrorKind::InvalidState, format!("no runtime set for the {role:?} role"))
        })
    }

    /// Attaches the context to `bus`.
    ///
    /// Subscribes to BlueZ signals first, so no object added while the existing ones are enumerated is missed, then
    /// caches the adapters and the devices publishing the transport service. Returns the signal stream, whose events
    /// should be passed to [`Context::handle_event`].
    pub async fn attach(&self, bus: Arc<dyn Bus>) -> Result<BusEventStream> {
        let events = bus.events().await?;
        let adapters = bus.adapters().await?;

        let mut devices = Vec::new();
        for device in bus.devices().await? {
            if self.is_transport_device(&*device).await {
                devices.push(device);
            }
        }

        debug!("found {} adapter(s) and {} device(s)", adapters.len(), devices.len());

        {
            let mut state = self.lock();
            state.bus = Some(bus);
            state.adapters = adapters;
            state.devices = devices;
        }
        self.changed.notify_waiters();

        Ok(events)
    }

    /// Detaches the context from its bus, forgetting every proxy and peer.
    ///
    /// Returns the bus the context was attached to.
    pub fn detach(&self) -> Option<Arc<dyn Bus>> {
        let (bus, adapters, devices, services, characteristics, addresses, tasks) = {
            let mut state = self.lock();
            (
                state.bus.take(),
                mem::take(&mut state.adapters),
                mem::take(&mut state.devices),
                mem::take(&mut state.characteristic_map),
                mem::take(&mut state.request_characteristics),
                mem::take(&mut state.address_map),
                mem::take(&mut state.notification_tasks),
            )
        };

        // Released outside the lock.
        for task in tasks.into_values() {
            task.abort();
        }
        drop((adapters, devices, services, characteristics, addresses));

        bus
    }

    /// Applies a BlueZ signal to the cached proxies.
    pub async fn handle_event(&self, event: BusEvent) {
        trace!("bus event: {:?}", event);

        match event {
            BusEvent::AdapterAdded(adapter) => {
                info!("adapter {} added", adapter.object_path());
                self.lock().adapters.push(adapter);
                self.changed.notify_waiters();
            }
            BusEvent::DeviceAdded(device) => {
                if self.is_transport_device(&*device).await {
                    debug!("device {} added", device.object_path());
                    {
                        let mut state = self.lock();
                        if !state.devices.iter().any(|x| x.object_path() == device.object_path()) {
                            state.devices.push(device);
                        }
                    }
                    self.changed.notify_waiters();
                }
            }
            BusEvent::InterfacesRemoved { path, interfaces } => {
                for interface in interfaces.iter().filter_map(|x| Interface::from_name(x)) {
                    match interface {
                        Interface::Adapter => self.remove_adapter(&path),
                        Interface::Device => self.remove_device(&path),
                        _ => (),
                    }
                }
            }
            BusEvent::AdapterPowered { path, address, powered } => {
                info!("adapter {} ({}) powered {}", path, address, if powered { "on" } else { "off" });
                let callback = self.lock().callbacks.adapter_state_changed.clone();
                if let Some(callback) = callback {
                    callback(if powered {
                        AdapterState::Enabled
                    } else {
                        AdapterState::Disabled
                    });
                }
            }
        }
    }

    fn remove_adapter(&self, path: &str) {
        let removed: Vec<_> = {
            let mut state = self.lock();
            let (removed, kept): (Vec<_>, Vec<_>) = mem::take(&mut state.adapters)
                .into_iter()
                .partition(|x| x.object_path() == path);
            state.adapters = kept;
            removed
        };

        if !removed.is_empty() {
            info!("adapter {} removed", path);
        }
    }

    fn remove_device(&self, path: &str) {
        let prefix = format!("{path}/");
        let (devices, characteristics, tasks) = {
            let mut state = self.lock();
            let (devices, kept): (Vec<_>, Vec<_>) = mem::take(&mut state.devices)
                .into_iter()
                .partition(|x| x.object_path() == path);
            state.devices = kept;

            let (characteristics, kept): (Vec<_>, Vec<_>) = mem::take(&mut state.request_characteristics)
                .into_iter()
                .partition(|(_, x)| x.object_path().starts_with(&prefix));
            state.request_characteristics = kept;
            state.address_map.retain(|x, _| !x.starts_with(&prefix));

            let tasks: Vec<_> = characteristics
                .iter()
                .filter_map(|(peer, _)| state.notification_tasks.remove(peer))
                .collect();
            (devices, characteristics, tasks)
        };

        for task in tasks {
            task.abort();
        }

        if !devices.is_empty() {
            debug!("device {} removed, {} peer(s) dropped", path, characteristics.len());
        }
    }

    async fn is_transport_device(&self, device: &dyn DeviceProxy) -> bool {
        match device.uuids().await {
            Ok(uuids) => uuids.contains(&self.config.service_uuid),
            Err(err) => {
                debug!("ignoring device {}: {:?}", device.object_path(), err);
                false
            }
        }
    }

    /// Waits until `ready` holds, checking after every change of the cached proxies.
    ///
    /// Gives up after `retries` waits of `timeout` each.
    pub(crate) async fn wait_for(&self, retries: u32, timeout: Duration, ready: impl Fn(&State) -> bool) -> bool {
        for _ in 0..retries {
            let changed = self.changed.notified();
            let is_ready = ready(&self.lock());
            if is_ready {
                return true;
            }
            let _ = tokio::time::timeout(timeout, changed).await;
        }

        let is_ready = ready(&self.lock());
        is_ready
    }

    pub(crate) fn notify_changed(&self) {
        self.changed.notify_waiters();
    }

    /// Registers `service` as the one notifying `peer`.
    ///
    /// Returns `false` if `peer` is already registered.
    pub fn insert_peer(&self, peer: &str, service: Arc<GattService>) -> bool {
        let mut state = self.lock();
        if state.characteristic_map.contains_key(peer) {
            return false;
        }
        state.characteristic_map.insert(peer.to_owned(), service);
        true
    }

    /// Forgets `peer`, returning the service that was notifying it.
    pub fn remove_peer(&self, peer: &str) -> Option<Arc<GattService>> {
        self.lock().characteristic_map.remove(peer)
    }

    /// The service notifying `peer`.
    pub fn lookup_peer(&self, peer: &str) -> Option<Arc<GattService>> {
        self.lock().characteristic_map.get(peer).cloned()
    }

    /// Addresses of the GATT clients subscribed to the response characteristic.
    pub fn subscribed_peers(&self) -> Vec<String> {
        self.lock().characteristic_map.keys().cloned().collect()
    }

    /// Records the request characteristic of the GATT server `peer`, replacing any previous one.
    pub fn insert_request_characteristic(&self, peer: &str, characteristic: Arc<dyn RemoteCharacteristic>) {
        let mut state = self.lock();
        if let Some((_, old)) = state.request_characteristics.iter().find(|(x, _)| x == peer) {
            let old = old.object_path().to_owned();
            state.address_map.remove(&old);
        }
        state.request_characteristics.retain(|(x, _)| x != peer);
        state
            .address_map
            .insert(characteristic.object_path().to_owned(), peer.to_owned());
        state.request_characteristics.push((peer.to_owned(), characteristic));
    }

    /// Forgets the GATT server `peer`.
    pub fn remove_request_characteristic(&self, peer: &str) -> Option<Arc<dyn RemoteCharacteristic>> {
        let (removed, task) = {
            let mut state = self.lock();
            let index = state.request_characteristics.iter().position(|(x, _)| x == peer);
            let removed = index.map(|i| state.request_characteristics.remove(i).1);
            if let Some(removed) = &removed {
                state.address_map.remove(removed.object_path());
            }
            (removed, state.notification_tasks.remove(peer))
        };

        if let Some(task) = task {
            task.abort();
        }
        removed
    }

    /// The request characteristic of the GATT server `peer`.
    pub fn request_characteristic(&self, peer: &str) -> Option<Arc<dyn RemoteCharacteristic>> {
        self.lock()
            .request_characteristics
            .iter()
            .find(|(x, _)| x == peer)
            .map(|(_, x)| x.clone())
    }

    /// The request characteristics of every connected GATT server, in connection order.
    pub fn request_characteristics(&self) -> Vec<(String, Arc<dyn RemoteCharacteristic>)> {
        self.lock().request_characteristics.clone()
    }

    /// The peer owning the characteristic at `path`.
    pub fn peer_for_characteristic(&self, path: &str) -> Option<String> {
        self.lock().address_map.get(path).cloned()
    }

    pub(crate) fn insert_notification_task(&self, peer: &str, task: JoinHandle<()>) {
        let old = self.lock().notification_tasks.insert(peer.to_owned(), task);
        if let Some(old) = old {
            old.abort();
        }
    }

    pub(crate) fn report_client_error(&self, peer: Option<&str>, data: &[u8], err: &Error) {
        warn!("failed to send {} bytes to {}: {}", data.len(), peer.unwrap_or("all peers"), err);
        let state = self.lock();
        if let Some(callback) = &state.callbacks.client_error {
            callback(peer, data, err);
        }
    }

    pub(crate) fn report_server_error(&self, peer: Option<&str>, data: &[u8], err: &Error) {
        warn!("failed to notify {} bytes to {}: {}", data.len(), peer.unwrap_or("all peers"), err);
        let state = self.lock();
        if let Some(callback) = &state.callbacks.server_error {
            callback(peer, data, err);
        }
    }
}
