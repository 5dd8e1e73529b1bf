//! An in-memory BlueZ used by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gattlink::advertisement::Advertisement;
use gattlink::bus::{
    AdapterProxy, AdvertisingManagerProxy, Bus, BusEvent, BusEventStream, Connector, DeviceProxy, DiscoveryFilter,
    GattManagerProxy, NotificationStream, RemoteCharacteristic, TransportCharacteristics,
};
use gattlink::error::ErrorKind;
use gattlink::gatt::GattService;
use gattlink::{Config, Error, Result, Uuid};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Calls made on the mock objects, in order.
pub type Log = Arc<Mutex<Vec<String>>>;

fn failure(what: &str) -> Error {
    Error::with_message(ErrorKind::Other, format!("{what} failed"))
}

/// A configuration with short wait budgets.
pub fn test_config() -> Config {
    Config {
        startup_retries: 2,
        startup_timeout: Duration::from_millis(50),
        peripheral_retries: 2,
        peripheral_timeout: Duration::from_millis(100),
        discovery_retries: 2,
        discovery_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

#[derive(Debug)]
pub struct MockAdapter {
    path: String,
    address: String,
    pub powered: AtomicBool,
    pub discoverable: AtomicBool,
    pub discovering: AtomicBool,
    pub filter: Mutex<Option<DiscoveryFilter>>,
    log: Log,
}

impl MockAdapter {
    pub fn new(name: &str, address: &str, log: &Log) -> Arc<Self> {
        Arc::new(MockAdapter {
            path: format!("/org/bluez/{name}"),
            address: address.to_owned(),
            powered: AtomicBool::new(false),
            discoverable: AtomicBool::new(false),
            discovering: AtomicBool::new(false),
            filter: Mutex::new(None),
            log: log.clone(),
        })
    }

    fn record(&self, call: &str) {
        self.log.lock().push(format!("{} {}", self.path, call));
    }
}

#[async_trait]
impl AdapterProxy for MockAdapter {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn address(&self) -> Result<String> {
        Ok(self.address.clone())
    }

    async fn is_powered(&self) -> Result<bool> {
        Ok(self.powered.load(Ordering::SeqCst))
    }

    async fn set_powered(&self, powered: bool) -> Result<()> {
        self.record(&format!("Powered={powered}"));
        self.powered.store(powered, Ordering::SeqCst);
        Ok(())
    }

    async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        self.record(&format!("Discoverable={discoverable}"));
        self.discoverable.store(discoverable, Ordering::SeqCst);
        Ok(())
    }

    async fn is_discovering(&self) -> Result<bool> {
        Ok(self.discovering.load(Ordering::SeqCst))
    }

    async fn set_discovery_filter(&self, filter: &DiscoveryFilter) -> Result<()> {
        self.record("SetDiscoveryFilter");
        *self.filter.lock() = Some(filter.clone());
        Ok(())
    }

    async fn start_discovery(&self) -> Result<()> {
        self.record("StartDiscovery");
        self.discovering.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.record("StopDiscovery");
        self.discovering.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockCharacteristic {
    path: String,
    pub written: Mutex<Vec<Vec<u8>>>,
    pub fail_writes: AtomicBool,
    notifier: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl MockCharacteristic {
    pub fn new(path: String) -> Arc<Self> {
        Arc::new(MockCharacteristic {
            path,
            written: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            notifier: Mutex::new(None),
        })
    }

    /// Notifies `value` to whoever subscribed. Returns `false` if nobody did.
    pub fn notify(&self, value: &[u8]) -> bool {
        match &*self.notifier.lock() {
            Some(tx) => tx.send(value.to_vec()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl RemoteCharacteristic for MockCharacteristic {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn write_value(&self, value: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(failure("WriteValue"));
        }
        self.written.lock().push(value.to_vec());
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notifier.lock() = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

#[derive(Debug)]
pub struct MockDevice {
    path: String,
    address: String,
    uuids: Vec<Uuid>,
    pub connected: AtomicBool,
    pub request: Arc<MockCharacteristic>,
    pub response: Arc<MockCharacteristic>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl MockDevice {
    /// A device on `hci0` publishing the service `uuid`.
    pub fn new(address: &str, uuid: Uuid) -> Arc<Self> {
        let path = format!("/org/bluez/hci0/dev_{}", address.replace(':', "_"));
        let service = format!("{path}/service000c");
        Arc::new(MockDevice {
            request: MockCharacteristic::new(format!("{service}/char000d")),
            response: MockCharacteristic::new(format!("{service}/char000f")),
            path,
            address: address.to_owned(),
            uuids: vec![uuid],
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DeviceProxy for MockDevice {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn address(&self) -> Result<String> {
        Ok(self.address.clone())
    }

    async fn uuids(&self) -> Result<Vec<Uuid>> {
        Ok(self.uuids.clone())
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn transport_characteristics(&self, config: &Config) -> Result<Option<TransportCharacteristics>> {
        if !self.uuids.contains(&config.service_uuid) {
            return Ok(None);
        }
        Ok(Some(TransportCharacteristics {
            request: self.request.clone(),
            response: self.response.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct MockGattManager {
    path: String,
    fail: bool,
    pub registered: Mutex<Vec<String>>,
}

impl MockGattManager {
    pub fn new(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(MockGattManager {
            path: format!("/org/bluez/{name}"),
            fail,
            registered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl GattManagerProxy for MockGattManager {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn register_service(&self, service_path: &str) -> Result<()> {
        if self.fail {
            return Err(failure("RegisterApplication"));
        }
        self.registered.lock().push(service_path.to_owned());
        Ok(())
    }

    async fn unregister_service(&self, service_path: &str) -> Result<()> {
        self.registered.lock().retain(|x| x != service_path);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockAdvertisingManager {
    path: String,
    fail: bool,
    pub registered: Mutex<Vec<String>>,
}

impl MockAdvertisingManager {
    pub fn new(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(MockAdvertisingManager {
            path: format!("/org/bluez/{name}"),
            fail,
            registered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AdvertisingManagerProxy for MockAdvertisingManager {
    fn object_path(&self) -> &str {
        &self.path
    }

    async fn register_advertisement(&self, advertisement_path: &str) -> Result<()> {
        if self.fail {
            return Err(failure("RegisterAdvertisement"));
        }
        self.registered.lock().push(advertisement_path.to_owned());
        Ok(())
    }

    async fn unregister_advertisement(&self, advertisement_path: &str) -> Result<()> {
        self.registered.lock().retain(|x| x != advertisement_path);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockBus {
    pub adapters: Mutex<Vec<Arc<MockAdapter>>>,
    pub devices: Mutex<Vec<Arc<MockDevice>>>,
    pub gatt_managers: Mutex<Vec<Arc<MockGattManager>>>,
    pub advertising_managers: Mutex<Vec<Arc<MockAdvertisingManager>>>,
    pub exported: Mutex<BTreeMap<String, Arc<GattService>>>,
    pub advertisements: Mutex<Vec<String>>,
    pub names: Mutex<Vec<String>>,
    /// Values set on exported characteristics, with their object path.
    pub values: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail_values: AtomicBool,
    events: Mutex<Option<mpsc::UnboundedSender<BusEvent>>>,
    pub log: Log,
}

impl MockBus {
    /// A bus with one powered-off adapter `hci0` and its managers.
    pub fn with_adapter() -> Arc<Self> {
        let bus = Arc::new(MockBus::default());
        bus.add_adapter("hci0", "00:11:22:33:44:55", false, false);
        bus
    }

    pub fn add_adapter(&self, name: &str, address: &str, fail_gatt: bool, fail_advertising: bool) -> Arc<MockAdapter> {
        let adapter = MockAdapter::new(name, address, &self.log);
        self.adapters.lock().push(adapter.clone());
        self.gatt_managers.lock().push(MockGattManager::new(name, fail_gatt));
        self.advertising_managers
            .lock()
            .push(MockAdvertisingManager::new(name, fail_advertising));
        adapter
    }

    pub fn adapter(&self, index: usize) -> Arc<MockAdapter> {
        self.adapters.lock()[index].clone()
    }

    /// Sends a signal on the stream handed out by [`Bus::events`]. Returns `false` if nobody listens.
    pub fn emit(&self, event: BusEvent) -> bool {
        match &*self.events.lock() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn exported_service(&self, hci: &str) -> Option<Arc<GattService>> {
        self.exported
            .lock()
            .values()
            .find(|x| x.hci() == hci)
            .cloned()
    }
}

#[async_trait]
impl Bus for MockBus {
    async fn adapters(&self) -> Result<Vec<Arc<dyn AdapterProxy>>> {
        Ok(self
            .adapters
            .lock()
            .iter()
            .map(|x| x.clone() as Arc<dyn AdapterProxy>)
            .collect())
    }

    async fn devices(&self) -> Result<Vec<Arc<dyn DeviceProxy>>> {
        Ok(self
            .devices
            .lock()
            .iter()
            .map(|x| x.clone() as Arc<dyn DeviceProxy>)
            .collect())
    }

    async fn gatt_managers(&self) -> Result<Vec<Arc<dyn GattManagerProxy>>> {
        Ok(self
            .gatt_managers
            .lock()
            .iter()
            .map(|x| x.clone() as Arc<dyn GattManagerProxy>)
            .collect())
    }

    async fn advertising_managers(&self) -> Result<Vec<Arc<dyn AdvertisingManagerProxy>>> {
        Ok(self
            .advertising_managers
            .lock()
            .iter()
            .map(|x| x.clone() as Arc<dyn AdvertisingManagerProxy>)
            .collect())
    }

    async fn events(&self) -> Result<BusEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn request_name(&self, name: &str) -> Result<()> {
        self.names.lock().push(name.to_owned());
        Ok(())
    }

    async fn release_name(&self, name: &str) -> Result<()> {
        self.names.lock().retain(|x| x != name);
        Ok(())
    }

    async fn export_service(&self, service: &Arc<GattService>) -> Result<()> {
        self.exported
            .lock()
            .insert(service.object_path().to_owned(), service.clone());
        Ok(())
    }

    async fn unexport_service(&self, service: &GattService) -> Result<()> {
        self.exported.lock().remove(service.object_path());
        Ok(())
    }

    async fn export_advertisement(&self, advertisement: &Arc<Advertisement>) -> Result<()> {
        self.advertisements
            .lock()
            .push(advertisement.object_path().to_owned());
        Ok(())
    }

    async fn unexport_advertisement(&self, advertisement: &Advertisement) -> Result<()> {
        self.advertisements
            .lock()
            .retain(|x| x != advertisement.object_path());
        Ok(())
    }

    async fn set_characteristic_value(&self, characteristic_path: &str, value: &[u8]) -> Result<()> {
        if self.fail_values.load(Ordering::SeqCst) {
            return Err(failure("PropertiesChanged"));
        }
        self.values
            .lock()
            .push((characteristic_path.to_owned(), value.to_vec()));
        Ok(())
    }
}

/// Hands out the same [`MockBus`] on every connection.
#[derive(Debug, Clone)]
pub struct MockConnector(pub Arc<MockBus>);

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn Bus>> {
        Ok(self.0.clone())
    }
}

/// Collects what a packet-received callback is handed, and consumes `consumed(len)` bytes of each fragment.
#[derive(Clone, Default)]
pub struct Received(pub Arc<Mutex<Vec<(String, Vec<u8>)>>>);

impl Received {
    pub fn callback(&self, consumed: fn(usize) -> usize) -> gattlink::context::PacketReceivedCallback {
        let received = self.0.clone();
        Arc::new(move |peer: &str, data: &[u8]| {
            received.lock().push((peer.to_owned(), data.to_vec()));
            Ok(consumed(data.len()))
        })
    }

    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// Collects the peers and payloads handed to an error callback.
#[derive(Clone, Default)]
pub struct Failures(pub Arc<Mutex<Vec<(Option<String>, Vec<u8>, ErrorKind)>>>);

impl Failures {
    pub fn callback(&self) -> gattlink::context::ErrorCallback {
        let failures = self.0.clone();
        Arc::new(move |peer: Option<&str>, data: &[u8], err: &Error| {
            failures
                .lock()
                .push((peer.map(str::to_owned), data.to_vec(), err.kind()));
        })
    }

    pub fn take(&self) -> Vec<(Option<String>, Vec<u8>, ErrorKind)> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// Polls `check` until it holds, letting spawned tasks run in between. Gives up after about a second.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Counts the calls in `log` ending with `call`.
pub fn count(log: &Log, call: &str) -> usize {
    log.lock().iter().filter(|x| x.ends_with(call)).count()
}
