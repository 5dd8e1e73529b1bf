//! The BlueZ D-Bus surface used by the transport.
//!
//! Every BlueZ object the transport talks to is reached through one of the traits in this module. The
//! [`bluez`][crate::bluez] backend implements them on top of the system bus; other implementations (for example an
//! in-memory bus in tests) can be plugged in through a [`Connector`].

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::advertisement::Advertisement;
use crate::gatt::GattService;
use crate::{Config, Result, Uuid};

/// Name of the BlueZ service on the system bus.
pub const BLUEZ_SERVICE: &str = "org.bluez";

/// Error name used when rejecting a D-Bus method call made on an exported object.
pub const BLUEZ_ERROR_FAILED: &str = "org.bluez.Error.Failed";

/// Stream of signals received from BlueZ.
pub type BusEventStream = Pin<Box<dyn Stream<Item = BusEvent> + Send>>;

/// Stream of values notified by a remote characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// D-Bus interfaces the transport either implements or consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// `org.bluez.Adapter1`
    Adapter,
    /// `org.bluez.Device1`
    Device,
    /// `org.bluez.GattManager1`
    GattManager,
    /// `org.bluez.LEAdvertisingManager1`
    AdvertisingManager,
    /// `org.bluez.GattService1`
    GattService,
    /// `org.bluez.GattCharacteristic1`
    GattCharacteristic,
    /// `org.bluez.GattDescriptor1`
    GattDescriptor,
    /// `org.bluez.LEAdvertisement1`
    Advertisement,
    /// `org.freedesktop.DBus.ObjectManager`
    ObjectManager,
    /// `org.freedesktop.DBus.Properties`
    Properties,
}

impl Interface {
    const ALL: [Interface; 10] = [
        Interface::Adapter,
        Interface::Device,
        Interface::GattManager,
        Interface::AdvertisingManager,
        Interface::GattService,
        Interface::GattCharacteristic,
        Interface::GattDescriptor,
        Interface::Advertisement,
        Interface::ObjectManager,
        Interface::Properties,
    ];

    /// The D-Bus interface name.
    pub const fn name(self) -> &'static str {
        match self {
            Interface::Adapter => "org.bluez.Adapter1",
            Interface::Device => "org.bluez.Device1",
            Interface::GattManager => "org.bluez.GattManager1",
            Interface::AdvertisingManager => "org.bluez.LEAdvertisingManager1",
            Interface::GattService => "org.bluez.GattService1",
            Interface::GattCharacteristic => "org.bluez.GattCharacteristic1",
            Interface::GattDescriptor => "org.bluez.GattDescriptor1",
            Interface::Advertisement => "org.bluez.LEAdvertisement1",
            Interface::ObjectManager => "org.freedesktop.DBus.ObjectManager",
            Interface::Properties => "org.freedesktop.DBus.Properties",
        }
    }

    /// Looks up an interface by its D-Bus name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|x| x.name() == name)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A BlueZ signal relevant to the transport.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// `InterfacesAdded` for an `org.bluez.Adapter1` object
    AdapterAdded(Arc<dyn AdapterProxy>),
    /// `InterfacesAdded` for an `org.bluez.Device1` object
    DeviceAdded(Arc<dyn DeviceProxy>),
    /// `InterfacesRemoved`
    InterfacesRemoved {
        /// Object path the interfaces were removed from
        path: String,
        /// Names of the removed interfaces
        interfaces: Vec<String>,
    },
    /// `PropertiesChanged` of `org.bluez.Adapter1.Powered`
    AdapterPowered {
        /// Object path of the adapter
        path: String,
        /// Bluetooth address of the adapter
        address: String,
        /// The new value of the property
        powered: bool,
    },
}

/// Transport used while discovering devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DiscoveryTransport {
    /// Interleaved scan
    #[default]
    Auto,
    /// BR/EDR inquiry
    BrEdr,
    /// LE scan only
    Le,
}

/// Arguments of `org.bluez.Adapter1.SetDiscoveryFilter`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryFilter {
    /// Only report devices advertising one of these services
    pub uuids: Vec<Uuid>,
    /// Transport to scan on
    pub transport: DiscoveryTransport,
}

/// Proxy to a local Bluetooth adapter (`org.bluez.Adapter1`).
#[async_trait]
pub trait AdapterProxy: Send + Sync + fmt::Debug {
    /// The D-Bus object path, e.g. `/org/bluez/hci0`.
    fn object_path(&self) -> &str;

    /// The HCI name of the adapter, e.g. `hci0`.
    fn name(&self) -> &str {
        self.object_path().rsplit('/').next().unwrap_or_default()
    }

    /// The `Address` property.
    async fn address(&self) -> Result<String>;

    /// The `Powered` property.
    async fn is_powered(&self) -> Result<bool>;

    /// Sets the `Powered` property.
    async fn set_powered(&self, powered: bool) -> Result<()>;

    /// Sets the `Discoverable` property.
    async fn set_discoverable(&self, discoverable: bool) -> Result<()>;

    /// The `Discovering` property.
    async fn is_discovering(&self) -> Result<bool>;

    /// Calls `SetDiscoveryFilter`.
    async fn set_discovery_filter(&self, filter: &DiscoveryFilter) -> Result<()>;

    /// Calls `StartDiscovery`.
    async fn start_discovery(&self) -> Result<()>;

    /// Calls `StopDiscovery`.
    async fn stop_discovery(&self) -> Result<()>;
}

/// The request and response characteristics of a remote transport service.
#[derive(Debug, Clone)]
pub struct TransportCharacteristics {
    /// The characteristic requests are written to
    pub request: Arc<dyn RemoteCharacteristic>,
    /// The characteristic responses are notified on
    pub response: Arc<dyn RemoteCharacteristic>,
}

/// Proxy to a remote Bluetooth device (`org.bluez.Device1`).
#[async_trait]
pub trait DeviceProxy: Send + Sync + fmt::Debug {
    /// The D-Bus object path, e.g. `/org/bluez/hci0/dev_00_11_22_33_44_55`.
    fn object_path(&self) -> &str;

    /// The `Address` property.
    async fn address(&self) -> Result<String>;

    /// The `UUIDs` property, empty if the services of the device are not known.
    async fn uuids(&self) -> Result<Vec<Uuid>>;

    /// The `Connected` property.
    async fn is_connected(&self) -> Result<bool>;

    /// Calls `Connect`.
    async fn connect(&self) -> Result<()>;

    /// Calls `Disconnect`.
    async fn disconnect(&self) -> Result<()>;

    /// Resolves the transport characteristics published by the device, if it publishes the transport service.
    async fn transport_characteristics(&self, config: &Config) -> Result<Option<TransportCharacteristics>>;
}

/// Proxy to a characteristic of a remote GATT server (`org.bluez.GattCharacteristic1`).
#[async_trait]
pub trait RemoteCharacteristic: Send + Sync + fmt::Debug {
    /// The D-Bus object path of the characteristic.
    fn object_path(&self) -> &str;

    /// Calls `WriteValue`.
    async fn write_value(&self, value: &[u8]) -> Result<()>;

    /// Calls `StartNotify` and returns the stream of notified values.
    ///
    /// Notifications stop when the stream is dropped.
    async fn notifications(&self) -> Result<NotificationStream>;
}

/// Proxy to `org.bluez.GattManager1`.
#[async_trait]
pub trait GattManagerProxy: Send + Sync + fmt::Debug {
    /// The D-Bus object path, e.g. `/org/bluez/hci0`.
    fn object_path(&self) -> &str;

    /// Registers the service hierarchy rooted at `service_path`.
    async fn register_service(&self, service_path: &str) -> Result<()>;

    /// Unregisters the service hierarchy rooted at `service_path`.
    async fn unregister_service(&self, service_path: &str) -> Result<()>;
}

/// Proxy to `org.bluez.LEAdvertisingManager1`.
#[async_trait]
pub trait AdvertisingManagerProxy: Send + Sync + fmt::Debug {
    /// The D-Bus object path, e.g. `/org/bluez/hci0`.
    fn object_path(&self) -> &str;

    /// Calls `RegisterAdvertisement`.
    async fn register_advertisement(&self, advertisement_path: &str) -> Result<()>;

    /// Calls `UnregisterAdvertisement`.
    async fn unregister_advertisement(&self, advertisement_path: &str) -> Result<()>;
}

/// A connection to the bus BlueZ lives on.
#[async_trait]
pub trait Bus: Send + Sync + fmt::Debug {
    /// All `org.bluez.Adapter1` objects currently known to BlueZ.
    async fn adapters(&self) -> Result<Vec<Arc<dyn AdapterProxy>>>;

    /// All `org.bluez.Device1` objects currently known to BlueZ.
    async fn devices(&self) -> Result<Vec<Arc<dyn DeviceProxy>>>;

    /// All `org.bluez.GattManager1` objects.
    async fn gatt_managers(&self) -> Result<Vec<Arc<dyn GattManagerProxy>>>;

    /// All `org.bluez.LEAdvertisingManager1` objects.
    async fn advertising_managers(&self) -> Result<Vec<Arc<dyn AdvertisingManagerProxy>>>;

    /// Subscribes to the BlueZ signals the transport reacts to.
    async fn events(&self) -> Result<BusEventStream>;

    /// Requests ownership of a well-known bus name.
    async fn request_name(&self, name: &str) -> Result<()>;

    /// Releases a well-known bus name.
    async fn release_name(&self, name: &str) -> Result<()>;

    /// Exports the service, its characteristics and their descriptors, along with the object manager rooted at the
    /// service path.
    async fn export_service(&self, service: &Arc<GattService>) -> Result<()>;

    /// Removes the objects exported by [`Bus::export_service`].
    async fn unexport_service(&self, service: &GattService) -> Result<()>;

    /// Exports the `org.bluez.LEAdvertisement1` object.
    async fn export_advertisement(&self, advertisement: &Arc<Advertisement>) -> Result<()>;

    /// Removes the object exported by [`Bus::export_advertisement`].
    async fn unexport_advertisement(&self, advertisement: &Advertisement) -> Result<()>;

    /// Sets the `Value` property of an exported characteristic, which BlueZ delivers to the subscribed client as a
    /// notification.
    async fn set_characteristic_value(&self, characteristic_path: &str, value: &[u8]) -> Result<()>;
}

/// Opens a [`Bus`].
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Connects to the bus.
    async fn connect(&self) -> Result<Arc<dyn Bus>>;
}
