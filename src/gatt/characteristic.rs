use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{properties, Descriptor, Properties, PropertyValue};
use crate::btuuid::BluetoothUuidExt;
use crate::recv::RecvInfo;
use crate::Uuid;

/// The part a characteristic plays in the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicRole {
    /// Written by GATT clients without response.
    Request,
    /// Notified to the subscribed GATT client.
    Response,
}

impl CharacteristicRole {
    /// The `Flags` property of a characteristic with this role.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            CharacteristicRole::Request => &["write-without-response"],
            CharacteristicRole::Response => &["notify"],
        }
    }
}

/// A transport characteristic (`org.bluez.GattCharacteristic1`).
#[derive(Debug)]
pub struct Characteristic {
    path: String,
    uuid: Uuid,
    service_path: String,
    role: CharacteristicRole,
    descriptor: Descriptor,
    notifying: AtomicBool,
    recv_info: Mutex<RecvInfo>,
}

impl Characteristic {
    pub(crate) fn new(
        service_path: &str,
        index: usize,
        uuid: Uuid,
        role: CharacteristicRole,
        description: &str,
    ) -> Self {
        let path = format!("{service_path}/char{index}");
        Characteristic {
            descriptor: Descriptor::new(&path, description),
            path,
            uuid,
            service_path: service_path.to_owned(),
            role,
            notifying: AtomicBool::new(false),
            recv_info: Mutex::new(RecvInfo::default()),
        }
    }

    /// The object path of this characteristic.
    pub fn object_path(&self) -> &str {
        &self.path
    }

    /// The object path of the service this characteristic belongs to.
    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// The UUID of this characteristic.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The role of this characteristic.
    pub fn role(&self) -> CharacteristicRole {
        self.role
    }

    /// The user description of this characteristic.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The `Notifying` property.
    pub fn is_notifying(&self) -> bool {
        self.notifying.load(Ordering::Acquire)
    }

    pub(crate) fn set_notifying(&self, notifying: bool) {
        self.notifying.store(notifying, Ordering::Release)
    }

    /// Where fragments written to this characteristic are delivered.
    pub fn recv_info(&self) -> RecvInfo {
        self.recv_info.lock().clone()
    }

    pub(crate) fn set_recv_info(&self, info: RecvInfo) {
        *self.recv_info.lock() = info;
    }

    pub(crate) fn take_recv_info(&self) -> RecvInfo {
        std::mem::take(&mut *self.recv_info.lock())
    }

    /// The `org.bluez.GattCharacteristic1` properties published in the managed objects.
    pub fn properties(&self) -> Properties {
        properties([
            ("UUID", PropertyValue::String(self.uuid.to_bluez_string())),
            ("Service", PropertyValue::ObjectPath(self.service_path.clone())),
            (
                "Flags",
                PropertyValue::Strings(self.role.flags().iter().map(|x| (*x).to_owned()).collect()),
            ),
            (
                "Descriptors",
                PropertyValue::ObjectPaths(vec![self.descriptor.object_path().to_owned()]),
            ),
        ])
    }
}
