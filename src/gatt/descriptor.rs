use super::{properties, Properties, PropertyValue};
use crate::btuuid::descriptors::CHARACTERISTIC_USER_DESCRIPTION;
use crate::btuuid::BluetoothUuidExt;
use crate::Uuid;

/// A read-only characteristic user description (`org.bluez.GattDescriptor1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    path: String,
    characteristic_path: String,
    value: Vec<u8>,
}

impl Descriptor {
    pub(crate) fn new(characteristic_path: &str, description: &str) -> Self {
        Descriptor {
            path: format!("{characteristic_path}/desc0"),
            characteristic_path: characteristic_path.to_owned(),
            value: description.as_bytes().to_vec(),
        }
    }

    /// The object path of this descriptor.
    pub fn object_path(&self) -> &str {
        &self.path
    }

    /// The object path of the characteristic this descriptor belongs to.
    pub fn characteristic_path(&self) -> &str {
        &self.characteristic_path
    }

    /// The UUID of this descriptor.
    pub fn uuid(&self) -> Uuid {
        CHARACTERISTIC_USER_DESCRIPTION
    }

    /// Handles `ReadValue`.
    pub fn read_value(&self) -> Vec<u8> {
        self.value.clone()
    }

    /// The `org.bluez.GattDescriptor1` properties.
    pub fn properties(&self) -> Properties {
        properties([
            ("UUID", PropertyValue::String(self.uuid().to_bluez_string())),
            (
                "Characteristic",
                PropertyValue::ObjectPath(self.characteristic_path.clone()),
            ),
            ("Flags", PropertyValue::Strings(vec!["read".to_owned()])),
        ])
    }
}
