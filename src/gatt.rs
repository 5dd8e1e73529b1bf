//! The GATT object hierarchy exported for BlueZ.
//!
//! Each local adapter gets one transport [`GattService`] holding a request and a response
//! [`Characteristic`], each described by a user description [`Descriptor`]:
//!
//! ```text
//! /org/iotivity/gatt/hci0/service0
//! /org/iotivity/gatt/hci0/service0/char0        request, write-without-response
//! /org/iotivity/gatt/hci0/service0/char0/desc0
//! /org/iotivity/gatt/hci0/service0/char1        response, notify
//! /org/iotivity/gatt/hci0/service0/char1/desc0
//! ```

use std::collections::BTreeMap;

mod characteristic;
mod descriptor;
mod service;

pub use characteristic::{Characteristic, CharacteristicRole};
pub use descriptor::Descriptor;
pub use service::GattService;

/// Value of a property published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyValue {
    /// `s`
    String(String),
    /// `o`
    ObjectPath(String),
    /// `as`
    Strings(Vec<String>),
    /// `ao`
    ObjectPaths(Vec<String>),
    /// `b`
    Bool(bool),
    /// `ay`
    Bytes(Vec<u8>),
}

/// Properties of one interface, by name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Interfaces of one object with their properties, by interface name.
pub type InterfaceProperties = BTreeMap<String, Properties>;

/// The reply to `org.freedesktop.DBus.ObjectManager.GetManagedObjects`, by object path.
pub type ManagedObjects = BTreeMap<String, InterfaceProperties>;

pub(crate) fn properties<const N: usize>(entries: [(&str, PropertyValue); N]) -> Properties {
    entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}
