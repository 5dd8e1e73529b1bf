use tracing::info;

use crate::btuuid::BluetoothUuidExt;
use crate::gatt::{properties, Properties, PropertyValue};
use crate::{Config, Uuid};

/// The LE advertisement announcing the transport service (`org.bluez.LEAdvertisement1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    path: String,
    service_uuids: Vec<Uuid>,
    local_name: Option<String>,
}

impl Advertisement {
    /// Creates the advertisement described by `config`.
    pub fn new(config: &Config) -> Self {
        Advertisement {
            path: config.advertisement_path(),
            service_uuids: vec![config.service_uuid],
            local_name: config.local_name.clone(),
        }
    }

    /// The object path of this advertisement.
    pub fn object_path(&self) -> &str {
        &self.path
    }

    /// The advertised service UUIDs.
    pub fn service_uuids(&self) -> &[Uuid] {
        &self.service_uuids
    }

    /// The advertised local name.
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// The `org.bluez.LEAdvertisement1` properties.
    pub fn properties(&self) -> Properties {
        let mut props = properties([
            ("Type", PropertyValue::String("peripheral".to_owned())),
            (
                "ServiceUUIDs",
                PropertyValue::Strings(self.service_uuids.iter().map(|x| x.to_bluez_string()).collect()),
            ),
        ]);
        if let Some(name) = &self.local_name {
            props.insert("LocalName".to_owned(), PropertyValue::String(name.clone()));
        }
        props
    }

    /// Handles `Release`, called by BlueZ when it removes the advertisement.
    pub fn release(&self) {
        info!("advertisement {} released", self.path);
    }
}
