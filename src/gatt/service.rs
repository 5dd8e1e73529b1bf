use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use super::{
    properties, Characteristic, CharacteristicRole, InterfaceProperties, ManagedObjects, Properties, PropertyValue,
};
use crate::btuuid::BluetoothUuidExt;
use crate::bus::{GattManagerProxy, Interface};
use crate::context::Context;
use crate::error::ErrorKind;
use crate::recv::{recv, RecvInfo};
use crate::{Error, Result, Uuid};

/// The transport service exported for one local adapter (`org.bluez.GattService1`).
///
/// Besides the service itself, this type implements the handlers of its characteristics and descriptors, and the
/// object manager BlueZ queries at the service path when the service is registered.
#[derive(Debug)]
pub struct GattService {
    context: Weak<Context>,
    hci: String,
    path: String,
    uuid: Uuid,
    request: Characteristic,
    response: Characteristic,
    gatt_manager: Option<Arc<dyn GattManagerProxy>>,
}

impl GattService {
    /// Creates the service for the adapter named `hci` (e.g. `hci0`).
    ///
    /// `gatt_manager` is the `org.bluez.GattManager1` the service gets registered with.
    pub fn new(
        context: &Arc<Context>,
        hci: &str,
        gatt_manager: Option<Arc<dyn GattManagerProxy>>,
    ) -> Result<Arc<Self>> {
        if hci.is_empty() || !hci.bytes().all(|x| x.is_ascii_alphanumeric() || x == b'_') {
            return Err(Error::with_message(ErrorKind::InvalidParameter, format!("invalid adapter name {hci:?}")));
        }

        let config = context.config();
        let path = config.service_path(hci);
        let request = Characteristic::new(
            &path,
            0,
            config.request_uuid,
            CharacteristicRole::Request,
            &config.request_description,
        );
        let response = Characteristic::new(
            &path,
            1,
            config.response_uuid,
            CharacteristicRole::Response,
            &config.response_description,
        );

        debug!("created GATT service {}", path);

        Ok(Arc::new(GattService {
            context: Arc::downgrade(context),
            hci: hci.to_owned(),
            path,
            uuid: config.service_uuid,
            request,
            response,
            gatt_manager,
        }))
    }

    /// The object path of this service.
    pub fn object_path(&self) -> &str {
        &self.path
    }

    /// The name of the adapter this service is exported for.
    pub fn hci(&self) -> &str {
        &self.hci
    }

    /// The UUID of this service.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The request characteristic (`char0`).
    pub fn request(&self) -> &Characteristic {
        &self.request
    }

    /// The response characteristic (`char1`).
    pub fn response(&self) -> &Characteristic {
        &self.response
    }

    /// The characteristic exported at `path`, if any.
    pub fn characteristic(&self, path: &str) -> Option<&Characteristic> {
        [&self.request, &self.response].into_iter().find(|x| x.object_path() == path)
    }

    /// The `org.bluez.GattManager1` this service is registered with.
    pub fn gatt_manager(&self) -> Option<&Arc<dyn GattManagerProxy>> {
        self.gatt_manager.as_ref()
    }

    /// The address the GATT client subscribed to this service is known by.
    ///
    /// BlueZ does not tell a GATT server which client it is talking to, so the address is derived from the identity
    /// of the response characteristic. It is only meaningful inside this process, and only distinguishes clients as
    /// long as one client at most is connected per adapter.
    pub fn peer_address(&self) -> String {
        format!("&{:p}", &self.response)
    }

    /// The `org.bluez.GattService1` properties.
    pub fn properties(&self) -> Properties {
        properties([
            ("UUID", PropertyValue::String(self.uuid.to_bluez_string())),
            ("Primary", PropertyValue::Bool(true)),
            (
                "Characteristics",
                PropertyValue::ObjectPaths(vec![
                    self.request.object_path().to_owned(),
                    self.response.object_path().to_owned(),
                ]),
            ),
        ])
    }

    /// Handles `GetManagedObjects` on the object manager rooted at the service path.
    ///
    /// Describes the service, both characteristics and both descriptors.
    pub fn managed_objects(&self) -> ManagedObjects {
        fn object(interface: Interface, properties: Properties) -> InterfaceProperties {
            [(interface.name().to_owned(), properties)].into_iter().collect()
        }

        let mut objects = ManagedObjects::new();
        objects.insert(self.path.clone(), object(Interface::GattService, self.properties()));
        for characteristic in [&self.request, &self.response] {
            objects.insert(
                characteristic.object_path().to_owned(),
                object(Interface::GattCharacteristic, characteristic.properties()),
            );
            let descriptor = characteristic.descriptor();
            objects.insert(
                descriptor.object_path().to_owned(),
                object(Interface::GattDescriptor, descriptor.properties()),
            );
        }
        objects
    }

    /// Handles `WriteValue` on the request characteristic.
    ///
    /// The written fragment is delivered to the server packet-received callback on behalf of the subscribed client.
    pub fn write_value(&self, value: &[u8]) -> Result<()> {
        if recv(&self.request.recv_info(), value) {
            Ok(())
        } else {
            Err(Error::with_message(ErrorKind::Other, "Error when handling GATT request data fragment"))
        }
    }

    /// Handles `StartNotify` on the response characteristic.
    ///
    /// Registers the client under [`peer_address`][Self::peer_address], so responses can be sent to it and requests
    /// it writes are attributed to it.
    pub fn start_notify(self: &Arc<Self>) -> Result<()> {
        if self.response.is_notifying() {
            return Err(Error::with_message(ErrorKind::InvalidState, "Notifications are already enabled."));
        }

        let context = self
            .context
            .upgrade()
            .ok_or_else(|| Error::with_message(ErrorKind::Internal, "Error creating peer endpoint information"))?;

        let peer = self.peer_address();
        if !context.insert_peer(&peer, self.clone()) {
            return Err(Error::with_message(ErrorKind::InvalidState, "Unable to set response endpoint."));
        }

        let callback = context.callbacks().server_packet_received;
        self.request.set_recv_info(RecvInfo::new(peer.clone(), callback, &context));
        self.response.set_notifying(true);

        info!("{} subscribed to {}", peer, self.response.object_path());
        Ok(())
    }

    /// Handles `StopNotify` on the response characteristic.
    pub fn stop_notify(&self) -> Result<()> {
        if !self.response.is_notifying() {
            return Err(Error::with_message(ErrorKind::InvalidState, "Notifications were not previously enabled."));
        }

        let removed = self.release();
        if removed {
            Ok(())
        } else {
            Err(Error::with_message(ErrorKind::Internal, "Error removing peer address information"))
        }
    }

    /// Forgets the subscribed client, if any. Returns `true` if the client was registered with the context.
    pub(crate) fn release(&self) -> bool {
        let info = self.request.take_recv_info();
        self.response.set_notifying(false);

        let Some(peer) = info.peer() else {
            return false;
        };

        let removed = match self.context.upgrade() {
            Some(context) => context.remove_peer(peer).is_some(),
            None => false,
        };

        if removed {
            info!("{} unsubscribed from {}", peer, self.response.object_path());
        } else {
            warn!("{} was not registered as a peer", peer);
        }
        removed
    }
}
