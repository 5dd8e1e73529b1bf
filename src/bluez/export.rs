//! Serving the transport's GATT hierarchy and advertisement with [`dbus_crossroads`].

use std::collections::HashMap;
use std::sync::Arc;

use dbus::arg::{PropMap, RefArg, Variant};
use dbus_crossroads::{Crossroads, IfaceBuilder, IfaceToken, MethodErr};
use tracing::{debug, trace};

use super::error::failed;
use crate::advertisement::Advertisement;
use crate::btuuid::BluetoothUuidExt;
use crate::bus::Interface;
use crate::error::ErrorKind;
use crate::gatt::{Characteristic, CharacteristicRole, GattService, ManagedObjects, PropertyValue};
use crate::Error;

const ERROR_NOT_SUPPORTED: &str = "org.bluez.Error.NotSupported";

/// Data of an exported characteristic object.
#[derive(Debug, Clone)]
pub(super) struct ExportedCharacteristic {
    service: Arc<GattService>,
    role: CharacteristicRole,
}

impl ExportedCharacteristic {
    fn characteristic(&self) -> &Characteristic {
        match self.role {
            CharacteristicRole::Request => self.service.request(),
            CharacteristicRole::Response => self.service.response(),
        }
    }

    fn require(&self, role: CharacteristicRole, method: &str) -> Result<(), MethodErr> {
        if self.role == role {
            Ok(())
        } else {
            Err(MethodErr::from((
                ERROR_NOT_SUPPORTED,
                format!("{} is not supported by {}", method, self.characteristic().object_path()),
            )))
        }
    }
}

/// Data of an exported descriptor object.
#[derive(Debug, Clone)]
pub(super) struct ExportedDescriptor {
    characteristic: ExportedCharacteristic,
}

/// Interfaces registered with the crossroads instance.
#[derive(Clone, Copy)]
pub(super) struct Tokens {
    service: IfaceToken<Arc<GattService>>,
    object_manager: IfaceToken<Arc<GattService>>,
    characteristic: IfaceToken<ExportedCharacteristic>,
    descriptor: IfaceToken<ExportedDescriptor>,
    advertisement: IfaceToken<Arc<Advertisement>>,
}

impl Tokens {
    pub(super) fn register(cr: &mut Crossroads) -> Self {
        Tokens {
            service: register_service(cr),
            object_manager: register_object_manager(cr),
            characteristic: register_characteristic(cr),
            descriptor: register_descriptor(cr),
            advertisement: register_advertisement(cr),
        }
    }

    /// Inserts the service, both characteristics and both descriptors.
    pub(super) fn insert_service(&self, cr: &mut Crossroads, service: &Arc<GattService>) -> crate::Result<()> {
        cr.insert(
            path(service.object_path()).map_err(from_method_err)?,
            &[self.service, self.object_manager],
            service.clone(),
        );

        for role in [CharacteristicRole::Request, CharacteristicRole::Response] {
            let characteristic = ExportedCharacteristic {
                service: service.clone(),
                role,
            };
            let characteristic_path = path(characteristic.characteristic().object_path()).map_err(from_method_err)?;
            let descriptor_path =
                path(characteristic.characteristic().descriptor().object_path()).map_err(from_method_err)?;

            cr.insert(characteristic_path, &[self.characteristic], characteristic.clone());
            cr.insert(descriptor_path, &[self.descriptor], ExportedDescriptor { characteristic });
        }

        debug!("exported {}", service.object_path());
        Ok(())
    }

    pub(super) fn remove_service(&self, cr: &mut Crossroads, service: &GattService) -> crate::Result<()> {
        for characteristic in [service.request(), service.response()] {
            let descriptor_path = path(characteristic.descriptor().object_path()).map_err(from_method_err)?;
            cr.remove::<ExportedDescriptor>(&descriptor_path);
            let characteristic_path = path(characteristic.object_path()).map_err(from_method_err)?;
            cr.remove::<ExportedCharacteristic>(&characteristic_path);
        }
        cr.remove::<Arc<GattService>>(&path(service.object_path()).map_err(from_method_err)?);

        debug!("unexported {}", service.object_path());
        Ok(())
    }

    pub(super) fn insert_advertisement(
        &self,
        cr: &mut Crossroads,
        advertisement: &Arc<Advertisement>,
    ) -> crate::Result<()> {
        cr.insert(
            path(advertisement.object_path()).map_err(from_method_err)?,
            &[self.advertisement],
            advertisement.clone(),
        );
        debug!("exported {}", advertisement.object_path());
        Ok(())
    }

    pub(super) fn remove_advertisement(&self, cr: &mut Crossroads, advertisement: &Advertisement) -> crate::Result<()> {
        cr.remove::<Arc<Advertisement>>(&path(advertisement.object_path()).map_err(from_method_err)?);
        debug!("unexported {}", advertisement.object_path());
        Ok(())
    }
}

fn path(path: &str) -> Result<dbus::Path<'static>, MethodErr> {
    dbus::Path::new(path.to_owned()).map_err(|err| MethodErr::invalid_arg(&err))
}

fn from_method_err(err: MethodErr) -> Error {
    Error::with_message(ErrorKind::InvalidParameter, err.description())
}

fn register_service(cr: &mut Crossroads) -> IfaceToken<Arc<GattService>> {
    cr.register(Interface::GattService.name(), |b: &mut IfaceBuilder<Arc<GattService>>| {
        b.property("UUID").get(|_, service| Ok(service.uuid().to_bluez_string()));
        b.property("Primary").get(|_, _| Ok(true));
        b.property("Characteristics").get(|_, service| {
            Ok(vec![
                path(service.request().object_path())?,
                path(service.response().object_path())?,
            ])
        });
    })
}

fn register_object_manager(cr: &mut Crossroads) -> IfaceToken<Arc<GattService>> {
    cr.register(Interface::ObjectManager.name(), |b: &mut IfaceBuilder<Arc<GattService>>| {
        b.method("GetManagedObjects", (), ("objects",), |_, service, _: ()| {
            trace!("GetManagedObjects on {}", service.object_path());
            Ok((managed_objects(service.managed_objects())?,))
        });
    })
}

fn register_characteristic(cr: &mut Crossroads) -> IfaceToken<ExportedCharacteristic> {
    cr.register(
        Interface::GattCharacteristic.name(),
        |b: &mut IfaceBuilder<ExportedCharacteristic>| {
            b.property("UUID")
                .get(|_, x| Ok(x.characteristic().uuid().to_bluez_string()));
            b.property("Service").get(|_, x| path(x.service.object_path()));
            b.property("Flags").get(|_, x| {
                Ok(x.characteristic()
                    .role()
                    .flags()
                    .iter()
                    .map(|flag| flag.to_string())
                    .collect::<Vec<_>>())
            });
            b.property("Descriptors")
                .get(|_, x| Ok(vec![path(x.characteristic().descriptor().object_path())?]));
            b.property("Notifying").get(|_, x| Ok(x.characteristic().is_notifying()));

            b.method(
                "WriteValue",
                ("value", "options"),
                (),
                |_, x, (value, _options): (Vec<u8>, PropMap)| {
                    x.require(CharacteristicRole::Request, "WriteValue")?;
                    trace!("{} bytes written to {}", value.len(), x.characteristic().object_path());
                    x.service.write_value(&value).map_err(failed)
                },
            );
            b.method("StartNotify", (), (), |_, x, _: ()| {
                x.require(CharacteristicRole::Response, "StartNotify")?;
                x.service.start_notify().map_err(failed)
            });
            b.method("StopNotify", (), (), |_, x, _: ()| {
                x.require(CharacteristicRole::Response, "StopNotify")?;
                x.service.stop_notify().map_err(failed)
            });
        },
    )
}

fn register_descriptor(cr: &mut Crossroads) -> IfaceToken<ExportedDescriptor> {
    cr.register(
        Interface::GattDescriptor.name(),
        |b: &mut IfaceBuilder<ExportedDescriptor>| {
            b.property("UUID")
                .get(|_, x| Ok(x.characteristic.characteristic().descriptor().uuid().to_bluez_string()));
            b.property("Characteristic")
                .get(|_, x| path(x.characteristic.characteristic().object_path()));
            b.property("Flags").get(|_, _| Ok(vec!["read".to_owned()]));

            b.method("ReadValue", ("options",), ("value",), |_, x, (_options,): (PropMap,)| {
                Ok((x.characteristic.characteristic().descriptor().read_value(),))
            });
        },
    )
}

fn register_advertisement(cr: &mut Crossroads) -> IfaceToken<Arc<Advertisement>> {
    cr.register(Interface::Advertisement.name(), |b: &mut IfaceBuilder<Arc<Advertisement>>| {
        b.property("Type").get(|_, _| Ok("peripheral".to_owned()));
        b.property("ServiceUUIDs").get(|_, x| {
            Ok(x.service_uuids()
                .iter()
                .map(|uuid| uuid.to_bluez_string())
                .collect::<Vec<_>>())
        });
        b.property("LocalName").get(|_, x| {
            x.local_name()
                .map(str::to_owned)
                .ok_or_else(|| MethodErr::no_property(&"LocalName"))
        });

        b.method("Release", (), (), |_, x, _: ()| {
            x.release();
            Ok(())
        });
    })
}

fn variant(value: PropertyValue) -> Result<Variant<Box<dyn RefArg>>, MethodErr> {
    let value: Box<dyn RefArg> = match value {
        PropertyValue::String(x) => Box::new(x),
        PropertyValue::ObjectPath(x) => Box::new(path(&x)?),
        PropertyValue::Strings(x) => Box::new(x),
        PropertyValue::ObjectPaths(x) => Box::new(x.iter().map(|x| path(x)).collect::<Result<Vec<_>, _>>()?),
        PropertyValue::Bool(x) => Box::new(x),
        PropertyValue::Bytes(x) => Box::new(x),
    };
    Ok(Variant(value))
}

/// Converts the reply to `GetManagedObjects` to its D-Bus form.
fn managed_objects(
    objects: ManagedObjects,
) -> Result<HashMap<dbus::Path<'static>, HashMap<String, PropMap>>, MethodErr> {
    let mut reply = HashMap::with_capacity(objects.len());
    for (object_path, interfaces) in objects {
        let mut object = HashMap::with_capacity(interfaces.len());
        for (interface, properties) in interfaces {
            let mut props = PropMap::new();
            for (name, value) in properties {
                props.insert(name, variant(value)?);
            }
            object.insert(interface, props);
        }
        reply.insert(path(&object_path)?, object);
    }
    Ok(reply)
}
