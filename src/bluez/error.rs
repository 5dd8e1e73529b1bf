use dbus_crossroads::MethodErr;

use crate::bus::BLUEZ_ERROR_FAILED;
use crate::error::ErrorKind;

impl From<bluer::Error> for crate::Error {
    fn from(err: bluer::Error) -> Self {
        crate::Error::new(kind_from_bluer(&err), Some(Box::new(err)), String::new())
    }
}

fn kind_from_bluer(err: &bluer::Error) -> ErrorKind {
    match err.kind {
        bluer::ErrorKind::ConnectionAttemptFailed => ErrorKind::ConnectionFailed,
        bluer::ErrorKind::Failed => ErrorKind::Other,
        bluer::ErrorKind::InvalidArguments => ErrorKind::InvalidParameter,
        bluer::ErrorKind::InvalidLength => ErrorKind::InvalidParameter,
        bluer::ErrorKind::NotReady => ErrorKind::AdapterNotEnabled,
        bluer::ErrorKind::NotSupported => ErrorKind::NotSupported,
        bluer::ErrorKind::InvalidOffset => ErrorKind::InvalidParameter,
        bluer::ErrorKind::InvalidAddress(_) => ErrorKind::InvalidParameter,
        bluer::ErrorKind::InvalidName(_) => ErrorKind::InvalidParameter,
        bluer::ErrorKind::ServicesUnresolved => ErrorKind::InvalidState,
        bluer::ErrorKind::NotFound => ErrorKind::NotFound,
        bluer::ErrorKind::AlreadyExists => ErrorKind::AlreadyStarted,
        bluer::ErrorKind::InProgress => ErrorKind::InvalidState,
        bluer::ErrorKind::Internal(_) => ErrorKind::Internal,
        _ => ErrorKind::Other,
    }
}

impl From<dbus::Error> for crate::Error {
    fn from(err: dbus::Error) -> Self {
        let message = err.name().unwrap_or_default().to_owned();
        crate::Error::new(ErrorKind::DBus, Some(Box::new(err)), message)
    }
}

/// Rejects a method call made by BlueZ on an exported object.
pub(super) fn failed(err: crate::Error) -> MethodErr {
    MethodErr::from((BLUEZ_ERROR_FAILED, err.message()))
}
