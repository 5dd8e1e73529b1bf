//! `Uuid` extensions for Bluetooth UUIDs and the transport's assigned UUIDs

use uuid::Uuid;

/// This is the Bluetooth Base UUID. It is used with 16-bit and 32-bit UUIDs
/// [defined](https://www.bluetooth.com/specifications/assigned-numbers/) by the Bluetooth SIG.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Const function to create a 16-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Extension trait for [uuid::Uuid] with helper methods for the string forms BlueZ expects
pub trait BluetoothUuidExt: private::Sealed {
    /// Creates a 16-bit Bluetooth UUID
    fn from_u16(uuid: u16) -> Self;

    /// Returns `true` if self is a valid 16-bit Bluetooth UUID
    fn is_u16_uuid(&self) -> bool;

    /// Tries to convert self into a 16-bit Bluetooth UUID
    fn try_to_u16(&self) -> Option<u16>;

    /// Formats the UUID the way it is published in a `UUID` D-Bus property.
    ///
    /// 16-bit Bluetooth UUIDs use their short hexadecimal form (e.g. `2901`), all other UUIDs the upper case
    /// hyphenated form.
    fn to_bluez_string(&self) -> String;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(uuid: u16) -> Self {
        bluetooth_uuid_from_u16(uuid)
    }

    fn is_u16_uuid(&self) -> bool {
        let u = self.as_u128();
        (u & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID && (((u >> 96) as u32) & 0xffff0000) == 0
    }

    fn try_to_u16(&self) -> Option<u16> {
        let u = self.as_u128();
        self.is_u16_uuid().then(|| (u >> 96) as u16)
    }

    fn to_bluez_string(&self) -> String {
        match self.try_to_u16() {
            Some(short) => format!("{short:04x}"),
            None => self.hyphenated().to_string().to_uppercase(),
        }
    }
}

mod private {
    use uuid::Uuid;

    pub trait Sealed {}

    impl Sealed for Uuid {}
}

/// UUIDs of the OIC transport GATT service
pub mod transport {
    use uuid::Uuid;

    /// The OIC transport profile service.
    pub const SERVICE: Uuid = Uuid::from_u128(0xade3d529_c784_4f63_a987_eb69f70ee816);

    /// The request characteristic, written by the GATT client without response.
    pub const REQUEST_CHARACTERISTIC: Uuid = Uuid::from_u128(0xad7b334f_4637_4b86_90b6_9d787f03d218);

    /// The response characteristic, notified by the GATT server.
    pub const RESPONSE_CHARACTERISTIC: Uuid = Uuid::from_u128(0xe9241982_4580_42c4_8831_95048216b256);
}

/// Bluetooth GATT Descriptor 16-bit UUIDs
pub mod descriptors {
    #![allow(missing_docs)]

    use uuid::Uuid;

    use super::bluetooth_uuid_from_u16;

    pub const CHARACTERISTIC_USER_DESCRIPTION: Uuid = bluetooth_uuid_from_u16(0x2901);
}
