//! Transport configuration

use std::time::Duration;

use crate::btuuid::transport;
use crate::Uuid;

/// Configuration of the LE transport.
///
/// The defaults describe the OIC transport profile: the GATT object hierarchy rooted at `/org/iotivity/gatt`, the
/// assigned service and characteristic UUIDs, and the wait budgets used while BlueZ objects are being discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct Config {
    /// Root of the exported GATT object hierarchy.
    pub object_root: String,
    /// Well-known D-Bus name owned while the GATT server role is running.
    pub bus_name: String,
    /// UUID of the transport GATT service.
    pub service_uuid: Uuid,
    /// UUID of the request characteristic (client to server, write without response).
    pub request_uuid: Uuid,
    /// UUID of the response characteristic (server to client, notify).
    pub response_uuid: Uuid,
    /// User description of the request characteristic.
    pub request_description: String,
    /// User description of the response characteristic.
    pub response_description: String,
    /// Local name included in the LE advertisement, if any.
    pub local_name: Option<String>,
    /// Number of waits for the first local adapter when the transport starts.
    pub startup_retries: u32,
    /// Length of each wait for the first local adapter.
    pub startup_timeout: Duration,
    /// Number of waits for the GATT server role to finish its setup.
    pub peripheral_retries: u32,
    /// Length of each wait for the GATT server role setup.
    pub peripheral_timeout: Duration,
    /// Number of waits for a peer to be discovered before a multicast send.
    pub discovery_retries: u32,
    /// Length of each wait for peer discovery.
    pub discovery_timeout: Duration,
    /// Size of a single GATT write or notification used when fragmenting packets.
    pub mtu: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            object_root: "/org/iotivity/gatt".to_string(),
            bus_name: "org.iotivity.gatt.service".to_string(),
            service_uuid: transport::SERVICE,
            request_uuid: transport::REQUEST_CHARACTERISTIC,
            response_uuid: transport::RESPONSE_CHARACTERISTIC,
            request_description: "OIC Node Request".to_string(),
            response_description: "OIC Node Response".to_string(),
            local_name: None,
            startup_retries: 2,
            startup_timeout: Duration::from_secs(2),
            peripheral_retries: 2,
            peripheral_timeout: Duration::from_secs(2),
            discovery_retries: 5,
            discovery_timeout: Duration::from_secs(2),
            mtu: crate::fragment::DEFAULT_MTU,
        }
    }
}

impl Config {
    /// Object path of the transport service exported for the local adapter named `hci` (e.g. `hci0`).
    pub fn service_path(&self, hci: &str) -> String {
        format!("{}/{}/service0", self.object_root, hci)
    }

    /// Object path of the LE advertisement object.
    pub fn advertisement_path(&self) -> String {
        format!("{}/advertisement0", self.object_root)
    }
}
