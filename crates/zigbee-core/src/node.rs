//! Zigbee node and endpoint representation

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::cluster::id;

/// Short network address of the coordinator
pub const COORDINATOR_NWK_ADDRESS: u16 = 0x0000;

/// Error returned when parsing an IEEE address string fails
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid IEEE address: {0}")]
pub struct InvalidIeeeAddress(pub String);

/// IEEE (EUI-64) extended address
///
/// Stored little-endian as received over the air, displayed big-endian as
/// colon-separated hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IeeeAddress(pub [u8; 8]);

impl IeeeAddress {
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Build an address from its big-endian numeric form
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_le_bytes())
    }

    #[must_use]
    pub const fn to_u64(self) -> u64 {
        u64::from_le_bytes(self.0)
    }
}

impl fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[7], b[6], b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

impl FromStr for IeeeAddress {
    type Err = InvalidIeeeAddress;

    /// Accepts `00:11:22:33:44:55:66:77` or `0011223344556677`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidIeeeAddress(s.to_string());

        let digits: String = if s.contains(':') {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() != 8 || parts.iter().any(|p| p.len() != 2) {
                return Err(invalid());
            }
            parts.concat()
        } else {
            s.trim_start_matches("0x").to_string()
        };

        if digits.len() != 16 {
            return Err(invalid());
        }

        let value = u64::from_str_radix(&digits, 16).map_err(|_| invalid())?;
        Ok(Self::from_u64(value))
    }
}

impl Serialize for IeeeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IeeeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Zigbee node types (network role)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Coordinator,
    Router,
    EndDevice,
}

/// One physical device on the mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// IEEE address (EUI-64)
    pub ieee_address: IeeeAddress,
    /// Network short address, reassigned by the coordinator
    pub nwk_address: u16,
    /// Network role
    pub node_type: NodeType,
    /// Manufacturer code from the node descriptor
    pub manufacturer_code: u16,
    /// Link quality indicator (0-255)
    pub lqi: u8,
    /// Whether the library currently considers the node reachable
    pub reachable: bool,
    /// Device endpoints
    pub endpoints: Vec<Endpoint>,
}

impl Node {
    #[must_use]
    pub fn new(ieee_address: IeeeAddress, nwk_address: u16) -> Self {
        Self {
            ieee_address,
            nwk_address,
            node_type: NodeType::EndDevice,
            manufacturer_code: 0,
            lqi: 0,
            reachable: true,
            endpoints: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.nwk_address == COORDINATOR_NWK_ADDRESS
    }

    /// Look up an endpoint by its id
    #[must_use]
    pub fn endpoint(&self, endpoint_id: u8) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.id == endpoint_id)
    }

    /// First endpoint with the given profile and one of the device ids
    #[must_use]
    pub fn find_endpoint(&self, profile_id: u16, device_ids: &[u16]) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|ep| ep.profile_id == profile_id && device_ids.contains(&ep.device_id))
    }

    /// Model identifier of the first endpoint that carries one
    #[must_use]
    pub fn model_identifier(&self) -> Option<&str> {
        self.endpoints
            .iter()
            .find_map(|ep| ep.model_identifier.as_deref())
    }

    /// Manufacturer name of the first endpoint that carries one
    #[must_use]
    pub fn manufacturer_name(&self) -> Option<&str> {
        self.endpoints
            .iter()
            .find_map(|ep| ep.manufacturer_name.as_deref())
    }
}

/// A logical sub-device within a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint ID (1-240)
    pub id: u8,
    /// Profile ID (0x0104 Home Automation, 0xC05E Light Link)
    pub profile_id: u16,
    /// Device ID within the profile
    pub device_id: u16,
    /// Input (server) clusters
    pub in_clusters: Vec<u16>,
    /// Output (client) clusters
    pub out_clusters: Vec<u16>,
    /// Basic cluster manufacturer name
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    /// Basic cluster model identifier
    #[serde(default)]
    pub model_identifier: Option<String>,
    /// Basic cluster software build id
    #[serde(default)]
    pub sw_build_id: Option<String>,
}

impl Endpoint {
    #[must_use]
    pub fn has_input_cluster(&self, cluster_id: u16) -> bool {
        self.in_clusters.contains(&cluster_id)
    }

    /// Server side Color Control present
    #[must_use]
    pub fn supports_color(&self) -> bool {
        self.has_input_cluster(id::COLOR_CONTROL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::profile;

    #[test]
    fn ieee_display_is_big_endian() {
        let addr = IeeeAddress::new([0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(addr.to_string(), "00:11:22:33:44:55:66:77");
        assert_eq!(addr.to_u64(), 0x0011_2233_4455_6677);
    }

    #[test]
    fn ieee_parses_both_forms() {
        let with_colons: IeeeAddress = "00:15:8d:00:01:02:03:04".parse().unwrap();
        let plain: IeeeAddress = "00158d0001020304".parse().unwrap();
        assert_eq!(with_colons, plain);
        assert_eq!(with_colons.0[0], 0x04);
        assert_eq!(with_colons.0[7], 0x00);
    }

    #[test]
    fn ieee_rejects_garbage() {
        assert!("00:11:22".parse::<IeeeAddress>().is_err());
        assert!("zz:11:22:33:44:55:66:77".parse::<IeeeAddress>().is_err());
        assert!("0011".parse::<IeeeAddress>().is_err());
    }

    #[test]
    fn ieee_serializes_as_string() {
        let addr = IeeeAddress::from_u64(0x00158d0001020304);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"00:15:8d:00:01:02:03:04\"");
        let back: IeeeAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn endpoint_lookup_by_profile_and_device() {
        let mut node = Node::new(IeeeAddress::from_u64(1), 0x1234);
        node.endpoints.push(Endpoint {
            id: 1,
            profile_id: profile::LIGHT_LINK,
            device_id: 0x0220,
            in_clusters: vec![id::ON_OFF, id::LEVEL_CONTROL, id::COLOR_CONTROL],
            ..Default::default()
        });
        assert!(node.find_endpoint(profile::LIGHT_LINK, &[0x0220]).is_some());
        assert!(node.find_endpoint(profile::HOME_AUTOMATION, &[0x0220]).is_none());
        assert!(node.endpoint(1).unwrap().supports_color());
        assert!(!node.is_coordinator());
    }
}
