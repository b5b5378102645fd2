//! Zigbee network manager interface
//!
//! The radio stack (network formation, discovery, framing, addressing) lives
//! in an external library. This module describes what the plugin consumes
//! from it: state, events, node lookup and asynchronous commands whose
//! returned future is the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::cluster::{status, Attribute, ClusterCommand};
use crate::node::{IeeeAddress, Node};

/// Network errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZigbeeError {
    #[error("Network not running")]
    NotRunning,

    #[error("Node not found: {0}")]
    NodeNotFound(IeeeAddress),

    #[error("Request timed out")]
    Timeout,

    #[error("Device replied with ZCL status {0:#04x}")]
    Status(u8),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ZigbeeError {
    /// Build an error from a non-success ZCL status
    #[must_use]
    pub fn from_status(code: u8) -> Self {
        if code == status::TIMEOUT {
            Self::Timeout
        } else {
            Self::Status(code)
        }
    }
}

/// Network state as reported by the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Address of one endpoint on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub ieee_address: IeeeAddress,
    pub endpoint: u8,
}

impl Target {
    #[must_use]
    pub fn new(ieee_address: IeeeAddress, endpoint: u8) -> Self {
        Self {
            ieee_address,
            endpoint,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ieee_address, self.endpoint)
    }
}

/// Cluster-specific command received from a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCommand {
    pub ieee_address: IeeeAddress,
    pub endpoint: u8,
    pub cluster_id: u16,
    pub command_id: u8,
    pub manufacturer_code: Option<u16>,
    pub payload: Vec<u8>,
}

/// Reporting configuration for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingConfig {
    pub attribute_id: u16,
    pub data_type: crate::cluster::DataType,
    pub min_interval: u16,
    pub max_interval: u16,
    /// Reportable change, encoded little-endian for analog types
    pub reportable_change: u16,
}

/// Network events
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// Network state changed
    StateChanged(NetworkState),
    /// Node finished joining and its endpoints are known
    NodeAdded(Node),
    /// Node left or was removed
    NodeRemoved { ieee_address: IeeeAddress },
    /// Node reachability changed
    NodeReachableChanged {
        ieee_address: IeeeAddress,
        reachable: bool,
    },
    /// Link quality of a node changed
    LinkQualityChanged { ieee_address: IeeeAddress, lqi: u8 },
    /// Attribute report or read response updated an attribute
    AttributeChanged {
        ieee_address: IeeeAddress,
        endpoint: u8,
        cluster_id: u16,
        attribute: Attribute,
    },
    /// A device sent a cluster command to the coordinator
    CommandReceived(IncomingCommand),
    /// Permit join window opened or closed
    PermitJoinChanged { enabled: bool },
}

impl NetworkEvent {
    /// Node the event concerns, if any
    #[must_use]
    pub fn ieee_address(&self) -> Option<IeeeAddress> {
        match self {
            Self::NodeAdded(node) => Some(node.ieee_address),
            Self::NodeRemoved { ieee_address }
            | Self::NodeReachableChanged { ieee_address, .. }
            | Self::LinkQualityChanged { ieee_address, .. }
            | Self::AttributeChanged { ieee_address, .. } => Some(*ieee_address),
            Self::CommandReceived(cmd) => Some(cmd.ieee_address),
            Self::StateChanged(_) | Self::PermitJoinChanged { .. } => None,
        }
    }
}

/// Network status information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub channel: u8,
    pub pan_id: u16,
    pub extended_pan_id: u64,
    pub firmware_version: Option<String>,
    pub permit_join: bool,
}

/// Controller backend the library should drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// deCONZ firmware (ConBee, RaspBee)
    #[default]
    Deconz,
    /// NXP JN5189 firmware
    Nxp,
}

/// Everything the library needs to bring up one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub serial_port: String,
    pub baud_rate: u32,
    pub backend: Backend,
    /// File the library uses to persist its network configuration
    pub settings_path: PathBuf,
}

/// Default baud rate for ConBee II
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// The external network manager
///
/// Every `async` method resolves once the library has the reply; `Ok` means
/// the device (or coordinator) confirmed with a success status.
#[async_trait]
pub trait ZigbeeNetwork: Send + Sync {
    fn state(&self) -> NetworkState;

    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent>;

    fn nodes(&self) -> Vec<Node>;

    fn node(&self, ieee_address: &IeeeAddress) -> Option<Node>;

    fn info(&self) -> NetworkInfo;

    async fn start(&self) -> Result<(), ZigbeeError>;

    async fn stop(&self) -> Result<(), ZigbeeError>;

    /// Restart the controller keeping the network configuration
    async fn reset(&self) -> Result<(), ZigbeeError>;

    /// Wipe the network configuration and form a new network
    async fn factory_reset(&self) -> Result<(), ZigbeeError>;

    async fn permit_join(&self, duration_secs: u8) -> Result<(), ZigbeeError>;

    async fn read_attributes(
        &self,
        target: Target,
        cluster_id: u16,
        attribute_ids: &[u16],
    ) -> Result<Vec<Attribute>, ZigbeeError>;

    async fn send_command(
        &self,
        target: Target,
        command: ClusterCommand,
    ) -> Result<(), ZigbeeError>;

    /// Bind a cluster on the node to the coordinator
    async fn bind(&self, target: Target, cluster_id: u16) -> Result<(), ZigbeeError>;

    async fn configure_reporting(
        &self,
        target: Target,
        cluster_id: u16,
        config: ReportingConfig,
    ) -> Result<(), ZigbeeError>;

    /// Ask a node to leave the network
    async fn remove_node(&self, ieee_address: &IeeeAddress) -> Result<(), ZigbeeError>;
}

/// Creates network manager instances for controller things
pub trait NetworkFactory: Send + Sync {
    fn create(&self, settings: &NetworkSettings) -> Result<Arc<dyn ZigbeeNetwork>, ZigbeeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_status_maps_to_timeout() {
        assert_eq!(ZigbeeError::from_status(status::TIMEOUT), ZigbeeError::Timeout);
        assert_eq!(ZigbeeError::from_status(0x01), ZigbeeError::Status(0x01));
    }

    #[test]
    fn events_expose_their_node() {
        let ieee = IeeeAddress::from_u64(0xAA);
        let event = NetworkEvent::LinkQualityChanged {
            ieee_address: ieee,
            lqi: 10,
        };
        assert_eq!(event.ieee_address(), Some(ieee));
        assert_eq!(NetworkEvent::StateChanged(NetworkState::Running).ieee_address(), None);
    }

    #[test]
    fn state_display() {
        assert_eq!(NetworkState::Running.to_string(), "running");
    }
}
