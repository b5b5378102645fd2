//! Error types for the plugin

use thiserror::Error;
use zigbee_core::{IeeeAddress, ZigbeeError};

use crate::platform::{ThingClass, ThingId};

/// Result of an action, as reported to the host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThingError {
    /// Network is not running or the device is unreachable
    #[error("Hardware not available")]
    HardwareNotAvailable,

    /// The device answered the command with an error
    #[error("Hardware failure: {0}")]
    HardwareFailure(String),

    #[error("Thing not found: {0}")]
    ThingNotFound(ThingId),

    /// The thing class does not support the action
    #[error("Action {action} not supported by {class}")]
    ActionTypeNotFound {
        class: ThingClass,
        action: &'static str,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<ZigbeeError> for ThingError {
    fn from(err: ZigbeeError) -> Self {
        match err {
            ZigbeeError::NotRunning => Self::HardwareNotAvailable,
            other => Self::HardwareFailure(other.to_string()),
        }
    }
}

/// Errors that fail thing setup
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Unsupported thing class: {0}")]
    ThingClassNotFound(String),

    /// A required thing parameter is absent or unparsable
    #[error("Missing or invalid parameter: {0}")]
    MissingParameter(&'static str),

    /// Device thing whose parent controller is not set up
    #[error("No network for parent thing {0:?}")]
    NetworkNotFound(Option<ThingId>),

    #[error("Node {0} is not known to the network")]
    NodeNotFound(IeeeAddress),

    /// The node has no endpoint matching the thing class
    #[error("Node {ieee_address} has no endpoint for {class}")]
    EndpointNotFound {
        ieee_address: IeeeAddress,
        class: ThingClass,
    },

    /// The thing, or another thing for the same node, is already set up
    #[error("Thing already set up: {0}")]
    AlreadySetUp(ThingId),

    #[error("Thing not set up: {0}")]
    NotSetUp(ThingId),

    #[error("Network error: {0}")]
    Network(#[from] ZigbeeError),
}
