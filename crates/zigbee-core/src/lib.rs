//! Zigbee abstraction layer
//!
//! Node and cluster model, the attribute codec, and the interface of the
//! external network manager the plugin drives.

pub mod cluster;
pub mod codec;
pub mod color;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod network;
pub mod node;

pub use cluster::{Attribute, ClusterCommand, DataType};
pub use codec::{DecodeError, Polarity};
pub use color::Rgb;
pub use network::{
    Backend, IncomingCommand, NetworkEvent, NetworkFactory, NetworkInfo, NetworkSettings,
    NetworkState, Target, ZigbeeError, ZigbeeNetwork,
};
pub use node::{Endpoint, IeeeAddress, Node};
