//! Zigbee HA/ZLL device integration
//!
//! Exposes controllers and the devices on their networks as things, with
//! adapters for IKEA Tradfri, Lumi/Xiaomi and generic Home Automation or
//! Light Link devices.

pub mod adapters;
pub mod config;
pub mod discovery;
pub mod error;
pub mod platform;
pub mod plugin;
pub mod task;

pub use config::PluginConfig;
pub use error::{SetupError, ThingError};
pub use platform::{
    Action, EventType, StateType, StateValue, Thing, ThingClass, ThingDescriptor, ThingEvent,
    ThingId, ThingParams, ThingSettings,
};
pub use plugin::{PluginEvent, ZigbeePlugin};
