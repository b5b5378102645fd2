//! Host platform thing model
//!
//! Things are owned by the host. Adapters hold an `Arc<Thing>` and mutate
//! its state; every change is broadcast to host subscribers.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;
use uuid::Uuid;
use zigbee_core::{Backend, IeeeAddress, Rgb};

use crate::error::SetupError;

/// Host thing identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(pub Uuid);

impl ThingId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ThingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Every thing class this plugin can set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThingClass {
    ZigbeeController,
    GenericOnOffLight,
    GenericDimmableLight,
    GenericColorTemperatureLight,
    GenericColorLight,
    GenericPowerSocket,
    TradfriColorLight,
    TradfriColorTemperatureLight,
    TradfriDimmableLight,
    TradfriPowerSocket,
    TradfriRemote,
    TradfriOnOffSwitch,
    TradfriMotionSensor,
    LumiTemperatureSensor,
    LumiMagnetSensor,
    LumiButtonSensor,
    LumiMotionSensor,
    LumiWaterSensor,
}

impl ThingClass {
    pub const ALL: [Self; 18] = [
        Self::ZigbeeController,
        Self::GenericOnOffLight,
        Self::GenericDimmableLight,
        Self::GenericColorTemperatureLight,
        Self::GenericColorLight,
        Self::GenericPowerSocket,
        Self::TradfriColorLight,
        Self::TradfriColorTemperatureLight,
        Self::TradfriDimmableLight,
        Self::TradfriPowerSocket,
        Self::TradfriRemote,
        Self::TradfriOnOffSwitch,
        Self::TradfriMotionSensor,
        Self::LumiTemperatureSensor,
        Self::LumiMagnetSensor,
        Self::LumiButtonSensor,
        Self::LumiMotionSensor,
        Self::LumiWaterSensor,
    ];

    /// Stable identifier used in descriptors and stored things
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ZigbeeController => "zigbeeController",
            Self::GenericOnOffLight => "genericOnOffLight",
            Self::GenericDimmableLight => "genericDimmableLight",
            Self::GenericColorTemperatureLight => "genericColorTemperatureLight",
            Self::GenericColorLight => "genericColorLight",
            Self::GenericPowerSocket => "genericPowerSocket",
            Self::TradfriColorLight => "tradfriColorLight",
            Self::TradfriColorTemperatureLight => "tradfriColorTemperatureLight",
            Self::TradfriDimmableLight => "tradfriDimmableLight",
            Self::TradfriPowerSocket => "tradfriPowerSocket",
            Self::TradfriRemote => "tradfriRemote",
            Self::TradfriOnOffSwitch => "tradfriOnOffSwitch",
            Self::TradfriMotionSensor => "tradfriMotionSensor",
            Self::LumiTemperatureSensor => "lumiTemperatureSensor",
            Self::LumiMagnetSensor => "lumiMagnetSensor",
            Self::LumiButtonSensor => "lumiButtonSensor",
            Self::LumiMotionSensor => "lumiMotionSensor",
            Self::LumiWaterSensor => "lumiWaterSensor",
        }
    }

    /// Human readable default title
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::ZigbeeController => "Zigbee controller",
            Self::GenericOnOffLight => "On/Off light",
            Self::GenericDimmableLight => "Dimmable light",
            Self::GenericColorTemperatureLight => "Color temperature light",
            Self::GenericColorLight => "Color light",
            Self::GenericPowerSocket => "Power socket",
            Self::TradfriColorLight => "TRADFRI color light",
            Self::TradfriColorTemperatureLight => "TRADFRI color temperature light",
            Self::TradfriDimmableLight => "TRADFRI dimmable light",
            Self::TradfriPowerSocket => "TRADFRI power outlet",
            Self::TradfriRemote => "TRADFRI remote",
            Self::TradfriOnOffSwitch => "TRADFRI on/off switch",
            Self::TradfriMotionSensor => "TRADFRI motion sensor",
            Self::LumiTemperatureSensor => "Aqara temperature and humidity sensor",
            Self::LumiMagnetSensor => "Aqara door and window sensor",
            Self::LumiButtonSensor => "Aqara wireless switch",
            Self::LumiMotionSensor => "Aqara motion sensor",
            Self::LumiWaterSensor => "Aqara water leak sensor",
        }
    }

    #[must_use]
    pub fn is_controller(self) -> bool {
        self == Self::ZigbeeController
    }
}

impl fmt::Display for ThingClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThingClass {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.name() == s)
            .ok_or_else(|| SetupError::ThingClassNotFound(s.to_string()))
    }
}

/// Thing parameters fixed at creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ieee_address: Option<IeeeAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// User editable thing settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingSettings {
    /// Seconds until a motion sensor reports absence again
    #[serde(default)]
    pub motion_timeout_secs: Option<u64>,
}

/// A thing the plugin proposes to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingDescriptor {
    pub thing_class: ThingClass,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ThingId>,
    pub params: ThingParams,
}

/// State types exposed by things
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateType {
    Connected,
    SignalStrength,
    Version,
    Power,
    Brightness,
    Color,
    ColorTemperature,
    Temperature,
    Humidity,
    Pressure,
    Closed,
    Pressed,
    IsPresent,
    LastSeenTime,
    LightIntensity,
    WaterDetected,
    BatteryLevel,
    BatteryCritical,
    NetworkState,
    PermitJoinEnabled,
    Channel,
    PanId,
    FirmwareVersion,
}

/// A typed state value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Uint(u64),
    Int(i64),
    Double(f64),
    Color(Rgb),
    Text(String),
}

impl StateValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for StateValue {
    fn from(v: u8) -> Self {
        Self::Uint(u64::from(v))
    }
}

impl From<u16> for StateValue {
    fn from(v: u16) -> Self {
        Self::Uint(u64::from(v))
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<Rgb> for StateValue {
    fn from(v: Rgb) -> Self {
        Self::Color(v)
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Events a thing can emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventType {
    Pressed { button: String },
    LongPressed { button: String },
    MotionDetected,
}

/// Change notification broadcast to the host
#[derive(Debug, Clone, PartialEq)]
pub enum ThingEvent {
    StateChanged {
        thing_id: ThingId,
        state: StateType,
        value: StateValue,
    },
    Event {
        thing_id: ThingId,
        event: EventType,
    },
}

/// Actions the host can execute on a thing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Power(bool),
    /// Brightness in percent
    Brightness(u8),
    Color(Rgb),
    /// Color temperature in mireds
    ColorTemperature(u16),
    Identify,
    RemoveFromNetwork,
    /// Open the network for joining for the given seconds (0 closes it)
    PermitJoin(u8),
    Reset,
    FactoryReset,
}

impl Action {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Power(_) => "power",
            Self::Brightness(_) => "brightness",
            Self::Color(_) => "color",
            Self::ColorTemperature(_) => "colorTemperature",
            Self::Identify => "identify",
            Self::RemoveFromNetwork => "removeFromNetwork",
            Self::PermitJoin(_) => "permitJoin",
            Self::Reset => "reset",
            Self::FactoryReset => "factoryReset",
        }
    }
}

/// A host thing
pub struct Thing {
    id: ThingId,
    class: ThingClass,
    name: String,
    parent_id: Option<ThingId>,
    params: ThingParams,
    settings: RwLock<ThingSettings>,
    states: DashMap<StateType, StateValue>,
    event_tx: broadcast::Sender<ThingEvent>,
}

impl fmt::Debug for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Thing {
    #[must_use]
    pub fn new(
        id: ThingId,
        class: ThingClass,
        name: impl Into<String>,
        parent_id: Option<ThingId>,
        params: ThingParams,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            id,
            class,
            name: name.into(),
            parent_id,
            params,
            settings: RwLock::new(ThingSettings::default()),
            states: DashMap::new(),
            event_tx,
        }
    }

    /// Create a thing for a descriptor the host accepted
    #[must_use]
    pub fn from_descriptor(descriptor: &ThingDescriptor) -> Self {
        Self::new(
            ThingId::new(),
            descriptor.thing_class,
            descriptor.title.clone(),
            descriptor.parent_id,
            descriptor.params.clone(),
        )
    }

    /// Recreate a stored thing whose class is known only by name
    pub fn restore(
        id: ThingId,
        class_name: &str,
        name: impl Into<String>,
        parent_id: Option<ThingId>,
        params: ThingParams,
    ) -> Result<Self, SetupError> {
        let class = class_name.parse()?;
        Ok(Self::new(id, class, name, parent_id, params))
    }

    #[must_use]
    pub fn id(&self) -> ThingId {
        self.id
    }

    #[must_use]
    pub fn class(&self) -> ThingClass {
        self.class
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<ThingId> {
        self.parent_id
    }

    #[must_use]
    pub fn params(&self) -> &ThingParams {
        &self.params
    }

    #[must_use]
    pub fn settings(&self) -> ThingSettings {
        self.settings.read().clone()
    }

    pub fn set_settings(&self, settings: ThingSettings) {
        *self.settings.write() = settings;
    }

    #[must_use]
    pub fn state_value(&self, state: StateType) -> Option<StateValue> {
        self.states.get(&state).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn bool_state(&self, state: StateType) -> Option<bool> {
        self.state_value(state).and_then(|v| v.as_bool())
    }

    /// Set a state, returns whether it changed
    ///
    /// Setting a state to its current value emits nothing.
    pub fn set_state_value(&self, state: StateType, value: impl Into<StateValue>) -> bool {
        let value = value.into();
        let previous = self.states.insert(state, value.clone());
        if previous.as_ref() == Some(&value) {
            return false;
        }
        let _ = self.event_tx.send(ThingEvent::StateChanged {
            thing_id: self.id,
            state,
            value,
        });
        true
    }

    pub fn emit_event(&self, event: EventType) {
        let _ = self.event_tx.send(ThingEvent::Event {
            thing_id: self.id,
            event,
        });
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ThingEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Thing {
        Thing::new(
            ThingId::new(),
            ThingClass::GenericDimmableLight,
            "Desk",
            None,
            ThingParams::default(),
        )
    }

    #[test]
    fn class_names_round_trip() {
        for class in ThingClass::ALL {
            assert_eq!(class.name().parse::<ThingClass>().unwrap(), class);
        }
        assert!(matches!(
            "philipsHueBulb".parse::<ThingClass>(),
            Err(SetupError::ThingClassNotFound(_))
        ));
    }

    #[test]
    fn unchanged_state_emits_nothing() {
        let thing = light();
        let mut rx = thing.subscribe();

        assert!(thing.set_state_value(StateType::Power, true));
        assert!(!thing.set_state_value(StateType::Power, true));
        assert!(thing.set_state_value(StateType::Power, false));

        assert!(matches!(
            rx.try_recv(),
            Ok(ThingEvent::StateChanged { value: StateValue::Bool(true), .. })
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(ThingEvent::StateChanged { value: StateValue::Bool(false), .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn restore_rejects_unknown_class() {
        let err = Thing::restore(ThingId::new(), "nope", "x", None, ThingParams::default());
        assert!(err.is_err());
        let ok =
            Thing::restore(ThingId::new(), "lumiMagnetSensor", "x", None, ThingParams::default())
            .unwrap();
        assert_eq!(ok.class(), ThingClass::LumiMagnetSensor);
    }

    #[test]
    fn descriptor_serializes_camel_case() {
        let descriptor = ThingDescriptor {
            thing_class: ThingClass::LumiMagnetSensor,
            title: "Door".to_string(),
            description: String::new(),
            parent_id: None,
            params: ThingParams {
                ieee_address: Some(IeeeAddress::from_u64(0x00158d0001020304)),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["thingClass"], "lumiMagnetSensor");
        assert_eq!(json["params"]["ieeeAddress"], "00:15:8d:00:01:02:03:04");
    }
}
