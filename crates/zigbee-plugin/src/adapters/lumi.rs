//! Xiaomi / Aqara (Lumi) sensors
//!
//! Lumi devices ignore the profile conventions and put everything on
//! endpoint 1. Their On/Off style booleans are inverted: 0 means pressed or
//! closed. Battery state arrives in the manufacturer specific 0xFF01 report.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use zigbee_core::cluster::{ias_zone_attrs, ias_zone_cmds, id, measurement_attrs, on_off_attrs};
use zigbee_core::codec::{decode_bool, decode_zone_status, Measurement, Polarity, ZoneStatus};
use zigbee_core::{Attribute, IncomingCommand};

use super::{removal_only, CriticalFlag, DeviceContext, ZigbeeDevice};
use crate::error::ThingError;
use crate::platform::{Action, EventType, StateType};
use crate::task::TaskSlot;

const LUMI_POLARITY: Polarity = Polarity::Inverted;

pub struct TemperatureSensor {
    ctx: DeviceContext,
}

impl TemperatureSensor {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ZigbeeDevice for TemperatureSensor {
    fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    fn check_online_status(&self) {
        self.ctx.refresh_connected();
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        removal_only(&self.ctx, action).await
    }

    fn handle_attribute(&self, _endpoint: u8, cluster_id: u16, attribute: &Attribute) {
        let (measurement, state) = match (cluster_id, attribute.id) {
            (id::TEMPERATURE_MEASUREMENT, measurement_attrs::MEASURED_VALUE) => {
                (Measurement::Temperature, StateType::Temperature)
            }
            (id::HUMIDITY_MEASUREMENT, measurement_attrs::MEASURED_VALUE) => {
                (Measurement::Humidity, StateType::Humidity)
            }
            (id::PRESSURE_MEASUREMENT, measurement_attrs::MEASURED_VALUE) => {
                (Measurement::Pressure, StateType::Pressure)
            }
            _ => {
                self.ctx.handle_common_attribute(cluster_id, attribute);
                return;
            }
        };
        match measurement.decode(attribute) {
            Ok(value) => {
                self.thing().set_state_value(state, value);
            }
            Err(e) => tracing::warn!(
                "{}: dropping {:?} report: {}",
                self.thing().name(),
                measurement,
                e
            ),
        }
    }
}

pub struct MagnetSensor {
    ctx: DeviceContext,
}

impl MagnetSensor {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ZigbeeDevice for MagnetSensor {
    fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    fn check_online_status(&self) {
        self.ctx.refresh_connected();
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        removal_only(&self.ctx, action).await
    }

    fn handle_attribute(&self, _endpoint: u8, cluster_id: u16, attribute: &Attribute) {
        if (cluster_id, attribute.id) != (id::ON_OFF, on_off_attrs::ON_OFF) {
            self.ctx.handle_common_attribute(cluster_id, attribute);
            return;
        }
        match decode_bool(attribute, LUMI_POLARITY) {
            Ok(closed) => {
                self.thing().set_state_value(StateType::Closed, closed);
            }
            Err(e) => tracing::warn!("{}: dropping contact report: {}", self.thing().name(), e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Down, long press timer running
    Pressed,
    /// Long press already reported, waiting for release
    Held,
}

const BUTTON: &str = "Button";

/// Single button wireless switch with long press detection
pub struct ButtonSensor {
    ctx: DeviceContext,
    phase: Arc<Mutex<Phase>>,
    long_press: TaskSlot,
}

impl ButtonSensor {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx,
            phase: Arc::new(Mutex::new(Phase::Idle)),
            long_press: TaskSlot::new(),
        }
    }

    fn press(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Idle {
                return;
            }
            *phase = Phase::Pressed;
        }
        self.thing().set_state_value(StateType::Pressed, true);

        let phase = Arc::clone(&self.phase);
        let thing = self.ctx.thing.clone();
        self.long_press
            .start_timer(self.ctx.config.long_press_threshold(), move || {
                {
                    let mut phase = phase.lock();
                    if *phase != Phase::Pressed {
                        return;
                    }
                    *phase = Phase::Held;
                }
                thing.emit_event(EventType::LongPressed {
                    button: BUTTON.to_string(),
                });
            });
    }

    fn release(&self) {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Idle);
        self.thing().set_state_value(StateType::Pressed, false);
        if previous == Phase::Pressed {
            self.long_press.cancel();
            self.thing().emit_event(EventType::Pressed {
                button: BUTTON.to_string(),
            });
        }
    }
}

#[async_trait]
impl ZigbeeDevice for ButtonSensor {
    fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    fn check_online_status(&self) {
        self.ctx.refresh_connected();
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        removal_only(&self.ctx, action).await
    }

    fn handle_attribute(&self, _endpoint: u8, cluster_id: u16, attribute: &Attribute) {
        if (cluster_id, attribute.id) != (id::ON_OFF, on_off_attrs::ON_OFF) {
            self.ctx.handle_common_attribute(cluster_id, attribute);
            return;
        }
        match decode_bool(attribute, LUMI_POLARITY) {
            Ok(true) => self.press(),
            Ok(false) => self.release(),
            Err(e) => tracing::warn!("{}: dropping button report: {}", self.thing().name(), e),
        }
    }
}

pub struct WaterSensor {
    ctx: DeviceContext,
}

impl WaterSensor {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        Self { ctx }
    }

    fn apply(&self, status: ZoneStatus) {
        self.thing()
            .set_state_value(StateType::WaterDetected, status.alarm1());
        self.thing()
            .set_state_value(StateType::BatteryCritical, status.battery_low());
    }
}

#[async_trait]
impl ZigbeeDevice for WaterSensor {
    fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    fn check_online_status(&self) {
        self.ctx.refresh_connected();
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        removal_only(&self.ctx, action).await
    }

    fn handle_attribute(&self, _endpoint: u8, cluster_id: u16, attribute: &Attribute) {
        if (cluster_id, attribute.id) != (id::IAS_ZONE, ias_zone_attrs::ZONE_STATUS) {
            self.ctx
                .handle_common_attribute_with(cluster_id, attribute, CriticalFlag::FromZoneStatus);
            return;
        }
        match decode_zone_status(attribute) {
            Ok(status) => self.apply(status),
            Err(e) => tracing::warn!("{}: dropping zone status: {}", self.thing().name(), e),
        }
    }

    fn handle_command(&self, command: &IncomingCommand) {
        if command.cluster_id != id::IAS_ZONE
            || command.command_id != ias_zone_cmds::ZONE_STATUS_CHANGE_NOTIFICATION
        {
            return;
        }
        match ZoneStatus::from_notification(&command.payload) {
            Ok(status) => self.apply(status),
            Err(e) => tracing::warn!("{}: dropping zone notification: {}", self.thing().name(), e),
        }
    }
}
