//! Motion sensors
//!
//! Presence is set on motion and cleared by a single-shot timer. The IKEA
//! sensor tells how long via its on-with-timed-off command, the Lumi sensor
//! uses the thing setting or the plugin default.

use async_trait::async_trait;
use std::time::Duration;
use zigbee_core::cluster::{id, measurement_attrs, occupancy_attrs, OnOffCommand};
use zigbee_core::codec::{decode_illuminance, decode_occupancy};
use zigbee_core::{Attribute, IncomingCommand};

use super::{removal_only, DeviceContext, ZigbeeDevice};
use crate::error::ThingError;
use crate::platform::{Action, EventType, StateType};
use crate::task::TaskSlot;

/// Mark presence and (re)arm the timer that clears it
fn detect_motion(ctx: &DeviceContext, timer: &TaskSlot, hold: Duration) {
    ctx.thing.set_state_value(StateType::IsPresent, true);
    ctx.thing.emit_event(EventType::MotionDetected);

    let thing = ctx.thing.clone();
    timer.start_timer(hold, move || {
        tracing::debug!("{}: no motion, clearing presence", thing.name());
        thing.set_state_value(StateType::IsPresent, false);
    });
}

pub struct TradfriMotionSensor {
    ctx: DeviceContext,
    presence: TaskSlot,
    battery: TaskSlot,
}

impl TradfriMotionSensor {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx,
            presence: TaskSlot::new(),
            battery: TaskSlot::new(),
        }
    }
}

#[async_trait]
impl ZigbeeDevice for TradfriMotionSensor {
    fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    fn check_online_status(&self) {
        if self.ctx.refresh_connected() {
            let ctx = self.ctx.clone();
            self.battery.spawn(async move { ctx.refresh_battery().await });
        } else {
            self.battery.cancel();
        }
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        removal_only(&self.ctx, action).await
    }

    fn handle_command(&self, command: &IncomingCommand) {
        if command.cluster_id != id::ON_OFF {
            return;
        }
        let hold = match OnOffCommand::parse(command.command_id, &command.payload) {
            // on_time is in tenths of a second
            Some(OnOffCommand::OnWithTimedOff { on_time, .. }) if on_time > 0 => {
                Duration::from_millis(u64::from(on_time) * 100)
            }
            Some(OnOffCommand::OnWithTimedOff { .. } | OnOffCommand::On) => {
                self.ctx.config.motion_timeout()
            }
            _ => return,
        };
        tracing::debug!("{}: motion, present for {:?}", self.thing().name(), hold);
        detect_motion(&self.ctx, &self.presence, hold);
    }
}

pub struct LumiMotionSensor {
    ctx: DeviceContext,
    presence: TaskSlot,
}

impl LumiMotionSensor {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        Self {
            ctx,
            presence: TaskSlot::new(),
        }
    }

    fn hold_time(&self) -> Duration {
        self.ctx
            .thing
            .settings()
            .motion_timeout_secs
            .map_or_else(|| self.ctx.config.motion_timeout(), Duration::from_secs)
    }
}

#[async_trait]
impl ZigbeeDevice for LumiMotionSensor {
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
        match (cluster_id, attribute.id) {
            (id::OCCUPANCY_SENSING, occupancy_attrs::OCCUPANCY) => {
                match decode_occupancy(attribute) {
                    Ok(true) => detect_motion(&self.ctx, &self.presence, self.hold_time()),
                    // The sensor never reports absence itself, the timer does
                    Ok(false) => {}
                    Err(e) => tracing::warn!(
                        "{}: dropping occupancy report: {}",
                        self.thing().name(),
                        e
                    ),
                }
            }
            (id::ILLUMINANCE_MEASUREMENT, measurement_attrs::MEASURED_VALUE) => {
                match decode_illuminance(attribute) {
                    Ok(lux) => {
                        self.thing().set_state_value(StateType::LightIntensity, lux);
                    }
                    Err(e) => tracing::warn!(
                        "{}: dropping illuminance report: {}",
                        self.thing().name(),
                        e
                    ),
                }
            }
            _ => {
                self.ctx.handle_common_attribute(cluster_id, attribute);
            }
        }
    }
}
