//! Lights and sockets (generic HA/ZLL and IKEA TRADFRI)

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use zigbee_core::cluster::{
    color_attrs, id, level_attrs, on_off_attrs, ColorCommand, IdentifyCommand, LevelCommand,
    OnOffCommand,
};
use zigbee_core::codec::{
    decode_bool, decode_level_percentage, decode_u16, percentage_to_level, ColorXyAccumulator,
    DecodeError, MiredRange, Polarity,
};
use zigbee_core::color::rgb_to_xy;
use zigbee_core::{Attribute, ClusterCommand};

use super::{unsupported, DeviceContext, ZigbeeDevice};
use crate::error::ThingError;
use crate::platform::{Action, StateType, ThingClass};
use crate::task::TaskSlot;

/// Transition time for level and color changes, tenths of a second
const TRANSITION_TIME: u16 = 5;

/// Which light clusters a class drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub dimmable: bool,
    pub color_temperature: bool,
    pub color: bool,
}

impl Capabilities {
    #[must_use]
    pub fn for_class(class: ThingClass) -> Self {
        match class {
            ThingClass::GenericDimmableLight | ThingClass::TradfriDimmableLight => Self {
                dimmable: true,
                ..Self::default()
            },
            ThingClass::GenericColorTemperatureLight | ThingClass::TradfriColorTemperatureLight => {
                Self {
                    dimmable: true,
                    color_temperature: true,
                    color: false,
                }
            }
            ThingClass::GenericColorLight | ThingClass::TradfriColorLight => Self {
                dimmable: true,
                color_temperature: true,
                color: true,
            },
            _ => Self::default(),
        }
    }

    /// Color Control attributes to read once online
    fn color_attributes(self) -> Vec<u16> {
        let mut attrs = Vec::new();
        if self.color_temperature {
            attrs.extend([
                color_attrs::COLOR_TEMP_PHYSICAL_MIN,
                color_attrs::COLOR_TEMP_PHYSICAL_MAX,
                color_attrs::COLOR_TEMPERATURE_MIREDS,
            ]);
        }
        if self.color {
            attrs.extend([color_attrs::CURRENT_X, color_attrs::CURRENT_Y]);
        }
        attrs
    }
}

#[derive(Debug, Default)]
struct ColorState {
    physical_min: Option<u16>,
    physical_max: Option<u16>,
    xy: ColorXyAccumulator,
}

impl ColorState {
    fn mired_range(&self) -> MiredRange {
        MiredRange::from_physical(self.physical_min, self.physical_max)
    }
}

/// State shared with the read chain task
struct Shared {
    ctx: DeviceContext,
    capabilities: Capabilities,
    color: Mutex<ColorState>,
}

impl Shared {
    fn apply(&self, cluster_id: u16, attribute: &Attribute) {
        if let Err(e) = self.try_apply(cluster_id, attribute) {
            tracing::warn!(
                "{}: dropping cluster {:#06x} report: {}",
                self.ctx.thing.name(),
                cluster_id,
                e
            );
        }
    }

    fn try_apply(&self, cluster_id: u16, attribute: &Attribute) -> Result<(), DecodeError> {
        let thing = &self.ctx.thing;
        match (cluster_id, attribute.id) {
            (id::ON_OFF, on_off_attrs::ON_OFF) => {
                let on = decode_bool(attribute, Polarity::Normal)?;
                thing.set_state_value(StateType::Power, on);
            }
            (id::LEVEL_CONTROL, level_attrs::CURRENT_LEVEL) if self.capabilities.dimmable => {
                let pct = decode_level_percentage(attribute)?;
                thing.set_state_value(StateType::Brightness, pct);
            }
            (id::COLOR_CONTROL, attr_id) if self.capabilities.color_temperature => {
                self.apply_color(attr_id, attribute)?;
            }
            _ => {
                self.ctx.handle_common_attribute(cluster_id, attribute);
            }
        }
        Ok(())
    }

    fn apply_color(&self, attr_id: u16, attribute: &Attribute) -> Result<(), DecodeError> {
        let thing = &self.ctx.thing;
        match attr_id {
            color_attrs::COLOR_TEMPERATURE_MIREDS => {
                let mireds = decode_u16(attribute)?;
                thing.set_state_value(StateType::ColorTemperature, mireds);
            }
            color_attrs::COLOR_TEMP_PHYSICAL_MIN => {
                self.color.lock().physical_min = Some(decode_u16(attribute)?);
            }
            color_attrs::COLOR_TEMP_PHYSICAL_MAX => {
                self.color.lock().physical_max = Some(decode_u16(attribute)?);
            }
            color_attrs::CURRENT_X if self.capabilities.color => {
                let x = decode_u16(attribute)?;
                let rgb = self.color.lock().xy.push_x(x);
                if let Some(rgb) = rgb {
                    thing.set_state_value(StateType::Color, rgb);
                }
            }
            color_attrs::CURRENT_Y if self.capabilities.color => {
                let y = decode_u16(attribute)?;
                let rgb = self.color.lock().xy.push_y(y);
                if let Some(rgb) = rgb {
                    thing.set_state_value(StateType::Color, rgb);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Read on/off, then level, then color; each read waits for the previous reply
    async fn read_initial_state(self: Arc<Self>) {
        let mut steps = vec![(id::ON_OFF, vec![on_off_attrs::ON_OFF])];
        if self.capabilities.dimmable {
            steps.push((id::LEVEL_CONTROL, vec![level_attrs::CURRENT_LEVEL]));
        }
        let color_attrs = self.capabilities.color_attributes();
        if !color_attrs.is_empty() {
            steps.push((id::COLOR_CONTROL, color_attrs));
        }

        for (cluster_id, attribute_ids) in steps {
            match self.ctx.read(cluster_id, &attribute_ids).await {
                Ok(attributes) => {
                    for attribute in &attributes {
                        self.apply(cluster_id, attribute);
                    }
                    if cluster_id == id::COLOR_CONTROL {
                        // A lone X or Y from this batch must not pair with a later report
                        self.color.lock().xy.reset();
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: reading cluster {:#06x} failed, stopping initial read: {}",
                        self.ctx.thing.name(),
                        cluster_id,
                        e
                    );
                    return;
                }
            }
        }
        tracing::debug!("{}: initial state read complete", self.ctx.thing.name());
    }
}

/// On/off, dimmable, color temperature and color lights, and sockets
pub struct Light {
    shared: Arc<Shared>,
    reads: TaskSlot,
}

impl Light {
    #[must_use]
    pub fn new(ctx: DeviceContext) -> Self {
        let capabilities = Capabilities::for_class(ctx.thing.class());
        Self {
            shared: Arc::new(Shared {
                ctx,
                capabilities,
                color: Mutex::new(ColorState::default()),
            }),
            reads: TaskSlot::new(),
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.shared.capabilities
    }

    #[must_use]
    pub fn mired_range(&self) -> MiredRange {
        self.shared.color.lock().mired_range()
    }

    async fn set_power(&self, on: bool) -> Result<(), ThingError> {
        let command = if on { OnOffCommand::On } else { OnOffCommand::Off };
        self.context().send(ClusterCommand::OnOff(command)).await?;
        self.thing().set_state_value(StateType::Power, on);
        Ok(())
    }

    async fn set_brightness(&self, percentage: u8) -> Result<(), ThingError> {
        if percentage > 100 {
            return Err(ThingError::InvalidParameter(format!(
                "brightness {percentage} out of range"
            )));
        }
        let command = LevelCommand::MoveToLevelWithOnOff {
            level: percentage_to_level(percentage),
            transition_time: TRANSITION_TIME,
        };
        self.context().send(ClusterCommand::Level(command)).await?;
        // The light switches itself with MoveToLevelWithOnOff but may not report it
        self.thing().set_state_value(StateType::Brightness, percentage);
        self.thing().set_state_value(StateType::Power, percentage > 0);
        Ok(())
    }

    async fn set_color_temperature(&self, mireds: u16) -> Result<(), ThingError> {
        let mireds = self.mired_range().clamp(mireds);
        let command = ColorCommand::MoveToColorTemperature {
            color_temp_mireds: mireds,
            transition_time: TRANSITION_TIME,
        };
        self.context().send(ClusterCommand::Color(command)).await?;
        self.thing().set_state_value(StateType::ColorTemperature, mireds);
        Ok(())
    }

    async fn set_color(&self, rgb: zigbee_core::Rgb) -> Result<(), ThingError> {
        let (x, y) = rgb_to_xy(rgb).to_fixed();
        let command = ColorCommand::MoveToColor {
            x,
            y,
            transition_time: TRANSITION_TIME,
        };
        self.context().send(ClusterCommand::Color(command)).await?;
        self.thing().set_state_value(StateType::Color, rgb);
        Ok(())
    }

    async fn identify(&self) -> Result<(), ThingError> {
        let identify_time = self.context().config.identify_time_secs;
        self.context()
            .send(ClusterCommand::Identify(IdentifyCommand::Identify { identify_time }))
            .await
    }
}

#[async_trait]
impl ZigbeeDevice for Light {
    fn context(&self) -> &DeviceContext {
        &self.shared.ctx
    }

    fn check_online_status(&self) {
        if self.context().refresh_connected() {
            self.reads.spawn(Arc::clone(&self.shared).read_initial_state());
        } else {
            self.reads.cancel();
        }
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        let caps = self.shared.capabilities;
        match *action {
            Action::Power(on) => self.set_power(on).await,
            Action::Brightness(pct) if caps.dimmable => self.set_brightness(pct).await,
            Action::ColorTemperature(mireds) if caps.color_temperature => {
                self.set_color_temperature(mireds).await
            }
            Action::Color(rgb) if caps.color => self.set_color(rgb).await,
            Action::Identify => self.identify().await,
            Action::RemoveFromNetwork => self.remove_from_network().await,
            _ => Err(unsupported(self.thing().class(), action)),
        }
    }

    fn handle_attribute(&self, endpoint: u8, cluster_id: u16, attribute: &Attribute) {
        if endpoint != self.context().endpoint {
            return;
        }
        self.shared.apply(cluster_id, attribute);
    }
}
