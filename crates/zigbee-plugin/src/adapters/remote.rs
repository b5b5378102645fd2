//! IKEA TRADFRI remote and on/off switch
//!
//! Both are client devices: they never report state, they send On/Off,
//! Level Control and (remote only) manufacturer specific Scenes commands
//! which are turned into button events.

use async_trait::async_trait;
use zigbee_core::cluster::{id, ikea_scene_cmds, manufacturer, LevelCommand, MoveMode, OnOffCommand};
use zigbee_core::IncomingCommand;

use super::{removal_only, DeviceContext, ZigbeeDevice};
use crate::error::ThingError;
use crate::platform::{Action, EventType};
use crate::task::TaskSlot;

/// Button layout of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Five button round remote
    Remote,
    /// Two button on/off switch
    OnOffSwitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Press {
    Short,
    Long,
}

pub struct Remote {
    ctx: DeviceContext,
    layout: Layout,
    battery: TaskSlot,
}

impl Remote {
    #[must_use]
    pub fn new(ctx: DeviceContext, layout: Layout) -> Self {
        Self {
            ctx,
            layout,
            battery: TaskSlot::new(),
        }
    }

    fn decode(&self, command: &IncomingCommand) -> Option<(Press, &'static str)> {
        match (self.layout, command.cluster_id) {
            (Layout::Remote, id::ON_OFF) => {
                match OnOffCommand::parse(command.command_id, &command.payload)? {
                    OnOffCommand::Toggle => Some((Press::Short, "Toggle")),
                    _ => None,
                }
            }
            (Layout::Remote, id::LEVEL_CONTROL) => {
                match LevelCommand::parse(command.command_id, &command.payload)? {
                    LevelCommand::Step { mode, .. } | LevelCommand::StepWithOnOff { mode, .. } => {
                        Some((Press::Short, brightness_button(mode)))
                    }
                    LevelCommand::Move { mode, .. } | LevelCommand::MoveWithOnOff { mode, .. } => {
                        Some((Press::Long, brightness_button(mode)))
                    }
                    _ => None,
                }
            }
            (Layout::Remote, id::SCENES)
                if command.manufacturer_code == Some(manufacturer::IKEA) =>
            {
                let button = match command.payload.first()? {
                    &ikea_scene_cmds::RIGHT => "Right",
                    &ikea_scene_cmds::LEFT => "Left",
                    _ => return None,
                };
                match command.command_id {
                    ikea_scene_cmds::ARROW_CLICK => Some((Press::Short, button)),
                    ikea_scene_cmds::ARROW_HOLD => Some((Press::Long, button)),
                    _ => None,
                }
            }
            (Layout::OnOffSwitch, id::ON_OFF) => {
                match OnOffCommand::parse(command.command_id, &command.payload)? {
                    OnOffCommand::On => Some((Press::Short, "On")),
                    OnOffCommand::Off => Some((Press::Short, "Off")),
                    _ => None,
                }
            }
            (Layout::OnOffSwitch, id::LEVEL_CONTROL) => {
                match LevelCommand::parse(command.command_id, &command.payload)? {
                    LevelCommand::Move { mode, .. } | LevelCommand::MoveWithOnOff { mode, .. } => {
                        let button = match mode {
                            MoveMode::Up => "On",
                            MoveMode::Down => "Off",
                        };
                        Some((Press::Long, button))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn brightness_button(mode: MoveMode) -> &'static str {
    match mode {
        MoveMode::Up => "Brightness up",
        MoveMode::Down => "Brightness down",
    }
}

#[async_trait]
impl ZigbeeDevice for Remote {
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
        let Some((press, button)) = self.decode(command) else {
            tracing::debug!(
                "{}: ignoring cluster {:#06x} command {:#04x}",
                self.thing().name(),
                command.cluster_id,
                command.command_id
            );
            return;
        };
        let button = button.to_string();
        tracing::debug!("{}: {:?} press on {}", self.thing().name(), press, button);
        let event = match press {
            Press::Short => EventType::Pressed { button },
            Press::Long => EventType::LongPressed { button },
        };
        self.thing().emit_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests::fixture;
    use crate::discovery::tests::node_with;
    use crate::platform::{ThingClass, ThingEvent};
    use zigbee_core::cluster::{ha_device, profile};

    async fn device(class: ThingClass, device_id: u16) -> Remote {
        let node = node_with(0x21, manufacturer::IKEA, profile::HOME_AUTOMATION, device_id, vec![]);
        let (_net, ctx) = fixture(class, node).await;
        let layout = if class == ThingClass::TradfriRemote {
            Layout::Remote
        } else {
            Layout::OnOffSwitch
        };
        Remote::new(ctx, layout)
    }

    fn command(cluster_id: u16, command_id: u8, payload: Vec<u8>) -> IncomingCommand {
        IncomingCommand {
            ieee_address: zigbee_core::IeeeAddress::from_u64(0x21),
            endpoint: 1,
            cluster_id,
            command_id,
            manufacturer_code: (cluster_id == id::SCENES).then_some(manufacturer::IKEA),
            payload,
        }
    }

    fn next_event(rx: &mut tokio::sync::broadcast::Receiver<ThingEvent>) -> Option<EventType> {
        match rx.try_recv().ok()? {
            ThingEvent::Event { event, .. } => Some(event),
            ThingEvent::StateChanged { .. } => None,
        }
    }

    fn pressed(button: &str) -> Option<EventType> {
        Some(EventType::Pressed {
            button: button.to_string(),
        })
    }

    fn long_pressed(button: &str) -> Option<EventType> {
        Some(EventType::LongPressed {
            button: button.to_string(),
        })
    }

    #[tokio::test]
    async fn remote_buttons() {
        let remote = device(ThingClass::TradfriRemote, ha_device::COLOR_SCENE_CONTROLLER).await;
        let mut rx = remote.thing().subscribe();

        remote.handle_command(&command(id::ON_OFF, 0x02, vec![]));
        assert_eq!(next_event(&mut rx), pressed("Toggle"));

        remote.handle_command(&command(id::LEVEL_CONTROL, 0x06, vec![0x00, 0x2B, 0x05, 0x00]));
        assert_eq!(next_event(&mut rx), pressed("Brightness up"));

        remote.handle_command(&command(id::LEVEL_CONTROL, 0x01, vec![0x01, 0x53]));
        assert_eq!(next_event(&mut rx), long_pressed("Brightness down"));

        remote.handle_command(&command(id::SCENES, 0x07, vec![0x01, 0x0D, 0x00]));
        assert_eq!(next_event(&mut rx), pressed("Left"));

        remote.handle_command(&command(id::SCENES, 0x08, vec![0x00, 0x0D, 0x00]));
        assert_eq!(next_event(&mut rx), long_pressed("Right"));

        // Stop and arrow release carry no event
        remote.handle_command(&command(id::LEVEL_CONTROL, 0x07, vec![]));
        remote.handle_command(&command(id::SCENES, 0x09, vec![0x00, 0x00]));
        assert_eq!(next_event(&mut rx), None);
    }

    #[tokio::test]
    async fn on_off_switch_buttons() {
        let switch = device(ThingClass::TradfriOnOffSwitch, ha_device::NON_COLOR_CONTROLLER).await;
        let mut rx = switch.thing().subscribe();

        switch.handle_command(&command(id::ON_OFF, 0x01, vec![]));
        assert_eq!(next_event(&mut rx), pressed("On"));
        switch.handle_command(&command(id::ON_OFF, 0x00, vec![]));
        assert_eq!(next_event(&mut rx), pressed("Off"));
        switch.handle_command(&command(id::LEVEL_CONTROL, 0x05, vec![0x00, 0x53]));
        assert_eq!(next_event(&mut rx), long_pressed("On"));
        switch.handle_command(&command(id::LEVEL_CONTROL, 0x01, vec![0x01, 0x53]));
        assert_eq!(next_event(&mut rx), long_pressed("Off"));
    }

    #[tokio::test]
    async fn remote_only_supports_removal() {
        let remote = device(ThingClass::TradfriRemote, ha_device::COLOR_SCENE_CONTROLLER).await;
        assert!(matches!(
            remote.execute_action(&Action::Power(true)).await,
            Err(ThingError::ActionTypeNotFound { .. })
        ));
    }
}
