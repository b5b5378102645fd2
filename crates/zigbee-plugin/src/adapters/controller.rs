//! Network controller thing
//!
//! Mirrors the network manager state onto the controller thing and runs the
//! network level actions.

use std::sync::Arc;
use zigbee_core::{NetworkState, ZigbeeNetwork};

use super::unsupported;
use crate::error::ThingError;
use crate::platform::{Action, StateType, Thing};

pub struct NetworkController {
    thing: Arc<Thing>,
    network: Arc<dyn ZigbeeNetwork>,
}

impl NetworkController {
    #[must_use]
    pub fn new(thing: Arc<Thing>, network: Arc<dyn ZigbeeNetwork>) -> Self {
        Self { thing, network }
    }

    #[must_use]
    pub fn thing(&self) -> &Arc<Thing> {
        &self.thing
    }

    #[must_use]
    pub fn network(&self) -> &Arc<dyn ZigbeeNetwork> {
        &self.network
    }

    /// Copy network state and info onto the thing
    pub fn refresh(&self) {
        let state = self.network.state();
        let running = state == NetworkState::Running;
        self.thing.set_state_value(StateType::Connected, running);
        self.thing
            .set_state_value(StateType::NetworkState, state.to_string());

        if !running {
            self.thing
                .set_state_value(StateType::PermitJoinEnabled, false);
            return;
        }

        let info = self.network.info();
        self.thing.set_state_value(StateType::Channel, info.channel);
        self.thing
            .set_state_value(StateType::PanId, format!("{:#06x}", info.pan_id));
        self.thing
            .set_state_value(StateType::PermitJoinEnabled, info.permit_join);
        if let Some(version) = info.firmware_version {
            self.thing.set_state_value(StateType::FirmwareVersion, version);
        }
    }

    pub fn set_permit_join(&self, enabled: bool) {
        self.thing
            .set_state_value(StateType::PermitJoinEnabled, enabled);
    }

    pub async fn execute_action(&self, action: &Action) -> Result<(), ThingError> {
        match *action {
            Action::PermitJoin(duration) => {
                if self.network.state() != NetworkState::Running {
                    return Err(ThingError::HardwareNotAvailable);
                }
                tracing::info!("Permit join for {}s on {}", duration, self.thing.name());
                self.network.permit_join(duration).await?;
                self.set_permit_join(duration > 0);
                Ok(())
            }
            Action::Reset => {
                tracing::info!("Resetting controller {}", self.thing.name());
                self.network.reset().await?;
                Ok(())
            }
            Action::FactoryReset => {
                tracing::warn!("Factory resetting controller {}", self.thing.name());
                self.network.factory_reset().await?;
                Ok(())
            }
            _ => Err(unsupported(self.thing.class(), action)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{StateValue, ThingClass, ThingId, ThingParams};
    use zigbee_core::mock::{MockNetwork, MockRequest};

    fn controller() -> (Arc<MockNetwork>, NetworkController) {
        let network = Arc::new(MockNetwork::new());
        let thing = Arc::new(Thing::new(
            ThingId::new(),
            ThingClass::ZigbeeController,
            "ConBee",
            None,
            ThingParams::default(),
        ));
        (network.clone(), NetworkController::new(thing, network))
    }

    #[tokio::test]
    async fn permit_join_needs_running_network() {
        let (net, controller) = controller();
        assert_eq!(
            controller.execute_action(&Action::PermitJoin(60)).await,
            Err(ThingError::HardwareNotAvailable)
        );

        net.start().await.unwrap();
        controller.execute_action(&Action::PermitJoin(60)).await.unwrap();
        assert_eq!(
            controller.thing().bool_state(StateType::PermitJoinEnabled),
            Some(true)
        );
        assert!(net.requests().contains(&MockRequest::PermitJoin(60)));
    }

    #[tokio::test]
    async fn reset_works_while_stopped() {
        let (net, controller) = controller();
        controller.execute_action(&Action::Reset).await.unwrap();
        controller.execute_action(&Action::FactoryReset).await.unwrap();
        assert_eq!(
            net.requests(),
            vec![MockRequest::Reset, MockRequest::FactoryReset]
        );
    }

    #[tokio::test]
    async fn refresh_mirrors_network_info() {
        let (net, controller) = controller();
        controller.refresh();
        assert_eq!(controller.thing().bool_state(StateType::Connected), Some(false));
        assert_eq!(
            controller.thing().state_value(StateType::NetworkState),
            Some(StateValue::Text("stopped".to_string()))
        );

        net.start().await.unwrap();
        controller.refresh();
        assert_eq!(controller.thing().bool_state(StateType::Connected), Some(true));
        assert_eq!(
            controller.thing().state_value(StateType::Channel),
            Some(StateValue::Uint(11))
        );
        assert_eq!(
            controller.thing().state_value(StateType::PanId),
            Some(StateValue::Text("0x1a62".to_string()))
        );
    }

    #[tokio::test]
    async fn light_actions_are_rejected() {
        let (_net, controller) = controller();
        assert!(matches!(
            controller.execute_action(&Action::Power(true)).await,
            Err(ThingError::ActionTypeNotFound { .. })
        ));
    }
}
