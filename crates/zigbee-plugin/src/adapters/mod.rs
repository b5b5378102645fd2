//! Device adapters
//!
//! One adapter per thing, bound to one endpoint of one node. Adapters decode
//! attribute reports into thing states and turn actions into cluster
//! commands. Background work (timers, read chains) holds only the
//! [`DeviceContext`] and shared state, never the adapter itself.

pub mod controller;
pub mod light;
pub mod lumi;
pub mod motion;
pub mod remote;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use zigbee_core::cluster::{basic_attrs, id, power_attrs, DataType};
use zigbee_core::codec::{
    self, decode_battery_percentage, decode_lumi_battery_voltage, lqi_to_percentage,
    lumi_voltage_to_percentage, BATTERY_CRITICAL_PERCENTAGE,
};
use zigbee_core::network::ReportingConfig;
use zigbee_core::{
    Attribute, ClusterCommand, IeeeAddress, IncomingCommand, NetworkState, Node, Target,
    ZigbeeError, ZigbeeNetwork,
};

use crate::config::PluginConfig;
use crate::error::{SetupError, ThingError};
use crate::platform::{Action, StateType, Thing, ThingClass};

pub use controller::NetworkController;

/// Which report owns the `batteryCritical` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalFlag {
    /// Derived from the battery percentage
    FromLevel,
    /// Set only by the IAS zone status battery-low bit
    FromZoneStatus,
}

/// Everything an adapter and its background tasks need
#[derive(Clone)]
pub struct DeviceContext {
    pub thing: Arc<Thing>,
    pub network: Arc<dyn ZigbeeNetwork>,
    pub config: Arc<PluginConfig>,
    pub ieee_address: IeeeAddress,
    pub endpoint: u8,
}

impl DeviceContext {
    #[must_use]
    pub fn target(&self) -> Target {
        Target::new(self.ieee_address, self.endpoint)
    }

    #[must_use]
    pub fn is_network_running(&self) -> bool {
        self.network.state() == NetworkState::Running
    }

    /// Fail fast while the network is down
    pub fn ensure_running(&self) -> Result<(), ThingError> {
        if self.is_network_running() {
            Ok(())
        } else {
            Err(ThingError::HardwareNotAvailable)
        }
    }

    /// Update `connected` from the network state and node reachability
    pub fn refresh_connected(&self) -> bool {
        let reachable = self
            .network
            .node(&self.ieee_address)
            .is_some_and(|node| node.reachable);
        let connected = self.is_network_running() && reachable;
        self.thing.set_state_value(StateType::Connected, connected);
        connected
    }

    /// Send one command and wait for its reply
    pub async fn send(&self, command: ClusterCommand) -> Result<(), ThingError> {
        self.ensure_running()?;
        tracing::debug!(
            "{} -> {} cluster {:#06x} command {:#04x}",
            self.thing.name(),
            self.target(),
            command.cluster_id(),
            command.command_id()
        );
        self.network
            .send_command(self.target(), command)
            .await
            .map_err(|e| {
                tracing::warn!("Command to {} failed: {}", self.thing.name(), e);
                ThingError::from(e)
            })
    }

    pub async fn read(
        &self,
        cluster_id: u16,
        attribute_ids: &[u16],
    ) -> Result<Vec<Attribute>, ZigbeeError> {
        self.network
            .read_attributes(self.target(), cluster_id, attribute_ids)
            .await
    }

    /// Ask the node to leave the network
    pub async fn remove_from_network(&self) -> Result<(), ThingError> {
        self.ensure_running()?;
        tracing::info!("Removing {} ({}) from network", self.thing.name(), self.ieee_address);
        self.network
            .remove_node(&self.ieee_address)
            .await
            .map_err(ThingError::from)
    }

    /// Record that the node was heard from
    pub fn touch(&self) {
        self.thing
            .set_state_value(StateType::LastSeenTime, Utc::now().timestamp());
    }

    pub fn set_battery_level(&self, percentage: u8) {
        self.thing.set_state_value(StateType::BatteryLevel, percentage);
        self.thing.set_state_value(
            StateType::BatteryCritical,
            percentage < BATTERY_CRITICAL_PERCENTAGE,
        );
    }

    fn apply_battery_level(&self, percentage: u8, critical: CriticalFlag) {
        match critical {
            CriticalFlag::FromLevel => self.set_battery_level(percentage),
            CriticalFlag::FromZoneStatus => {
                self.thing.set_state_value(StateType::BatteryLevel, percentage);
            }
        }
    }

    /// Attributes every family understands, returns whether it was consumed
    pub fn handle_common_attribute(&self, cluster_id: u16, attribute: &Attribute) -> bool {
        self.handle_common_attribute_with(cluster_id, attribute, CriticalFlag::FromLevel)
    }

    pub fn handle_common_attribute_with(
        &self,
        cluster_id: u16,
        attribute: &Attribute,
        critical: CriticalFlag,
    ) -> bool {
        match (cluster_id, attribute.id) {
            (id::POWER_CONFIGURATION, power_attrs::BATTERY_PERCENTAGE_REMAINING) => {
                match decode_battery_percentage(attribute) {
                    Ok(pct) => self.apply_battery_level(pct, critical),
                    Err(e) => tracing::warn!(
                        "{}: dropping battery report: {}",
                        self.thing.name(),
                        e
                    ),
                }
                true
            }
            (id::BASIC, basic_attrs::LUMI_REPORT) => {
                match decode_lumi_battery_voltage(attribute) {
                    Ok(mv) => self.apply_battery_level(lumi_voltage_to_percentage(mv), critical),
                    Err(e) => tracing::debug!(
                        "{}: no battery in status report: {}",
                        self.thing.name(),
                        e
                    ),
                }
                true
            }
            (id::BASIC, basic_attrs::SW_BUILD_ID) => {
                match codec::decode_string(attribute) {
                    Ok(version) => {
                        self.thing.set_state_value(StateType::Version, version);
                    }
                    Err(e) => tracing::warn!(
                        "{}: dropping version report: {}",
                        self.thing.name(),
                        e
                    ),
                }
                true
            }
            _ => false,
        }
    }

    /// Read the battery and ask the node to report it from now on
    pub async fn refresh_battery(&self) {
        match self
            .read(id::POWER_CONFIGURATION, &[power_attrs::BATTERY_PERCENTAGE_REMAINING])
            .await
        {
            Ok(attributes) => {
                for attribute in &attributes {
                    self.handle_common_attribute(id::POWER_CONFIGURATION, attribute);
                }
            }
            Err(e) => {
                tracing::debug!("{}: battery read failed: {}", self.thing.name(), e);
                return;
            }
        }

        if let Err(e) = self.network.bind(self.target(), id::POWER_CONFIGURATION).await {
            tracing::debug!("{}: binding power configuration failed: {}", self.thing.name(), e);
            return;
        }
        let reporting = ReportingConfig {
            attribute_id: power_attrs::BATTERY_PERCENTAGE_REMAINING,
            data_type: DataType::Uint8,
            min_interval: 300,
            max_interval: 3600,
            reportable_change: 2,
        };
        if let Err(e) = self
            .network
            .configure_reporting(self.target(), id::POWER_CONFIGURATION, reporting)
            .await
        {
            tracing::debug!("{}: battery reporting setup failed: {}", self.thing.name(), e);
        }
    }
}

/// A Zigbee device bound to a thing
#[async_trait]
pub trait ZigbeeDevice: Send + Sync {
    fn context(&self) -> &DeviceContext;

    fn thing(&self) -> &Arc<Thing> {
        &self.context().thing
    }

    fn ieee_address(&self) -> IeeeAddress {
        self.context().ieee_address
    }

    /// Re-evaluate connectivity after setup or a network state change
    fn check_online_status(&self);

    async fn remove_from_network(&self) -> Result<(), ThingError> {
        self.context().remove_from_network().await
    }

    async fn execute_action(&self, action: &Action) -> Result<(), ThingError>;

    fn handle_attribute(&self, _endpoint: u8, cluster_id: u16, attribute: &Attribute) {
        self.context().handle_common_attribute(cluster_id, attribute);
    }

    fn handle_command(&self, _command: &IncomingCommand) {}

    fn handle_link_quality(&self, lqi: u8) {
        self.thing()
            .set_state_value(StateType::SignalStrength, lqi_to_percentage(lqi));
    }

    fn handle_reachable(&self, reachable: bool) {
        let ctx = self.context();
        ctx.thing
            .set_state_value(StateType::Connected, reachable && ctx.is_network_running());
    }
}

/// Error for an action the thing class does not offer
pub(crate) fn unsupported(class: ThingClass, action: &Action) -> ThingError {
    ThingError::ActionTypeNotFound {
        class,
        action: action.name(),
    }
}

/// Action handling for devices whose only action is leaving the network
pub(crate) async fn removal_only(ctx: &DeviceContext, action: &Action) -> Result<(), ThingError> {
    match action {
        Action::RemoveFromNetwork => ctx.remove_from_network().await,
        _ => Err(unsupported(ctx.thing.class(), action)),
    }
}

/// Build the adapter for a device thing
pub fn create(
    thing: Arc<Thing>,
    network: Arc<dyn ZigbeeNetwork>,
    config: Arc<PluginConfig>,
    node: &Node,
) -> Result<Arc<dyn ZigbeeDevice>, SetupError> {
    let class = thing.class();
    let endpoint = crate::discovery::endpoint_for(class, node).ok_or(SetupError::EndpointNotFound {
        ieee_address: node.ieee_address,
        class,
    })?;

    if let Some(version) = node.endpoint(endpoint).and_then(|ep| ep.sw_build_id.clone()) {
        thing.set_state_value(StateType::Version, version);
    }
    thing.set_state_value(StateType::SignalStrength, lqi_to_percentage(node.lqi));

    let ctx = DeviceContext {
        thing,
        network,
        config,
        ieee_address: node.ieee_address,
        endpoint,
    };

    let device: Arc<dyn ZigbeeDevice> = match class {
        ThingClass::ZigbeeController => {
            return Err(SetupError::ThingClassNotFound(class.name().to_string()))
        }
        ThingClass::GenericOnOffLight
        | ThingClass::GenericDimmableLight
        | ThingClass::GenericColorTemperatureLight
        | ThingClass::GenericColorLight
        | ThingClass::GenericPowerSocket
        | ThingClass::TradfriColorLight
        | ThingClass::TradfriColorTemperatureLight
        | ThingClass::TradfriDimmableLight
        | ThingClass::TradfriPowerSocket => Arc::new(light::Light::new(ctx)),
        ThingClass::TradfriRemote => Arc::new(remote::Remote::new(ctx, remote::Layout::Remote)),
        ThingClass::TradfriOnOffSwitch => {
            Arc::new(remote::Remote::new(ctx, remote::Layout::OnOffSwitch))
        }
        ThingClass::TradfriMotionSensor => Arc::new(motion::TradfriMotionSensor::new(ctx)),
        ThingClass::LumiMotionSensor => Arc::new(motion::LumiMotionSensor::new(ctx)),
        ThingClass::LumiButtonSensor => Arc::new(lumi::ButtonSensor::new(ctx)),
        ThingClass::LumiTemperatureSensor => Arc::new(lumi::TemperatureSensor::new(ctx)),
        ThingClass::LumiMagnetSensor => Arc::new(lumi::MagnetSensor::new(ctx)),
        ThingClass::LumiWaterSensor => Arc::new(lumi::WaterSensor::new(ctx)),
    };

    tracing::info!(
        "Created {} adapter for {} on endpoint {}",
        class,
        node.ieee_address,
        endpoint
    );
    Ok(device)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::platform::{ThingId, ThingParams};
    use zigbee_core::mock::MockNetwork;

    /// Thing, running mock network and context for one node
    pub(crate) async fn fixture(class: ThingClass, node: Node) -> (
        Arc<MockNetwork>,
        DeviceContext,
    ) {
        let network = Arc::new(MockNetwork::new());
        network.add_node(node.clone());
        network.start().await.unwrap();
        network.clear_requests();

        let thing = Arc::new(Thing::new(
            ThingId::new(),
            class,
            class.display_name(),
            Some(ThingId::new()),
            ThingParams {
                ieee_address: Some(node.ieee_address),
                ..Default::default()
            },
        ));
        let endpoint = crate::discovery::endpoint_for(class, &node).unwrap();
        let ctx = DeviceContext {
            thing,
            network: network.clone(),
            config: Arc::new(PluginConfig::default()),
            ieee_address: node.ieee_address,
            endpoint,
        };
        (network, ctx)
    }

    #[tokio::test]
    async fn battery_critical_threshold() {
        let node = crate::discovery::tests::lumi_node(1, "lumi.sensor_magnet");
        let (_net, ctx) = fixture(ThingClass::LumiMagnetSensor, node).await;

        ctx.handle_common_attribute(
            id::POWER_CONFIGURATION,
            &Attribute::uint8(power_attrs::BATTERY_PERCENTAGE_REMAINING, 18),
        );
        assert_eq!(ctx.thing.bool_state(StateType::BatteryCritical), Some(true));
        ctx.handle_common_attribute(
            id::POWER_CONFIGURATION,
            &Attribute::uint8(power_attrs::BATTERY_PERCENTAGE_REMAINING, 20),
        );
        assert_eq!(ctx.thing.bool_state(StateType::BatteryCritical), Some(false));
        assert_eq!(
            ctx.thing.state_value(StateType::BatteryLevel).and_then(|v| v.as_uint()),
            Some(10)
        );
    }

    #[tokio::test]
    async fn endpoint_mismatch_fails_setup() {
        let node = crate::discovery::tests::lumi_node(2, "lumi.sensor_magnet");
        let (net, ctx) = fixture(ThingClass::LumiMagnetSensor, node.clone()).await;
        let thing = Arc::new(Thing::new(
            ThingId::new(),
            ThingClass::GenericColorLight,
            "Wrong",
            None,
            ThingParams::default(),
        ));
        let result = create(thing, net, ctx.config.clone(), &node);
        assert!(matches!(result, Err(SetupError::EndpointNotFound { .. })));
    }

    #[tokio::test]
    async fn actions_need_a_running_network() {
        let node = crate::discovery::tests::lumi_node(3, "lumi.sensor_magnet");
        let (net, ctx) = fixture(ThingClass::LumiMagnetSensor, node).await;
        net.set_state(NetworkState::Stopped);
        assert_eq!(ctx.remove_from_network().await, Err(ThingError::HardwareNotAvailable));
        assert!(!ctx.refresh_connected());
        assert!(net.requests().is_empty());
    }
}
