//! Plugin entry point
//!
//! Owns one network manager per controller thing and one adapter per device
//! thing. Network events are routed to adapters by IEEE address; nodes that
//! join are matched against the known families and proposed to the host.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use zigbee_core::{IeeeAddress, NetworkEvent, NetworkFactory, Node, ZigbeeNetwork};

use crate::adapters::{self, NetworkController, ZigbeeDevice};
use crate::config::PluginConfig;
use crate::discovery;
use crate::error::{SetupError, ThingError};
use crate::platform::{Action, Thing, ThingClass, ThingDescriptor, ThingId};

/// Events for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// New devices joined and can be added as things
    AutoThingsAppeared(Vec<ThingDescriptor>),
    /// A device left the network, its thing should be removed
    AutoThingDisappeared(ThingId),
}

struct NetworkEntry {
    controller: NetworkController,
    router: JoinHandle<()>,
}

impl Drop for NetworkEntry {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// State shared with the event routers
struct Registry {
    config: Arc<PluginConfig>,
    things: DashMap<ThingId, Arc<Thing>>,
    devices: DashMap<ThingId, Arc<dyn ZigbeeDevice>>,
    networks: DashMap<ThingId, Arc<NetworkEntry>>,
    /// Device thing per (controller, node)
    addresses: DashMap<(ThingId, IeeeAddress), ThingId>,
    /// Nodes proposed to the host that have no thing yet
    pending: DashMap<(ThingId, IeeeAddress), ThingClass>,
    event_tx: broadcast::Sender<PluginEvent>,
}

impl Registry {
    fn device_for(
        &self,
        network_id: ThingId,
        ieee_address: IeeeAddress,
    ) -> Option<Arc<dyn ZigbeeDevice>> {
        let thing_id = *self.addresses.get(&(network_id, ieee_address))?;
        self.devices.get(&thing_id).map(|entry| Arc::clone(entry.value()))
    }

    fn devices_of(&self, network_id: ThingId) -> Vec<Arc<dyn ZigbeeDevice>> {
        let ids: Vec<ThingId> = self
            .addresses
            .iter()
            .filter(|entry| entry.key().0 == network_id)
            .map(|entry| *entry.value())
            .collect();
        ids.iter()
            .filter_map(|id| self.devices.get(id).map(|entry| Arc::clone(entry.value())))
            .collect()
    }

    fn handle_network_event(&self, network_id: ThingId, event: &NetworkEvent) {
        match event {
            NetworkEvent::StateChanged(state) => {
                tracing::info!("Network {} is {}", network_id, state);
                if let Some(entry) = self.networks.get(&network_id) {
                    entry.controller.refresh();
                }
                for device in self.devices_of(network_id) {
                    device.check_online_status();
                }
            }
            NetworkEvent::PermitJoinChanged { enabled } => {
                if let Some(entry) = self.networks.get(&network_id) {
                    entry.controller.set_permit_join(*enabled);
                }
            }
            NetworkEvent::NodeAdded(node) => self.node_added(network_id, node),
            NetworkEvent::NodeRemoved { ieee_address } => self.node_removed(
                network_id,
                *ieee_address,
            ),
            NetworkEvent::NodeReachableChanged {
                ieee_address,
                reachable,
            } => {
                if let Some(device) = self.device_for(network_id, *ieee_address) {
                    device.handle_reachable(*reachable);
                }
            }
            NetworkEvent::LinkQualityChanged { ieee_address, lqi } => {
                if let Some(device) = self.device_for(network_id, *ieee_address) {
                    device.context().touch();
                    device.handle_link_quality(*lqi);
                }
            }
            NetworkEvent::AttributeChanged {
                ieee_address,
                endpoint,
                cluster_id,
                attribute,
            } => match self.device_for(network_id, *ieee_address) {
                Some(device) => {
                    device.context().touch();
                    device.handle_attribute(*endpoint, *cluster_id, attribute);
                }
                None => tracing::trace!(
                    "Attribute {:#06x}/{:#06x} from unadapted node {}",
                    cluster_id,
                    attribute.id,
                    ieee_address
                ),
            },
            NetworkEvent::CommandReceived(command) => {
                if let Some(device) = self.device_for(network_id, command.ieee_address) {
                    device.context().touch();
                    device.handle_command(command);
                }
            }
        }
    }

    fn node_added(&self, network_id: ThingId, node: &Node) {
        if node.is_coordinator() {
            return;
        }

        if let Some(device) = self.device_for(network_id, node.ieee_address) {
            tracing::debug!(
                "Node {} rejoined, already set up as {}",
                node.ieee_address,
                device.thing().name()
            );
            device.check_online_status();
            return;
        }

        let Some(found) = discovery::match_node(node) else {
            tracing::info!(
                "No adapter for node {} (manufacturer {:#06x}, model {:?})",
                node.ieee_address,
                node.manufacturer_code,
                node.model_identifier()
            );
            return;
        };

        match self.pending.entry((network_id, node.ieee_address)) {
            Entry::Occupied(_) => {
                tracing::debug!("Node {} already announced", node.ieee_address);
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(found.class);
            }
        }

        tracing::info!(
            "Discovered {} {} on endpoint {}",
            found.class,
            node.ieee_address,
            found.endpoint
        );
        let descriptor = discovery::node_descriptor(node, found.class, network_id);
        let _ = self
            .event_tx
            .send(PluginEvent::AutoThingsAppeared(vec![descriptor]));
    }

    fn node_removed(&self, network_id: ThingId, ieee_address: IeeeAddress) {
        self.pending.remove(&(network_id, ieee_address));
        let Some((_, thing_id)) = self.addresses.remove(&(network_id, ieee_address)) else {
            tracing::debug!("Node {} left, no thing attached", ieee_address);
            return;
        };
        self.devices.remove(&thing_id);
        tracing::info!("Node {} left, removing thing {}", ieee_address, thing_id);
        let _ = self
            .event_tx
            .send(PluginEvent::AutoThingDisappeared(thing_id));
    }
}

/// Forward network events to the registry until the network or plugin goes away
async fn route_events(
    registry: Weak<Registry>,
    network_id: ThingId,
    mut rx: broadcast::Receiver<NetworkEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.handle_network_event(network_id, &event);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Event router for {} skipped {} events", network_id, skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("Event router for {} stopped", network_id);
}

/// The Zigbee plugin
pub struct ZigbeePlugin {
    registry: Arc<Registry>,
    factory: Arc<dyn NetworkFactory>,
}

impl ZigbeePlugin {
    #[must_use]
    pub fn new(config: PluginConfig, factory: Arc<dyn NetworkFactory>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            registry: Arc::new(Registry {
                config: Arc::new(config),
                things: DashMap::new(),
                devices: DashMap::new(),
                networks: DashMap::new(),
                addresses: DashMap::new(),
                pending: DashMap::new(),
                event_tx,
            }),
            factory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.registry.config
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.registry.event_tx.subscribe()
    }

    /// Serial ports that may hold a controller
    #[must_use]
    pub fn discover_controllers(&self) -> Vec<ThingDescriptor> {
        discovery::discover_controllers()
    }

    #[must_use]
    pub fn thing(&self, id: ThingId) -> Option<Arc<Thing>> {
        self.registry.things.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Network manager of a controller thing
    #[must_use]
    pub fn network(&self, controller: ThingId) -> Option<Arc<dyn ZigbeeNetwork>> {
        self.registry
            .networks
            .get(&controller)
            .map(|entry| Arc::clone(entry.controller.network()))
    }

    /// Create the network or adapter backing a thing
    pub fn setup_thing(&self, thing: Arc<Thing>) -> Result<(), SetupError> {
        if self.registry.things.contains_key(&thing.id()) {
            return Err(SetupError::AlreadySetUp(thing.id()));
        }
        tracing::info!("Setting up {} ({})", thing.name(), thing.class());
        if thing.class().is_controller() {
            self.setup_controller(thing)
        } else {
            self.setup_device(thing)
        }
    }

    fn setup_controller(&self, thing: Arc<Thing>) -> Result<(), SetupError> {
        let settings = self.registry.config.network_settings(&thing)?;
        let network = self.factory.create(&settings)?;
        tracing::info!(
            "Created network on {} ({:?}), settings in {:?}",
            settings.serial_port,
            settings.backend,
            settings.settings_path
        );

        let controller = NetworkController::new(Arc::clone(&thing), Arc::clone(&network));
        controller.refresh();

        let router = tokio::spawn(route_events(
            Arc::downgrade(&self.registry),
            thing.id(),
            network.subscribe(),
        ));
        self.registry
            .networks
            .insert(thing.id(), Arc::new(NetworkEntry { controller, router }));
        self.registry.things.insert(thing.id(), thing);
        Ok(())
    }

    fn setup_device(&self, thing: Arc<Thing>) -> Result<(), SetupError> {
        let ieee_address = thing
            .params()
            .ieee_address
            .ok_or(SetupError::MissingParameter("ieeeAddress"))?;
        let parent_id = thing.parent_id().ok_or(SetupError::NetworkNotFound(None))?;
        let network = self
            .network(parent_id)
            .ok_or(SetupError::NetworkNotFound(Some(parent_id)))?;

        // Reserve the node before building the adapter
        let key = (parent_id, ieee_address);
        match self.registry.addresses.entry(key) {
            Entry::Occupied(existing) => return Err(SetupError::AlreadySetUp(*existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(thing.id());
            }
        }

        let device = network
            .node(&ieee_address)
            .ok_or(SetupError::NodeNotFound(ieee_address))
            .and_then(|node| {
                adapters::create(
                    Arc::clone(&thing),
                    network,
                    Arc::clone(&self.registry.config),
                    &node,
                )
            });
        let device = match device {
            Ok(device) => device,
            Err(e) => {
                self.registry
                    .addresses
                    .remove_if(&key, |_, owner| *owner == thing.id());
                return Err(e);
            }
        };

        self.registry.pending.remove(&key);
        self.registry.devices.insert(thing.id(), device);
        self.registry.things.insert(thing.id(), thing);
        Ok(())
    }

    /// Start a controller's network or bring a device online
    pub async fn post_setup_thing(&self, id: ThingId) -> Result<(), SetupError> {
        let entry = self
            .registry
            .networks
            .get(&id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(entry) = entry {
            tracing::info!("Starting network for {}", entry.controller.thing().name());
            let started = entry.controller.network().start().await;
            entry.controller.refresh();
            return started.map_err(|e| {
                tracing::error!("Failed to start network: {}", e);
                SetupError::from(e)
            });
        }

        let device = self
            .registry
            .devices
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SetupError::NotSetUp(id))?;
        device.check_online_status();
        Ok(())
    }

    /// Drop whatever backs a thing the host removed
    pub async fn thing_removed(&self, id: ThingId) {
        self.registry.things.remove(&id);

        if self.registry.devices.remove(&id).is_some() {
            self.registry.addresses.retain(|_, thing_id| *thing_id != id);
            tracing::info!("Removed adapter for {}", id);
            return;
        }

        let Some((_, entry)) = self.registry.networks.remove(&id) else {
            return;
        };

        let children: Vec<ThingId> = self
            .registry
            .things
            .iter()
            .filter(|thing| thing.parent_id() == Some(id))
            .map(|thing| thing.id())
            .collect();
        for child in &children {
            self.registry.devices.remove(child);
            self.registry.things.remove(child);
        }
        self.registry.addresses.retain(|(network_id, _), _| *network_id != id);
        self.registry.pending.retain(|(network_id, _), _| *network_id != id);

        if let Err(e) = entry.controller.network().stop().await {
            tracing::warn!("Failed to stop network for {}: {}", id, e);
        }
        tracing::info!("Removed controller {} and {} devices", id, children.len());
    }

    pub async fn execute_action(&self, id: ThingId, action: Action) -> Result<(), ThingError> {
        tracing::debug!("Executing {} on {}", action.name(), id);

        let entry = self
            .registry
            .networks
            .get(&id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(entry) = entry {
            return entry.controller.execute_action(&action).await;
        }

        let device = self
            .registry
            .devices
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ThingError::ThingNotFound(id))?;
        device.execute_action(&action).await
    }

    /// Process one event of a controller's network
    pub fn handle_network_event(&self, network_id: ThingId, event: &NetworkEvent) {
        self.registry.handle_network_event(network_id, event);
    }
}
