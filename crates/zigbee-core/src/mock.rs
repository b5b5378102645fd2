//! In-memory network manager for tests
//!
//! Records every request and answers it from a scripted attribute table.
//! With [`MockNetwork::gate`] enabled, replies are held until the test
//! releases them, which lets tests observe request ordering.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::cluster::{Attribute, ClusterCommand};
use crate::network::{
    NetworkEvent, NetworkFactory, NetworkInfo, NetworkSettings, NetworkState, ReportingConfig,
    Target, ZigbeeError, ZigbeeNetwork,
};
use crate::node::{IeeeAddress, Node};

/// A request the mock received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Start,
    Stop,
    Reset,
    FactoryReset,
    PermitJoin(u8),
    Read {
        target: Target,
        cluster_id: u16,
        attribute_ids: Vec<u16>,
    },
    Command {
        target: Target,
        command: ClusterCommand,
    },
    Bind {
        target: Target,
        cluster_id: u16,
    },
    ConfigureReporting {
        target: Target,
        cluster_id: u16,
        attribute_id: u16,
    },
    RemoveNode(IeeeAddress),
}

type Reply = Result<Vec<Attribute>, ZigbeeError>;

/// A request held back until the test releases it
#[derive(Debug)]
pub struct PendingReply {
    pub request: MockRequest,
    scripted: Reply,
    reply: oneshot::Sender<Reply>,
}

impl PendingReply {
    /// Answer with the scripted reply
    pub fn release(self) {
        let _ = self.reply.send(self.scripted);
    }

    /// Answer with an error instead
    pub fn fail(self, error: ZigbeeError) {
        let _ = self.reply.send(Err(error));
    }
}

pub struct MockNetwork {
    state: RwLock<NetworkState>,
    info: RwLock<NetworkInfo>,
    event_tx: broadcast::Sender<NetworkEvent>,
    nodes: DashMap<IeeeAddress, Node>,
    attributes: DashMap<(Target, u16, u16), Attribute>,
    failure: Mutex<Option<ZigbeeError>>,
    requests: Mutex<Vec<MockRequest>>,
    gate: Mutex<Option<mpsc::UnboundedSender<PendingReply>>>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(NetworkState::Stopped),
            info: RwLock::new(NetworkInfo {
                channel: 11,
                pan_id: 0x1A62,
                extended_pan_id: 0x00DD_CCBB_AA00_0001,
                firmware_version: Some("0x26780700".to_string()),
                permit_join: false,
            }),
            event_tx,
            nodes: DashMap::new(),
            attributes: DashMap::new(),
            failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    /// Change state and broadcast it
    pub fn set_state(&self, state: NetworkState) {
        *self.state.write() = state;
        self.emit(NetworkEvent::StateChanged(state));
    }

    pub fn emit(&self, event: NetworkEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Make a node known without announcing it
    pub fn add_node(&self, node: Node) {
        self.nodes.insert(node.ieee_address, node);
    }

    /// Add a node and announce it like a completed join
    pub fn join_node(&self, node: Node) {
        self.add_node(node.clone());
        self.emit(NetworkEvent::NodeAdded(node));
    }

    /// Drop a node and announce its departure
    pub fn leave_node(&self, ieee_address: IeeeAddress) {
        self.nodes.remove(&ieee_address);
        self.emit(NetworkEvent::NodeRemoved { ieee_address });
    }

    /// Value returned when the attribute is read
    pub fn set_attribute(&self, target: Target, cluster_id: u16, attribute: Attribute) {
        self.attributes
            .insert((target, cluster_id, attribute.id), attribute);
    }

    /// Make every following request fail (or succeed again with `None`)
    pub fn fail_with(&self, error: Option<ZigbeeError>) {
        *self.failure.lock() = error;
    }

    /// Hold replies until released through the returned receiver
    pub fn gate(&self) -> mpsc::UnboundedReceiver<PendingReply> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.gate.lock() = Some(tx);
        rx
    }

    #[must_use]
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Outbound cluster commands in the order they were sent
    #[must_use]
    pub fn commands(&self) -> Vec<(Target, ClusterCommand)> {
        self.requests
            .lock()
            .iter()
            .filter_map(|req| match req {
                MockRequest::Command { target, command } => Some((*target, *command)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn ensure_running(&self) -> Result<(), ZigbeeError> {
        if *self.state.read() == NetworkState::Running {
            Ok(())
        } else {
            Err(ZigbeeError::NotRunning)
        }
    }

    async fn reply(&self, request: MockRequest, scripted: Reply) -> Reply {
        self.requests.lock().push(request.clone());
        let scripted = match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => scripted,
        };

        let gate = self.gate.lock().clone();
        let Some(gate) = gate else {
            return scripted;
        };

        let (reply, rx) = oneshot::channel();
        gate.send(PendingReply {
            request,
            scripted,
            reply,
        })
        .map_err(|_| ZigbeeError::Transport("reply gate closed".to_string()))?;
        rx.await
            .unwrap_or_else(|_| Err(ZigbeeError::Transport("reply dropped".to_string())))
    }
}

#[async_trait]
impl ZigbeeNetwork for MockNetwork {
    fn state(&self) -> NetworkState {
        *self.state.read()
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }

    fn nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }

    fn node(&self, ieee_address: &IeeeAddress) -> Option<Node> {
        self.nodes.get(ieee_address).map(|entry| entry.value().clone())
    }

    fn info(&self) -> NetworkInfo {
        self.info.read().clone()
    }

    async fn start(&self) -> Result<(), ZigbeeError> {
        self.reply(MockRequest::Start, Ok(Vec::new())).await?;
        self.set_state(NetworkState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ZigbeeError> {
        self.reply(MockRequest::Stop, Ok(Vec::new())).await?;
        self.set_state(NetworkState::Stopped);
        Ok(())
    }

    async fn reset(&self) -> Result<(), ZigbeeError> {
        self.reply(MockRequest::Reset, Ok(Vec::new())).await?;
        self.set_state(NetworkState::Running);
        Ok(())
    }

    async fn factory_reset(&self) -> Result<(), ZigbeeError> {
        self.reply(MockRequest::FactoryReset, Ok(Vec::new())).await?;
        self.nodes.clear();
        self.set_state(NetworkState::Running);
        Ok(())
    }

    async fn permit_join(&self, duration_secs: u8) -> Result<(), ZigbeeError> {
        self.ensure_running()?;
        self.reply(MockRequest::PermitJoin(duration_secs), Ok(Vec::new()))
            .await?;
        let enabled = duration_secs > 0;
        self.info.write().permit_join = enabled;
        self.emit(NetworkEvent::PermitJoinChanged { enabled });
        Ok(())
    }

    async fn read_attributes(
        &self,
        target: Target,
        cluster_id: u16,
        attribute_ids: &[u16],
    ) -> Result<Vec<Attribute>, ZigbeeError> {
        self.ensure_running()?;
        let scripted = attribute_ids
            .iter()
            .filter_map(|attr_id| {
                self.attributes
                    .get(&(target, cluster_id, *attr_id))
                    .map(|entry| entry.value().clone())
            })
            .collect();
        let request = MockRequest::Read {
            target,
            cluster_id,
            attribute_ids: attribute_ids.to_vec(),
        };
        self.reply(request, Ok(scripted)).await
    }

    async fn send_command(
        &self,
        target: Target,
        command: ClusterCommand,
    ) -> Result<(), ZigbeeError> {
        self.ensure_running()?;
        self.reply(MockRequest::Command { target, command }, Ok(Vec::new()))
            .await
            .map(|_| ())
    }

    async fn bind(&self, target: Target, cluster_id: u16) -> Result<(), ZigbeeError> {
        self.ensure_running()?;
        self.reply(MockRequest::Bind { target, cluster_id }, Ok(Vec::new()))
            .await
            .map(|_| ())
    }

    async fn configure_reporting(
        &self,
        target: Target,
        cluster_id: u16,
        config: ReportingConfig,
    ) -> Result<(), ZigbeeError> {
        self.ensure_running()?;
        let request = MockRequest::ConfigureReporting {
            target,
            cluster_id,
            attribute_id: config.attribute_id,
        };
        self.reply(request, Ok(Vec::new())).await.map(|_| ())
    }

    async fn remove_node(&self, ieee_address: &IeeeAddress) -> Result<(), ZigbeeError> {
        self.ensure_running()?;
        self.reply(MockRequest::RemoveNode(*ieee_address), Ok(Vec::new()))
            .await?;
        self.leave_node(*ieee_address);
        Ok(())
    }
}

/// Factory handing out mock networks and remembering them
#[derive(Default)]
pub struct MockFactory {
    created: Mutex<Vec<(NetworkSettings, Arc<MockNetwork>)>>,
}

impl MockFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently created network
    #[must_use]
    pub fn last(&self) -> Option<Arc<MockNetwork>> {
        self.created.lock().last().map(|(_, net)| Arc::clone(net))
    }

    #[must_use]
    pub fn settings(&self) -> Vec<NetworkSettings> {
        self.created
            .lock()
            .iter()
            .map(|(settings, _)| settings.clone())
            .collect()
    }
}

impl NetworkFactory for MockFactory {
    fn create(&self, settings: &NetworkSettings) -> Result<Arc<dyn ZigbeeNetwork>, ZigbeeError> {
        let network = Arc::new(MockNetwork::new());
        self.created
            .lock()
            .push((settings.clone(), Arc::clone(&network)));
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{id, on_off_attrs, OnOffCommand};

    fn target() -> Target {
        Target::new(IeeeAddress::from_u64(0x42), 1)
    }

    #[tokio::test]
    async fn requires_running_network() {
        let net = MockNetwork::new();
        let err = net
            .send_command(target(), ClusterCommand::OnOff(OnOffCommand::On))
            .await;
        assert_eq!(err, Err(ZigbeeError::NotRunning));
        assert!(net.requests().is_empty());
    }

    #[tokio::test]
    async fn reads_scripted_attributes() {
        let net = MockNetwork::new();
        net.start().await.unwrap();
        net.set_attribute(target(), id::ON_OFF, Attribute::boolean(on_off_attrs::ON_OFF, true));

        let attrs = net
            .read_attributes(target(), id::ON_OFF, &[on_off_attrs::ON_OFF, 0x4003])
            .await
            .unwrap();
        assert_eq!(attrs, vec![Attribute::boolean(on_off_attrs::ON_OFF, true)]);
    }

    #[tokio::test]
    async fn gated_replies_wait_for_release() {
        let net = Arc::new(MockNetwork::new());
        net.start().await.unwrap();
        let mut gate = net.gate();

        let task = {
            let net = Arc::clone(&net);
            tokio::spawn(async move {
                net.send_command(target(), ClusterCommand::OnOff(OnOffCommand::Off))
                    .await
            })
        };

        let pending = gate.recv().await.unwrap();
        assert!(matches!(pending.request, MockRequest::Command { .. }));
        assert!(!task.is_finished());
        pending.fail(ZigbeeError::Status(0x01));
        assert_eq!(task.await.unwrap(), Err(ZigbeeError::Status(0x01)));
    }

    #[tokio::test]
    async fn state_changes_are_broadcast() {
        let net = MockNetwork::new();
        let mut rx = net.subscribe();
        net.start().await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            NetworkEvent::StateChanged(NetworkState::Running)
        ));
    }
}
