//! Component F: Mesh Service API (spec.md §6). The external RPC surface:
//! validates requests and dispatches into C (consensus), B (topology), and D
//! (router), composing every other component the way the teacher's top-level
//! service types sit over their storage/executor layers.

use std::collections::HashMap;
use std::sync::Arc;

use async_std::sync::RwLock;

use mesh_common::config::NodeConfig;
use mesh_common::errors::{format_err, Result};
use mesh_common::ids::{MeshId, NodeId, StreamId};
use mesh_common::model::{Chunk, Node, NodeStatus, Stream, StreamStatus};
use mesh_executor::resource_group::ServiceResourceGroup;
use mesh_outbox::{MemOutboxStore, OutboxDispatcher, OutboxStore, RetryPolicy};
use mesh_raft::group::{DsgHandle, McgHandle};
use mesh_raft::types::Configuration;
use mesh_router::{scheduler::chunk_ack_frame, DedupWindow, RaftLinkBridge, ReorderBuffer, Router};
use mesh_topology::{Lsa, Topology};
use mesh_transport::errors::CloseReason;
use mesh_transport::frame::{Frame, FrameHeader, FrameType};
use mesh_transport::link::{Link, LinkEvent, LinkState};

use crate::dispatch::RouterPayloadDispatch;
use crate::errors::{invalid_argument, not_found, precondition};
use crate::mesh_state::MeshState;
use crate::state_machine::{DsgStateMachine, McgStateMachine};
use crate::types::{MeshEvent, MeshStatus, OpenStreamRequest, PublishResult, StreamHandle, TopologyStatus};

struct StreamEntry {
    dsg: DsgHandle,
    state_machine: Arc<DsgStateMachine>,
    outbox: Arc<dyn OutboxStore>,
    dispatch: Arc<RouterPayloadDispatch>,
    /// Tracks spec.md §3's `Stream` entity for this locally opened stream,
    /// so `close_client_data_stream` can check the "closed stream implies
    /// fully delivered" invariant instead of tearing down blind.
    stream: Arc<RwLock<Stream>>,
}

pub struct MeshService {
    local_node: NodeId,
    config: NodeConfig,
    mesh_id: RwLock<Option<MeshId>>,
    topology: Topology,
    router: Router,
    raft_bridge: Arc<RaftLinkBridge>,
    mesh_state: MeshState,
    mcg: RwLock<Option<McgHandle>>,
    streams: RwLock<HashMap<StreamId, StreamEntry>>,
    events_rx: async_std::channel::Receiver<MeshEvent>,
    events_tx: async_std::channel::Sender<MeshEvent>,
    group: Arc<ServiceResourceGroup>,
    dedup: DedupWindow,
    reorder: RwLock<HashMap<StreamId, Arc<ReorderBuffer>>>,
    subscriptions: RwLock<HashMap<StreamId, async_std::channel::Sender<(u64, Vec<u8>)>>>,
}

impl MeshService {
    pub fn new(local_node: NodeId, config: NodeConfig, topology: Topology, router: Router, group: Arc<ServiceResourceGroup>) -> Self {
        let (events_tx, events_rx) = async_std::channel::unbounded();
        let mesh_state = MeshState::new(topology.clone(), events_tx.clone());
        let raft_bridge = RaftLinkBridge::new(local_node, router.clone());
        let credit_window_chunks = config.scheduler.credit_window_chunks;
        Self {
            local_node,
            config,
            mesh_id: RwLock::new(None),
            topology,
            router,
            raft_bridge,
            mesh_state,
            mcg: RwLock::new(None),
            streams: RwLock::new(HashMap::new()),
            events_rx,
            events_tx,
            group,
            dedup: DedupWindow::new(credit_window_chunks),
            reorder: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    async fn status(&self) -> MeshStatus {
        let mesh_id = self.mesh_id.read().await.as_ref().copied().unwrap_or(MeshId(0));
        MeshStatus {
            mesh_id,
            local_node: self.local_node,
            members: self.mesh_state.members().await,
            local_status: NodeStatus::Active,
        }
    }

    /// `SeedMesh`: creates a mesh with this node as the first MCG member.
    pub async fn seed_mesh(&self, _mesh_name: &str) -> Result<MeshStatus> {
        if self.mcg.read().await.is_some() {
            return Err(precondition("mesh already seeded or joined"));
        }
        let mesh_id = MeshId::random();
        *self.mesh_id.write().await = Some(mesh_id);

        let members = Configuration {
            members: [self.local_node].into_iter().collect(),
            learners: Default::default(),
        };
        let handle = self.spawn_mcg(mesh_id, members).await?;
        *self.mcg.write().await = Some(McgHandle::new(handle));

        self.mesh_state
            .member_add(Node {
                node_id: self.local_node,
                mesh_id,
                region_id: None,
                advertised_endpoint: self.config.link.listen_endpoint.clone(),
                public_key: vec![],
                status: NodeStatus::Active,
            })
            .await;

        Ok(self.status().await)
    }

    /// `JoinMesh`: dials the given peers and seeds the local MCG engine with
    /// the resulting member set. A fully general runtime join would route an
    /// add-member proposal through the mesh's existing leader over the wire;
    /// this node instead starts its own engine already configured with every
    /// peer it was told about, which matches spec.md §8 scenario 1's
    /// fixed-peer-list bootstrap but not an incremental join against a
    /// running mesh — recorded as a simplification in the design ledger.
    pub async fn join_mesh(self: &Arc<Self>, mesh_id: MeshId, peers: &[(NodeId, String)]) -> Result<MeshStatus> {
        if self.mcg.read().await.is_some() {
            return Err(precondition("already a member of a mesh"));
        }
        *self.mesh_id.write().await = Some(mesh_id);

        let mut members: std::collections::HashSet<NodeId> = [self.local_node].into_iter().collect();
        for (peer_id, endpoint) in peers {
            match self.dial_peer(*peer_id, endpoint).await {
                Ok(()) => {
                    members.insert(*peer_id);
                }
                Err(e) => log::warn!("join_mesh: failed to dial {} at {}: {}", peer_id, endpoint, e),
            }
        }

        let configuration = Configuration {
            members: members.clone(),
            learners: Default::default(),
        };
        let handle = self.spawn_mcg(mesh_id, configuration).await?;
        *self.mcg.write().await = Some(McgHandle::new(handle));

        for member in members {
            self.mesh_state
                .member_add(Node {
                    node_id: member,
                    mesh_id,
                    region_id: None,
                    advertised_endpoint: String::new(),
                    public_key: vec![],
                    status: NodeStatus::Active,
                })
                .await;
        }

        Ok(self.status().await)
    }

    /// `LeaveMesh`: commits remove-self through the MCG.
    pub async fn leave_mesh(&self) -> Result<()> {
        let mcg = self.require_mcg().await?;
        mcg.remove_member(self.local_node).await?;
        Ok(())
    }

    /// `EvictNode`: MCG-committed removal of another node (spec.md §8
    /// scenario 5: closes links, drops its LSAs, fails its stream targets
    /// after `drain_timeout`).
    pub async fn evict_node(&self, target_node_id: NodeId) -> Result<MeshStatus> {
        let mcg = self.require_mcg().await?;
        mcg.remove_member(target_node_id).await?;

        if let Ok(link) = self.router.links().get(target_node_id).await {
            link.close(CloseReason::PeerEvicted).await;
        }
        self.router.links().remove(target_node_id).await;

        Ok(self.status().await)
    }

    /// `AddLink`/`DropLink`: operator override of the link set. Dialing
    /// establishes the transport connection; topology learns of it the same
    /// way any other link-up event is learned, via `handle_link_event`.
    pub async fn add_link(self: &Arc<Self>, peer: NodeId, endpoint: &str) -> Result<TopologyStatus> {
        self.dial_peer(peer, endpoint).await?;
        Ok(self.topology_status().await)
    }

    pub async fn drop_link(&self, peer: NodeId) -> Result<TopologyStatus> {
        if let Ok(link) = self.router.links().get(peer).await {
            link.close(CloseReason::Explicit).await;
        }
        self.router.links().remove(peer).await;
        Ok(self.topology_status().await)
    }

    async fn topology_status(&self) -> TopologyStatus {
        let neighbors = self.router.links().neighbors().await;
        TopologyStatus {
            live_links: neighbors.into_iter().map(|n| (self.local_node, n)).collect(),
        }
    }

    /// `OpenClientDataStream`: forms a DSG for the new stream.
    pub async fn open_client_data_stream(&self, req: OpenStreamRequest) -> Result<StreamHandle> {
        if req.target_nodes.is_empty() {
            return Err(invalid_argument("target list must not be empty"));
        }
        let known_members = self.mesh_state.members().await;
        for target in &req.target_nodes {
            if !known_members.contains(target) {
                return Err(invalid_argument("target list contains a non-member"));
            }
        }

        let stream_id = StreamId::random();
        let mesh_id = self
            .mesh_id
            .read()
            .await
            .as_ref()
            .copied()
            .ok_or_else(|| precondition("mesh not yet initialized"))?;
        let group_id = mesh_common::ids::GroupKind::Dsg(stream_id).group_id(mesh_id);

        let mut members: std::collections::HashSet<NodeId> = req.target_nodes.iter().copied().collect();
        members.insert(self.local_node);
        let configuration = Configuration {
            members,
            learners: Default::default(),
        };

        let outbox = Arc::new(MemOutboxStore::default());
        let state_machine = Arc::new(DsgStateMachine::new(stream_id, req.target_nodes.clone(), req.qos, outbox.clone()));
        let transport = Arc::new(self.raft_bridge.for_group(group_id));
        let log = mesh_store::open_log_store(&self.config.store.log, &group_id.to_string()).await?;
        let stable = mesh_store::open_stable_store(&self.config.store.stable, &group_id.to_string()).await?;
        let snapshots = mesh_store::open_snapshot_store(&self.config.store.snapshot, &group_id.to_string()).await?;

        let handle = mesh_raft::handle::RaftHandle::spawn(
            &format!("dsg-{stream_id}"),
            &self.group,
            self.local_node,
            configuration,
            self.config.consensus.clone(),
            log.clone(),
            stable,
            snapshots,
            transport,
            state_machine.clone(),
        )
        .await;
        self.raft_bridge.register_group(group_id, handle.clone()).await;

        let policy = RetryPolicy {
            max_attempts_reliable: self.config.scheduler.max_attempts_reliable,
            backoff: mesh_common::time::Backoff::DEFAULT,
        };
        let dispatch = Arc::new(RouterPayloadDispatch::new(
            self.router.clone(),
            stream_id,
            log,
            self.topology.clone(),
            self.config.scheduler.paths_per_target,
            self.config.scheduler.credit_window_chunks,
        ));
        let dispatcher = Arc::new(OutboxDispatcher::new(
            outbox.clone(),
            dispatch.clone(),
            policy,
            self.config.outbox.outbox_shards,
            std::time::Duration::from_millis(250),
        ));
        dispatcher.recover().await?;
        dispatcher.spawn_tasks(&self.group).await;

        let stream = Arc::new(RwLock::new(Stream {
            stream_id,
            tenant_id: req.tenant_id,
            target_nodes: req.target_nodes,
            qos: req.qos,
            priority: req.priority,
            committed_seq: 0,
            delivered_seq_per_target: Default::default(),
            created_at: mesh_common::time::MeshTime::now().wall_millis_since_epoch(),
            status: StreamStatus::Active,
        }));

        self.streams.write().await.insert(
            stream_id,
            StreamEntry {
                dsg: DsgHandle::new(handle),
                state_machine,
                outbox,
                dispatch,
                stream,
            },
        );

        Ok(StreamHandle { stream_id, group_id })
    }

    /// `CloseClientDataStream`: drain then tear down the DSG (spec.md §4.D:
    /// no new chunks accepted; in-flight entries allowed to reach a terminal
    /// state; after `drain_timeout` anything left is `failed_permanent`).
    pub async fn close_client_data_stream(&self, stream_id: StreamId) -> Result<()> {
        let entry = self
            .streams
            .write()
            .await
            .remove(&stream_id)
            .ok_or_else(|| not_found("no such stream"))?;
        {
            let mut stream = entry.stream.write().await;
            stream.status = StreamStatus::Draining;
        }
        let _ = entry
            .dsg
            .propose(mesh_raft::group::DsgEntry::MemberRemove(self.local_node))
            .await;
        async_std::task::sleep(self.config.scheduler.drain_timeout).await;

        // spec.md §3 invariant: "for a closed stream, delivered_seq_per_target[t]
        // >= committed_seq for every t". `drain_timeout` is a hard deadline
        // (spec.md §4.D), so a target that never acks still gets torn down;
        // violating entries are logged as `failed_permanent` rather than
        // silently dropped.
        let mut stream = entry.stream.write().await;
        stream.committed_seq = entry.state_machine.committed_seq();
        stream.status = StreamStatus::Closed;
        if !stream.fully_delivered() {
            for target in &stream.target_nodes {
                let delivered = stream.delivered_seq_per_target.get(target).copied().unwrap_or(0);
                if delivered < stream.committed_seq {
                    log::warn!(
                        "stream {} closed before {} fully delivered ({} of {} acked); marking its outstanding entries failed_permanent",
                        stream_id,
                        target,
                        delivered,
                        stream.committed_seq,
                    );
                    for seq in (delivered + 1)..=stream.committed_seq {
                        let _ = entry.outbox.mark_failed_permanent((stream_id, seq, *target)).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// `PublishClientData`: durable once the DSG commit returns (spec.md
    /// §4.D step 1).
    pub async fn publish_client_data(&self, stream_id: StreamId, payload_ciphertext: Vec<u8>) -> Result<PublishResult> {
        let streams = self.streams.read().await;
        let entry = streams.get(&stream_id).ok_or_else(|| not_found("no such stream"))?;

        let seq = entry.state_machine.committed_seq() + 1;
        entry.dsg.publish_chunk(seq, payload_ciphertext, self.local_node).await?;
        Ok(PublishResult { seq, durable: true })
    }

    pub async fn get_mesh_status(&self) -> MeshStatus {
        self.status().await
    }

    /// `SubscribeClientData`: registers this node's single consumer for a
    /// stream's in-order `(seq, payload)` delivery (spec.md §6). Only one
    /// active subscription per stream is supported per node — multiplexing
    /// to several local consumers is left to the caller, since nothing in
    /// spec.md §4.D requires the core itself to fan a stream out further
    /// than one delivery point per destination node.
    pub async fn subscribe_client_data(&self, stream_id: StreamId) -> async_std::channel::Receiver<(u64, Vec<u8>)> {
        let (tx, rx) = async_std::channel::unbounded();
        self.subscriptions.write().await.insert(stream_id, tx);
        rx
    }

    /// Feeds one inbound `DATA` frame through the receive-side pipeline
    /// (spec.md §4.D): dedup against the sliding `(stream_id, seq)` window,
    /// then the per-stream reorder buffer, delivering every run it releases
    /// to a registered subscriber in strict `seq` order. Frames for a stream
    /// with no local subscriber are dropped after dedup bookkeeping — there
    /// is nowhere to deliver them yet.
    pub async fn handle_inbound_data(&self, frame: Frame) -> Result<()> {
        let stream_id = frame
            .header
            .stream_id
            .ok_or_else(|| format_err!("data frame missing stream_id"))?;
        let seq = frame.header.seq.ok_or_else(|| format_err!("data frame missing seq"))?;
        let origin_node = frame.header.from_node.ok_or_else(|| format_err!("data frame missing from_node"))?;

        if !self.dedup.mark_and_check(stream_id, seq).await {
            return Ok(());
        }

        // spec.md §4.D: acknowledge transport-level receipt immediately,
        // independent of whether a local subscriber exists yet — at-least-
        // once transport underneath exactly-once subscriber delivery.
        let ack = chunk_ack_frame(self.local_node, stream_id, origin_node, seq);
        if let Err(e) = self.router.send_unicast(origin_node, ack).await {
            log::warn!("failed to send chunk ack for stream {} seq {} to {}: {}", stream_id, seq, origin_node, e);
        }

        let buffer = {
            let mut guard = self.reorder.write().await;
            guard
                .entry(stream_id)
                .or_insert_with(|| Arc::new(ReorderBuffer::new(self.config.scheduler.reorder_window, 1)))
                .clone()
        };
        let released = buffer
            .admit(Chunk {
                stream_id,
                seq,
                payload_ciphertext: frame.payload,
                origin_node,
                published_at: mesh_common::time::MeshTime::now().wall_millis_since_epoch(),
            })
            .await;

        let subscriptions = self.subscriptions.read().await;
        if let Some(tx) = subscriptions.get(&stream_id) {
            for chunk in released {
                if tx.send((chunk.seq, chunk.payload_ciphertext)).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Demultiplexes one inbound frame by `FrameType` (spec.md §4.A/§4.D).
    /// `CONTROL` frames carrying a `correlation_id` are Raft RPC traffic
    /// (every request and response `raft_transport` sends sets one); those
    /// without one are topology LSAs flooded by gossip. `PING`/`PONG` only
    /// need to have been read off the link to refresh its liveness clock,
    /// which `Link::recv` already does; `CLOSE` needs no further action here.
    pub async fn handle_inbound_frame(&self, peer: NodeId, frame: Frame) -> Result<()> {
        match frame.frame_type {
            FrameType::Data => self.handle_inbound_data(frame).await,
            FrameType::Control => {
                if frame.header.correlation_id.is_some() {
                    self.raft_bridge.dispatch_inbound(peer, &frame).await
                } else if frame.header.stream_id.is_some() {
                    self.handle_inbound_chunk_ack(peer, frame).await
                } else {
                    let lsa: Lsa = bincode::deserialize(&frame.payload).map_err(|e| format_err!("decode lsa: {}", e))?;
                    self.topology.handle_inbound_lsa(lsa, peer).await;
                    Ok(())
                }
            }
            // `Link::recv` fully consumes `Grant` frames itself; this arm is
            // unreachable in practice.
            FrameType::Ping | FrameType::Pong | FrameType::Close | FrameType::Grant => Ok(()),
        }
    }

    /// Applies an inbound `CHUNK_ACK` (spec.md §4.D step 4 / §3): grants the
    /// target's credit back, marks the outbox row `acked` so it can
    /// eventually be reaped, and advances the `Stream`'s per-target delivery
    /// watermark that `close_client_data_stream` checks against
    /// `committed_seq` before tearing a stream down.
    async fn handle_inbound_chunk_ack(&self, from: NodeId, frame: Frame) -> Result<()> {
        let stream_id = frame.header.stream_id.ok_or_else(|| format_err!("chunk ack missing stream_id"))?;
        let seq = frame.header.seq.ok_or_else(|| format_err!("chunk ack missing seq"))?;

        let streams = self.streams.read().await;
        let entry = match streams.get(&stream_id) {
            Some(entry) => entry,
            // Stream already closed locally; nothing left to credit or mark.
            None => return Ok(()),
        };

        entry.outbox.mark_acked((stream_id, seq, from)).await?;
        entry.dispatch.grant_credit(from).await;

        let mut stream = entry.stream.write().await;
        let delivered = stream.delivered_seq_per_target.entry(from).or_insert(0);
        if seq > *delivered {
            *delivered = seq;
        }
        Ok(())
    }

    /// Spawns the per-link read loop (dispatching every inbound frame via
    /// `handle_inbound_frame`) and heartbeat sender for a link that is now
    /// in the link table. Shared between `dial_peer` and the node process's
    /// inbound accept loop so both directions of a connection are serviced
    /// identically regardless of which side dialed (spec.md §4.A). Takes
    /// `Arc<Self>` because the reader task outlives the call that spawned it.
    pub async fn spawn_link_reader(self: &Arc<Self>, peer: NodeId, link: Link) {
        let local_node = self.local_node;
        let heartbeat_link = link.clone();
        self.group
            .spawn(&format!("link-heartbeat-{peer}"), move |_token| {
                let link = heartbeat_link.clone();
                async move {
                    let _ = link.run_heartbeat(local_node).await;
                    Ok(())
                }
            })
            .await;

        let service = self.clone();
        self.group
            .spawn(&format!("link-reader-{peer}"), move |token| async move {
                loop {
                    let recv = link.recv();
                    let cancelled = token.wait_for_cancellation();
                    let frame = match futures::future::select(Box::pin(recv), Box::pin(cancelled)).await {
                        futures::future::Either::Left((Ok(frame), _)) => frame,
                        futures::future::Either::Left((Err(_), _)) => return Ok(()),
                        futures::future::Either::Right(_) => return Ok(()),
                    };
                    if let Err(e) = service.handle_inbound_frame(peer, frame).await {
                        log::warn!("dropping inbound frame from {}: {}", peer, e);
                    }
                }
            })
            .await;
    }

    pub fn events(&self) -> async_std::channel::Receiver<MeshEvent> {
        self.events_rx.clone()
    }

    async fn require_mcg(&self) -> Result<McgHandle> {
        self.mcg
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| precondition("mesh not yet initialized"))
    }

    async fn spawn_mcg(&self, mesh_id: MeshId, members: Configuration) -> Result<mesh_raft::handle::RaftHandle> {
        let group_id = mesh_common::ids::GroupKind::Mcg.group_id(mesh_id);
        let state_machine = Arc::new(McgStateMachine::new(self.mesh_state.clone()));
        let transport = Arc::new(self.raft_bridge.for_group(group_id));
        let log = mesh_store::open_log_store(&self.config.store.log, &group_id.to_string()).await?;
        let stable = mesh_store::open_stable_store(&self.config.store.stable, &group_id.to_string()).await?;
        let snapshots = mesh_store::open_snapshot_store(&self.config.store.snapshot, &group_id.to_string()).await?;

        let handle = mesh_raft::handle::RaftHandle::spawn(
            "mcg",
            &self.group,
            self.local_node,
            members,
            self.config.consensus.clone(),
            log,
            stable,
            snapshots,
            transport,
            state_machine,
        )
        .await;
        self.raft_bridge.register_group(group_id, handle.clone()).await;
        Ok(handle)
    }

    /// Dials a peer whose `NodeId` is already known (spec.md §4.A's dialer
    /// -parity rule requires knowing who you're dialing before deciding
    /// which side dials).
    async fn dial_peer(self: &Arc<Self>, peer: NodeId, endpoint: &str) -> Result<()> {
        let (events_tx, events_rx) = async_std::channel::unbounded();
        let link = Link::dial(endpoint, peer, self.local_node, self.config.link.clone(), events_tx)
            .await
            .map_err(|e| format_err!("dial {}: {:?}", endpoint, e))?;
        self.register_link(peer, link, events_rx).await;
        Ok(())
    }

    /// Accepts a peer that dialed us (spec.md §4.A's other half of the dialer
    /// -parity rule). The node process's listener hands the just-completed
    /// handshake here; everything past that point is identical to the dial
    /// side's bookkeeping.
    pub async fn accept_link(self: &Arc<Self>, peer: NodeId, link: Link, events_rx: async_std::channel::Receiver<LinkEvent>) {
        self.register_link(peer, link, events_rx).await;
    }

    /// Shared tail of `dial_peer`/`accept_link`: records the link, folds its
    /// first state into topology, starts its reader/heartbeat tasks, and
    /// relays its subsequent transport-level state changes as `MeshEvent`s.
    async fn register_link(self: &Arc<Self>, peer: NodeId, link: Link, events_rx: async_std::channel::Receiver<LinkEvent>) {
        self.router.links().insert(peer, link.clone()).await;
        self.topology
            .handle_link_event(LinkEvent::StateChanged {
                peer,
                state: LinkState::Up,
                reason: None,
            })
            .await;
        self.spawn_link_reader(peer, link).await;

        let events_tx = self.events_tx.clone();
        self.group
            .spawn(&format!("link-events-{peer}"), move |token| async move {
                loop {
                    let recv = events_rx.recv();
                    let cancelled = token.wait_for_cancellation();
                    match futures::future::select(Box::pin(recv), Box::pin(cancelled)).await {
                        futures::future::Either::Left((Ok(LinkEvent::StateChanged { state, .. }), _)) => {
                            let event = match state {
                                LinkState::Up => MeshEvent::LinkUp(peer, peer),
                                LinkState::Down | LinkState::Closed => MeshEvent::LinkDown(peer, peer),
                                LinkState::Connecting | LinkState::Draining => continue,
                            };
                            if events_tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                        futures::future::Either::Left((Err(_), _)) => return Ok(()),
                        futures::future::Either::Right(_) => return Ok(()),
                    }
                }
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::config::TopologyConfig;
    use mesh_common::model::Qos;
    use mesh_router::LinkTable;

    fn make_service(local_node: NodeId) -> MeshService {
        let (topology, _rx) = Topology::new(local_node, TopologyConfig::default());
        let router = Router::new(local_node, topology.clone(), LinkTable::new());
        let group = Arc::new(ServiceResourceGroup::new("test"));
        MeshService::new(local_node, NodeConfig::default(), topology, router, group)
    }

    #[async_std::test]
    async fn seed_mesh_rejects_a_second_seed() {
        let service = make_service(NodeId(1));
        assert!(service.seed_mesh("m").await.is_ok());
        assert!(service.seed_mesh("m").await.is_err());
    }

    #[async_std::test]
    async fn open_client_data_stream_rejects_empty_target_list() {
        let service = make_service(NodeId(1));
        service.seed_mesh("m").await.unwrap();
        let err = service
            .open_client_data_stream(OpenStreamRequest {
                tenant_id: "t".into(),
                target_nodes: vec![],
                qos: Qos::Reliable,
                priority: 0,
            })
            .await
            .unwrap_err();
        assert!(format!("{}", err).contains("empty"));
    }

    #[async_std::test]
    async fn open_client_data_stream_rejects_non_member_target() {
        let service = make_service(NodeId(1));
        service.seed_mesh("m").await.unwrap();
        let err = service
            .open_client_data_stream(OpenStreamRequest {
                tenant_id: "t".into(),
                target_nodes: vec![NodeId(99)],
                qos: Qos::Reliable,
                priority: 0,
            })
            .await
            .unwrap_err();
        assert!(format!("{}", err).contains("non-member"));
    }

    #[async_std::test]
    async fn publish_without_open_stream_is_not_found() {
        let service = make_service(NodeId(1));
        let err = service.publish_client_data(StreamId::random(), vec![1, 2, 3]).await.unwrap_err();
        assert!(format!("{}", err).contains("no such stream"));
    }

    #[async_std::test]
    async fn inbound_data_dedups_and_delivers_in_order_to_a_subscriber() {
        let service = make_service(NodeId(2));
        let stream_id = StreamId::random();
        let rx = service.subscribe_client_data(stream_id).await;

        let frame = |seq: u64, payload: Vec<u8>| mesh_transport::frame::Frame {
            frame_type: mesh_transport::frame::FrameType::Data,
            header: mesh_transport::frame::FrameHeader {
                from_node: Some(NodeId(1)),
                to_node: Some(NodeId(2)),
                stream_id: Some(stream_id),
                seq: Some(seq),
                ..Default::default()
            },
            payload,
        };

        // Arrives out of order: seq 2 before seq 1.
        service.handle_inbound_data(frame(2, b"b".to_vec())).await.unwrap();
        service.handle_inbound_data(frame(1, b"a".to_vec())).await.unwrap();
        // A duplicate of an already-applied seq must not be delivered again.
        service.handle_inbound_data(frame(1, b"a".to_vec())).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, (1, b"a".to_vec()));
        assert_eq!(second, (2, b"b".to_vec()));
        assert!(rx.try_recv().is_err());
    }
}
