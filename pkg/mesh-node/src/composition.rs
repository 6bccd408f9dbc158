//! Component H: Node Process / Composition Root.
//!
//! Constructs every other component in dependency order (stores are opened
//! lazily by `mesh-service` itself, per group, so this root only needs
//! transport, topology, router and the service built on top of them),
//! registers every long-lived task into one `ServiceResourceGroup`, and
//! blocks on the process-wide `RootResource` the way the teacher's binaries
//! block on their own composition root's `wait()`.

use std::sync::Arc;

use mesh_common::config::NodeConfig;
use mesh_common::errors::{format_err, Result};
use mesh_common::ids::{MeshId, NodeId};
use mesh_executor::resource::ServiceResource;
use mesh_executor::resource_group::ServiceResourceGroup;
use mesh_executor::root_resource::RootResource;
use mesh_router::{LinkTable, Router};
use mesh_service::MeshService;
use mesh_topology::Topology;
use mesh_transport::frame::{Frame, FrameHeader, FrameType};
use mesh_transport::link::Listener;

/// How this node should join a mesh at startup (spec.md §6 `SeedMesh`
/// /`JoinMesh`). Chosen by the CLI and handed to `run` once.
pub enum Bootstrap {
    Seed { mesh_name: String },
    Join { mesh_id: MeshId, peers: Vec<(NodeId, String)> },
    None,
}

/// Builds the node, runs it until shutdown, and returns once every
/// registered resource has reached a terminal state.
pub async fn run(local_node: NodeId, config: NodeConfig, bootstrap: Bootstrap) -> Result<()> {
    let root = Arc::new(RootResource::new());
    let group = Arc::new(ServiceResourceGroup::new("mesh-node"));
    root.register_dependency(group.clone() as Arc<dyn ServiceResource>).await;
    spawn_signal_shutdown(&group, root.clone()).await?;

    let (topology, outbound_gossip_rx) = Topology::new(local_node, config.topology.clone());
    // `mesh_service::register_link` folds each link's state into topology
    // directly rather than through this channel (see DESIGN.md); kept so
    // `Topology::spawn_tasks`'s link-event consumer task has a receiver.
    let (_link_events_tx, link_events_rx) = async_std::channel::unbounded();
    let router = Router::new(local_node, topology.clone(), LinkTable::new());

    topology.spawn_tasks(&group, link_events_rx).await;
    spawn_gossip_flood(&group, local_node, router.clone(), outbound_gossip_rx).await;

    let service = Arc::new(MeshService::new(
        local_node,
        config.clone(),
        topology,
        router,
        group.clone(),
    ));

    match bootstrap {
        Bootstrap::Seed { mesh_name } => {
            service.seed_mesh(&mesh_name).await?;
            log::info!("seeded a new mesh as {}", local_node);
        }
        Bootstrap::Join { mesh_id, peers } => {
            service.join_mesh(mesh_id, &peers).await?;
            log::info!("joined mesh {} via {} configured peer(s)", mesh_id, peers.len());
        }
        Bootstrap::None => {}
    }

    spawn_listener(&group, local_node, config, service).await?;

    root.wait().await
}

/// Installs a SIGINT/SIGTERM handler and, on the first signal, tells
/// `RootResource` to begin graceful shutdown — the clean-exit path to
/// spec.md §6's exit code `0`. Mirrors the teacher's `ctrlc::set_handler`
/// pattern of stashing a one-shot sender behind a mutex so the synchronous
/// signal callback only ever fires it once, then letting an async task do
/// the actual (async) shutdown work.
async fn spawn_signal_shutdown(group: &ServiceResourceGroup, root: Arc<RootResource>) -> Result<()> {
    let (tx, rx) = async_std::channel::bounded(1);
    let tx = std::sync::Mutex::new(Some(tx));
    ctrlc::set_handler(move || {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.try_send(());
        }
    })
    .map_err(|e| format_err!("installing signal handler: {}", e))?;

    group
        .spawn("signal-shutdown", move |token| async move {
            futures::future::select(Box::pin(rx.recv()), Box::pin(token.wait_for_cancellation())).await;
            root.shutdown().await;
            Ok(())
        })
        .await;
    Ok(())
}

/// Drains locally-originated/forwarded LSAs off `Topology`'s outbound gossip
/// channel and floods each as a broadcast `CONTROL` frame (spec.md §4.B).
async fn spawn_gossip_flood(
    group: &ServiceResourceGroup,
    local_node: NodeId,
    router: Router,
    outbound_gossip_rx: async_std::channel::Receiver<mesh_topology::GossipMessage>,
) {
    group
        .spawn("topology-gossip-flood", move |token| async move {
            loop {
                let recv = outbound_gossip_rx.recv();
                let cancelled = token.wait_for_cancellation();
                let message = match futures::future::select(Box::pin(recv), Box::pin(cancelled)).await {
                    futures::future::Either::Left((Ok(message), _)) => message,
                    futures::future::Either::Left((Err(_), _)) => return Ok(()),
                    futures::future::Either::Right(_) => return Ok(()),
                };
                let payload = bincode::serialize(&message.lsa).map_err(|e| format_err!("encode lsa: {}", e))?;
                let frame = Frame {
                    frame_type: FrameType::Control,
                    header: FrameHeader {
                        from_node: Some(local_node),
                        ..Default::default()
                    },
                    payload,
                };
                router.broadcast(frame, message.exclude).await;
            }
        })
        .await;
}

/// Binds the listen endpoint and, for every accepted connection, hands the
/// completed handshake to the service the same way a dialed link is handed
/// off (spec.md §4.A dialer-parity: both sides end up running the identical
/// reader/heartbeat tasks once the handshake is done).
async fn spawn_listener(group: &ServiceResourceGroup, local_node: NodeId, config: NodeConfig, service: Arc<MeshService>) -> Result<()> {
    let listener = Listener::bind(&config.link.listen_endpoint)
        .await
        .map_err(|e| format_err!("binding {}: {}", config.link.listen_endpoint, e))?;
    log::info!("{} listening on {}", local_node, config.link.listen_endpoint);

    group
        .spawn("link-acceptor", move |token| async move {
            loop {
                let (events_tx, events_rx) = async_std::channel::unbounded();
                let accept = listener.accept(local_node, config.link.clone(), events_tx);
                let cancelled = token.wait_for_cancellation();
                let (peer, link) = match futures::future::select(Box::pin(accept), Box::pin(cancelled)).await {
                    futures::future::Either::Left((Ok(pair), _)) => pair,
                    futures::future::Either::Left((Err(e), _)) => {
                        log::warn!("accept failed: {:?}", e);
                        continue;
                    }
                    futures::future::Either::Right(_) => return Ok(()),
                };
                service.accept_link(peer, link, events_rx).await;
            }
        })
        .await;
    Ok(())
}
