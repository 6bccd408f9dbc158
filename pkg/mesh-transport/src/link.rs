//! Component A: the duplex, authenticated, framed pipe between two nodes
//! (spec.md §4.A). Grounded on the teacher's `net::tcp` module for the raw
//! socket shape, rebuilt here on `async-std::net` (itself a teacher
//! dependency via `common`'s `async-std` feature) instead of the teacher's
//! `io_uring`-backed executor, which is Linux-specific plumbing this mesh
//! doesn't need.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_std::io::{ReadExt, WriteExt};
use async_std::net::{TcpListener as StdTcpListener, TcpStream};
use async_std::sync::Mutex;

use mesh_common::config::LinkConfig;
use mesh_common::errors::{format_err, Result};
use mesh_common::ids::NodeId;
use mesh_common::time::Backoff;

use crate::errors::{CloseReason, DialError, RecvError, SendOutcome};
use crate::frame::{Frame, FrameHeader, FrameType};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum LinkState {
    Connecting = 0,
    Up = 1,
    Draining = 2,
    Down = 3,
    Closed = 4,
}

impl LinkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LinkState::Connecting,
            1 => LinkState::Up,
            2 => LinkState::Draining,
            3 => LinkState::Down,
            _ => LinkState::Closed,
        }
    }
}

/// Events a `Link` emits on every state transition, consumed by the topology
/// (component B, to learn a neighbor went down) and the outbox (component E,
/// to wake retry of affected destinations).
#[derive(Clone, Debug)]
pub enum LinkEvent {
    StateChanged {
        peer: NodeId,
        state: LinkState,
        reason: Option<CloseReason>,
    },
}

struct Shared {
    local_node_id: NodeId,
    peer: Mutex<NodeId>,
    state: AtomicU8,
    stream: Mutex<Option<TcpStream>>,
    recv_buf: Mutex<VecDeque<u8>>,
    send_credit: AtomicI64,
    /// Bytes of inbound `Data` payload received since the last `Grant` we
    /// sent back to the peer; flushed once it crosses half the window
    /// (spec.md §4.A).
    recv_credit_consumed: AtomicI64,
    /// Set the moment `send` first returns `WouldBlock`, cleared once a
    /// `Grant` replenishes `send_credit` above zero. `run_heartbeat` closes
    /// the link with `CreditTimeout` if this stays set past
    /// `credit_stall_after`.
    credit_stalled_since: Mutex<Option<std::time::Instant>>,
    config: LinkConfig,
    events: async_std::channel::Sender<LinkEvent>,
    last_frame_at: Mutex<std::time::Instant>,
}

/// A live (or recently live) connection to exactly one peer.
#[derive(Clone)]
pub struct Link {
    shared: Arc<Shared>,
}

impl Link {
    fn new(
        local_node_id: NodeId,
        peer: NodeId,
        stream: TcpStream,
        config: LinkConfig,
        events: async_std::channel::Sender<LinkEvent>,
    ) -> Self {
        let shared = Arc::new(Shared {
            local_node_id,
            peer: Mutex::new(peer),
            state: AtomicU8::new(LinkState::Connecting as u8),
            stream: Mutex::new(Some(stream)),
            recv_buf: Mutex::new(VecDeque::new()),
            send_credit: AtomicI64::new(config.credit_window_bytes as i64),
            recv_credit_consumed: AtomicI64::new(0),
            credit_stalled_since: Mutex::new(None),
            config,
            events,
            last_frame_at: Mutex::new(std::time::Instant::now()),
        });
        Self { shared }
    }

    pub async fn peer(&self) -> NodeId {
        *self.shared.peer.lock().await
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    async fn set_state(&self, state: LinkState, reason: Option<CloseReason>) {
        self.shared.state.store(state as u8, Ordering::SeqCst);
        let peer = self.peer().await;
        let _ = self
            .shared
            .events
            .send(LinkEvent::StateChanged {
                peer,
                state,
                reason,
            })
            .await;
    }

    /// Dials `peer_endpoint`. The lower-`node_id` side of a pair is the
    /// dialer (spec.md §4.A); callers are expected to only invoke `dial` when
    /// `local_node_id < peer_node_id` and otherwise wait for an inbound
    /// accept via `Listener`.
    pub async fn dial(
        peer_endpoint: &str,
        peer_node_id: NodeId,
        local_node_id: NodeId,
        config: LinkConfig,
        events: async_std::channel::Sender<LinkEvent>,
    ) -> std::result::Result<Link, DialError> {
        let stream = TcpStream::connect(peer_endpoint)
            .await
            .map_err(|_| DialError::Unreachable)?;

        let link = Link::new(local_node_id, peer_node_id, stream, config, events);
        link.handshake_outbound(local_node_id)
            .await
            .map_err(|_| DialError::ProtocolMismatch)?;
        link.set_state(LinkState::Up, None).await;
        Ok(link)
    }

    async fn handshake_outbound(&self, local_node_id: NodeId) -> Result<()> {
        self.write_frame_raw(&Frame {
            frame_type: FrameType::Control,
            header: FrameHeader {
                from_node: Some(local_node_id),
                ..Default::default()
            },
            payload: vec![],
        })
        .await
    }

    /// Non-blocking send. Returns `WouldBlock` when the credit window is
    /// saturated (spec.md §4.A).
    pub async fn send(&self, frame: Frame) -> Result<SendOutcome> {
        if self.state() != LinkState::Up {
            return Ok(SendOutcome::Closed);
        }

        let cost = frame.payload.len() as i64;
        if frame.frame_type == FrameType::Data {
            let remaining = self.shared.send_credit.fetch_sub(cost, Ordering::SeqCst) - cost;
            if remaining < 0 {
                // Refund: we don't actually send when out of credit.
                self.shared.send_credit.fetch_add(cost, Ordering::SeqCst);
                let mut stalled = self.shared.credit_stalled_since.lock().await;
                if stalled.is_none() {
                    *stalled = Some(std::time::Instant::now());
                }
                return Ok(SendOutcome::WouldBlock);
            }
        }

        match self.write_frame_raw(&frame).await {
            Ok(()) => Ok(SendOutcome::Ok),
            Err(_) => {
                self.set_state(LinkState::Down, Some(CloseReason::Explicit))
                    .await;
                Ok(SendOutcome::Closed)
            }
        }
    }

    /// Applies a `Grant` frame from the peer, replenishing our send window
    /// (spec.md §4.A: "replenished by CONTROL credit frames"). Called only
    /// from within `recv`, never by `mesh-service`.
    async fn grant_credit(&self, bytes: u64) {
        let remaining = self.shared.send_credit.fetch_add(bytes as i64, Ordering::SeqCst) + bytes as i64;
        if remaining > 0 {
            *self.shared.credit_stalled_since.lock().await = None;
        }
    }

    async fn write_frame_raw(&self, frame: &Frame) -> Result<()> {
        let mut guard = self.shared.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| format_err!("link closed"))?;
        stream.write_all(&frame.encode()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Blocks until the next frame arrives, or the link closes. `Grant`
    /// frames are consumed here and never returned to the caller (spec.md
    /// §4.A: link-level credit replenishment is internal to the link).
    pub async fn recv(&self) -> std::result::Result<Frame, RecvError> {
        loop {
            let decoded = {
                let mut buf = self.shared.recv_buf.lock().await;
                match Frame::decode(buf.make_contiguous()) {
                    Ok(Some((frame, consumed))) => {
                        buf.drain(..consumed);
                        Some(frame)
                    }
                    _ => None,
                }
            };

            if let Some(frame) = decoded {
                *self.shared.last_frame_at.lock().await = std::time::Instant::now();

                if frame.frame_type == FrameType::Grant {
                    if frame.payload.len() == 8 {
                        let bytes = u64::from_be_bytes(frame.payload[..8].try_into().unwrap());
                        self.grant_credit(bytes).await;
                    }
                    continue;
                }

                if frame.frame_type == FrameType::Data {
                    let consumed = self
                        .shared
                        .recv_credit_consumed
                        .fetch_add(frame.payload.len() as i64, Ordering::SeqCst)
                        + frame.payload.len() as i64;
                    let half_window = (self.shared.config.credit_window_bytes / 2) as i64;
                    if consumed >= half_window {
                        self.shared.recv_credit_consumed.fetch_sub(consumed, Ordering::SeqCst);
                        let _ = self
                            .send(Frame {
                                frame_type: FrameType::Grant,
                                header: FrameHeader {
                                    from_node: Some(self.shared.local_node_id),
                                    ..Default::default()
                                },
                                payload: (consumed as u64).to_be_bytes().to_vec(),
                            })
                            .await;
                    }
                }

                return Ok(frame);
            }

            let mut chunk = [0u8; 4096];
            let n = {
                let mut guard = self.shared.stream.lock().await;
                let stream = match guard.as_mut() {
                    Some(s) => s,
                    None => return Err(RecvError::Closed),
                };
                stream.read(&mut chunk).await
            };

            match n {
                Ok(0) => {
                    self.set_state(LinkState::Down, Some(CloseReason::Explicit))
                        .await;
                    return Err(RecvError::Closed);
                }
                Ok(n) => {
                    let mut buf = self.shared.recv_buf.lock().await;
                    buf.extend(&chunk[..n]);
                }
                Err(e) => {
                    self.set_state(LinkState::Down, Some(CloseReason::Explicit))
                        .await;
                    return Err(RecvError::ProtocolError(e.to_string()));
                }
            }
        }
    }

    pub async fn close(&self, reason: CloseReason) {
        if self.state() == LinkState::Closed {
            return;
        }
        *self.shared.stream.lock().await = None;
        self.set_state(LinkState::Closed, Some(reason)).await;
    }

    /// Runs the heartbeat loop for this link (spec.md §4.A): sends PING every
    /// `ping_interval`; if nothing at all is heard for `dead_after`, the link
    /// is declared down. Also closes the link with `CreditTimeout` if the
    /// send-credit window has been stalled for longer than
    /// `credit_stall_after`.
    pub async fn run_heartbeat(&self, local_node_id: NodeId) -> Result<()> {
        let interval = self.shared.config.ping_interval;
        let dead_after = self.shared.config.dead_after;
        let credit_stall_after = self.shared.config.credit_stall_after;

        loop {
            async_std::task::sleep(interval).await;
            if self.state() != LinkState::Up {
                return Ok(());
            }

            let elapsed = self.shared.last_frame_at.lock().await.elapsed();
            if elapsed >= dead_after {
                self.close(CloseReason::HeartbeatTimeout).await;
                return Ok(());
            }

            let stalled_elapsed = self.shared.credit_stalled_since.lock().await.map(|t| t.elapsed());
            if matches!(stalled_elapsed, Some(e) if e >= credit_stall_after) {
                self.close(CloseReason::CreditTimeout).await;
                return Ok(());
            }

            let _ = self
                .send(Frame {
                    frame_type: FrameType::Ping,
                    header: FrameHeader {
                        from_node: Some(local_node_id),
                        ..Default::default()
                    },
                    payload: vec![],
                })
                .await;
        }
    }

    async fn handshake_inbound(&self) -> Result<NodeId> {
        let frame = self
            .recv()
            .await
            .map_err(|_| format_err!("handshake failed"))?;
        let peer = frame
            .header
            .from_node
            .ok_or_else(|| format_err!("handshake frame missing from_node"))?;
        *self.shared.peer.lock().await = peer;
        Ok(peer)
    }
}

pub struct Listener {
    inner: StdTcpListener,
}

impl Listener {
    pub async fn bind(endpoint: &str) -> Result<Self> {
        Ok(Self {
            inner: StdTcpListener::bind(endpoint).await?,
        })
    }

    /// Accepts one inbound dial. The caller is responsible for enforcing the
    /// dialer-parity rule (spec.md §4.A): if the remote's advertised
    /// `node_id` is lower than ours, we should have been the dialer and this
    /// connection is superseded.
    pub async fn accept(
        &self,
        local_node_id: NodeId,
        config: LinkConfig,
        events: async_std::channel::Sender<LinkEvent>,
    ) -> Result<(NodeId, Link)> {
        let (stream, _addr) = self.inner.accept().await?;
        let link = Link::new(local_node_id, NodeId(0), stream, config, events);
        let peer = link.handshake_inbound().await?;
        link.set_state(LinkState::Up, None).await;
        Ok((peer, link))
    }
}

/// Computes the reconnect delay for attempt `n` (spec.md §4.A: "exponential
/// backoff (base 1s, cap 60s, jitter ±20%)").
pub fn reconnect_backoff(attempt: u32) -> Duration {
    Backoff::DEFAULT.duration_for_attempt(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn dial_and_accept_complete_handshake() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.inner.local_addr().unwrap();

        let (events_tx, _events_rx) = async_std::channel::unbounded();
        let (events_tx2, _events_rx2) = async_std::channel::unbounded();

        let local = NodeId(1);
        let peer = NodeId(2);

        let addr_str = addr.to_string();
        let accept_fut = listener.accept(peer, LinkConfig::default(), events_tx2);
        let dial_fut = Link::dial(
            &addr_str,
            peer,
            local,
            LinkConfig::default(),
            events_tx,
        );

        let (accepted, dialed) = futures::join!(accept_fut, dial_fut);
        let (accepted_peer, accepted_link) = accepted.unwrap();
        let dialed_link = dialed.unwrap();

        assert_eq!(accepted_peer, local);
        assert_eq!(dialed_link.peer().await, peer);
        assert_eq!(accepted_link.state(), LinkState::Up);
        assert_eq!(dialed_link.state(), LinkState::Up);
    }
}
