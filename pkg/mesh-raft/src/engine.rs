//! The Raft state machine driver (spec.md §4.C): pre-vote, election,
//! log replication, commit-on-quorum, and application to the injected
//! `StateMachine`. One `RaftCore` instance backs either an MCG or a DSG —
//! the engine itself is agnostic to which (spec.md §9's consolidated-engine
//! decision), grounded on the teacher's own raft message shapes
//! (`examples/other_examples/11ca47cf_dennisss-repo__pkg-raft-src-protos.rs.rs`)
//! and the actor-loop API shape of the `async-raft` reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_std::sync::RwLock;
use futures::channel::oneshot;
use rand::Rng;

use mesh_common::config::ConsensusConfig;
use mesh_common::errors::{format_err, FailureKind, Result};
use mesh_common::ids::NodeId;
use mesh_executor::cancellation::CancellationToken;

use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    PreVoteRequest, PreVoteResponse, ProposeResponse, RequestVoteRequest, RequestVoteResponse,
};
use crate::state_machine::StateMachine;
use crate::store::{LogStore, SnapshotStore, StableStore};
use crate::transport::RaftTransport;
use crate::types::{Configuration, LogEntry, LogEntryData, LogIndex, Metadata, Snapshot, SnapshotMeta, Term};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

#[derive(Clone, Debug)]
pub struct RaftMetrics {
    pub role: Role,
    pub current_term: Term,
    pub last_log_index: LogIndex,
    pub commit_index: LogIndex,
    pub current_leader: Option<NodeId>,
}

pub(crate) enum RaftMsg {
    AppendEntries {
        request: AppendEntriesRequest,
        tx: oneshot::Sender<AppendEntriesResponse>,
    },
    PreVote {
        request: PreVoteRequest,
        tx: oneshot::Sender<PreVoteResponse>,
    },
    RequestVote {
        request: RequestVoteRequest,
        tx: oneshot::Sender<RequestVoteResponse>,
    },
    InstallSnapshot {
        request: InstallSnapshotRequest,
        tx: oneshot::Sender<InstallSnapshotResponse>,
    },
    Propose {
        data: Vec<u8>,
        tx: oneshot::Sender<Result<ProposeResponse>>,
    },
    ChangeConfig {
        change: crate::types::ConfigChange,
        tx: oneshot::Sender<Result<()>>,
    },
}

pub struct RaftCore {
    pub(crate) local_id: NodeId,
    config: ConsensusConfig,
    log: Arc<dyn LogStore>,
    stable: Arc<dyn StableStore>,
    snapshots: Arc<dyn SnapshotStore>,
    transport: Arc<dyn RaftTransport>,
    state_machine: Arc<dyn StateMachine>,
    pub(crate) rx: async_std::channel::Receiver<RaftMsg>,
    pub(crate) metrics: Arc<RwLock<RaftMetrics>>,

    role: Role,
    current_term: Term,
    voted_for: Option<NodeId>,
    commit_index: LogIndex,
    last_applied: LogIndex,
    configuration: Configuration,
    pending_config_change: bool,
    last_snapshot_index: LogIndex,

    next_index: HashMap<NodeId, LogIndex>,
    match_index: HashMap<NodeId, LogIndex>,
}

impl RaftCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        local_id: NodeId,
        initial_members: Configuration,
        config: ConsensusConfig,
        log: Arc<dyn LogStore>,
        stable: Arc<dyn StableStore>,
        snapshots: Arc<dyn SnapshotStore>,
        transport: Arc<dyn RaftTransport>,
        state_machine: Arc<dyn StateMachine>,
        rx: async_std::channel::Receiver<RaftMsg>,
        metrics: Arc<RwLock<RaftMetrics>>,
    ) -> Self {
        Self {
            local_id,
            config,
            log,
            stable,
            snapshots,
            transport,
            state_machine,
            rx,
            metrics,
            role: Role::Follower,
            current_term: 0,
            voted_for: None,
            commit_index: 0,
            last_applied: 0,
            configuration: initial_members,
            pending_config_change: false,
            last_snapshot_index: 0,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
        }
    }

    fn peers(&self) -> Vec<NodeId> {
        self.configuration
            .members
            .iter()
            .chain(self.configuration.learners.iter())
            .filter(|id| **id != self.local_id)
            .copied()
            .collect()
    }

    /// Runs until `token` is cancelled or the inbound channel closes.
    pub async fn run(mut self, token: Arc<dyn CancellationToken>) -> Result<()> {
        let metadata = self.stable.load_metadata().await?;
        self.current_term = metadata.current_term;
        self.voted_for = metadata.voted_for;
        self.commit_index = metadata.commit_index;
        if let Some(snapshot) = self.snapshots.load_latest().await? {
            self.configuration = snapshot.meta.configuration.clone();
            self.last_snapshot_index = snapshot.meta.last_included_index;
            self.last_applied = snapshot.meta.last_included_index;
            self.state_machine.restore(&snapshot.data).await?;
        }
        self.publish_metrics().await;

        loop {
            if token.is_cancelled().await {
                return Ok(());
            }

            let timeout = self.next_timeout();
            let recv = self.rx.recv();
            let sleep = async_std::task::sleep(timeout);

            match futures::future::select(Box::pin(recv), Box::pin(sleep)).await {
                futures::future::Either::Left((Ok(msg), _)) => self.handle_message(msg).await?,
                futures::future::Either::Left((Err(_), _)) => return Ok(()),
                futures::future::Either::Right(_) => self.handle_timeout().await?,
            }
        }
    }

    fn next_timeout(&self) -> Duration {
        match self.role {
            Role::Leader => self.config.heartbeat_interval,
            Role::Follower | Role::Candidate => {
                let jitter_ms = self.config.election_timeout_jitter.as_millis() as u64;
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..jitter_ms)
                };
                self.config.election_timeout + Duration::from_millis(extra)
            }
        }
    }

    async fn handle_timeout(&mut self) -> Result<()> {
        match self.role {
            Role::Leader => self.replicate_once().await,
            Role::Follower | Role::Candidate => self.start_election().await,
        }
    }

    async fn handle_message(&mut self, msg: RaftMsg) -> Result<()> {
        match msg {
            RaftMsg::AppendEntries { request, tx } => {
                let response = self.on_append_entries(request).await?;
                let _ = tx.send(response);
            }
            RaftMsg::PreVote { request, tx } => {
                let response = self.on_pre_vote(request).await?;
                let _ = tx.send(response);
            }
            RaftMsg::RequestVote { request, tx } => {
                let response = self.on_request_vote(request).await?;
                let _ = tx.send(response);
            }
            RaftMsg::InstallSnapshot { request, tx } => {
                let response = self.on_install_snapshot(request).await?;
                let _ = tx.send(response);
            }
            RaftMsg::Propose { data, tx } => {
                let response = self.on_propose(LogEntryData::Command(data)).await;
                let _ = tx.send(response);
            }
            RaftMsg::ChangeConfig { change, tx } => {
                let response = self.on_change_config(change).await;
                let _ = tx.send(response);
            }
        }
        Ok(())
    }

    async fn persist_metadata(&self) -> Result<()> {
        self.stable
            .save_metadata(Metadata {
                current_term: self.current_term,
                voted_for: self.voted_for,
                commit_index: self.commit_index,
            })
            .await
    }

    async fn step_down(&mut self, term: Term) -> Result<()> {
        self.role = Role::Follower;
        self.current_term = term;
        self.voted_for = None;
        self.persist_metadata().await?;
        self.publish_metrics().await;
        Ok(())
    }

    async fn publish_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.role = self.role;
        metrics.current_term = self.current_term;
        metrics.last_log_index = self.log.last_index().await.unwrap_or(0);
        metrics.commit_index = self.commit_index;
        metrics.current_leader = if self.role == Role::Leader {
            Some(self.local_id)
        } else {
            None
        };
    }

    // --- Candidate / election ---------------------------------------------

    /// spec.md §4.C: "pre-vote to avoid disruption by partitioned
    /// candidates". A follower/candidate whose election timer fires first
    /// polls peers at the term it *would* campaign under, without touching
    /// `current_term`/`voted_for`. Only a pre-vote quorum earns a real
    /// election; a node stuck on the minority side of a partition can keep
    /// losing pre-votes forever without ever bumping its term, so it can't
    /// force a healthy leader to step down the moment the partition heals.
    async fn start_election(&mut self) -> Result<()> {
        self.role = Role::Candidate;

        if !self.run_pre_vote().await? {
            self.publish_metrics().await;
            return Ok(());
        }

        self.current_term += 1;
        self.voted_for = Some(self.local_id);
        self.persist_metadata().await?;

        let last_log_index = self.log.last_index().await?;
        let last_log_term = self.log.last_term().await?;
        let request = RequestVoteRequest {
            term: self.current_term,
            candidate_id: self.local_id,
            last_log_index,
            last_log_term,
        };

        let peers = self.peers();
        let mut votes = 1usize; // vote for self
        let quorum = self.configuration.quorum_size();

        let responses = futures::future::join_all(peers.iter().map(|peer| {
            let transport = self.transport.clone();
            let request = request.clone();
            let peer = *peer;
            async move { (peer, transport.request_vote(peer, request).await) }
        }))
        .await;

        for (_, response) in responses {
            match response {
                Ok(response) => {
                    if response.term > self.current_term {
                        self.step_down(response.term).await?;
                        return Ok(());
                    }
                    if response.vote_granted {
                        votes += 1;
                    }
                }
                Err(_) => continue,
            }
        }

        if votes >= quorum {
            self.become_leader().await?;
        } else {
            self.publish_metrics().await;
        }
        Ok(())
    }

    /// Runs the non-term-incrementing pre-vote round. Returns whether the
    /// hypothetical election would reach quorum.
    async fn run_pre_vote(&mut self) -> Result<bool> {
        let last_log_index = self.log.last_index().await?;
        let last_log_term = self.log.last_term().await?;
        let request = PreVoteRequest {
            term: self.current_term + 1,
            candidate_id: self.local_id,
            last_log_index,
            last_log_term,
        };

        let peers = self.peers();
        let mut votes = 1usize; // the candidate counts itself
        let quorum = self.configuration.quorum_size();

        let responses = futures::future::join_all(peers.iter().map(|peer| {
            let transport = self.transport.clone();
            let request = request.clone();
            let peer = *peer;
            async move { transport.pre_vote(peer, request).await }
        }))
        .await;

        for response in responses {
            if let Ok(response) = response {
                if response.vote_granted {
                    votes += 1;
                }
            }
        }

        Ok(votes >= quorum)
    }

    async fn become_leader(&mut self) -> Result<()> {
        self.role = Role::Leader;
        let last_index = self.log.last_index().await?;
        for peer in self.peers() {
            self.next_index.insert(peer, last_index + 1);
            self.match_index.insert(peer, 0);
        }
        self.match_index.insert(self.local_id, last_index);

        // Commit a no-op so entries from prior terms become committable
        // under the leader-completeness property (spec.md §4.C).
        self.append_local(LogEntryData::Noop).await?;
        self.publish_metrics().await;
        self.replicate_once().await
    }

    // --- Follower RPC handlers ----------------------------------------------

    async fn on_append_entries(&mut self, req: AppendEntriesRequest) -> Result<AppendEntriesResponse> {
        if req.term < self.current_term {
            return Ok(AppendEntriesResponse {
                term: self.current_term,
                success: false,
                last_log_index: self.log.last_index().await?,
            });
        }
        if req.term > self.current_term || self.role != Role::Follower {
            self.step_down(req.term).await?;
        }

        if req.prev_log_index > 0 {
            match self.log.get(req.prev_log_index).await? {
                Some(entry) if entry.term == req.prev_log_term => {}
                _ => {
                    return Ok(AppendEntriesResponse {
                        term: self.current_term,
                        success: false,
                        last_log_index: self.log.last_index().await?,
                    });
                }
            }
        }

        if !req.entries.is_empty() {
            self.log.truncate_from(req.entries[0].index).await?;
            self.log.append(req.entries.clone()).await?;
        }

        if req.leader_commit > self.commit_index {
            let last_new_index = req
                .entries
                .last()
                .map(|e| e.index)
                .unwrap_or(req.prev_log_index);
            self.commit_index = req.leader_commit.min(last_new_index);
            self.apply_committed().await?;
        }
        self.persist_metadata().await?;
        self.publish_metrics().await;

        Ok(AppendEntriesResponse {
            term: self.current_term,
            success: true,
            last_log_index: self.log.last_index().await?,
        })
    }

    /// Answers a pre-vote poll without touching `current_term`/`voted_for`
    /// (spec.md §4.C). Grants only when the candidate's term isn't already
    /// behind ours and its log is at least as up-to-date as ours — the same
    /// log-comparison rule `on_request_vote` applies, just without the
    /// `voted_for` exclusivity check since no real vote is being cast.
    async fn on_pre_vote(&mut self, req: PreVoteRequest) -> Result<PreVoteResponse> {
        let our_last_index = self.log.last_index().await?;
        let our_last_term = self.log.last_term().await?;
        let candidate_up_to_date = req.last_log_term > our_last_term
            || (req.last_log_term == our_last_term && req.last_log_index >= our_last_index);
        let grant = req.term >= self.current_term && candidate_up_to_date;
        Ok(PreVoteResponse {
            term: self.current_term,
            vote_granted: grant,
        })
    }

    async fn on_request_vote(&mut self, req: RequestVoteRequest) -> Result<RequestVoteResponse> {
        if req.term < self.current_term {
            return Ok(RequestVoteResponse {
                term: self.current_term,
                vote_granted: false,
            });
        }
        if req.term > self.current_term {
            self.step_down(req.term).await?;
        }

        let already_voted = self.voted_for.is_some() && self.voted_for != Some(req.candidate_id);
        let our_last_index = self.log.last_index().await?;
        let our_last_term = self.log.last_term().await?;
        let candidate_up_to_date = req.last_log_term > our_last_term
            || (req.last_log_term == our_last_term && req.last_log_index >= our_last_index);

        let grant = !already_voted && candidate_up_to_date;
        if grant {
            self.voted_for = Some(req.candidate_id);
            self.persist_metadata().await?;
        }

        Ok(RequestVoteResponse {
            term: self.current_term,
            vote_granted: grant,
        })
    }

    async fn on_install_snapshot(&mut self, req: InstallSnapshotRequest) -> Result<InstallSnapshotResponse> {
        if req.term < self.current_term {
            return Ok(InstallSnapshotResponse {
                term: self.current_term,
            });
        }
        if req.term > self.current_term {
            self.step_down(req.term).await?;
        }

        self.state_machine.restore(&req.snapshot.data).await?;
        self.configuration = req.snapshot.meta.configuration.clone();
        self.last_snapshot_index = req.snapshot.meta.last_included_index;
        self.commit_index = self.commit_index.max(req.snapshot.meta.last_included_index);
        self.last_applied = self.last_applied.max(req.snapshot.meta.last_included_index);
        self.log.compact_through(req.snapshot.meta.last_included_index).await?;
        self.snapshots.save(req.snapshot).await?;
        self.persist_metadata().await?;
        self.publish_metrics().await;

        Ok(InstallSnapshotResponse {
            term: self.current_term,
        })
    }

    // --- Leader: proposals and replication -----------------------------

    async fn on_propose(&mut self, data: LogEntryData) -> Result<ProposeResponse> {
        if self.role != Role::Leader {
            return Err(format_err!(
                "{:?}: not the leader",
                FailureKind::ConsensusPrecondition
            ));
        }
        let entry = self.append_local(data).await?;
        self.replicate_once().await?;
        Ok(ProposeResponse {
            term: entry.term,
            index: entry.index,
        })
    }

    async fn on_change_config(&mut self, change: crate::types::ConfigChange) -> Result<()> {
        if self.role != Role::Leader {
            return Err(format_err!(
                "{:?}: not the leader",
                FailureKind::ConsensusPrecondition
            ));
        }
        if self.pending_config_change {
            return Err(format_err!(
                "{:?}: a configuration change is already in flight",
                FailureKind::ConsensusPrecondition
            ));
        }
        self.pending_config_change = true;
        self.append_local(LogEntryData::Config(change.clone())).await?;
        self.configuration.apply(&change);

        let target = change_target(&change);
        let last_index = self.log.last_index().await?;
        self.next_index.entry(target).or_insert(last_index + 1);
        self.match_index.entry(target).or_insert(0);

        self.replicate_once().await
    }

    async fn append_local(&mut self, data: LogEntryData) -> Result<LogEntry> {
        let index = self.log.last_index().await? + 1;
        let entry = LogEntry {
            index,
            term: self.current_term,
            data,
        };
        self.log.append(vec![entry.clone()]).await?;
        self.match_index.insert(self.local_id, index);
        Ok(entry)
    }

    /// Sends one round of `AppendEntries` to every peer, advances
    /// `match_index`/`next_index` from the results, then recomputes
    /// `commit_index` as the highest index acknowledged by a quorum in the
    /// current term (spec.md §4.C commit-on-quorum, the Raft §5.4.2 rule that
    /// a leader only commits entries from its own term directly).
    async fn replicate_once(&mut self) -> Result<()> {
        let last_index = self.log.last_index().await?;
        let peers = self.peers();
        // spec.md §4.C: "maximum in-flight AppendEntries per follower = 8" —
        // a far-behind follower is caught up in batches of at most this many
        // entries per round rather than one unbounded burst.
        let max_inflight = self.config.max_inflight_append_entries.max(1) as LogIndex;

        let calls = peers.iter().map(|peer| {
            let peer = *peer;
            let next = *self.next_index.get(&peer).unwrap_or(&(last_index + 1));
            let prev_index = next.saturating_sub(1);
            let batch_end = last_index.min(next.saturating_add(max_inflight) - 1) + 1;
            let log = self.log.clone();
            let transport = self.transport.clone();
            let term = self.current_term;
            let local_id = self.local_id;
            let commit_index = self.commit_index;
            async move {
                let prev_term = if prev_index == 0 {
                    0
                } else {
                    log.get(prev_index).await.ok().flatten().map(|e| e.term).unwrap_or(0)
                };
                let entries = log.range(next, batch_end).await.unwrap_or_default();
                let request = AppendEntriesRequest {
                    term,
                    leader_id: local_id,
                    prev_log_index: prev_index,
                    prev_log_term: prev_term,
                    entries,
                    leader_commit: commit_index,
                };
                (peer, next, transport.append_entries(peer, request).await)
            }
        });
        let results = futures::future::join_all(calls).await;

        for (peer, attempted_next, result) in results {
            match result {
                Ok(response) => {
                    if response.term > self.current_term {
                        self.step_down(response.term).await?;
                        return Ok(());
                    }
                    if response.success {
                        self.match_index.insert(peer, response.last_log_index);
                        self.next_index.insert(peer, response.last_log_index + 1);
                    } else {
                        let retreat = attempted_next.saturating_sub(1).max(1);
                        self.next_index.insert(peer, retreat);
                    }
                }
                Err(_) => continue,
            }
        }

        self.advance_commit_index().await?;
        self.publish_metrics().await;
        Ok(())
    }

    async fn advance_commit_index(&mut self) -> Result<()> {
        if self.role != Role::Leader {
            return Ok(());
        }
        let quorum = self.configuration.quorum_size();
        let mut indices: Vec<LogIndex> = self.configuration.members.iter().map(|id| *self.match_index.get(id).unwrap_or(&0)).collect();
        indices.sort_unstable();
        if indices.is_empty() {
            return Ok(());
        }
        let candidate = indices[indices.len().saturating_sub(quorum)];

        if candidate > self.commit_index {
            if let Some(entry) = self.log.get(candidate).await? {
                if entry.term == self.current_term {
                    self.commit_index = candidate;
                    self.apply_committed().await?;
                    self.persist_metadata().await?;
                }
            }
        }
        self.maybe_snapshot().await
    }

    async fn apply_committed(&mut self) -> Result<()> {
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            if let Some(entry) = self.log.get(index).await? {
                match &entry.data {
                    LogEntryData::Noop => {}
                    LogEntryData::Config(change) => {
                        self.configuration.apply(change);
                        self.pending_config_change = false;
                    }
                    LogEntryData::Command(_) => {
                        self.state_machine.apply(&entry).await?;
                    }
                }
            }
            self.last_applied = index;
        }
        Ok(())
    }

    async fn maybe_snapshot(&mut self) -> Result<()> {
        if self.last_applied.saturating_sub(self.last_snapshot_index) < self.config.snapshot_entry_threshold {
            return Ok(());
        }
        let last_included_term = match self.log.get(self.last_applied).await? {
            Some(entry) => entry.term,
            None => return Ok(()),
        };
        let data = self.state_machine.snapshot().await?;
        self.snapshots
            .save(Snapshot {
                meta: SnapshotMeta {
                    last_included_index: self.last_applied,
                    last_included_term,
                    configuration: self.configuration.clone(),
                },
                data,
            })
            .await?;
        self.log.compact_through(self.last_applied).await?;
        self.last_snapshot_index = self.last_applied;
        Ok(())
    }
}

fn change_target(change: &crate::types::ConfigChange) -> NodeId {
    match change {
        crate::types::ConfigChange::AddMember(id)
        | crate::types::ConfigChange::AddLearner(id)
        | crate::types::ConfigChange::RemoveServer(id) => *id,
    }
}
