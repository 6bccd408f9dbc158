//! Loads the configuration surface (spec.md §6) from an optional TOML file,
//! then layers CLI overrides on top. Every key in the file maps onto a field
//! of one of `mesh_common::config`'s named structs (spec.md §9's "group
//! related parameters into named configuration structs" note) — there is no
//! separate config shape invented for the file format.
//!
//! Unrecognized top-level keys are a hard error (`serde(deny_unknown_fields)`
//! on every section) rather than silently ignored: an operator typo in a
//! config file should fail loudly at startup, not run quietly with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mesh_common::config::{ConsensusConfig, CostWeights, NodeConfig, SchedulerConfig, StoreBackend, StoreConfig};
use mesh_common::errors::{format_err, Result};

#[derive(Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    link: Option<FileLink>,
    consensus: Option<FileConsensus>,
    topology: Option<FileTopology>,
    scheduler: Option<FileScheduler>,
    outbox: Option<FileOutbox>,
    store: Option<FileStore>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLink {
    listen_endpoint: Option<String>,
    ping_interval_ms: Option<u64>,
    dead_after_ms: Option<u64>,
    credit_stall_after_ms: Option<u64>,
    credit_window_bytes: Option<u64>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConsensus {
    election_timeout_ms: Option<u64>,
    election_timeout_jitter_ms: Option<u64>,
    heartbeat_ms: Option<u64>,
    snapshot_entry_threshold: Option<u64>,
    snapshot_byte_threshold: Option<u64>,
    max_inflight_append_entries: Option<usize>,
    commit_timeout_ms: Option<u64>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileTopology {
    lsa_interval_ms: Option<u64>,
    path_k: Option<usize>,
    cost_weights: Option<FileCostWeights>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileCostWeights {
    latency: Option<f64>,
    loss: Option<f64>,
    util: Option<f64>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileScheduler {
    credit_window_chunks: Option<u64>,
    reorder_window: Option<u64>,
    drain_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    paths_per_target: Option<usize>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOutbox {
    outbox_shards: Option<u32>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FileStore {
    log: Option<String>,
    stable: Option<String>,
    snapshot: Option<String>,
    dir: Option<PathBuf>,
}

fn parse_backend(name: Option<&str>, dir: Option<&Path>) -> Result<Option<StoreBackend>> {
    match name {
        None => Ok(None),
        Some("memory") => Ok(Some(StoreBackend::Memory)),
        Some("file") => {
            let dir = dir
                .ok_or_else(|| format_err!("store.*=\"file\" requires store.dir to be set"))?
                .to_path_buf();
            Ok(Some(StoreBackend::File { dir }))
        }
        Some(other) => Err(format_err!("unrecognized store backend \"{}\" (expected \"memory\" or \"file\")", other)),
    }
}

/// Reads and merges a TOML config file onto `NodeConfig::default()`. Returns
/// the defaults unchanged when `path` is `None` — a config file is optional,
/// every key already has a documented default (spec.md §6).
pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
    let mut config = NodeConfig::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let text = std::fs::read_to_string(path).map_err(|e| format_err!("reading config file {:?}: {}", path, e))?;
    let file: FileConfig = toml::from_str(&text).map_err(|e| format_err!("parsing config file {:?}: {}", path, e))?;

    if let Some(l) = file.link {
        if let Some(v) = l.listen_endpoint {
            config.link.listen_endpoint = v;
        }
        if let Some(v) = l.ping_interval_ms {
            config.link.ping_interval = Duration::from_millis(v);
        }
        if let Some(v) = l.dead_after_ms {
            config.link.dead_after = Duration::from_millis(v);
        }
        if let Some(v) = l.credit_stall_after_ms {
            config.link.credit_stall_after = Duration::from_millis(v);
        }
        if let Some(v) = l.credit_window_bytes {
            config.link.credit_window_bytes = v;
        }
    }

    if let Some(c) = file.consensus {
        apply_consensus(&mut config.consensus, c);
    }

    if let Some(t) = file.topology {
        if let Some(v) = t.lsa_interval_ms {
            config.topology.lsa_interval = Duration::from_millis(v);
        }
        if let Some(v) = t.path_k {
            config.topology.path_k = v;
        }
        if let Some(w) = t.cost_weights {
            apply_cost_weights(&mut config.topology.cost_weights, w);
        }
    }

    if let Some(s) = file.scheduler {
        apply_scheduler(&mut config.scheduler, s);
    }

    if let Some(o) = file.outbox {
        if let Some(v) = o.outbox_shards {
            config.outbox.outbox_shards = v;
        }
    }

    if let Some(s) = file.store {
        apply_store(&mut config.store, s)?;
    }

    Ok(config)
}

fn apply_consensus(config: &mut ConsensusConfig, c: FileConsensus) {
    if let Some(v) = c.election_timeout_ms {
        config.election_timeout = Duration::from_millis(v);
    }
    if let Some(v) = c.election_timeout_jitter_ms {
        config.election_timeout_jitter = Duration::from_millis(v);
    }
    if let Some(v) = c.heartbeat_ms {
        config.heartbeat_interval = Duration::from_millis(v);
    }
    if let Some(v) = c.snapshot_entry_threshold {
        config.snapshot_entry_threshold = v;
    }
    if let Some(v) = c.snapshot_byte_threshold {
        config.snapshot_byte_threshold = v;
    }
    if let Some(v) = c.max_inflight_append_entries {
        config.max_inflight_append_entries = v;
    }
    if let Some(v) = c.commit_timeout_ms {
        config.commit_timeout = Duration::from_millis(v);
    }
}

fn apply_cost_weights(weights: &mut CostWeights, w: FileCostWeights) {
    if let Some(v) = w.latency {
        weights.latency = v;
    }
    if let Some(v) = w.loss {
        weights.loss = v;
    }
    if let Some(v) = w.util {
        weights.utilization = v;
    }
}

fn apply_scheduler(config: &mut SchedulerConfig, s: FileScheduler) {
    if let Some(v) = s.credit_window_chunks {
        config.credit_window_chunks = v;
    }
    if let Some(v) = s.reorder_window {
        config.reorder_window = v;
    }
    if let Some(v) = s.drain_timeout_ms {
        config.drain_timeout = Duration::from_millis(v);
    }
    if let Some(v) = s.max_attempts {
        config.max_attempts_reliable = v;
    }
    if let Some(v) = s.paths_per_target {
        config.paths_per_target = v;
    }
}

fn apply_store(config: &mut StoreConfig, s: FileStore) -> Result<()> {
    let dir = s.dir.as_deref();
    if let Some(backend) = parse_backend(s.log.as_deref(), dir)? {
        config.log = backend;
    }
    if let Some(backend) = parse_backend(s.stable.as_deref(), dir)? {
        config.stable = backend;
    }
    if let Some(backend) = parse_backend(s.snapshot.as_deref(), dir)? {
        config.snapshot = backend;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mesh-node-config-test-{}.toml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_path_returns_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.link.listen_endpoint, NodeConfig::default().link.listen_endpoint);
    }

    #[test]
    fn overrides_only_the_keys_present() {
        let path = write_temp(
            r#"
            [link]
            listen_endpoint = "0.0.0.0:9"

            [scheduler]
            paths_per_target = 7
            "#,
        );
        let config = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.link.listen_endpoint, "0.0.0.0:9");
        assert_eq!(config.scheduler.paths_per_target, 7);
        // Untouched keys keep their defaults.
        assert_eq!(config.scheduler.reorder_window, NodeConfig::default().scheduler.reorder_window);
    }

    #[test]
    fn unknown_key_is_a_hard_error() {
        let path = write_temp("[link]\nbogus_key = 1\n");
        let err = load(Some(&path)).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(format!("{}", err).contains("parsing config file"));
    }

    #[test]
    fn file_backend_without_dir_is_rejected() {
        let path = write_temp("[store]\nlog = \"file\"\n");
        let err = load(Some(&path)).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(format!("{}", err).contains("store.dir"));
    }

    #[test]
    fn file_backend_with_dir_is_accepted() {
        let path = write_temp("[store]\nlog = \"file\"\ndir = \"/var/lib/mesh\"\n");
        let config = load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        match config.store.log {
            StoreBackend::File { dir } => assert_eq!(dir, PathBuf::from("/var/lib/mesh")),
            StoreBackend::Memory => panic!("expected a file backend"),
        }
    }
}
