//! Binary entry point: parses CLI + config file into a `NodeConfig`, then
//! blocks on the composition root (spec.md §9 supplement, component H).
//!
//! Exit codes (spec.md §6): `0` clean shutdown, `1` configuration could not
//! be loaded (nothing was constructed yet), `2` a registered resource failed
//! permanently at or after startup (most commonly a durable-store I/O
//! error surfacing through the MCG/DSG it backs).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mesh_common::ids::{MeshId, NodeId};
use mesh_node::composition::Bootstrap;

#[derive(Parser)]
#[command(name = "mesh-node", about = "Runs one mesh node process")]
struct Args {
    /// This node's identity, as a 32-hex-digit u128. Defaults to a freshly
    /// generated random id when omitted.
    #[arg(long)]
    node_id: Option<String>,

    /// Path to a TOML configuration file (spec.md §6). Every key is optional;
    /// an omitted file runs entirely on documented defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `[link].listen_endpoint` from the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Overrides every store backend to a file-backed one rooted at this
    /// directory.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    bootstrap: Option<BootstrapArgs>,
}

#[derive(clap::Subcommand)]
enum BootstrapArgs {
    /// `SeedMesh`: this node becomes the first MCG member of a new mesh.
    Seed {
        #[arg(long, default_value = "default")]
        mesh_name: String,
    },
    /// `JoinMesh`: dial the given peers and seed the local MCG with the
    /// resulting member set. Each peer is `<node_id_hex>@<endpoint>`.
    Join {
        #[arg(long)]
        mesh_id: String,
        #[arg(long = "peer")]
        peers: Vec<String>,
    },
}

fn parse_hex_u128(s: &str) -> mesh_common::errors::Result<u128> {
    u128::from_str_radix(s, 16).map_err(|e| mesh_common::errors::format_err!("invalid hex id {:?}: {}", s, e))
}

fn parse_peer(s: &str) -> mesh_common::errors::Result<(NodeId, String)> {
    let (id, endpoint) = s
        .split_once('@')
        .ok_or_else(|| mesh_common::errors::format_err!("peer {:?} must be <node_id_hex>@<endpoint>", s))?;
    Ok((NodeId(parse_hex_u128(id)?), endpoint.to_string()))
}

fn load(args: &Args) -> mesh_common::errors::Result<(NodeId, mesh_common::config::NodeConfig, Bootstrap)> {
    let local_node = match &args.node_id {
        Some(s) => NodeId(parse_hex_u128(s)?),
        None => NodeId::random(),
    };

    let mut config = mesh_node::config_file::load(args.config.as_deref())?;
    if let Some(listen) = &args.listen {
        config.link.listen_endpoint = listen.clone();
    }
    if let Some(dir) = &args.store_dir {
        config.store.log = mesh_common::config::StoreBackend::File { dir: dir.clone() };
        config.store.stable = mesh_common::config::StoreBackend::File { dir: dir.clone() };
        config.store.snapshot = mesh_common::config::StoreBackend::File { dir: dir.clone() };
    }

    let bootstrap = match &args.bootstrap {
        None => Bootstrap::None,
        Some(BootstrapArgs::Seed { mesh_name }) => Bootstrap::Seed {
            mesh_name: mesh_name.clone(),
        },
        Some(BootstrapArgs::Join { mesh_id, peers }) => Bootstrap::Join {
            mesh_id: MeshId(parse_hex_u128(mesh_id)?),
            peers: peers.iter().map(|p| parse_peer(p)).collect::<mesh_common::errors::Result<Vec<_>>>()?,
        },
    };

    Ok((local_node, config, bootstrap))
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let (local_node, config, bootstrap) = match load(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    match async_std::task::block_on(mesh_node::composition::run(local_node, config, bootstrap)) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            log::error!("node terminated: {}", e);
            ExitCode::from(2)
        }
    }
}
