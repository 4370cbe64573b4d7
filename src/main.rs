//! Delegate Node CLI
//!
//! Entry point for the `delegate-node` worker binary.

use clap::Parser;
use delegate_node::config::{CliOverrides, NodeConfig};
use delegate_node::exit::{session_exit_code, ExitCode, FailureKind};
use delegate_node::telemetry;
use delegate_worker::{Endpoint, Launcher, SystemLauncher, WebSocketTransport, WorkerSession};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "delegate-node")]
#[command(about = "Build-farm worker node", version)]
struct Cli {
    /// Coordinator host name or address
    host: String,

    /// Coordinator port
    port: u16,

    /// Websocket resource path on the coordinator (e.g. /ws)
    resource: String,

    /// Path to config file (default: ./delegate-node.toml if present)
    #[arg(long, short = 'c', env = "DELEGATE_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding repository workspaces
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug")
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    // clap exits with status 2 on usage errors
    let cli = Cli::parse();

    let overrides = CliOverrides {
        workspace_root: cli.workspace_root.clone(),
        log_level: cli.log_level.clone(),
    };
    let config = match NodeConfig::load(cli.config.as_deref(), &overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(ExitCode::Config.as_i32());
        }
    };

    telemetry::init_tracing(config.log_level());
    for source in &config.sources {
        debug!(origin = ?source.origin, path = ?source.path, digest = ?source.digest, "config source");
    }

    process::exit(run(cli, &config).as_i32());
}

fn run(cli: Cli, config: &NodeConfig) -> ExitCode {
    let endpoint = Endpoint::new(cli.host, cli.port, cli.resource);
    info!(url = %endpoint.url(), "connecting");

    let transport = match WebSocketTransport::connect(&endpoint, config.connect_timeout()) {
        Ok(transport) => transport,
        Err(e) => {
            error!(error = %e, "{}", FailureKind::Transport.description());
            return FailureKind::Transport.exit_code();
        }
    };

    let launcher: Arc<dyn Launcher> = Arc::new(SystemLauncher);
    let mut session = WorkerSession::new(transport, launcher, &config.worker_config());
    let result = session.run();

    let code = session_exit_code(&result);
    match &result {
        Ok(outcome) => match FailureKind::from_outcome(outcome) {
            None => info!(?outcome, "session completed"),
            Some(kind) => error!(?outcome, "{}", kind.description()),
        },
        Err(e) => error!(error = %e, "{}", FailureKind::from_session_error(e).description()),
    }
    code
}
