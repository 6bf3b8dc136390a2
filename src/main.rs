//! IPsec overlay host agent.
//!
//! # Architecture Overview
//!
//! ```text
//!   metadata service ──poll /version──▶ ChangeWatcher ──▶ Overlay::reload
//!                                                           │
//!                                    ┌──────────────────────┴──────────┐
//!                                    ▼                                 ▼
//!                             TemplateManager                   TopologyStore
//!                           (ike.conf, childsa.conf)         (ArcSwap<Topology>)
//!                                                                │        │
//!            raw ARP on eth0 ◀──── ArpResponder ◀── is_remote ───┘        │
//!                                                                         │
//!   charon (VICI socket) ◀──── SaMonitor (list-sas / initiate)            │
//!                                                                         │
//!   control HTTP (/ping, /v1/reload, /v1/loglevel) ──▶ Overlay::reload    │
//! ```
//!
//! Every long-running loop is spawned from `run`; the first one to exit
//! stops the agent.

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time;

use ipsec_overlay::arp;
use ipsec_overlay::config::loader::{read_config, ConfigError};
use ipsec_overlay::config::validation::validate_config;
use ipsec_overlay::config::watcher::TemplateWatcher;
use ipsec_overlay::config::{AgentConfig, MonitorConfig};
use ipsec_overlay::control::{ControlServer, ControlState};
use ipsec_overlay::lifecycle::{signals, Shutdown};
use ipsec_overlay::metadata::{ChangeWatcher, MetadataClient};
use ipsec_overlay::monitor::{DaemonConnector, SaMonitor};
use ipsec_overlay::observability::{logging, metrics};
use ipsec_overlay::overlay::{Overlay, Reloadable};
use ipsec_overlay::store::TopologyStore;
use ipsec_overlay::templates::TemplateManager;
use ipsec_overlay::vici::ViciConnector;

type LoopResult = Result<(), Box<dyn Error + Send + Sync>>;

/// How long async loops get to finish after the stop signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "ipsec-overlay")]
#[command(version, about = "Per-host agent for an IPsec container overlay network")]
struct Cli {
    /// Agent configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with ike.conf and childsa.conf
    #[arg(long = "ipsec-config")]
    ipsec_config: Option<PathBuf>,

    /// Control surface listen address
    #[arg(long)]
    listen: Option<String>,

    /// Metadata service address
    #[arg(long, env = "RANCHER_METADATA_ADDRESS")]
    metadata_address: Option<String>,

    /// Interface to answer ARP requests on
    #[arg(long)]
    interface: Option<String>,

    /// Tunnel daemon VICI socket
    #[arg(long)]
    vici_socket: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Connect to the tunnel daemon, list SAs and exit
    #[arg(long)]
    check_daemon: bool,
}

impl Cli {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(dir) = &self.ipsec_config {
            config.templates.directory = dir.clone();
        }
        if let Some(listen) = &self.listen {
            config.control.listen = listen.clone();
        }
        if let Some(address) = &self.metadata_address {
            config.metadata.address = address.clone();
        }
        if let Some(interface) = &self.interface {
            config.arp.interface = interface.clone();
        }
        if let Some(socket) = &self.vici_socket {
            config.monitor.vici_socket = socket.clone();
        }
        if self.debug {
            config.observability.log_level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Exit explicitly: the ARP thread blocks on a raw socket read and would
    // keep the runtime from shutting down.
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "Agent stopped with error");
            eprintln!("ipsec-overlay: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => AgentConfig::default(),
    };
    cli.apply(&mut config);

    let log_level = logging::init(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ipsec-overlay starting");

    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            tracing::error!(error = %e, "Invalid configuration");
        }
        return Err(ConfigError::Validation(errors).into());
    }

    if cli.check_daemon {
        return check_daemon(&config.monitor).await;
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let metadata = Arc::new(MetadataClient::new(&config.metadata)?);
    let version = metadata.wait_until_ready(Duration::from_secs(1)).await;

    let templates = Arc::new(TemplateManager::load(&config.templates.directory)?);
    let store = Arc::new(TopologyStore::new());
    store.refresh(metadata.as_ref()).await?;

    let overlay: Arc<dyn Reloadable> = Arc::new(Overlay::new(metadata.clone(), store.clone(), templates));
    let listener = TcpListener::bind(&config.control.listen).await?;

    let shutdown = Shutdown::new();
    let mut loops: JoinSet<(&'static str, LoopResult)> = JoinSet::new();

    let watcher = ChangeWatcher::new(metadata.clone(), config.metadata.poll_interval()).with_initial_version(version);
    let (target, rx) = (overlay.clone(), shutdown.subscribe());
    loops.spawn(async move {
        watcher.run(target, rx).await;
        ("metadata watcher", Ok(()))
    });

    if config.monitor.enabled {
        let connector: Arc<dyn DaemonConnector> = Arc::new(ViciConnector::new(
            config.monitor.vici_socket.clone(),
            config.monitor.initiate_timeout(),
        ));
        let monitor = SaMonitor::new(metadata.clone(), connector, config.monitor.clone());
        let rx = shutdown.subscribe();
        loops.spawn(async move {
            monitor.run(rx).await;
            ("sa monitor", Ok(()))
        });
    }

    let server = ControlServer::new(ControlState {
        reloader: overlay.clone(),
        log_level,
    });
    let rx = shutdown.subscribe();
    loops.spawn(async move { ("control server", server.run(listener, rx).await.map_err(Into::into)) });

    if config.templates.watch {
        let (watcher, changes) = TemplateWatcher::new(&config.templates.directory);
        let handle = watcher.run()?;
        let (target, rx) = (overlay.clone(), shutdown.subscribe());
        loops.spawn(async move {
            let _watcher = handle;
            reload_on_template_change(changes, target, rx).await;
            ("template watcher", Ok(()))
        });
    }

    let arp_task = config.arp.enabled.then(|| {
        let (store, interface) = (store.clone(), config.arp.interface.clone());
        tokio::task::spawn_blocking(move || arp::listen_and_serve(store, &interface))
    });
    let arp_exit = async {
        match arp_task {
            Some(task) => match task.await {
                Ok(Ok(())) => ("arp responder", Ok(())),
                Ok(Err(e)) => ("arp responder", Err(e.into())),
                Err(e) => ("arp responder", Err(e.into())),
            },
            None => std::future::pending().await,
        }
    };

    tracing::info!(
        arp = config.arp.enabled,
        monitor = config.monitor.enabled,
        template_watch = config.templates.watch,
        "Agent running"
    );

    let result: Result<(), Box<dyn Error>> = tokio::select! {
        signal = signals::wait_for_shutdown() => {
            tracing::info!(signal, "Received signal");
            Ok(())
        }
        (name, result) = arp_exit => loop_exit(name, result),
        Some(joined) = loops.join_next() => match joined {
            Ok((name, result)) => loop_exit(name, result),
            Err(e) => Err(e.into()),
        },
    };

    shutdown.trigger("agent stopping");
    let drained = time::timeout(DRAIN_TIMEOUT, async { while loops.join_next().await.is_some() {} }).await;
    if drained.is_err() {
        tracing::warn!(timeout = ?DRAIN_TIMEOUT, "Some loops did not stop in time");
    }

    tracing::info!("Shutdown complete");
    result
}

fn loop_exit(name: &'static str, result: LoopResult) -> Result<(), Box<dyn Error>> {
    match result {
        Ok(()) => {
            tracing::error!(name, "Loop exited unexpectedly");
            Err(format!("{name} exited").into())
        }
        Err(e) => {
            tracing::error!(name, error = %e, "Loop failed");
            Err(format!("{name}: {e}").into())
        }
    }
}

async fn reload_on_template_change(
    mut changes: tokio::sync::mpsc::UnboundedReceiver<PathBuf>,
    target: Arc<dyn Reloadable>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            changed = changes.recv() => {
                let Some(path) = changed else { break };
                // Editors emit bursts of events; settle and drain before reloading.
                time::sleep(Duration::from_millis(200)).await;
                while changes.try_recv().is_ok() {}

                tracing::info!(path = %path.display(), "Reloading after template change");
                match target.reload().await {
                    Ok(()) => metrics::record_reload("templates", true),
                    Err(e) => {
                        tracing::error!(error = %e, "Reload after template change failed");
                        metrics::record_reload("templates", false);
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn check_daemon(config: &MonitorConfig) -> Result<(), Box<dyn Error>> {
    let connector = ViciConnector::new(config.vici_socket.clone(), config.initiate_timeout());
    let mut session = connector.connect().await?;
    let sas = session.list_sas().await?;
    for sa in &sas {
        tracing::info!(name = %sa.name, remote = %sa.remote_host, state = %sa.state, "SA");
    }
    tracing::info!(socket = %config.vici_socket.display(), count = sas.len(), "Tunnel daemon reachable");
    Ok(())
}
