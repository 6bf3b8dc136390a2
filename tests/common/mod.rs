//! Shared fakes for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use ipsec_overlay::metadata::{
    ClusterSnapshot, Container, Environment, Host, MetadataError, MetadataResult, MetadataSource, Network, Service,
};
use ipsec_overlay::monitor::{DaemonConnector, DaemonError, DaemonResult, DaemonSession, SaSummary};
use ipsec_overlay::overlay::{ReloadError, Reloadable};

pub fn host(uuid: &str, agent_ip: &str) -> Host {
    Host {
        name: uuid.to_string(),
        uuid: uuid.to_string(),
        agent_ip: agent_ip.to_string(),
        state: "active".to_string(),
        ..Host::default()
    }
}

pub fn container(name: &str, ip: &str, host_uuid: &str) -> Container {
    Container {
        name: name.to_string(),
        uuid: format!("c-{name}"),
        primary_ip: ip.to_string(),
        host_uuid: host_uuid.to_string(),
        network_uuid: "net-1".to_string(),
        service_name: "app".to_string(),
        stack_name: "default".to_string(),
        state: "running".to_string(),
        ..Container::default()
    }
}

pub fn overlay_network() -> Network {
    let mut network = Network {
        name: "ipsec".to_string(),
        uuid: "net-1".to_string(),
        default: true,
        ..Network::default()
    };
    network.metadata.insert(
        "cniConfig".to_string(),
        json!({ "10-ipsec.conf": {
            "type": "rancher-bridge",
            "bridge": "docker0",
            "bridgeSubnet": "10.42.0.0/16",
            "ipam": { "subnetPrefixSize": "/16" }
        }}),
    );
    network
}

/// Three hosts; this agent runs on `h1` as 10.42.0.2.
///
/// | address    | host |
/// |------------|------|
/// | 10.42.0.2  | h1   |
/// | 10.42.0.10 | h1   |
/// | 10.42.0.11 | h2   |
/// | 10.42.0.12 | h3   |
pub fn three_host_snapshot() -> ClusterSnapshot {
    let self_container = Container {
        service_name: "ipsec".to_string(),
        stack_name: "network".to_string(),
        system: true,
        ..container("ipsec-1", "10.42.0.2", "h1")
    };
    ClusterSnapshot {
        containers: vec![
            self_container.clone(),
            container("web-1", "10.42.0.10", "h1"),
            container("web-2", "10.42.0.11", "h2"),
            container("db-1", "10.42.0.12", "h3"),
        ],
        self_container,
        self_host: host("h1", "192.168.1.1"),
        self_service: Service {
            name: "ipsec".to_string(),
            uuid: "svc-ipsec".to_string(),
            stack_name: "network".to_string(),
            kind: "service".to_string(),
            state: "active".to_string(),
            system: true,
            ..Service::default()
        },
        hosts: vec![
            host("h1", "192.168.1.1"),
            host("h2", "192.168.1.2"),
            host("h3", "192.168.1.3"),
        ],
        networks: vec![overlay_network()],
        ..ClusterSnapshot::default()
    }
}

/// In-memory metadata service backed by a mutable snapshot.
pub struct FakeMetadata {
    snapshot: Mutex<ClusterSnapshot>,
    version: Mutex<String>,
    failing: AtomicBool,
    pub version_reads: AtomicU32,
}

impl FakeMetadata {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            version: Mutex::new("1".to_string()),
            failing: AtomicBool::new(false),
            version_reads: AtomicU32::new(0),
        }
    }

    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    /// Every call fails while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_service_state(&self, state: &str) {
        self.snapshot.lock().unwrap().self_service.state = state.to_string();
    }

    pub fn update(&self, f: impl FnOnce(&mut ClusterSnapshot)) {
        f(&mut self.snapshot.lock().unwrap());
    }

    fn read<T>(&self, f: impl FnOnce(&ClusterSnapshot) -> T) -> MetadataResult<T> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable("fake metadata is down".to_string()));
        }
        Ok(f(&self.snapshot.lock().unwrap()))
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn get_version(&self) -> MetadataResult<String> {
        self.version_reads.fetch_add(1, Ordering::SeqCst);
        let version = self.version.lock().unwrap().clone();
        self.read(|_| version)
    }

    async fn get_self_container(&self) -> MetadataResult<Container> {
        self.read(|s| s.self_container.clone())
    }

    async fn get_self_host(&self) -> MetadataResult<Host> {
        self.read(|s| s.self_host.clone())
    }

    async fn get_self_service(&self) -> MetadataResult<Service> {
        self.read(|s| s.self_service.clone())
    }

    async fn get_hosts(&self) -> MetadataResult<Vec<Host>> {
        self.read(|s| s.hosts.clone())
    }

    async fn get_containers(&self) -> MetadataResult<Vec<Container>> {
        self.read(|s| s.containers.clone())
    }

    async fn get_services(&self) -> MetadataResult<Vec<Service>> {
        self.read(|s| s.services.clone())
    }

    async fn get_networks(&self) -> MetadataResult<Vec<Network>> {
        self.read(|s| s.networks.clone())
    }

    async fn get_region_name(&self) -> MetadataResult<String> {
        self.read(|s| s.region.clone().unwrap_or_default())
    }

    async fn get_environments(&self) -> MetadataResult<Vec<Environment>> {
        self.read(|s| s.environments.clone())
    }
}

/// Shared call log of a [`FakeDaemon`].
#[derive(Default)]
pub struct DaemonCalls {
    pub connects: AtomicU32,
    pub list_calls: AtomicU32,
    pub initiated: Mutex<Vec<String>>,
}

impl DaemonCalls {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn initiated(&self) -> Vec<String> {
        self.initiated.lock().unwrap().clone()
    }
}

/// Tunnel daemon fake with scripted SAs and failures.
pub struct FakeDaemon {
    pub calls: Arc<DaemonCalls>,
    sas: Vec<SaSummary>,
    available: bool,
    failing_children: HashSet<String>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(DaemonCalls::default()),
            sas: Vec::new(),
            available: true,
            failing_children: HashSet::new(),
        }
    }

    pub fn with_sa(mut self, remote_host: &str) -> Self {
        self.sas.push(SaSummary {
            name: format!("conn-{remote_host}"),
            remote_host: remote_host.to_string(),
            state: "ESTABLISHED".to_string(),
        });
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing_initiate(mut self, child: &str) -> Self {
        self.failing_children.insert(child.to_string());
        self
    }
}

#[async_trait]
impl DaemonConnector for FakeDaemon {
    async fn connect(&self) -> DaemonResult<Box<dyn DaemonSession>> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(DaemonError::Unavailable("connection refused".to_string()));
        }
        Ok(Box::new(FakeSession {
            calls: self.calls.clone(),
            sas: self.sas.clone(),
            failing_children: self.failing_children.clone(),
        }))
    }
}

struct FakeSession {
    calls: Arc<DaemonCalls>,
    sas: Vec<SaSummary>,
    failing_children: HashSet<String>,
}

#[async_trait]
impl DaemonSession for FakeSession {
    async fn list_sas(&mut self) -> DaemonResult<Vec<SaSummary>> {
        self.calls.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sas.clone())
    }

    async fn initiate(&mut self, child: &str) -> DaemonResult<()> {
        if self.failing_children.contains(child) {
            return Err(DaemonError::CommandFailed {
                command: "initiate".to_string(),
                message: format!("establishing CHILD_SA '{child}' failed"),
            });
        }
        self.calls.initiated.lock().unwrap().push(child.to_string());
        Ok(())
    }
}

/// Counts reloads and optionally fails them.
#[derive(Default)]
pub struct FakeReloader {
    pub reloads: AtomicU32,
    pub fail: AtomicBool,
}

impl FakeReloader {
    pub fn count(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reloadable for FakeReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            let missing = MetadataError::Unavailable("metadata down".to_string());
            return Err(ReloadError::Topology(missing.into()));
        }
        Ok(())
    }
}

/// Serve `snapshot` as the metadata HTTP API under `/2016-07-29`.
pub async fn start_mock_metadata(snapshot: ClusterSnapshot, version: &'static str) -> SocketAddr {
    let doc = |value: Value| move || async move { Json(value) };
    let region = snapshot.region.clone().unwrap_or_default();
    let api = Router::new()
        .route("/version", get(doc(json!(version))))
        .route("/self/container", get(doc(json!(snapshot.self_container))))
        .route("/self/host", get(doc(json!(snapshot.self_host))))
        .route("/self/service", get(doc(json!(snapshot.self_service))))
        .route("/self/region_name", get(doc(json!(region))))
        .route("/hosts", get(doc(json!(snapshot.hosts))))
        .route("/containers", get(doc(json!(snapshot.containers))))
        .route("/services", get(doc(json!(snapshot.services))))
        .route("/networks", get(doc(json!(snapshot.networks))))
        .route("/environments", get(doc(json!(snapshot.environments))));
    let app = Router::new().nest("/2016-07-29", api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}
