//! Component settings read from the process configuration.
//!
//! The component name is read bare; every other key is looked up with the
//! name as superkey, so one file can carry settings for several
//! components (`counter-1:component.priority=2`).

use arbor_cluster::HeartbeatConfig;
use arbor_core::{
    ConfigView, Configuration, CoreError, CoreResult, PathFilter, Pattern, ServiceAddress,
};
use arbor_persist::PersistConfig;
use arbor_store::ReplicationPolicy;
use arbor_transport::{MemoryBus, Transport, UdpTransport};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default poll interval of workers
pub const DEFAULT_POLL: Duration = Duration::from_secs(1);

/// Default base name of console output files
pub const DEFAULT_CONSOLE_OUTPUT: &str = "arbor_output";

/// Which transport a component uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// In-process broadcast bus
    #[default]
    Memory,
    /// UDP datagrams to a fixed peer list
    Udp,
}

impl FromStr for TransportKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "udp" => Ok(Self::Udp),
            other => Err(CoreError::malformed(
                "transport",
                format!("unknown transport '{}'", other),
            )),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// Everything needed to assemble one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSettings {
    /// Component (service) name
    pub name: String,
    /// Service type offered
    pub service_type: String,
    /// Priority; lower values win
    pub priority: i32,
    /// Transport address
    pub address: ServiceAddress,
    /// Transport kind
    pub transport: TransportKind,
    /// Local UDP socket
    pub udp_bind: SocketAddr,
    /// UDP peers to send to
    pub udp_peers: Vec<SocketAddr>,
    /// Publish, subscribe and pre-get sets
    pub policy: ReplicationPolicy,
    /// Worker poll interval
    pub poll_interval: Duration,
    /// Heartbeat timing
    pub heartbeat: HeartbeatConfig,
    /// Persistence, when enabled
    pub persist: Option<PersistConfig>,
    /// Base name of console save files
    pub console_output: String,
}

impl ComponentSettings {
    /// Settings with defaults for everything but identity
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        address: ServiceAddress,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            priority: 0,
            address,
            transport: TransportKind::default(),
            udp_bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            udp_peers: Vec::new(),
            policy: ReplicationPolicy::local_only(),
            poll_interval: DEFAULT_POLL,
            heartbeat: HeartbeatConfig::default(),
            persist: None,
            console_output: DEFAULT_CONSOLE_OUTPUT.to_string(),
        }
    }

    /// Read settings from `config`
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` for an absent name, type or address part
    /// and `Malformed` or `InvalidPath` for values that do not parse
    pub fn from_config(config: &Configuration) -> CoreResult<Self> {
        let name = config.view().require("component.name")?.to_string();
        let view = config.scoped(&name);

        let address = ServiceAddress::new(
            view.require_parsed("address.cluster")?,
            view.require_parsed("address.instance")?,
            view.require_parsed("address.component")?,
        );
        let mut settings = Self::new(name.clone(), view.require("component.type")?, address);

        settings.priority = view.parsed_or("component.priority", 0)?;
        settings.transport = view.parsed_or("transport", TransportKind::default())?;
        settings.udp_bind = view.parsed_or("udp.bind", settings.udp_bind)?;
        settings.udp_peers = view
            .list("udp.peers")
            .iter()
            .map(|peer| {
                peer.parse::<SocketAddr>().map_err(|e| {
                    CoreError::malformed("configuration", format!("udp.peers '{}': {}", peer, e))
                })
            })
            .collect::<CoreResult<_>>()?;
        settings.policy = policy(&view)?;
        settings.poll_interval = view.millis_or("worker.poll_ms", DEFAULT_POLL)?;
        settings.heartbeat = HeartbeatConfig {
            period: view.millis_or("heartbeat.period_ms", settings.heartbeat.period)?,
            failure_multiple: view
                .parsed_or("heartbeat.failure_multiple", settings.heartbeat.failure_multiple)?,
        };
        if view.flag_or("persist.enabled", false)? {
            settings.persist = Some(PersistConfig::from_view(&view)?);
        }
        settings.console_output = view.string_or("console.output", DEFAULT_CONSOLE_OUTPUT);

        Ok(settings)
    }
}

fn policy(view: &ConfigView<'_>) -> CoreResult<ReplicationPolicy> {
    let publish =
        PathFilter::from_lists(view.list("store.publish"), view.list("store.non_publish"))?;
    let subscribe =
        PathFilter::from_lists(view.list("store.subscribe"), view.list("store.non_subscribe"))?;
    let pre_get = view
        .list("store.pre_get")
        .iter()
        .map(|p| Pattern::parse(p))
        .collect::<CoreResult<Vec<_>>>()?;

    for pattern in &pre_get {
        if !subscribe.permits(&pattern.prefix()) {
            warn!(%pattern, "pre-get pattern is not subscribed, answers will be rejected");
        }
    }
    Ok(ReplicationPolicy {
        publish,
        subscribe,
        pre_get,
    })
}

/// Open the transport named by `settings`. Memory transports join `bus`.
///
/// # Errors
///
/// Returns `Transport` if a UDP socket cannot be bound
pub async fn open_transport(
    settings: &ComponentSettings,
    bus: &MemoryBus,
) -> CoreResult<Arc<dyn Transport>> {
    match settings.transport {
        TransportKind::Memory => Ok(Arc::new(bus.join(settings.address))),
        TransportKind::Udp => {
            let transport =
                UdpTransport::bind(settings.address, settings.udp_bind, settings.udp_peers.clone())
                    .await?;
            Ok(Arc::new(transport))
        }
    }
}
