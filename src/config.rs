//! Configuration values passed into discovery and negotiation entry points

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::models::Credential;

/// Default ports probed by the range scanner
pub const DEFAULT_PORTS: [u16; 6] = [80, 8080, 8000, 8899, 9000, 554];

/// Well-known ONVIF device service paths
pub const DEFAULT_SERVICE_PATHS: [&str; 4] = [
    "/onvif/device_service",
    "/onvif/services",
    "/ONVIF/device_service",
    "/onvif-http/services",
];

/// WS-Discovery multicast group
pub const WS_DISCOVERY_GROUP: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_ms),
    )
}

/// Range scanner settings
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub ports: Vec<u16>,
    pub paths: Vec<String>,
    /// Per-probe HTTP timeout
    pub probe_timeout: Duration,
    /// Ceiling on live probe tasks
    pub max_in_flight: usize,
    /// Emit a progress event every N completed probes
    pub progress_interval: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            paths: DEFAULT_SERVICE_PATHS.iter().map(|p| p.to_string()).collect(),
            probe_timeout: env_millis("ONVIF_SCOUT_PROBE_TIMEOUT_MS", 2000),
            max_in_flight: std::env::var("ONVIF_SCOUT_MAX_IN_FLIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(1000),
            progress_interval: 500,
        }
    }
}

/// WS-Discovery probe settings
#[derive(Debug, Clone)]
pub struct MulticastConfig {
    /// Interface name; `None` probes every multicast-capable interface
    pub interface: Option<String>,
    /// Listen window per interface
    pub timeout: Duration,
    pub ttl: u32,
    pub group: SocketAddrV4,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            interface: None,
            timeout: env_millis("ONVIF_SCOUT_MULTICAST_TIMEOUT_MS", 3000),
            ttl: 2,
            group: WS_DISCOVERY_GROUP,
        }
    }
}

/// HTTP client settings for authenticated SOAP calls
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: env_millis("ONVIF_SCOUT_REQUEST_TIMEOUT_MS", 10_000),
            accept_invalid_certs: true,
            user_agent: format!("onvif-scout/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Everything a discovery run needs
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub scan: ScanConfig,
    pub multicast: MulticastConfig,
    pub client: ClientConfig,
    /// Tried in order, first success wins
    pub credentials: Vec<Credential>,
    pub verbose: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            multicast: MulticastConfig::default(),
            client: ClientConfig::default(),
            credentials: default_credentials(),
            verbose: false,
        }
    }
}

/// Factory credentials commonly left on cameras
pub fn default_credentials() -> Vec<Credential> {
    vec![
        Credential::new("admin", "admin"),
        Credential::new("admin", "12345"),
        Credential::new("admin", ""),
        Credential::new("root", "root"),
    ]
}
