//! Proxy configuration.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use danmu_core::AdapterConfig;
use serde::{Deserialize, Serialize};

use crate::ca::CaManager;
use crate::domains::{HostAllowList, DOUYIN_HOSTS};
use crate::error::{CaManagerError, ConfigError};
use crate::DEFAULT_PROXY_PORT;

/// Responses declaring a larger body than this are streamed (1 MiB).
pub const DEFAULT_STREAM_LARGE_BODIES: u64 = 1024 * 1024;

/// Proxy server configuration.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address to bind the proxy to.
    pub listen_addr: SocketAddr,
    /// Skip upstream certificate verification.
    pub insecure_upstream: bool,
    /// Content-length above which a response is never buffered.
    pub stream_large_bodies: u64,
    /// Hosts whose TLS traffic is decrypted; empty means all.
    pub allowed_hosts: Vec<String>,
    /// CA directory; `None` uses the platform data directory.
    pub ca_dir: Option<PathBuf>,
    /// URL markers for the push channel and enter-room endpoint.
    pub adapter: AdapterConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PROXY_PORT)),
            insecure_upstream: true,
            stream_large_bodies: DEFAULT_STREAM_LARGE_BODIES,
            allowed_hosts: DOUYIN_HOSTS.iter().map(|h| h.to_string()).collect(),
            ca_dir: None,
            adapter: AdapterConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Loads a JSON config file. Missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the port, keeping the configured IP.
    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_addr.set_port(port);
        self
    }

    pub fn with_insecure_upstream(mut self, insecure: bool) -> Self {
        self.insecure_upstream = insecure;
        self
    }

    pub fn with_stream_large_bodies(mut self, bytes: u64) -> Self {
        self.stream_large_bodies = bytes;
        self
    }

    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ca_dir(mut self, ca_dir: impl Into<PathBuf>) -> Self {
        self.ca_dir = Some(ca_dir.into());
        self
    }

    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }

    /// CA manager for the configured directory.
    pub fn ca_manager(&self) -> Result<CaManager, CaManagerError> {
        match &self.ca_dir {
            Some(dir) => Ok(CaManager::new(dir)),
            None => CaManager::with_default_dir(),
        }
    }

    pub fn host_allow_list(&self) -> HostAllowList {
        HostAllowList::new(&self.allowed_hosts)
    }
}
