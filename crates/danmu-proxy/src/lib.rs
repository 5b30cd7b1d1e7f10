//! Danmu Proxy - MITM proxy binding for the Douyin webcast decoder.
//!
//! Terminates TLS for Douyin hosts, hands enter-room responses and push
//! WebSocket frames to [`danmu_core::InterceptionAdapter`], and forwards all
//! traffic unchanged.
//!
//! ## Architecture
//!
//! ```text
//! CONNECT ─► allowed host? ─ no ─► tunnel
//!                 │ yes
//!                 ▼
//!          TLS termination (CA)
//!                 │
//!      ┌──────────┴──────────┐
//!      ▼                     ▼
//!  HTTP response        WebSocket frame
//!  (enter_room only)    (server → client)
//!      │                     │
//!      └──────► adapter ◄────┘ ─► DY_DATA lines on stdout
//! ```

mod ca;
mod config;
mod domains;
mod error;
mod handler;
mod proxy;
mod tls;

/// Default proxy port.
pub const DEFAULT_PROXY_PORT: u16 = 8081;

pub use ca::{CaManager, CaManagerError};
pub use config::{ProxyConfig, DEFAULT_STREAM_LARGE_BODIES};
pub use domains::{HostAllowList, HostPattern, DOUYIN_HOSTS};
pub use error::{ConfigError, ProxyError, Result};
pub use handler::WebcastHandler;
pub use proxy::{ProxyHandle, ProxyServer};
pub use tls::{upstream_connector, UpstreamConnector};
