//! Client configuration: router endpoint, transport knobs, redirect cap.

use rudp::ConnConfig;
use std::time::Duration;

pub const DEFAULT_ROUTER_HOST: &str = "127.0.0.1";
pub const DEFAULT_ROUTER_PORT: u16 = 3000;

/// Connect + read deadline for the stream path.
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MAX_REDIRECTS: usize = 5;

pub const ROUTER_HOST_ENV: &str = "HTTPC_ROUTER_HOST";
pub const ROUTER_PORT_ENV: &str = "HTTPC_ROUTER_PORT";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Router every datagram is sent to.
    pub router_host: String,
    pub router_port: u16,
    /// Handshake and retransmission parameters of the datagram path.
    pub transport: ConnConfig,
    pub tcp_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            router_host: DEFAULT_ROUTER_HOST.to_string(),
            router_port: DEFAULT_ROUTER_PORT,
            transport: ConnConfig::default(),
            tcp_timeout: DEFAULT_TCP_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `HTTPC_ROUTER_HOST` / `HTTPC_ROUTER_PORT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup(ROUTER_HOST_ENV).filter(|h| !h.trim().is_empty()) {
            config.router_host = host.trim().to_string();
        }
        if let Some(port) = lookup(ROUTER_PORT_ENV) {
            match port.trim().parse::<u16>() {
                Ok(p) => config.router_port = p,
                Err(_) => log::warn!(
                    "[httpc] ignoring {ROUTER_PORT_ENV}={port:?}: not a port number"
                ),
            }
        }
        config
    }

    /// `host:port` of the router, ready for socket address resolution.
    pub fn router_addr(&self) -> String {
        format!("{}:{}", self.router_host, self.router_port)
    }
}
