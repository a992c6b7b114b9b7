//! TCP liveness probe
//!
//! Treats a host as live when it accepts a TCP connection on the configured
//! port within the probe timeout.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::host::HostKey;
use crate::traits::HostProber;

#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self::new(config.probe_port, config.probe_timeout())
    }
}

#[async_trait]
impl HostProber for TcpProber {
    async fn probe(&self, key: &HostKey) -> Result<()> {
        let addr = SocketAddr::new(key.ip, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(Error::probe(format!("{}: {}", addr, e))),
            Err(_) => Err(Error::probe(format!(
                "{}: no answer within {:?}",
                addr, self.timeout
            ))),
        }
    }

    fn prober_name(&self) -> &'static str {
        "tcp"
    }
}
