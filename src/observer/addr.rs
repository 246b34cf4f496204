use std::{fmt, net::IpAddr, str::FromStr};

use super::error::Error;

/// A canonical `host:port` pair used as the key for channels and topology
/// entries.
///
/// Hosts are lowercased, `localhost` collapses to `127.0.0.1` and literal IPs
/// are re-rendered in their canonical form, so the same peer written two
/// different ways maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr {
    host: String,
    port: u16,
}

impl PeerAddr {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: canonical_host(host),
            port,
        }
    }

    pub fn parse(addr: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidAddress(addr.to_string());
        let (host, port) = addr.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = match host.strip_prefix('[') {
            Some(bracketed) => bracketed.strip_suffix(']').ok_or_else(invalid)?,
            // an unbracketed host with colons is an ambiguous IPv6 literal
            None if host.contains(':') => Err(invalid())?,
            None => host,
        };
        if host.is_empty()
            || host
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '[' | ']' | '@'))
        {
            Err(invalid())?
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The observation address paired with this primary address: same host,
    /// next port up.
    pub fn observation(&self) -> Result<PeerAddr, Error> {
        let port = self
            .port
            .checked_add(1)
            .ok_or_else(|| Error::PortOverflow(self.to_string()))?;
        Ok(Self {
            host: self.host.clone(),
            port,
        })
    }

    /// WebSocket URL of the observation endpoint served at this address.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self)
    }
}

fn canonical_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    if host == "localhost" {
        return "127.0.0.1".into();
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => host,
    }
}

impl FromStr for PeerAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
