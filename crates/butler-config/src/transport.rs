use std::net::SocketAddr;

use serde::Deserialize;

/// Default address for the line-delimited JSON transport
pub const DEFAULT_TRANSPORT_ADDRESS: ([u8; 4], u16) = ([127, 0, 0, 1], 7878);

/// Wire transport endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Address a serving responder listens on
    #[serde(default)]
    pub listen: Option<SocketAddr>,
    /// Address a requester connects to
    #[serde(default)]
    pub connect: Option<SocketAddr>,
}

impl TransportConfig {
    /// Listen address, falling back to the default
    pub fn listen_address(&self) -> SocketAddr {
        self.listen.unwrap_or_else(|| SocketAddr::from(DEFAULT_TRANSPORT_ADDRESS))
    }

    /// Connect address, falling back to the listen address and then the default
    pub fn connect_address(&self) -> SocketAddr {
        self.connect.unwrap_or_else(|| self.listen_address())
    }
}
