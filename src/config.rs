use std::net::IpAddr;
use std::time::Duration;

use crate::cli::Args;

/// Port the echo server listens on
pub const SERVER_PORT: u16 = 4242;
/// Fixed local port for datagram exchanges
pub const CLIENT_PORT: u16 = 8484;
/// Largest supported message: the minimum IPv6 path MTU, guaranteed
/// deliverable without fragmentation on any IPv6-capable path
pub const MAX_PAYLOAD: usize = 1280;
/// How long to wait for each reply
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport used for the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Datagram,
    Stream,
}

/// Endpoint configuration derived once from the target address and CLI
/// flags, immutable afterwards
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Echo server address
    pub target: IpAddr,
    pub transport: Transport,
    /// Interface to pin the socket to, if any
    pub interface: Option<String>,
    /// Whether the target is a multicast group
    pub multicast: bool,
    /// Destination port (the fixed wire port except in test harnesses)
    pub server_port: u16,
    /// Local datagram bind port
    pub client_port: u16,
}

impl EndpointConfig {
    pub fn new(target: IpAddr, args: &Args) -> Self {
        Self {
            target,
            transport: if args.tcp {
                Transport::Stream
            } else {
                Transport::Datagram
            },
            interface: args.interface.clone(),
            multicast: target.is_multicast(),
            server_port: SERVER_PORT,
            client_port: CLIENT_PORT,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.target.is_ipv6()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_config_from_args() {
        let args = Args::parse_from(["reverb", "-t", "127.0.0.1"]);
        let config = EndpointConfig::new("127.0.0.1".parse().unwrap(), &args);

        assert_eq!(config.transport, Transport::Stream);
        assert!(!config.multicast);
        assert!(!config.is_ipv6());
        assert_eq!(config.server_port, SERVER_PORT);
        assert_eq!(config.client_port, CLIENT_PORT);
    }

    #[test]
    fn test_multicast_detection() {
        let args = Args::parse_from(["reverb", "ff02::1"]);
        let config = EndpointConfig::new("ff02::1".parse().unwrap(), &args);

        assert_eq!(config.transport, Transport::Datagram);
        assert!(config.multicast);
        assert!(config.is_ipv6());
    }
}
