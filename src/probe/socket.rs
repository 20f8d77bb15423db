//! Socket construction, interface pinning and the reply-readiness wait
//!
//! Sockets are configured through socket2 and converted into std types
//! for I/O. Interface binding uses SO_BINDTODEVICE on Linux and
//! IP_BOUND_IF on macOS; the readiness wait drops to libc poll(2), which
//! socket2 has no wrapper for.

use anyhow::{bail, Context, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use crate::config::{EndpointConfig, Transport};
use crate::probe::interface::{interface_index, resolve_source_address};

/// The one socket a verification run owns, released by drop on every
/// exit path
#[derive(Debug)]
pub enum Endpoint {
    Datagram { socket: UdpSocket, server: SocketAddr },
    Stream { stream: TcpStream },
}

/// Outcome of waiting for the socket to become readable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Data is ready on the monitored socket
    Ready,
    /// The timeout elapsed with nothing to read
    TimedOut,
    /// poll signalled the socket without marking it readable
    Stray,
}

fn wildcard(ipv6: bool) -> IpAddr {
    if ipv6 {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    } else {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

/// Bind a socket to a specific network interface
///
/// On Linux, uses SO_BINDTODEVICE which requires CAP_NET_RAW or root.
/// On macOS, uses IP_BOUND_IF with the interface index.
fn bind_to_device(socket: &Socket, name: &str, ipv6: bool) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        let _ = ipv6;
        socket
            .bind_device(Some(name.as_bytes()))
            .with_context(|| format!("failed to bind socket to interface '{}'", name))
    }

    #[cfg(target_os = "macos")]
    {
        use std::num::NonZeroU32;
        let index = interface_index(name)
            .ok_or_else(|| anyhow::anyhow!("Invalid interface {}", name))?;
        let index = NonZeroU32::new(index);
        let bound = if ipv6 {
            socket.bind_device_by_index_v6(index)
        } else {
            socket.bind_device_by_index_v4(index)
        };
        bound.with_context(|| format!("failed to bind socket to interface '{}'", name))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = (socket, ipv6);
        anyhow::bail!(
            "interface binding is not supported on this platform (interface '{}')",
            name
        )
    }
}

/// Create the socket described by `config`, pinned and bound, and for
/// stream transport already connected to the target
///
/// Source-address resolution failure and port-reuse failure are
/// advisories; every other failure is fatal.
pub fn create_endpoint(config: &EndpointConfig) -> Result<Endpoint> {
    if config.multicast && config.interface.is_none() {
        // Checked again here in case a caller skipped CLI validation
        bail!("multicast target {} requires an interface", config.target);
    }

    let ipv6 = config.is_ipv6();
    let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
    let (socket_type, protocol) = match config.transport {
        Transport::Datagram => (Type::DGRAM, Protocol::UDP),
        Transport::Stream => (Type::STREAM, Protocol::TCP),
    };

    let socket = Socket::new(domain, socket_type, Some(protocol)).context("socket")?;

    let mut source: Option<IpAddr> = None;
    if let Some(ref name) = config.interface {
        bind_to_device(&socket, name, ipv6)?;

        if interface_index(name).is_none() {
            bail!("Invalid interface {}", name);
        }

        match resolve_source_address(name, ipv6) {
            Ok(addr) => {
                println!("Binding to {}", addr);
                source = Some(addr);
            }
            Err(e) => {
                eprintln!(
                    "Cannot find suitable source address for interface {}: {}",
                    name, e
                );
            }
        }
    }

    if let Err(e) = socket.set_reuse_port(true) {
        eprintln!("Cannot enable port reuse: {}", e);
    }

    let server = SocketAddr::new(config.target, config.server_port);

    match config.transport {
        Transport::Datagram => {
            let local = SocketAddr::new(source.unwrap_or_else(|| wildcard(ipv6)), config.client_port);
            socket
                .bind(&SockAddr::from(local))
                .with_context(|| format!("bind to {}", local))?;
            Ok(Endpoint::Datagram {
                socket: socket.into(),
                server,
            })
        }
        Transport::Stream => {
            let local = SocketAddr::new(wildcard(ipv6), 0);
            socket
                .bind(&SockAddr::from(local))
                .with_context(|| format!("bind to {}", local))?;
            socket
                .connect(&SockAddr::from(server))
                .with_context(|| format!("connect to {}", server))?;
            Ok(Endpoint::Stream {
                stream: socket.into(),
            })
        }
    }
}

impl Endpoint {
    /// Whether this endpoint exchanges datagrams (whose echoes come back
    /// byte-reversed) rather than a byte stream
    pub fn is_datagram(&self) -> bool {
        matches!(self, Endpoint::Datagram { .. })
    }

    fn raw_fd(&self) -> RawFd {
        match self {
            Endpoint::Datagram { socket, .. } => socket.as_raw_fd(),
            Endpoint::Stream { stream } => stream.as_raw_fd(),
        }
    }

    /// Local address the socket ended up bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Endpoint::Datagram { socket, .. } => socket.local_addr(),
            Endpoint::Stream { stream } => stream.local_addr(),
        }
    }

    /// Transmit one payload: a single atomic send for datagram, a write
    /// loop until the full length is on the wire for stream
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        match self {
            Endpoint::Datagram { socket, server } => {
                socket.send_to(payload, *server).context("send")?;
                Ok(())
            }
            Endpoint::Stream { stream } => {
                let mut pos = 0;
                while pos < payload.len() {
                    let written = stream.write(&payload[pos..]).context("send")?;
                    if written == 0 {
                        bail!("connection closed while sending");
                    }
                    pos += written;
                }
                Ok(())
            }
        }
    }

    /// Read one reply into `buf`: a single receive for datagram, a read
    /// loop until `expected` bytes have arrived for stream
    pub fn recv_reply(&mut self, buf: &mut [u8], expected: usize) -> Result<usize> {
        match self {
            Endpoint::Datagram { socket, .. } => {
                let received = socket.recv(buf).context("recv")?;
                if received == 0 {
                    bail!("empty datagram received");
                }
                Ok(received)
            }
            Endpoint::Stream { stream } => {
                let mut received = 0;
                while received < expected {
                    let n = stream.read(&mut buf[received..]).context("recv")?;
                    if n == 0 {
                        bail!("connection closed while receiving");
                    }
                    received += n;
                }
                Ok(received)
            }
        }
    }
}

/// Block until the endpoint is readable, for at most `timeout`
pub fn await_reply(endpoint: &Endpoint, timeout: Duration) -> Result<Wait> {
    let mut pollfd = libc::pollfd {
        fd: endpoint.raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };

    if ready < 0 {
        return Err(io::Error::last_os_error()).context("poll");
    }
    if ready == 0 {
        return Ok(Wait::TimedOut);
    }
    if pollfd.revents & libc::POLLIN == 0 {
        return Ok(Wait::Stray);
    }
    Ok(Wait::Ready)
}
