//! Source-address selection for interface-pinned sockets
//!
//! Binding outbound traffic wants a routable address: link-local and
//! auto-configured addresses work but only reach the local segment, so
//! they are used as a last resort (IPv6) or rejected outright (IPv4).

use anyhow::{anyhow, Result};
use pnet::datalink;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Check if an IPv6 address is link-local (fe80::/10)
///
/// Link-local addresses have the first 10 bits set to 1111111010,
/// which means the first segment is in the range 0xfe80-0xfebf.
pub fn is_link_local_ipv6(addr: &Ipv6Addr) -> bool {
    let first_seg = addr.segments()[0];
    (0xfe80..=0xfebf).contains(&first_seg)
}

/// Check if an IPv4 address is link-local (169.254.0.0/16)
pub fn is_link_local_ipv4(addr: &Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 169 && octets[1] == 254
}

/// Pick a source address from a candidate list, preferring routable
/// addresses over link-local ones
///
/// IPv4 candidates must not be unspecified or in 169.254.0.0/16. IPv6
/// candidates must not be unspecified; the first link-local seen is
/// remembered and returned only when nothing routable exists.
pub fn pick_source<I>(candidates: I, ipv6: bool) -> Option<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    let mut link_local: Option<IpAddr> = None;

    for addr in candidates {
        match addr {
            IpAddr::V4(v4) if !ipv6 => {
                if v4.is_unspecified() || is_link_local_ipv4(&v4) {
                    continue;
                }
                return Some(addr);
            }
            IpAddr::V6(v6) if ipv6 => {
                if v6.is_unspecified() {
                    continue;
                }
                if is_link_local_ipv6(&v6) {
                    if link_local.is_none() {
                        link_local = Some(addr);
                    }
                    continue;
                }
                return Some(addr);
            }
            _ => {}
        }
    }

    link_local
}

/// Resolve a source address for binding on the named interface
///
/// Enumerates the host's interface addresses and applies the
/// [`pick_source`] preference order to those matching the name and
/// family. Errors when the interface has no usable address.
pub fn resolve_source_address(name: &str, ipv6: bool) -> Result<IpAddr> {
    let candidates: Vec<IpAddr> = datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.name == name)
        .flat_map(|iface| iface.ips.into_iter().map(|net| net.ip()))
        .collect();

    pick_source(candidates, ipv6).ok_or_else(|| {
        anyhow!(
            "no usable {} source address on interface '{}'",
            if ipv6 { "IPv6" } else { "IPv4" },
            name
        )
    })
}

/// Resolve the OS index of a named interface
///
/// A missing index means the interface name is invalid.
pub fn interface_index(name: &str) -> Option<u32> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .map(|iface| iface.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_ipv6_link_local_detection() {
        let link_local: Ipv6Addr = "fe80::1".parse().unwrap();
        assert!(is_link_local_ipv6(&link_local));

        // Edge of link-local range (febf::)
        let link_local_edge: Ipv6Addr = "febf::1".parse().unwrap();
        assert!(is_link_local_ipv6(&link_local_edge));

        // Global unicast (2000::/3) should NOT be link-local
        let global: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert!(!is_link_local_ipv6(&global));

        // Unique local (fc00::/7) should NOT be link-local
        let ula: Ipv6Addr = "fd00::1".parse().unwrap();
        assert!(!is_link_local_ipv6(&ula));

        // Loopback should NOT be link-local
        let loopback: Ipv6Addr = "::1".parse().unwrap();
        assert!(!is_link_local_ipv6(&loopback));

        // Just outside the range on both sides
        let below_range: Ipv6Addr = "fe7f::1".parse().unwrap();
        assert!(!is_link_local_ipv6(&below_range));

        let above_range: Ipv6Addr = "fec0::1".parse().unwrap();
        assert!(!is_link_local_ipv6(&above_range));
    }

    #[test]
    fn test_ipv4_link_local_detection() {
        assert!(is_link_local_ipv4(&"169.254.0.1".parse().unwrap()));
        assert!(is_link_local_ipv4(&"169.254.255.254".parse().unwrap()));
        assert!(!is_link_local_ipv4(&"169.253.0.1".parse().unwrap()));
        assert!(!is_link_local_ipv4(&"192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn test_prefers_routable_over_link_local() {
        let picked = pick_source(vec![v6("fe80::1"), v6("2001:db8::5")], true);
        assert_eq!(picked, Some(v6("2001:db8::5")));
    }

    #[test]
    fn test_link_local_as_last_resort() {
        let picked = pick_source(vec![v6("::"), v6("fe80::1"), v6("fe80::2")], true);
        // First link-local seen wins the fallback slot
        assert_eq!(picked, Some(v6("fe80::1")));
    }

    #[test]
    fn test_ipv4_link_local_rejected_outright() {
        let picked = pick_source(vec![v4("0.0.0.0"), v4("169.254.10.1")], false);
        assert_eq!(picked, None);
    }

    #[test]
    fn test_family_filter() {
        let picked = pick_source(vec![v6("2001:db8::1"), v4("10.0.0.1")], false);
        assert_eq!(picked, Some(v4("10.0.0.1")));

        let picked = pick_source(vec![v4("10.0.0.1"), v6("2001:db8::1")], true);
        assert_eq!(picked, Some(v6("2001:db8::1")));
    }

    #[test]
    fn test_no_candidates() {
        assert_eq!(pick_source(Vec::new(), true), None);
        assert_eq!(pick_source(vec![v4("0.0.0.0")], false), None);
    }

    #[test]
    fn test_nonexistent_interface() {
        assert!(interface_index("nonexistent_iface_12345").is_none());
        assert!(resolve_source_address("nonexistent_iface_12345", false).is_err());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_loopback_interface_resolves() {
        let interfaces = datalink::interfaces();
        let loopback = match interfaces.iter().find(|iface| iface.is_loopback()) {
            Some(iface) => iface.name.clone(),
            None => {
                eprintln!("Skipping loopback resolver test: no loopback interface visible.");
                return;
            }
        };

        // Loopback carries 127.0.0.1, which the v4 filter accepts
        let addr = resolve_source_address(&loopback, false);
        if let Ok(addr) = addr {
            assert!(addr.is_ipv4());
        }
        assert!(interface_index(&loopback).is_some());
    }
}
