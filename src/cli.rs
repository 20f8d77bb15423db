use clap::Parser;

/// Echo-server correctness tester: sends a fixed table of payloads and
/// verifies the replies (byte-reversed for UDP, verbatim for TCP)
#[derive(Parser, Debug, Clone)]
#[command(name = "reverb")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IPv4 or IPv6 address of the echo server
    pub target: Option<String>,

    /// Bind to this network interface (required for multicast targets)
    #[arg(short = 'i', long = "interface")]
    pub interface: Option<String>,

    /// Flood mode: send back-to-back without waiting for replies
    #[arg(short = 'F', long = "flood")]
    pub flood: bool,

    /// Forever mode: repeat the whole vector table indefinitely
    #[arg(short = 'e', long = "forever")]
    pub forever: bool,

    /// Use TCP instead of the default UDP
    #[arg(short = 't', long = "tcp")]
    pub tcp: bool,
}

impl Args {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref iface) = self.interface {
            if iface.is_empty() {
                return Err("Interface name cannot be empty".into());
            }
            // IFNAMSIZ on Linux is 16 including null terminator
            if iface.len() > 15 {
                return Err(format!("Interface name too long: {} (max 15 chars)", iface));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let args = Args::parse_from(["reverb", "-F", "-e", "-t", "-i", "eth0", "2001:db8::1"]);
        assert!(args.flood);
        assert!(args.forever);
        assert!(args.tcp);
        assert_eq!(args.interface.as_deref(), Some("eth0"));
        assert_eq!(args.target.as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn test_target_is_optional_at_parse_time() {
        // Missing target is handled by main (usage + invalid-argument exit),
        // not by clap's required-argument error.
        let args = Args::parse_from(["reverb"]);
        assert!(args.target.is_none());
    }

    #[test]
    fn test_interface_name_too_long() {
        let args = Args::parse_from(["reverb", "-i", "averylonginterface0", "::1"]);
        assert!(args.validate().is_err());
    }
}
