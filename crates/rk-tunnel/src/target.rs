//! SSH target parsing

use std::fmt;
use std::str::FromStr;

use crate::error::TunnelError;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Parsed `user@host[:port]` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Login user
    pub user: String,
    /// Host name or address, without brackets for IPv6
    pub host: String,
    /// SSH port
    pub port: u16,
}

impl SshTarget {
    /// Create a target from parts
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
        }
    }
}

impl FromStr for SshTarget {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TunnelError::InvalidHostname(s.to_string());

        let (user, rest) = s.rsplit_once('@').ok_or_else(invalid)?;
        if user.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [v6addr] or [v6addr]:port
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_SSH_PORT,
        };

        Ok(Self::new(user, host, port))
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let target: SshTarget = "alice@example.org:2222".parse().unwrap();
        assert_eq!(target, SshTarget::new("alice", "example.org", 2222));
        assert_eq!(target.to_string(), "alice@example.org:2222");
    }

    #[test]
    fn test_parse_default_port() {
        let target: SshTarget = "bob@10.0.0.5".parse().unwrap();
        assert_eq!(target.port, DEFAULT_SSH_PORT);
    }

    #[test]
    fn test_parse_ipv6() {
        let target: SshTarget = "carol@[::1]:2200".parse().unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.port, 2200);
        assert_eq!(target.to_string(), "carol@[::1]:2200");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["example.org", "@host:22", "user@", "user@host:notaport", "user@:22"] {
            assert!(
                matches!(bad.parse::<SshTarget>(), Err(TunnelError::InvalidHostname(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
