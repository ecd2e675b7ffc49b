//! Port mapping parsing
//!
//! Short syntax is `[ip:][host[-end]:]container[-end][/protocol]`, with IPv6
//! host addresses written in brackets (`[::1]:8080:80`).

use super::config::{PortConfig, PortValue};
use crate::error::{BerthError, Result};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Transport protocol of a port mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "sctp" => Ok(Protocol::Sctp),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Sctp => write!(f, "sctp"),
        }
    }
}

/// Inclusive port range; a single port has `start == end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Number of ports covered
    pub fn len(&self) -> usize {
        usize::from(self.end.saturating_sub(self.start)) + 1
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }

    fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.split_once('-') {
            Some((start, end)) => {
                let range = Self {
                    start: parse_port(start)?,
                    end: parse_port(end)?,
                };
                if range.start > range.end {
                    return Err(format!("port range '{}' is reversed", s));
                }
                Ok(range)
            }
            None => Ok(Self::single(parse_port(s)?)),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("empty port".to_string());
    }
    let value: u64 = trimmed
        .parse()
        .map_err(|_| format!("'{}' is not a port number", trimmed))?;
    port_from_number(value)
}

fn port_from_number(value: u64) -> std::result::Result<u16, String> {
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(format!("port {} is out of range 1-65535", value)),
    }
}

/// A resolved host-to-container port mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// Host address to bind to; all addresses when absent
    pub host_ip: Option<IpAddr>,
    /// Host port(s); an ephemeral port is chosen by the engine when absent
    pub published: Option<PortRange>,
    /// Container port(s)
    pub target: PortRange,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Parse a short-syntax port mapping
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err("empty port mapping".to_string());
        }

        let (addr, protocol) = match spec.rsplit_once('/') {
            Some((addr, proto)) => (addr, proto.parse()?),
            None => (spec, Protocol::Tcp),
        };

        let (host_ip, rest) = if let Some(stripped) = addr.strip_prefix('[') {
            let (ip, rest) = stripped
                .split_once("]:")
                .ok_or_else(|| "unterminated IPv6 address".to_string())?;
            (Some(parse_ip(ip)?), Some(rest))
        } else {
            (None, None)
        };

        let parts: Vec<&str> = match rest {
            Some(rest) => rest.split(':').collect(),
            None => addr.split(':').collect(),
        };

        let (host_ip, published, target) = match (host_ip, parts.as_slice()) {
            (None, [target]) => (None, None, *target),
            (ip, [published, target]) => (ip, non_empty(published), *target),
            (None, [ip, published, target]) => {
                (Some(parse_ip(ip)?), non_empty(published), *target)
            }
            _ => {
                return Err(
                    "expected [ip:][host:]container; wrap IPv6 addresses in brackets".to_string(),
                )
            }
        };

        let mapping = Self {
            host_ip,
            published: published.map(PortRange::parse).transpose()?,
            target: PortRange::parse(target)?,
            protocol,
        };
        mapping.check_ranges()?;
        Ok(mapping)
    }

    /// Resolve any accepted port syntax for the named service
    pub fn from_config(service: &str, config: &PortConfig) -> Result<Self> {
        let invalid = |reason: String| BerthError::InvalidPort {
            service: service.to_string(),
            spec: config.to_string(),
            reason,
        };

        match config {
            PortConfig::Short(spec) => Self::parse(spec).map_err(invalid),
            PortConfig::Number(port) => Ok(Self {
                host_ip: None,
                published: None,
                target: PortRange::single(port_from_number(*port).map_err(invalid)?),
                protocol: Protocol::Tcp,
            }),
            PortConfig::Long(long) => {
                let published = match &long.published {
                    Some(PortValue::Number(n)) => {
                        Some(PortRange::single(port_from_number(*n).map_err(invalid)?))
                    }
                    Some(PortValue::Text(s)) if !s.trim().is_empty() => {
                        Some(PortRange::parse(s).map_err(invalid)?)
                    }
                    _ => None,
                };
                let mapping = Self {
                    host_ip: long
                        .host_ip
                        .as_deref()
                        .map(parse_ip)
                        .transpose()
                        .map_err(invalid)?,
                    published,
                    target: PortRange::single(port_from_number(long.target).map_err(invalid)?),
                    protocol: long
                        .protocol
                        .as_deref()
                        .map(str::parse::<Protocol>)
                        .transpose()
                        .map_err(invalid)?
                        .unwrap_or_default(),
                };
                mapping.check_ranges().map_err(invalid)?;
                Ok(mapping)
            }
        }
    }

    fn check_ranges(&self) -> std::result::Result<(), String> {
        if let Some(published) = self.published {
            if published.len() != self.target.len() && !self.target.is_single() {
                return Err(format!(
                    "host range {} and container range {} differ in size",
                    published, self.target
                ));
            }
        }
        Ok(())
    }

    /// Host ports this mapping binds, if any
    pub fn host_ports(&self) -> Vec<u16> {
        match self.published {
            // a host range with a single container port binds one port from the range
            Some(range) if self.target.is_single() && !range.is_single() => Vec::new(),
            Some(range) => range.ports().collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host_ip {
            Some(IpAddr::V6(ip)) => write!(f, "[{}]:", ip)?,
            Some(IpAddr::V4(ip)) => write!(f, "{}:", ip)?,
            None => {}
        }
        match self.published {
            Some(published) => write!(f, "{}:", published)?,
            None if self.host_ip.is_some() => write!(f, ":")?,
            None => {}
        }
        write!(f, "{}/{}", self.target, self.protocol)
    }
}

fn parse_ip(s: &str) -> std::result::Result<IpAddr, String> {
    s.parse()
        .map_err(|_| format!("'{}' is not a valid IP address", s))
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::config::PortConfigLong;

    #[test]
    fn test_parse_host_container() {
        let m = PortMapping::parse("8080:80").unwrap();
        assert_eq!(m.published, Some(PortRange::single(8080)));
        assert_eq!(m.target, PortRange::single(80));
        assert_eq!(m.protocol, Protocol::Tcp);
        assert_eq!(m.host_ports(), vec![8080]);
        assert_eq!(m.to_string(), "8080:80/tcp");
    }

    #[test]
    fn test_parse_container_only() {
        let m = PortMapping::parse("5432").unwrap();
        assert_eq!(m.published, None);
        assert!(m.host_ports().is_empty());
        assert_eq!(m.to_string(), "5432/tcp");
    }

    #[test]
    fn test_parse_ip_and_protocol() {
        let m = PortMapping::parse("127.0.0.1:5353:53/udp").unwrap();
        assert_eq!(m.host_ip, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(m.protocol, Protocol::Udp);
        assert_eq!(m.to_string(), "127.0.0.1:5353:53/udp");

        let m = PortMapping::parse("127.0.0.1::80").unwrap();
        assert_eq!(m.published, None);
        assert_eq!(m.to_string(), "127.0.0.1::80/tcp");
    }

    #[test]
    fn test_parse_ipv6() {
        let m = PortMapping::parse("[::1]:8080:80").unwrap();
        assert_eq!(m.host_ip, Some("::1".parse().unwrap()));
        assert_eq!(m.to_string(), "[::1]:8080:80/tcp");

        assert!(PortMapping::parse("::1:8080:80").is_err());
    }

    #[test]
    fn test_parse_ranges() {
        let m = PortMapping::parse("9000-9002:9000-9002").unwrap();
        assert_eq!(m.host_ports(), vec![9000, 9001, 9002]);

        let m = PortMapping::parse("9000-9002:80").unwrap();
        assert!(m.host_ports().is_empty());

        let err = PortMapping::parse("9000-9002:80-81").unwrap_err();
        assert!(err.contains("differ in size"), "{}", err);
        assert!(PortMapping::parse("9002-9000:80").is_err());
    }

    #[test]
    fn test_rejects_bad_ports() {
        assert!(PortMapping::parse("0:80").is_err());
        assert!(PortMapping::parse("70000:80").is_err());
        assert!(PortMapping::parse("web:80").is_err());
        assert!(PortMapping::parse("80/icmp").is_err());
        assert!(PortMapping::parse("").is_err());
    }

    #[test]
    fn test_from_config_names_service() {
        let err = PortMapping::from_config("app", &PortConfig::Short("80:x".to_string()))
            .unwrap_err();
        assert_eq!(err.service(), Some("app"));
        assert!(err.to_string().contains("'80:x'"));

        let err = PortMapping::from_config("app", &PortConfig::Number(0)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_from_long_config() {
        let long = PortConfig::Long(PortConfigLong {
            target: 80,
            published: Some(PortValue::Number(8080)),
            host_ip: Some("0.0.0.0".to_string()),
            protocol: Some("UDP".to_string()),
        });
        let m = PortMapping::from_config("web", &long).unwrap();
        assert_eq!(m.to_string(), "0.0.0.0:8080:80/udp");
    }
}
