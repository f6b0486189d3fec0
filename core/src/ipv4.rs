//! IPv4-only address math. Anything that is not dotted-quad IPv4 is treated
//! as "not an address" by callers and dropped from set algebra.

use ipnet::{IpNet, Ipv4Net};
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::ValidationError;

/// Smallest prefix length accepted for an expected-asset CIDR (65,536 addresses).
pub const MIN_BASELINE_PREFIX: u8 = 16;

pub fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    s.trim().parse::<Ipv4Addr>().ok()
}

/// Numeric order for parseable IPv4 strings; everything else sorts after, lexicographically.
pub fn compare_ips(a: &str, b: &str) -> Ordering {
    match (parse_ipv4(a), parse_ipv4(b)) {
        (Some(x), Some(y)) => u32::from(x).cmp(&u32::from(y)).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// `a.b.c.0/24` bucket for an address.
pub fn slash24_key(ip: Ipv4Addr) -> String {
    let o = ip.octets();
    format!("{}.{}.{}.0/24", o[0], o[1], o[2])
}

/// A single IPv4 address or an IPv4 network, as written in scope rules and baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ipv4Target {
    Addr(Ipv4Addr),
    Net(Ipv4Net),
}

impl Ipv4Target {
    /// Parse an address or CIDR. Host bits in a CIDR are kept; see [`Ipv4Target::canonical`].
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let t = raw.trim();
        if t.contains('/') {
            match t.parse::<IpNet>() {
                Ok(IpNet::V4(n)) => Ok(Ipv4Target::Net(n)),
                Ok(IpNet::V6(_)) => Err(ValidationError::Ipv6NotSupported(raw.to_string())),
                Err(_) => Err(ValidationError::InvalidAddress(raw.to_string())),
            }
        } else {
            match t.parse::<IpAddr>() {
                Ok(IpAddr::V4(a)) => Ok(Ipv4Target::Addr(a)),
                Ok(IpAddr::V6(_)) => Err(ValidationError::Ipv6NotSupported(raw.to_string())),
                Err(_) => Err(ValidationError::InvalidAddress(raw.to_string())),
            }
        }
    }

    /// Parse an expected-asset definition: IPv4 only, prefix >= /16, masked to the network address.
    pub fn parse_baseline(raw: &str) -> Result<Self, ValidationError> {
        let target = Self::parse(raw)?;
        if let Ipv4Target::Net(n) = target {
            if n.prefix_len() < MIN_BASELINE_PREFIX {
                return Err(ValidationError::PrefixTooWide {
                    definition: raw.trim().to_string(),
                    prefix: n.prefix_len(),
                    min: MIN_BASELINE_PREFIX,
                });
            }
        }
        Ok(target.canonical())
    }

    pub fn canonical(self) -> Self {
        match self {
            Ipv4Target::Net(n) => Ipv4Target::Net(n.trunc()),
            a => a,
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        match self {
            Ipv4Target::Addr(a) => *a == ip,
            Ipv4Target::Net(n) => n.contains(&ip),
        }
    }

    /// Every address covered, network and broadcast included, as integers.
    pub fn addresses(&self) -> std::ops::RangeInclusive<u32> {
        match self {
            Ipv4Target::Addr(a) => {
                let v = u32::from(*a);
                v..=v
            }
            Ipv4Target::Net(n) => u32::from(n.network())..=u32::from(n.broadcast()),
        }
    }
}

impl fmt::Display for Ipv4Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ipv4Target::Addr(a) => write!(f, "{a}"),
            Ipv4Target::Net(n) => write!(f, "{}/{}", n.addr(), n.prefix_len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address_and_cidr() {
        assert_eq!(Ipv4Target::parse("10.0.0.5").unwrap(), Ipv4Target::Addr(Ipv4Addr::new(10, 0, 0, 5)));
        let net = Ipv4Target::parse(" 10.0.0.0/24 ").unwrap();
        assert!(net.contains(Ipv4Addr::new(10, 0, 0, 200)));
        assert!(!net.contains(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(net.addresses().count(), 256);
    }

    #[test]
    fn ipv6_is_its_own_error() {
        assert!(matches!(Ipv4Target::parse("fe80::1"), Err(ValidationError::Ipv6NotSupported(_))));
        assert!(matches!(Ipv4Target::parse("2001:db8::/32"), Err(ValidationError::Ipv6NotSupported(_))));
        assert!(matches!(Ipv4Target::parse("10.0.0.0/33"), Err(ValidationError::InvalidAddress(_))));
        assert!(matches!(Ipv4Target::parse("host.local"), Err(ValidationError::InvalidAddress(_))));
    }

    #[test]
    fn baseline_is_masked_and_capped() {
        let t = Ipv4Target::parse_baseline("10.1.2.3/24").unwrap();
        assert_eq!(t.to_string(), "10.1.2.0/24");
        assert_eq!(Ipv4Target::parse_baseline("10.0.0.0/16").unwrap().addresses().count(), 65_536);
        let err = Ipv4Target::parse_baseline("10.0.0.0/15").unwrap_err();
        assert!(matches!(err, ValidationError::PrefixTooWide { prefix: 15, min: 16, .. }));
        assert_eq!(Ipv4Target::parse_baseline("10.0.0.9").unwrap().to_string(), "10.0.0.9");
    }

    #[test]
    fn address_range_covers_whole_block() {
        let t = Ipv4Target::parse("10.0.0.0/30").unwrap();
        let ips: Vec<Ipv4Addr> = t.addresses().map(Ipv4Addr::from).collect();
        assert_eq!(ips.len(), 4);
        assert_eq!(ips[0], Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(ips[3], Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn numeric_sort_puts_garbage_last() {
        let mut v = vec!["10.0.0.10", "zzz", "10.0.0.9", "abc", "9.255.255.255"];
        v.sort_by(|a, b| compare_ips(a, b));
        assert_eq!(v, vec!["9.255.255.255", "10.0.0.9", "10.0.0.10", "abc", "zzz"]);
    }

    #[test]
    fn slash24_bucket() {
        assert_eq!(slash24_key(Ipv4Addr::new(192, 168, 7, 42)), "192.168.7.0/24");
    }
}
