//! IP-range membership check.

use core::{fmt, str::FromStr};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;

/// An IPv4 or IPv6 network in CIDR notation, e.g. `192.0.2.0/24`.
///
/// Host bits in the address are ignored: `192.0.2.7/24` is the same network
/// as `192.0.2.0/24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("expected <address>/<prefix>, got {0:?}")]
    MissingPrefix(String),
    #[error("invalid address {0:?}")]
    Address(String),
    #[error("prefix {prefix} is out of range for {family} (max {max})")]
    Prefix {
        prefix: String,
        family: &'static str,
        max: u8,
    },
}

impl Cidr {
    /// Returns whether `addr` belongs to this network. Addresses of the other
    /// family never match.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

const fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) }
}

const fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CidrError::MissingPrefix(s.to_string()))?;
        let network: IpAddr = addr
            .parse()
            .map_err(|_| CidrError::Address(addr.to_string()))?;
        let (family, max) = match network {
            IpAddr::V4(_) => ("IPv4", 32),
            IpAddr::V6(_) => ("IPv6", 128),
        };
        let prefix = prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= max)
            .ok_or_else(|| CidrError::Prefix {
                prefix: prefix.to_string(),
                family,
                max,
            })?;
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Returns whether at least one address was found and every address lies in
/// one of `ranges`.
pub fn all_within(addrs: &[IpAddr], ranges: &[Cidr]) -> bool {
    !addrs.is_empty()
        && addrs
            .iter()
            .all(|addr| ranges.iter().any(|range| range.contains(*addr)))
}

/// Resolves the domain's A/AAAA records and checks them against `ranges`.
pub async fn check_cidr(resolver: &TokioAsyncResolver, domain: &str, ranges: &[Cidr]) -> bool {
    let addrs: Vec<IpAddr> = match resolver.lookup_ip(domain).await {
        Ok(lookup) => lookup.iter().collect(),
        Err(e) => {
            tracing::debug!("[{domain}] Address lookup failed: {e}");
            return false;
        }
    };

    let ok = all_within(&addrs, ranges);
    tracing::debug!("[{domain}] Checking addresses {addrs:?} against {ranges:?}");
    if !ok {
        tracing::debug!("[{domain}] IP range checkup failed");
    }
    ok
}
