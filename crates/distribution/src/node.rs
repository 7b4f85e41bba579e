//! Node identities used by the distribution layer.
//!
//! Nodes are identified by their cluster address. An address is cheap to
//! copy, compare and hash, so bucket records carry it by value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Cluster address of a cache node.
///
/// Newtype over `SocketAddr` so ordering and hashing are those of the
/// underlying address while keeping the domain meaning explicit.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeAddress(pub SocketAddr);

impl NodeAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// IP part of the address, used when exposing owners to clients.
    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for NodeAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node participating in a membership change.
///
/// Keep this struct small and cheap to clone; the subgroup is only
/// meaningful for partitioned-replica clusters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub address: NodeAddress,
    /// Partition (subgroup) name in partitioned-replica mode.
    pub subgroup: Option<String>,
    /// Set by the distribution layer for the first node of a subgroup.
    pub is_coordinator: bool,
}

impl NodeInfo {
    /// Construct a node without subgroup information.
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            subgroup: None,
            is_coordinator: false,
        }
    }

    pub fn with_subgroup(address: NodeAddress, subgroup: impl Into<String>) -> Self {
        Self {
            address,
            subgroup: Some(subgroup.into()),
            is_coordinator: false,
        }
    }

    /// Subgroup name, falling back to the node address for plain partitions.
    pub fn subgroup_or_address(&self) -> String {
        self.subgroup
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: NodeAddress = "10.0.0.1:7800".parse().unwrap();
        assert_eq!(addr.to_string(), "10.0.0.1:7800");
        assert_eq!(addr.port(), 7800);
        assert_eq!(addr.ip().to_string(), "10.0.0.1");
    }

    #[test]
    fn test_ordering_follows_socket_addr() {
        let a: NodeAddress = "10.0.0.1:7800".parse().unwrap();
        let b: NodeAddress = "10.0.0.2:7800".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_subgroup_fallback() {
        let addr: NodeAddress = "10.0.0.1:7800".parse().unwrap();
        assert_eq!(NodeInfo::new(addr).subgroup_or_address(), "10.0.0.1:7800");
        assert_eq!(NodeInfo::with_subgroup(addr, "p1").subgroup_or_address(), "p1");
    }
}
