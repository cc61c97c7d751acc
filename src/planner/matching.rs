//! Name and address matching for rule selectors.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::error::{PlanError, Result};
use crate::nsx::{Gateway, Segment, VirtualMachine};
use crate::rules::MatchOperator;

/// Objects addressable by display name.
pub trait NamedObject {
    /// Display name used for rule matching.
    fn display_name(&self) -> &str;
}

impl NamedObject for VirtualMachine {
    fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl NamedObject for Segment {
    fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl NamedObject for Gateway {
    fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Selects objects whose display name matches `name` under `operator`.
///
/// Both sides are trimmed and compared case-insensitively. The exact
/// operator stops at the first hit; the substring operators collect
/// every hit in inventory order.
pub fn match_by_name<'a, T: NamedObject>(
    objects: &'a [T],
    name: &str,
    operator: MatchOperator,
) -> Vec<&'a T> {
    let needle = name.trim().to_lowercase();
    let mut found = Vec::new();

    for object in objects {
        let candidate = object.display_name().trim().to_lowercase();
        let hit = match operator {
            MatchOperator::Exact => candidate == needle,
            MatchOperator::StartsWith => candidate.starts_with(&needle),
            MatchOperator::EndsWith => candidate.ends_with(&needle),
            MatchOperator::Contains => candidate.contains(&needle),
        };

        if hit {
            found.push(object);
            if operator == MatchOperator::Exact {
                break;
            }
        }
    }

    found
}

/// One entry of a parsed IP specifier list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpSpec {
    /// A single address.
    Single(IpAddr),
    /// A CIDR network; membership follows usable-host semantics.
    Cidr(IpNetwork),
    /// An inclusive `first-second` address range.
    Range {
        /// Low end of the range.
        first: IpAddr,
        /// High end of the range.
        second: IpAddr,
    },
}

impl IpSpec {
    /// Parses a comma-separated IP specifier list. Entries are single
    /// addresses, CIDR networks, or `first-second` ranges.
    ///
    /// # Errors
    ///
    /// Any malformed entry is fatal: unparsable addresses, networks
    /// with host bits set, ranges with more than one dash, mixed-version
    /// or inverted ranges.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        input
            .split(',')
            .map(|token| Self::parse_token(token.trim()))
            .collect()
    }

    fn parse_token(token: &str) -> Result<Self> {
        if token.contains('-') {
            let parts: Vec<&str> = token.split('-').collect();
            if parts.len() != 2 {
                return Err(PlanError::invalid_ip(token, "a range takes exactly one dash").into());
            }
            if parts.iter().any(|part| part.contains('/')) {
                return Err(
                    PlanError::invalid_ip(token, "range endpoints cannot be networks").into(),
                );
            }
            let first: IpAddr = parts[0].trim().parse().map_err(|_| {
                PlanError::invalid_ip(token, "first range endpoint is not a valid address")
            })?;
            let second: IpAddr = parts[1].trim().parse().map_err(|_| {
                PlanError::invalid_ip(token, "second range endpoint is not a valid address")
            })?;
            if first.is_ipv4() != second.is_ipv4() {
                return Err(
                    PlanError::invalid_ip(token, "range endpoints must share an IP version").into(),
                );
            }
            if first > second {
                return Err(PlanError::invalid_ip(token, "range start exceeds range end").into());
            }
            Ok(Self::Range { first, second })
        } else if token.contains('/') {
            let network: IpNetwork = token
                .parse()
                .map_err(|e: ipnetwork::IpNetworkError| PlanError::invalid_ip(token, e.to_string()))?;
            let aligned = match network {
                IpNetwork::V4(net) => net.ip() == net.network(),
                IpNetwork::V6(net) => net.ip() == net.network(),
            };
            if !aligned {
                return Err(
                    PlanError::invalid_ip(token, "host bits set below the network prefix").into(),
                );
            }
            Ok(Self::Cidr(network))
        } else {
            let addr: IpAddr = token
                .parse()
                .map_err(|_| PlanError::invalid_ip(token, "not a valid IP address"))?;
            Ok(Self::Single(addr))
        }
    }

    /// True when `addr` satisfies this entry. Version mismatches never
    /// match.
    #[must_use]
    pub fn matches(&self, addr: IpAddr) -> bool {
        match self {
            Self::Single(ip) => addr == *ip,
            Self::Cidr(network) => network_hosts(*network, addr),
            Self::Range { first, second } => {
                addr.is_ipv4() == first.is_ipv4() && *first <= addr && addr <= *second
            }
        }
    }
}

impl fmt::Display for IpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(addr) => write!(f, "{addr}"),
            Self::Cidr(network) => write!(f, "{network}"),
            Self::Range { first, second } => write!(f, "{first}-{second}"),
        }
    }
}

/// Usable-host membership for a network. The network and broadcast
/// addresses of an IPv4 network, and the subnet-router address of an
/// IPv6 network, are not hosts unless the prefix leaves no room for
/// the distinction.
fn network_hosts(network: IpNetwork, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpNetwork::V4(net), IpAddr::V4(addr)) => {
            net.contains(addr)
                && (net.prefix() >= 31 || (addr != net.network() && addr != net.broadcast()))
        }
        (IpNetwork::V6(net), IpAddr::V6(addr)) => {
            net.contains(addr) && (net.prefix() >= 127 || addr != net.network())
        }
        _ => false,
    }
}

/// Returns the VMs with at least one eligible interface address
/// satisfying any specifier entry. Loopback addresses are never
/// eligible. Scanning stops at the first hit per VM, so each VM
/// appears at most once.
pub fn match_by_ip<'a>(vms: &'a [VirtualMachine], specs: &[IpSpec]) -> Vec<&'a VirtualMachine> {
    vms.iter()
        .filter(|vm| {
            vm.attachments
                .iter()
                .flat_map(|vif| &vif.ip_address_info)
                .flat_map(|info| &info.ip_addresses)
                .filter(|addr| !addr.is_loopback())
                .any(|addr| specs.iter().any(|spec| spec.matches(*addr)))
        })
        .collect()
}
