//! Shared sub-resource kinds
//!
//! Infrastructure that is not owned 1:1 by a resource. A row of one of
//! these tables exists only while something references it; reference-ness
//! is always computed by query, never stored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ownership::descriptors;
use crate::store::{RowId, Table};

/// Shared infrastructure types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedKind {
    NetBind,
    IpAddress,
    LinuxServerGroup,
}

impl SharedKind {
    /// Kinds in reclamation order: a kind comes before anything it references
    pub const ALL: [SharedKind; 3] = [
        SharedKind::NetBind,
        SharedKind::LinuxServerGroup,
        SharedKind::IpAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SharedKind::NetBind => "net_bind",
            SharedKind::IpAddress => "ip_address",
            SharedKind::LinuxServerGroup => "linux_server_group",
        }
    }

    pub fn table(&self) -> Table {
        match self {
            SharedKind::NetBind => Table::NetBinds,
            SharedKind::IpAddress => Table::IpAddresses,
            SharedKind::LinuxServerGroup => Table::LinuxServerGroups,
        }
    }

    /// Every (table, column) that can hold a reference to this kind
    pub fn referencers(&self) -> Vec<(Table, &'static str)> {
        let kind = *self;
        let mut found: Vec<(Table, &'static str)> = Vec::new();

        for descriptor in descriptors() {
            for link in descriptor.shared.iter().filter(|link| link.kind == kind) {
                found.push((descriptor.table, link.column));
            }
        }

        for other in SharedKind::ALL {
            for (column, _) in other.links().iter().filter(|(_, target)| *target == kind) {
                found.push((other.table(), *column));
            }
        }

        if kind == SharedKind::IpAddress {
            found.push((Table::Hosts, "primary_ip"));
        }
        found
    }

    /// Shared rows this kind itself references, reclaimed after it
    pub fn links(&self) -> &'static [(&'static str, SharedKind)] {
        match self {
            SharedKind::NetBind => &[("ip_address", SharedKind::IpAddress)],
            SharedKind::IpAddress | SharedKind::LinuxServerGroup => &[],
        }
    }
}

impl fmt::Display for SharedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reference to one shared row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SharedRef {
    pub kind: SharedKind,
    pub id: RowId,
}

impl SharedRef {
    pub fn new(kind: SharedKind, id: RowId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for SharedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

/// Transport protocol of a network binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Tcp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_bind_referencers_come_from_descriptors() {
        let refs = SharedKind::NetBind.referencers();
        assert_eq!(refs, vec![(Table::HttpdSiteBinds, "net_bind")]);
    }

    #[test]
    fn test_ip_address_referencers() {
        let refs = SharedKind::IpAddress.referencers();
        assert!(refs.contains(&(Table::NetBinds, "ip_address")));
        assert!(refs.contains(&(Table::Hosts, "primary_ip")));
    }

    #[test]
    fn test_group_referenced_by_linux_accounts() {
        assert_eq!(
            SharedKind::LinuxServerGroup.referencers(),
            vec![(Table::LinuxAccounts, "group")]
        );
    }

    #[test]
    fn test_protocol_serde() {
        let p: Protocol = serde_json::from_str("\"udp\"").unwrap();
        assert_eq!(p, Protocol::Udp);
        assert_eq!(Protocol::default().as_str(), "tcp");
    }
}
