//! Operations the master asks host daemons to perform

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::Table;

/// Closed set of daemon operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonOperation {
    SetPassword,
    RebuildHttpd,
    RebuildMysql,
    RebuildLinux,
    RebuildNetwork,
}

impl DaemonOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonOperation::SetPassword => "set_password",
            DaemonOperation::RebuildHttpd => "rebuild_httpd",
            DaemonOperation::RebuildMysql => "rebuild_mysql",
            DaemonOperation::RebuildLinux => "rebuild_linux",
            DaemonOperation::RebuildNetwork => "rebuild_network",
        }
    }

    /// The rebuild a change to `table` calls for, if the table feeds host configuration
    pub fn rebuild_for(table: Table) -> Option<DaemonOperation> {
        match table {
            Table::HttpdSites
            | Table::HttpdSiteBinds
            | Table::HttpdSiteUrls
            | Table::HttpdTomcatContexts => Some(DaemonOperation::RebuildHttpd),
            Table::MysqlDatabases | Table::MysqlUsers => Some(DaemonOperation::RebuildMysql),
            Table::LinuxAccounts | Table::LinuxServerGroups => Some(DaemonOperation::RebuildLinux),
            Table::NetBinds | Table::IpAddresses => Some(DaemonOperation::RebuildNetwork),
            _ => None,
        }
    }
}

impl fmt::Display for DaemonOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_matches_serde() {
        let json = serde_json::to_value(DaemonOperation::RebuildHttpd).unwrap();
        assert_eq!(json, serde_json::json!("rebuild_httpd"));
    }

    #[test]
    fn test_rebuild_mapping() {
        assert_eq!(
            DaemonOperation::rebuild_for(Table::HttpdSiteUrls),
            Some(DaemonOperation::RebuildHttpd)
        );
        assert_eq!(
            DaemonOperation::rebuild_for(Table::NetBinds),
            Some(DaemonOperation::RebuildNetwork)
        );
        assert_eq!(DaemonOperation::rebuild_for(Table::Accounts), None);
        assert_eq!(DaemonOperation::rebuild_for(Table::DisableLog), None);
    }
}
