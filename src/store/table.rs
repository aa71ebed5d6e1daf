//! Table identifiers
//!
//! The closed set of tables known to the master. The same identifiers are
//! the "table" component of every invalidation tuple.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every table persisted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    // Ownership tree
    Accounts,
    AccountHosts,
    Packages,
    Usernames,
    DisableLog,

    // Principals
    Administrators,
    MasterUsers,

    // Infrastructure
    Hosts,
    IpAddresses,
    NetBinds,
    LinuxServerGroups,

    // Hosting resources
    LinuxAccounts,
    MysqlDatabases,
    MysqlUsers,
    HttpdSites,
    HttpdSiteBinds,
    HttpdSiteUrls,
    HttpdTomcatContexts,
    CreditCards,

    // Foreign subsystems that hold cross-references
    VcsRepositories,
}

impl Table {
    /// All tables, in declaration order
    pub const ALL: [Table; 20] = [
        Table::Accounts,
        Table::AccountHosts,
        Table::Packages,
        Table::Usernames,
        Table::DisableLog,
        Table::Administrators,
        Table::MasterUsers,
        Table::Hosts,
        Table::IpAddresses,
        Table::NetBinds,
        Table::LinuxServerGroups,
        Table::LinuxAccounts,
        Table::MysqlDatabases,
        Table::MysqlUsers,
        Table::HttpdSites,
        Table::HttpdSiteBinds,
        Table::HttpdSiteUrls,
        Table::HttpdTomcatContexts,
        Table::CreditCards,
        Table::VcsRepositories,
    ];

    /// Returns the wire name of the table
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::AccountHosts => "account_hosts",
            Table::Packages => "packages",
            Table::Usernames => "usernames",
            Table::DisableLog => "disable_log",
            Table::Administrators => "administrators",
            Table::MasterUsers => "master_users",
            Table::Hosts => "hosts",
            Table::IpAddresses => "ip_addresses",
            Table::NetBinds => "net_binds",
            Table::LinuxServerGroups => "linux_server_groups",
            Table::LinuxAccounts => "linux_accounts",
            Table::MysqlDatabases => "mysql_databases",
            Table::MysqlUsers => "mysql_users",
            Table::HttpdSites => "httpd_sites",
            Table::HttpdSiteBinds => "httpd_site_binds",
            Table::HttpdSiteUrls => "httpd_site_urls",
            Table::HttpdTomcatContexts => "httpd_tomcat_contexts",
            Table::CreditCards => "credit_cards",
            Table::VcsRepositories => "vcs_repositories",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
