//! Resource descriptors
//!
//! Every resource type is described by data: how to reach its owning
//! account, how to reach its host, which rows depend on it, which shared
//! infrastructure it references and what blocks its removal. The generic
//! resolver and lifecycle executors only ever read this table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::SharedKind;
use crate::store::{Row, RowExt, RowId, RowSource, Table};

/// Every manageable resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Account,
    Package,
    Username,
    LinuxAccount,
    MysqlDatabase,
    MysqlUser,
    HttpdSite,
    HttpdSiteBind,
    HttpdSiteUrl,
    HttpdTomcatContext,
    CreditCard,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Account,
        ResourceKind::Package,
        ResourceKind::Username,
        ResourceKind::LinuxAccount,
        ResourceKind::MysqlDatabase,
        ResourceKind::MysqlUser,
        ResourceKind::HttpdSite,
        ResourceKind::HttpdSiteBind,
        ResourceKind::HttpdSiteUrl,
        ResourceKind::HttpdTomcatContext,
        ResourceKind::CreditCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Account => "account",
            ResourceKind::Package => "package",
            ResourceKind::Username => "username",
            ResourceKind::LinuxAccount => "linux_account",
            ResourceKind::MysqlDatabase => "mysql_database",
            ResourceKind::MysqlUser => "mysql_user",
            ResourceKind::HttpdSite => "httpd_site",
            ResourceKind::HttpdSiteBind => "httpd_site_bind",
            ResourceKind::HttpdSiteUrl => "httpd_site_url",
            ResourceKind::HttpdTomcatContext => "httpd_tomcat_context",
            ResourceKind::CreditCard => "credit_card",
        }
    }

    /// Parse a wire name such as `httpd_site`
    pub fn from_name(name: &str) -> Option<ResourceKind> {
        ResourceKind::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// The descriptor for this type
    pub fn descriptor(&self) -> &'static ResourceDescriptor {
        // DESCRIPTORS is declared in the same order as ResourceKind::ALL
        &DESCRIPTORS[*self as usize]
    }

    /// The table holding rows of this type
    pub fn table(&self) -> Table {
        self.descriptor().table
    }

    /// Find the resource type stored in `table`
    pub fn for_table(table: Table) -> Option<ResourceKind> {
        DESCRIPTORS.iter().find(|d| d.table == table).map(|d| d.kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reference to one resource row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: RowId,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: RowId) -> Self {
        Self { kind, id }
    }

    pub fn table(&self) -> Table {
        self.kind.table()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

/// One step of a join chain: read `column` and continue in `table`
#[derive(Debug, Clone, Copy)]
pub struct Hop {
    pub column: &'static str,
    pub table: Table,
}

/// Join chain to the row carrying the host column
#[derive(Debug, Clone, Copy)]
pub struct HostPath {
    pub hops: &'static [Hop],
    pub column: &'static str,
}

/// What a dependent category holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentRows {
    /// Resources removed through their own descriptor
    Resource(ResourceKind),
    /// Plain rows deleted as-is
    Rows(Table),
}

impl DependentRows {
    pub fn table(&self) -> Table {
        match self {
            DependentRows::Resource(kind) => kind.table(),
            DependentRows::Rows(table) => *table,
        }
    }
}

/// Rows referencing the resource through `column`
#[derive(Debug, Clone, Copy)]
pub struct Dependent {
    pub rows: DependentRows,
    pub column: &'static str,
}

/// Reference from a resource column to shared infrastructure
#[derive(Debug, Clone, Copy)]
pub struct SharedLink {
    pub column: &'static str,
    pub kind: SharedKind,
}

/// Returns a reason when `row` must not be removed
pub type RemovalGuard = fn(&dyn RowSource, RowId, &Row) -> Option<String>;

/// Declarative description of one resource type
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub table: Table,
    /// Join chain ending at the owning account row
    pub owner: &'static [Hop],
    /// Join chain to the host column; `None` for unbound types
    pub host: Option<HostPath>,
    /// Dependent categories, removed in this order before the row itself
    pub dependents: &'static [Dependent],
    pub shared: &'static [SharedLink],
    pub guards: &'static [RemovalGuard],
    /// Whether rows carry a `disable_log` column
    pub disableable: bool,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("owner", &self.owner)
            .field("host", &self.host)
            .field("dependents", &self.dependents)
            .field("shared", &self.shared)
            .field("guards", &self.guards.len())
            .field("disableable", &self.disableable)
            .finish()
    }
}

const TO_ACCOUNT: Hop = Hop { column: "account", table: Table::Accounts };
const TO_PACKAGE: Hop = Hop { column: "package", table: Table::Packages };
const TO_USERNAME: Hop = Hop { column: "username", table: Table::Usernames };
const TO_SITE: Hop = Hop { column: "site", table: Table::HttpdSites };
const TO_SITE_BIND: Hop = Hop { column: "site_bind", table: Table::HttpdSiteBinds };

const OWN_HOST: HostPath = HostPath { hops: &[], column: "host" };
const SITE_HOST: HostPath = HostPath { hops: &[TO_SITE], column: "host" };

static DESCRIPTORS: [ResourceDescriptor; 11] = [
    ResourceDescriptor {
        kind: ResourceKind::Account,
        table: Table::Accounts,
        owner: &[],
        host: None,
        dependents: &[
            Dependent { rows: DependentRows::Resource(ResourceKind::Package), column: "account" },
            Dependent { rows: DependentRows::Resource(ResourceKind::CreditCard), column: "account" },
            Dependent { rows: DependentRows::Rows(Table::Administrators), column: "account" },
            Dependent { rows: DependentRows::Rows(Table::AccountHosts), column: "account" },
        ],
        shared: &[],
        guards: &[guard_sub_accounts],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::Package,
        table: Table::Packages,
        owner: &[TO_ACCOUNT],
        host: None,
        dependents: &[
            Dependent { rows: DependentRows::Resource(ResourceKind::HttpdSite), column: "package" },
            Dependent { rows: DependentRows::Resource(ResourceKind::MysqlDatabase), column: "package" },
            Dependent { rows: DependentRows::Resource(ResourceKind::Username), column: "package" },
        ],
        shared: &[],
        guards: &[],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::Username,
        table: Table::Usernames,
        owner: &[TO_PACKAGE, TO_ACCOUNT],
        host: None,
        dependents: &[
            Dependent { rows: DependentRows::Resource(ResourceKind::LinuxAccount), column: "username" },
            Dependent { rows: DependentRows::Resource(ResourceKind::MysqlUser), column: "username" },
        ],
        shared: &[],
        guards: &[],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::LinuxAccount,
        table: Table::LinuxAccounts,
        owner: &[TO_USERNAME, TO_PACKAGE, TO_ACCOUNT],
        host: Some(OWN_HOST),
        dependents: &[],
        shared: &[SharedLink { column: "group", kind: SharedKind::LinuxServerGroup }],
        guards: &[guard_vcs_in_home],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::MysqlDatabase,
        table: Table::MysqlDatabases,
        owner: &[TO_PACKAGE, TO_ACCOUNT],
        host: Some(OWN_HOST),
        dependents: &[],
        shared: &[],
        guards: &[],
        disableable: false,
    },
    ResourceDescriptor {
        kind: ResourceKind::MysqlUser,
        table: Table::MysqlUsers,
        owner: &[TO_USERNAME, TO_PACKAGE, TO_ACCOUNT],
        host: Some(OWN_HOST),
        dependents: &[],
        shared: &[],
        guards: &[],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::HttpdSite,
        table: Table::HttpdSites,
        owner: &[TO_PACKAGE, TO_ACCOUNT],
        host: Some(OWN_HOST),
        dependents: &[
            Dependent { rows: DependentRows::Resource(ResourceKind::HttpdTomcatContext), column: "site" },
            Dependent { rows: DependentRows::Resource(ResourceKind::HttpdSiteBind), column: "site" },
        ],
        shared: &[],
        guards: &[],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::HttpdSiteBind,
        table: Table::HttpdSiteBinds,
        owner: &[TO_SITE, TO_PACKAGE, TO_ACCOUNT],
        host: Some(SITE_HOST),
        dependents: &[
            Dependent { rows: DependentRows::Resource(ResourceKind::HttpdSiteUrl), column: "site_bind" },
        ],
        shared: &[SharedLink { column: "net_bind", kind: SharedKind::NetBind }],
        guards: &[],
        disableable: true,
    },
    ResourceDescriptor {
        kind: ResourceKind::HttpdSiteUrl,
        table: Table::HttpdSiteUrls,
        owner: &[TO_SITE_BIND, TO_SITE, TO_PACKAGE, TO_ACCOUNT],
        host: Some(HostPath { hops: &[TO_SITE_BIND, TO_SITE], column: "host" }),
        dependents: &[],
        shared: &[],
        guards: &[],
        disableable: false,
    },
    ResourceDescriptor {
        kind: ResourceKind::HttpdTomcatContext,
        table: Table::HttpdTomcatContexts,
        owner: &[TO_SITE, TO_PACKAGE, TO_ACCOUNT],
        host: Some(SITE_HOST),
        dependents: &[],
        shared: &[],
        guards: &[],
        disableable: false,
    },
    ResourceDescriptor {
        kind: ResourceKind::CreditCard,
        table: Table::CreditCards,
        owner: &[TO_ACCOUNT],
        host: None,
        dependents: &[],
        shared: &[],
        guards: &[],
        disableable: false,
    },
];

/// All descriptors
pub fn descriptors() -> &'static [ResourceDescriptor] {
    &DESCRIPTORS
}

fn guard_sub_accounts(src: &dyn RowSource, id: RowId, _row: &Row) -> Option<String> {
    src.referencing(Table::Accounts, "parent", id)
        .first()
        .map(|child| format!("account #{} still has sub-account #{}", id, child))
}

fn guard_vcs_in_home(src: &dyn RowSource, id: RowId, row: &Row) -> Option<String> {
    let home = row.text("home")?.trim_end_matches('/');
    let host = row.ref_id("host");

    src.rows(Table::VcsRepositories)
        .filter(|(_, repo)| repo.ref_id("host") == host)
        .filter_map(|(_, repo)| repo.text("path"))
        .find(|path| *path == home || path.starts_with(&format!("{}/", home)))
        .map(|path| {
            format!(
                "linux_account #{} has version-control repository {} in its home directory",
                id, path
            )
        })
}
