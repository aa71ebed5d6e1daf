//! Create requests
//!
//! One variant per resource type. A request names the parent the new row
//! hangs off, the host it is bound to (if any) and its type-specific
//! fields. Field formats are checked here; uniqueness and reachability are
//! checked inside the transaction.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{MasterError, MasterResult};
use crate::ownership::{ResourceKind, ResourceRef};
use crate::shared::Protocol;
use crate::store::RowId;

/// Request to create one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateRequest {
    Account {
        parent: RowId,
        name: String,
        #[serde(default)]
        hosts: Vec<RowId>,
    },
    Package {
        account: RowId,
        name: String,
    },
    Username {
        package: RowId,
        name: String,
    },
    LinuxAccount {
        username: RowId,
        host: RowId,
        group: String,
        #[serde(default)]
        home: Option<String>,
    },
    MysqlDatabase {
        package: RowId,
        host: RowId,
        name: String,
    },
    MysqlUser {
        username: RowId,
        host: RowId,
    },
    HttpdSite {
        package: RowId,
        host: RowId,
        name: String,
    },
    HttpdSiteBind {
        site: RowId,
        ip_address: String,
        port: u16,
        #[serde(default)]
        protocol: Protocol,
    },
    HttpdSiteUrl {
        site_bind: RowId,
        hostname: String,
    },
    HttpdTomcatContext {
        site: RowId,
        path: String,
    },
    CreditCard {
        account: RowId,
        masked_number: String,
        expiration_month: u8,
        expiration_year: u16,
    },
}

impl CreateRequest {
    /// Type of the resource being created
    pub fn kind(&self) -> ResourceKind {
        match self {
            CreateRequest::Account { .. } => ResourceKind::Account,
            CreateRequest::Package { .. } => ResourceKind::Package,
            CreateRequest::Username { .. } => ResourceKind::Username,
            CreateRequest::LinuxAccount { .. } => ResourceKind::LinuxAccount,
            CreateRequest::MysqlDatabase { .. } => ResourceKind::MysqlDatabase,
            CreateRequest::MysqlUser { .. } => ResourceKind::MysqlUser,
            CreateRequest::HttpdSite { .. } => ResourceKind::HttpdSite,
            CreateRequest::HttpdSiteBind { .. } => ResourceKind::HttpdSiteBind,
            CreateRequest::HttpdSiteUrl { .. } => ResourceKind::HttpdSiteUrl,
            CreateRequest::HttpdTomcatContext { .. } => ResourceKind::HttpdTomcatContext,
            CreateRequest::CreditCard { .. } => ResourceKind::CreditCard,
        }
    }

    /// The existing row the new resource hangs off
    pub fn parent(&self) -> ResourceRef {
        match self {
            CreateRequest::Account { parent, .. } => ResourceRef::new(ResourceKind::Account, *parent),
            CreateRequest::Package { account, .. } | CreateRequest::CreditCard { account, .. } => {
                ResourceRef::new(ResourceKind::Account, *account)
            }
            CreateRequest::Username { package, .. }
            | CreateRequest::MysqlDatabase { package, .. }
            | CreateRequest::HttpdSite { package, .. } => {
                ResourceRef::new(ResourceKind::Package, *package)
            }
            CreateRequest::LinuxAccount { username, .. } | CreateRequest::MysqlUser { username, .. } => {
                ResourceRef::new(ResourceKind::Username, *username)
            }
            CreateRequest::HttpdSiteBind { site, .. } | CreateRequest::HttpdTomcatContext { site, .. } => {
                ResourceRef::new(ResourceKind::HttpdSite, *site)
            }
            CreateRequest::HttpdSiteUrl { site_bind, .. } => {
                ResourceRef::new(ResourceKind::HttpdSiteBind, *site_bind)
            }
        }
    }

    /// Host named directly by the request
    pub fn host(&self) -> Option<RowId> {
        match self {
            CreateRequest::LinuxAccount { host, .. }
            | CreateRequest::MysqlDatabase { host, .. }
            | CreateRequest::MysqlUser { host, .. }
            | CreateRequest::HttpdSite { host, .. } => Some(*host),
            _ => None,
        }
    }

    /// Hosts the new row binds to or, for an account, is granted
    pub fn target_hosts(&self) -> Vec<RowId> {
        match self {
            CreateRequest::Account { hosts, .. } => hosts.clone(),
            _ => self.host().into_iter().collect(),
        }
    }

    /// Check field formats
    pub fn validate(&self) -> MasterResult<()> {
        match self {
            CreateRequest::Account { name, .. } => check(account_name(), "account name", name),
            CreateRequest::Package { name, .. } => check(package_name(), "package name", name),
            CreateRequest::Username { name, .. } => check(username(), "username", name),
            CreateRequest::LinuxAccount { group, home, .. } => {
                check(username(), "group name", group)?;
                match home {
                    Some(home) if !home.starts_with('/') || home.contains("/../") || home.ends_with("/..") => {
                        Err(MasterError::validation(format!(
                            "home directory '{}' must be an absolute path",
                            home
                        )))
                    }
                    _ => Ok(()),
                }
            }
            CreateRequest::MysqlDatabase { name, .. } => check(database_name(), "database name", name),
            CreateRequest::MysqlUser { .. } => Ok(()),
            CreateRequest::HttpdSite { name, .. } => check(site_name(), "site name", name),
            CreateRequest::HttpdSiteBind { port, .. } => {
                if *port == 0 {
                    Err(MasterError::validation("port must be between 1 and 65535"))
                } else {
                    Ok(())
                }
            }
            CreateRequest::HttpdSiteUrl { hostname, .. } => check(hostname_pattern(), "hostname", hostname),
            CreateRequest::HttpdTomcatContext { path, .. } => {
                if path.is_empty() || check(context_path(), "context path", path).is_ok() {
                    Ok(())
                } else {
                    Err(MasterError::validation(format!(
                        "context path '{}' must be empty or start with '/'",
                        path
                    )))
                }
            }
            CreateRequest::CreditCard {
                masked_number,
                expiration_month,
                ..
            } => {
                check(masked_card(), "masked card number", masked_number)?;
                if (1..=12).contains(expiration_month) {
                    Ok(())
                } else {
                    Err(MasterError::validation(format!(
                        "expiration month {} is not between 1 and 12",
                        expiration_month
                    )))
                }
            }
        }
    }
}

/// Fields of a credit card that may be edited
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCardUpdate {
    #[serde(default)]
    pub masked_number: Option<String>,
    #[serde(default)]
    pub expiration_month: Option<u8>,
    #[serde(default)]
    pub expiration_year: Option<u16>,
}

impl CreditCardUpdate {
    pub fn validate(&self) -> MasterResult<()> {
        if let Some(number) = &self.masked_number {
            check(masked_card(), "masked card number", number)?;
        }
        if let Some(month) = self.expiration_month {
            if !(1..=12).contains(&month) {
                return Err(MasterError::validation(format!(
                    "expiration month {} is not between 1 and 12",
                    month
                )));
            }
        }
        Ok(())
    }
}

fn check(pattern: &Regex, what: &str, value: &str) -> MasterResult<()> {
    if pattern.is_match(value) {
        Ok(())
    } else {
        Err(MasterError::validation(format!("invalid {} '{}'", what, value)))
    }
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($re).unwrap_or_else(|e| panic!("bad pattern {}: {}", $re, e)))
        }
    };
}

pattern!(account_name, r"^[A-Z0-9][A-Z0-9_]{1,31}$|^[a-z0-9][a-z0-9_.-]{1,31}$");
pattern!(package_name, r"^[a-z0-9][a-z0-9_.-]{1,31}$");
pattern!(username, r"^[a-z_][a-z0-9_.-]{0,31}$");
pattern!(database_name, r"^[A-Za-z0-9_]{1,64}$");
pattern!(site_name, r"^[a-z0-9][a-z0-9.-]{0,62}$");
pattern!(
    hostname_pattern,
    r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$"
);
pattern!(context_path, r"^(/[A-Za-z0-9_.~-]+)+$");
pattern!(masked_card, r"^[X*]{4}(-?[X*]{4}){2}-?[0-9]{4}$");
