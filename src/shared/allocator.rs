//! Lookup-or-allocate for shared infrastructure
//!
//! Two shared rows for the same identifying columns never coexist: every
//! acquire looks for a matching row inside the caller's transaction first
//! and only inserts when none exists.

use std::net::IpAddr;

use serde_json::json;

use crate::errors::{MasterError, MasterResult};
use crate::invalidation::{AccountScope, HostScope};
use crate::lifecycle::UnitOfWork;
use crate::store::{into_row, RowExt, RowId, Table};

use super::kind::Protocol;

fn insert_shared(
    work: &mut UnitOfWork<'_>,
    table: Table,
    host: RowId,
    value: serde_json::Value,
) -> MasterResult<RowId> {
    let id = work.insert(table, into_row(table, value)?)?;
    work.record(table, AccountScope::All, HostScope::One(host));
    Ok(id)
}

/// The IP address row for `address` on `host`
pub fn acquire_ip_address(work: &mut UnitOfWork<'_>, host: RowId, address: &str) -> MasterResult<RowId> {
    let parsed: IpAddr = address
        .parse()
        .map_err(|_| MasterError::validation(format!("'{}' is not an IP address", address)))?;
    let address = parsed.to_string();
    work.rows().require(Table::Hosts, host)?;

    let existing = work
        .rows()
        .rows(Table::IpAddresses)
        .find(|(_, row)| row.ref_id("host") == Some(host) && row.text("address") == Some(address.as_str()))
        .map(|(id, _)| id);

    match existing {
        Some(id) => Ok(id),
        None => insert_shared(
            work,
            Table::IpAddresses,
            host,
            json!({ "host": host, "address": address }),
        ),
    }
}

/// The network binding for (host, address, port, protocol)
pub fn acquire_net_bind(
    work: &mut UnitOfWork<'_>,
    host: RowId,
    ip_address: RowId,
    port: u16,
    protocol: Protocol,
) -> MasterResult<RowId> {
    if port == 0 {
        return Err(MasterError::validation("port must be between 1 and 65535"));
    }
    let ip = work.rows().require(Table::IpAddresses, ip_address)?;
    if ip.ref_id("host") != Some(host) {
        return Err(MasterError::validation(format!(
            "ip_address #{} is not on host #{}",
            ip_address, host
        )));
    }

    let existing = work
        .rows()
        .rows(Table::NetBinds)
        .find(|(_, row)| {
            row.ref_id("host") == Some(host)
                && row.ref_id("ip_address") == Some(ip_address)
                && row.get("port").and_then(|p| p.as_u64()) == Some(u64::from(port))
                && row.text("protocol") == Some(protocol.as_str())
        })
        .map(|(id, _)| id);

    match existing {
        Some(id) => Ok(id),
        None => insert_shared(
            work,
            Table::NetBinds,
            host,
            json!({
                "host": host,
                "ip_address": ip_address,
                "port": port,
                "protocol": protocol.as_str(),
            }),
        ),
    }
}

/// The linux server group `name` on `host`
pub fn acquire_linux_group(work: &mut UnitOfWork<'_>, host: RowId, name: &str) -> MasterResult<RowId> {
    work.rows().require(Table::Hosts, host)?;

    let existing = work
        .rows()
        .rows(Table::LinuxServerGroups)
        .find(|(_, row)| row.ref_id("host") == Some(host) && row.text("name") == Some(name))
        .map(|(id, _)| id);

    match existing {
        Some(id) => Ok(id),
        None => insert_shared(
            work,
            Table::LinuxServerGroups,
            host,
            json!({ "host": host, "name": name }),
        ),
    }
}
