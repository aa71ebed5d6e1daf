//! JSON-lines TCP connector
//!
//! One connection per call: the master writes a single request line and
//! reads a single reply line.
//!
//! ```text
//! -> {"id":"…","operation":"rebuild_httpd","args":{…}}
//! <- {"id":"…","ok":true,"result":{…}}
//! <- {"id":"…","ok":false,"error":"…"}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::store::RowId;

use super::connector::{DaemonConnector, DaemonFuture};
use super::errors::{DaemonError, DaemonResult};
use super::operation::DaemonOperation;

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: Uuid,
    operation: DaemonOperation,
    args: &'a Value,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Connector dialing `host → address` over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    addresses: HashMap<RowId, String>,
}

impl TcpConnector {
    pub fn new(addresses: HashMap<RowId, String>) -> Self {
        Self { addresses }
    }

    pub fn address(&self, host: RowId) -> Option<&str> {
        self.addresses.get(&host).map(String::as_str)
    }

    async fn exchange(&self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonResult<Value> {
        let address = self.address(host).ok_or(DaemonError::UnknownHost(host))?;
        let unreachable = |e: std::io::Error| DaemonError::Unreachable {
            host,
            reason: e.to_string(),
        };

        let stream = TcpStream::connect(address).await.map_err(unreachable)?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_string(&Request {
            id: Uuid::new_v4(),
            operation,
            args: &args,
        })
        .map_err(|e| DaemonError::Protocol {
            host,
            reason: e.to_string(),
        })?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await.map_err(unreachable)?;
        writer.flush().await.map_err(unreachable)?;

        let mut lines = BufReader::new(reader).lines();
        let reply = lines
            .next_line()
            .await
            .map_err(unreachable)?
            .ok_or_else(|| DaemonError::Unreachable {
                host,
                reason: "connection closed before reply".to_string(),
            })?;
        let reply: Reply = serde_json::from_str(&reply).map_err(|e| DaemonError::Protocol {
            host,
            reason: e.to_string(),
        })?;

        if reply.ok {
            Ok(reply.result)
        } else {
            Err(DaemonError::Rejected {
                host,
                operation: operation.to_string(),
                message: reply.error.unwrap_or_else(|| "unspecified error".to_string()),
            })
        }
    }
}

impl DaemonConnector for TcpConnector {
    fn call<'a>(&'a self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonFuture<'a> {
        Box::pin(self.exchange(host, operation, args))
    }
}
