//! hostmaster - master server for multi-tenant hosting automation
//!
//! The master owns the authoritative relational store of accounts and the
//! resources they own on managed hosts. It resolves ownership, enforces
//! access, runs the resource lifecycle and broadcasts what every committed
//! change invalidated to connected clients and host daemons.

pub mod access;
pub mod auth;
pub mod cli;
pub mod daemon;
pub mod errors;
pub mod http_server;
pub mod invalidation;
pub mod lifecycle;
pub mod master;
pub mod observability;
pub mod ownership;
pub mod shared;
pub mod store;
