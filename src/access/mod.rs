//! # Access Control
//!
//! Principals, action names, permission bits and the resolver deciding
//! whether a principal may perform an action on a resource.

mod action;
mod permission;
mod principal;
mod resolver;

pub use action::{Action, Verb};
pub use permission::{Permission, PermissionPolicy};
pub use principal::{Principal, Role};
pub use resolver::AccessControl;
