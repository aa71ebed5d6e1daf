//! # Shared Infrastructure
//!
//! Network bindings, IP addresses and linux server groups: allocated on
//! demand by lookup-or-allocate and reclaimed by existence query once the
//! last referencing resource is gone.

mod allocator;
mod kind;
mod reclaim;

pub use allocator::{acquire_ip_address, acquire_linux_group, acquire_net_bind};
pub use kind::{Protocol, SharedKind, SharedRef};
pub use reclaim::{is_referenced, reclaim_if_unused, sweep, SweepReport, PINNED};
