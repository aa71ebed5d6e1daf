//! # Invalidation
//!
//! Every mutation records (table, account scope, host scope) tuples into the
//! batch of its transaction. Only a committed batch is handed to the
//! [`Broadcaster`], which clears the master's own memoization caches and
//! pushes the tuples to every connected client and daemon whose interest
//! intersects them.

mod batch;
mod broadcaster;
mod cache;
mod errors;
mod subscription;
mod tuple;

pub use batch::InvalidationBatch;
pub use broadcaster::{Broadcaster, FlushReport, SessionInfo, TupleReceiver, TupleSender};
pub use cache::{InvalidationCache, MemoCache};
pub use errors::{InvalidationError, InvalidationResult};
pub use subscription::{Interest, SessionKind};
pub use tuple::{AccountScope, HostScope, InvalidationTuple};
