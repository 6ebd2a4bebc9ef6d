//! Primary/replica plumbing.
//!
//! Every successful write on a primary pushes a [`MutationRecord`] onto the
//! shared [`MutationBroadcast`]. A replica issues `sync 0`; the primary's
//! [`SyncCommand`] streams a snapshot of the store followed by whatever it
//! pops from the broadcast. On the replica side [`ReplicaClient`] applies
//! the stream to its own store.
//!
//! [`MutationRecord`]: crate::core::MutationRecord

pub mod broadcast;
pub mod replica;
pub mod sync;

pub use broadcast::{DEFAULT_BROADCAST_CAPACITY, MutationBroadcast};
pub use replica::{Applied, ReplicaClient, ReplicaStats, SlaveofCommand};
pub use sync::SyncCommand;
