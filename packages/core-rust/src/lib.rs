//! Wharf Core: queue, message, claim and pool data types, storage errors,
//! validation bounds and the injectable clock.

pub mod clock;
pub mod error;
pub mod types;
pub mod validation;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use types::{
    flavor_of, CatalogEntry, ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, MessageStat,
    Metadata, NewClaim, NewMessage, PoolRecord, PoolUpdate, QueueId, QueueStats, QueueSummary,
    FLAVOR_KEY,
};
