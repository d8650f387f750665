pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use common::SessionId;
pub use error::{Result, StoreError};
pub use event::{CreateMode, EventType, SessionState, Stat, Version, WatchedEvent, WriteRecord};
pub use memory::{DEFAULT_HISTORY_LIMIT, InMemoryCoordinationStore, InMemorySession};
pub use store::{CoordinationStore, CoordinationStoreExt, EventReceiver};
