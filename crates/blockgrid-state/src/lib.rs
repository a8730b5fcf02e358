//! blockgrid-state — domain types and embedded state for blockgrid.
//!
//! Holds the data model shared by the scheduler: capability reports and
//! capacity values, request-scoped filter properties, `host@backend#pool`
//! identity helpers, and the persisted service and volume records.
//!
//! # Architecture
//!
//! Records are JSON-serialized into [redb](https://docs.rs/redb) `&[u8]`
//! value columns. The `StateStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod capability;
pub mod error;
pub mod host;
pub mod request;
pub mod store;
pub mod tables;
pub mod types;

pub use capability::{Capacity, CapabilityReport};
pub use error::{StateError, StateResult};
pub use host::{DEFAULT_POOL_NAME, HostLevel, append_pool, extract_host};
pub use request::*;
pub use store::StateStore;
pub use types::*;
