//! blockgrid-scheduler — capability registry, filters, and weighers.
//!
//! Picks the backend pool a volume lands on. The scheduler:
//!
//! - Ingests periodic capability reports into an in-memory registry
//! - Decides which replica owes an outward usage notification
//! - Narrows pool candidates through an ordered filter chain
//! - Ranks (or draws a lottery winner among) the survivors
//!
//! # Architecture
//!
//! ```text
//! PlacementEngine
//!   ├── HostManager (shared registry, one lock scope per mutation)
//!   │     ├── ServiceRegistry (live services, liveness)
//!   │     ├── BackendState ─► PoolState (replaced on every report)
//!   │     ├── notification ledger ─► UsageSink
//!   │     └── TtlCache (project → shard tags) ◄─ ProjectTagSource
//!   ├── FilterHandler (AZ, capacity, capabilities, affinity, ...)
//!   └── WeightHandler
//!         ├── Ordered (normalize, combine, sort)
//!         └── Stochastic (weighted lottery, rotated result)
//! ```

pub mod backend_state;
pub mod collab;
pub mod engine;
pub mod error;
pub mod extra_specs;
pub mod filters;
pub mod host_manager;
pub mod locks;
pub mod ttl_cache;
pub mod usage;
pub mod weights;

pub use backend_state::{BackendInfo, BackendState, PoolState};
pub use collab::{
    ExpressionEvaluator, LogUsageSink, ProjectTagSource, ServiceRegistry, SpecMatcher,
    StoreServiceRegistry, UsageSink, VolumeLookup,
};
pub use engine::PlacementEngine;
pub use error::{SchedulerError, SchedulerResult};
pub use extra_specs::ExtraSpecsMatcher;
pub use filters::{Filter, FilterDeps, FilterHandler, FilterOutcome, FilterTrace};
pub use host_manager::{HostManager, PoolQuery, PoolSummary};
pub use locks::{RegistryLocks, RegistryScope};
pub use ttl_cache::TtlCache;
pub use usage::{UsageKind, UsageRecord, get_usage};
pub use weights::{WeighedPool, WeightHandler, Weigher};
