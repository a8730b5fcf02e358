//! blockgrid-core — scheduler configuration shared by the blockgrid crates.

pub mod config;

pub use config::{ConfigError, SchedulerConfig, ShardConfig, WeightHandlerKind, WeigherConfig};
