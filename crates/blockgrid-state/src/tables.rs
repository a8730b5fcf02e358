//! redb table definitions for the blockgrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Shape shared by every table: string key, JSON bytes value.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Service records keyed by `{topic}/{host}`.
pub const SERVICES: JsonTable = TableDefinition::new("services");

/// Volume records keyed by volume UUID.
pub const VOLUMES: JsonTable = TableDefinition::new("volumes");
