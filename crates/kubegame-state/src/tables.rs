//! redb table definitions for the kubegame object store.

use redb::TableDefinition;

/// Cluster objects keyed by `{kind}/{namespace}/{name}`, JSON values.
pub const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");
