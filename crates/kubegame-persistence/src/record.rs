//! The persisted World record and the operations the reconciler needs on it.

use kube::ResourceExt;
use kubegame_core::{BoxFuture, World, WorldSpec};

use crate::error::StoreResult;

/// Table holding one row per World.
pub const WORLD_TABLE: &str = "worlds";

/// Schema bootstrap for [`WORLD_TABLE`]. `IF NOT EXISTS` keeps two
/// reconciliations racing past the existence check from failing.
pub const CREATE_WORLD_TABLE: &str = "CREATE TABLE IF NOT EXISTS worlds (
    name        TEXT PRIMARY KEY,
    game        TEXT NOT NULL,
    description TEXT NOT NULL
)";

/// Insert keyed on `name`; a duplicate is silently skipped.
pub const INSERT_WORLD: &str = "INSERT INTO worlds (name, game, description) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (name) DO NOTHING";

/// Row written for a World.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldRecord {
    pub name: String,
    pub game: String,
    pub description: String,
}

impl WorldRecord {
    pub fn new(name: &str, spec: &WorldSpec) -> Self {
        Self {
            name: name.to_string(),
            game: spec.game.clone(),
            description: spec.description.clone(),
        }
    }
}

impl From<&World> for WorldRecord {
    fn from(world: &World) -> Self {
        Self::new(&world.name_any(), &world.spec)
    }
}

/// What an insert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same name was already there; nothing was written.
    AlreadyPresent,
}

/// Operations on an open store connection.
pub trait WorldStore: Send + Sync {
    /// Whether `table` exists in the connection's current schema.
    fn table_exists<'a>(&'a self, table: &'a str) -> BoxFuture<'a, StoreResult<bool>>;

    /// Create [`WORLD_TABLE`].
    fn create_world_table(&self) -> BoxFuture<'_, StoreResult<()>>;

    /// Insert `record`, doing nothing if its name is already present.
    fn insert_world<'a>(&'a self, record: &'a WorldRecord)
    -> BoxFuture<'a, StoreResult<InsertOutcome>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_world() {
        let mut world = World::new(
            "w1",
            WorldSpec {
                game: "g1".to_string(),
                description: "d".to_string(),
            },
        );
        world.metadata.namespace = Some("default".to_string());

        assert_eq!(
            WorldRecord::from(&world),
            WorldRecord {
                name: "w1".to_string(),
                game: "g1".to_string(),
                description: "d".to_string(),
            }
        );
    }

    #[test]
    fn insert_statement_ignores_conflicts_on_name() {
        assert!(INSERT_WORLD.contains("ON CONFLICT (name) DO NOTHING"));
        assert!(CREATE_WORLD_TABLE.contains("name        TEXT PRIMARY KEY"));
    }
}
