//! Redb table definitions for the observation database.

use redb::TableDefinition;

/// Sequence name → next id to hand out
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// Surrogate keys
pub const PATHS: TableDefinition<u64, &str> = TableDefinition::new("paths");
// Key: path string, Value: first id registered for it
pub const PATH_INDEX: TableDefinition<&str, u64> = TableDefinition::new("path_index");
pub const CONDITIONS: TableDefinition<u64, &str> = TableDefinition::new("conditions");
pub const CONDITION_INDEX: TableDefinition<&str, u64> = TableDefinition::new("condition_index");

// Key: set id, Value: bincode-encoded StoredSet
pub const OBSERVATION_SETS: TableDefinition<u64, &[u8]> = TableDefinition::new("observation_sets");
// Key: observation id, Value: bincode-encoded StoredObservation
pub const OBSERVATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("observations");
// Key: (set id, observation id)
pub const SET_OBSERVATIONS: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("set_observations");

pub const SEQ_PATHS: &str = "paths";
pub const SEQ_CONDITIONS: &str = "conditions";
pub const SEQ_OBSERVATION_SETS: &str = "observation_sets";
pub const SEQ_OBSERVATIONS: &str = "observations";
