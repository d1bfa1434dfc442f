//! PTO observation store
//!
//! Observations record a condition seen on a network path over a time
//! interval. Paths and conditions are stored once and referenced by
//! surrogate id; observations are grouped into observation sets.

pub mod codec;
pub mod condition;
pub mod db;
pub mod model;
pub mod path;
pub mod store;
pub mod tables;

pub use codec::{ObservationReader, read_observations, write_observations};
pub use condition::ConditionCache;
pub use db::{DbError, DbResult, ObsDb};
pub use model::{Condition, Observation, ObservationSet, Path};
pub use path::PathCache;
pub use store::ObservationStore;

/// Media type of the streams read and written by [`codec`]
pub use pto_common::OBSERVATION_MEDIA_TYPE;
