//! Test helpers: in-process HTTP scenarios and throwaway SQLite databases.

#[cfg(feature = "database")]
mod database;
mod scenario;

#[cfg(feature = "database")]
pub use database::TestDb;
pub use scenario::{Scenario, ScenarioAssert, get, post};
