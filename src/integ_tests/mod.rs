//! Library-level integration tests, compiled into the lib test binary.
//!
//! Each test owns a `TempDir` data directory, so they run in parallel
//! without coordination.

mod common;
mod test_isolation;
mod test_properties;
mod test_regeneration;
mod test_scenarios;
