//! Helpers shared by the unit and integration tests.

pub mod concurrency;
