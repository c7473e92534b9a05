//! Concurrent HTTP(S) endpoint monitor.
//!
//! One checker loop per target probes its endpoint on the target's own
//! interval and appends every outcome to Postgres through a bounded pool.
//! The [`monitor::Supervisor`] starts the fleet and stops it as a whole.

pub mod config;
pub mod db;
pub mod monitor;
pub mod version;
