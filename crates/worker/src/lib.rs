//! exit1 worker — distributed uptime monitoring worker process.
//!
//! One worker owns one region: every tick it leases the region lock, pulls
//! the due checks, and runs each through the probe → enrich → classify →
//! persist → alert pipeline under a bounded pool.

pub mod aggregator;
pub mod alerts;
pub mod api;
pub mod cli;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod sink;
pub mod state;
