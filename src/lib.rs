//! `ctxtrace`: records kernel context switches into a persistent
//! shared-memory log that an external visualizer can read live.
//!
//! The binary (`src/main.rs`) wires these modules together; this
//! library surface exists so integration tests can construct and drive
//! a [`publisher::Publisher`] directly, without a live kernel probe.

pub mod cache;
pub mod config;
pub mod consumer;
pub mod identity;
pub mod log_entry;
pub mod probe;
pub mod publisher;
pub mod shared_log;
pub mod signals;
