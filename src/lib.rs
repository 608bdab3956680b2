//! ht-logger library.
//!
//! Serial temperature/humidity acquisition, last-reading cache, periodic
//! persistence and arbitrated history queries. `main.rs` wires these into the
//! host process; everything here is usable (and tested) without hardware.

pub mod arbiter;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod facade;
pub mod logging;
pub mod parser;
pub mod scheduler;
pub mod serial;
pub mod server;
pub mod store;
