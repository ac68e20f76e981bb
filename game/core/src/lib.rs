//! The authoritative ChronoClash server: the claim grid, the session
//! registry, deterministic event arbitration, the fixed-rate snapshot
//! producer and the termination detector, all driven by a single-threaded
//! poll loop in [`server::GameServer`].

pub mod config;
pub mod events;
pub mod grid;
pub mod server;
pub mod session;
pub mod snapshot;
