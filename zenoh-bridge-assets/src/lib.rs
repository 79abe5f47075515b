//! Zenoh bridge for asset-tracking telemetry.
//!
//! This bridge polls a remote asset-location API and publishes each tracked
//! asset's current state to Zenoh as a discrete message, tagged with routing
//! metadata for downstream filtering.
//!
//! # Key Expressions
//!
//! ```text
//! tracksight/assets/<output>          - asset messages (fixed output channel)
//! tracksight/assets/@/status          - bridge status (running/offline)
//! ```
//!
//! The bridge runs unattended and fails fast: when the bus connection reaches
//! a state it cannot recover from, the process shuts down cleanly and relies
//! on an external supervisor to restart it.

pub mod bus;
pub mod config;
pub mod poller;
pub mod runner;
pub mod source;
pub mod status;
