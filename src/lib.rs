//! Client core for a remote document-processing task queue: typed HTTP
//! clients, a polling sync store that publishes queue state, and the
//! notification sinks the CLI reports through.

pub mod core;
pub mod notify;
pub mod telemetry;
pub mod ui;
