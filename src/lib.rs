// Public API - configuration, vector table, socket setup and the
// verification engine; integration tests drive these directly
pub mod cli;
pub mod config;
pub mod probe;
pub mod vectors;
pub mod verify;
