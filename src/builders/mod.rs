//! Builders that assemble dispatchers from configuration.

pub mod dispatcher_builder;

pub use dispatcher_builder::{build_dispatcher, build_simulated_dispatcher};
