//! Builders to construct scheduler and dispatcher instances from configuration.

pub mod service_builder;

pub use service_builder::{build_services, Services};
