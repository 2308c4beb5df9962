pub mod api;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod rates;
pub mod readings;
pub mod reconcile;
pub mod sinks;
pub mod sources;
pub mod stats;
pub mod transform;
pub mod windows;

pub use pipeline::{Envelope, Pipeline};
pub use stats::{EnergyStatsReport, EnergyStatsService};
