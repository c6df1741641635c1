//! Concrete source adapters
//!
//! Implementations of the source traits for the services a Tideye
//! deployment talks to.

pub mod aishub;
pub mod influx;
pub mod signalk;

pub use aishub::AisHubRegistry;
pub use influx::InfluxSource;
pub use signalk::SignalKSource;
