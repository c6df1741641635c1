//! InfluxDB v2 time-series adapter
//!
//! Issues Flux queries over the HTTP query API and decodes the CSV result.

pub mod client;
pub mod csv_rows;
pub mod types;

pub use client::InfluxSource;
