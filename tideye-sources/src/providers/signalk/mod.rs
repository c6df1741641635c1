//! Signal K live vessel adapter

pub mod client;
pub mod types;

pub use client::SignalKSource;
