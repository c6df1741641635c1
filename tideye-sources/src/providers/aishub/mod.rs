//! AISHub external registry adapter

pub mod client;

pub use client::AisHubRegistry;
