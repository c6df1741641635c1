//! Tideye Resolver
//!
//! Vessel identity resolution over three tiers of decreasing cost:
//!
//! 1. The cache store, seeded by every earlier resolution
//! 2. The live Signal K server
//! 3. The AISHub registry, behind a persisted one-call-per-interval limit
//!
//! [`IdentityResolver`] drives the tiers; [`BatchProvider`] owns chunking,
//! throttle restarts and the identifier blocklist for the registry tier.

pub mod batch;
pub mod blocklist;
pub mod positions;
pub mod rate_limiter;
pub mod resolver;

pub use batch::BatchProvider;
pub use blocklist::InvalidIdentifiers;
pub use positions::PositionRecorder;
pub use rate_limiter::{RateLimitPermit, RateLimitStatus, RateLimiter};
pub use resolver::{IdentityResolver, Sources};
