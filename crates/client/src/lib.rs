//! HTTP clients for pricewatch.
//!
//! The aggregation client fetches raw per-platform price envelopes, the
//! normalizer turns them into [`pricewatch_core::ProductEntry`] lists,
//! and the tracking client persists comparisons for a signed-in user.

pub mod aggregate;
pub mod normalize;
pub mod tracking;

pub use aggregate::{AggregateClient, AggregateConfig, AggregateError, AggregateRequest, ProductSource};
pub use normalize::{Normalizer, normalize, parse_amount};
pub use tracking::{TrackedProduct, TrackingApi, TrackingClient, TrackingError, TrackingRequest};
