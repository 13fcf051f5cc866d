//! Palisade - Distributed Request Throttling and Abuse Control
//!
//! This crate decides, per incoming HTTP request, whether to admit,
//! throttle, or reject it, based on a sliding time window of prior activity
//! scoped by identity (authenticated user vs. anonymous IP), account tier,
//! and the specific endpoint being called. An independent IP blocklist
//! handles hard denials, decoupled from the rate counters.
//!
//! All mutable state is externalized behind the [`store::CounterStore`]
//! trait, so many limiter instances can run concurrently across replicas as
//! long as they share one store. The flow per request is: blocklist guard,
//! then the tier-level sliding window, then a stricter endpoint-level window
//! when a configured rule matches the route.

pub mod admin;
pub mod blocklist;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
