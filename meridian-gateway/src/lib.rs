//! Core library for a GraphQL aggregation gateway.
//!
//! The schema crates sitting on top of this library are almost entirely
//! declarative: type definitions and field resolvers that forward to
//! backends. Everything with actual invariants lives here:
//!
//! * [`loader`] — request-scoped, batched, deduplicating data loading, so a
//!   resolution wave costs one backend call per concern instead of one per
//!   field;
//! * [`pagination`] — translation between pagination idioms and assembly of
//!   the standard connection shape, plus draining of fully-enumerated
//!   collections;
//! * [`spec`] and [`response_extensions`] — the directive pipeline that maps
//!   execution errors back to directive-tagged fields and surfaces their
//!   transport status codes in the response `extensions`;
//! * [`services`] — thin clients for the aggregated REST backends;
//! * [`context`] — the per-operation context that scopes all of the above to
//!   a single GraphQL operation.

#![warn(unreachable_pub)]

pub mod configuration;
mod context;
pub mod error;
pub mod graphql;
pub mod json_ext;
pub mod loader;
pub mod pagination;
pub mod response_extensions;
pub mod services;
pub mod spec;

pub use configuration::Configuration;
pub use context::Context;
pub use error::FetchError;
pub use loader::BatchFetch;
pub use loader::BatchLoader;
pub use pagination::Connection;
pub use pagination::ConnectionArgs;
