//! eventscout: streaming multi-source event listings aggregation engine.
//!
//! Routes a resolved location/intent to a set of pluggable sources, fans
//! out bounded-concurrency fetch tasks, streams each source's results the
//! moment they exist, and folds everything into one deduplicated canonical
//! result set.

pub mod apis;
pub mod app;
pub mod cache;
pub mod canonical;
pub mod common;
pub mod config;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod observability;
pub mod registry;
pub mod resolver;
pub mod router;

pub use common::error::{EngineError, Result};
pub use domain::{
    CanonicalEvent, EventCategory, ExecutionResult, RawEventData, ResolvedLocation,
    RoutingContext, RoutingDecision, SourceDescriptor, SourceFailure,
};
