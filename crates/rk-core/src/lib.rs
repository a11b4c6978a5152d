//! Core functionality for the ranking engine
//!
//! This crate provides the fundamental abstractions shared by the data,
//! model and provider crates: the typed event bus, identifiers and the
//! provider-owned selection/aggregation state.

pub mod events;
pub mod ids;
pub mod sync;

// Re-export commonly used types
pub use events::{
    handler_from_fn, Event, EventBus, EventHandler, SubscriptionId,
    events::{ColumnEvent, ColumnEventKind, ProviderEvent, ProviderEventKind, RankingEvent, RankingEventKind},
};
pub use ids::{ColumnId, RankingId, UidGenerator};
pub use sync::{AggregationState, SelectionState, SyncManager};
