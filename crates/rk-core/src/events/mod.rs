use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Typed publish/subscribe channel
///
/// Handlers are registered per concrete event type, so a statistics cache
/// can listen to [`events::ColumnEvent`] only while a renderer listens to
/// [`events::RankingEvent`] only.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<(SubscriptionId, Box<dyn EventHandler>)>>>>,
    next_subscription: Arc<Mutex<u64>>,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Events fired by columns, rankings and the provider
pub mod events {
    use super::Event;
    use crate::ids::{ColumnId, RankingId};

    /// What changed on a column
    ///
    /// Every column setter enumerates the kinds it fires; a filter change
    /// always fires `Filter` followed by `DirtyValues`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ColumnEventKind {
        Filter,
        Mapping,
        SortMethod,
        Weights,
        Width,
        Label,
        Visibility,
        Compressed,
        ColorMapping,
        Renderer,
        Grouping,
        ReduceMethod,
        Script,
        Children,
        /// Cached values (order, statistics) depending on this column are stale
        DirtyValues,
        /// Header rendering is stale
        DirtyHeader,
    }

    impl ColumnEventKind {
        /// Whether the event invalidates the row order of the owning ranking
        pub fn dirties_order(&self) -> bool {
            matches!(self, ColumnEventKind::DirtyValues)
        }

        /// Stable name of the event, used in logs
        pub fn name(&self) -> &'static str {
            match self {
                ColumnEventKind::Filter => "filterChanged",
                ColumnEventKind::Mapping => "mappingChanged",
                ColumnEventKind::SortMethod => "sortMethodChanged",
                ColumnEventKind::Weights => "weightsChanged",
                ColumnEventKind::Width => "widthChanged",
                ColumnEventKind::Label => "labelChanged",
                ColumnEventKind::Visibility => "visibilityChanged",
                ColumnEventKind::Compressed => "compressChanged",
                ColumnEventKind::ColorMapping => "colorMappingChanged",
                ColumnEventKind::Renderer => "rendererTypeChanged",
                ColumnEventKind::Grouping => "groupingChanged",
                ColumnEventKind::ReduceMethod => "reduceChanged",
                ColumnEventKind::Script => "scriptChanged",
                ColumnEventKind::Children => "childrenChanged",
                ColumnEventKind::DirtyValues => "dirtyValues",
                ColumnEventKind::DirtyHeader => "dirtyHeader",
            }
        }
    }

    /// A column mutation
    #[derive(Debug, Clone, PartialEq)]
    pub struct ColumnEvent {
        pub ranking: RankingId,
        pub column: ColumnId,
        pub kind: ColumnEventKind,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RankingEventKind {
        SortCriteriaChanged,
        GroupCriteriaChanged,
        ColumnAdded(ColumnId),
        ColumnRemoved(ColumnId),
        ColumnMoved(ColumnId),
        /// A new order was committed for the given request generation
        OrderChanged { generation: u64, rows: usize },
        /// A sort result arrived after a newer request and was dropped
        StaleOrderDiscarded { generation: u64 },
    }

    /// A ranking mutation
    #[derive(Debug, Clone, PartialEq)]
    pub struct RankingEvent {
        pub ranking: RankingId,
        pub kind: RankingEventKind,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum ProviderEventKind {
        RankingAdded(RankingId),
        RankingRemoved(RankingId),
        SelectionChanged { selected: Vec<usize> },
        AggregationChanged { ranking: RankingId, group: String, collapsed: bool },
        Restored,
    }

    /// A provider-level mutation
    #[derive(Debug, Clone, PartialEq)]
    pub struct ProviderEvent {
        pub kind: ProviderEventKind,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(ColumnEvent, RankingEvent, ProviderEvent);
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
            next_subscription: Arc::new(Mutex::new(0)),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) -> SubscriptionId {
        let id = {
            let mut next = self.next_subscription.lock();
            *next += 1;
            SubscriptionId(*next)
        };
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers.entry(type_id).or_insert_with(Vec::new).push((id, handler));
        id
    }

    /// Subscribe with a closure receiving the concrete event type
    pub fn subscribe_fn<E, F>(&self, mut f: F) -> SubscriptionId
    where
        E: Event,
        F: FnMut(&E) + Send + Sync + 'static,
    {
        self.subscribe::<E>(handler_from_fn(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        }))
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();

        if let Some(event_handlers) = handlers.get_mut(&type_id) {
            for (_, handler) in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("EventBus")
            .field("event_types", &handlers.len())
            .field("handlers", &handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::events::*;
    use super::*;
    use crate::ids::{ColumnId, RankingId};

    fn column_event(kind: ColumnEventKind) -> ColumnEvent {
        ColumnEvent {
            ranking: RankingId::from("rank0"),
            column: ColumnId::from("col1"),
            kind,
        }
    }

    #[test]
    fn test_typed_subscription_only_sees_its_type() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe_fn(move |e: &ColumnEvent| sink.lock().push(e.kind));

        bus.publish(column_event(ColumnEventKind::Filter));
        bus.publish(RankingEvent {
            ranking: RankingId::from("rank0"),
            kind: RankingEventKind::SortCriteriaChanged,
        });
        bus.publish(column_event(ColumnEventKind::DirtyValues));

        assert_eq!(*seen.lock(), vec![ColumnEventKind::Filter, ColumnEventKind::DirtyValues]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let id = bus.subscribe_fn(move |_: &ColumnEvent| *sink.lock() += 1);

        bus.publish(column_event(ColumnEventKind::Width));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(column_event(ColumnEventKind::Width));

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_only_dirty_values_dirties_order() {
        assert!(ColumnEventKind::DirtyValues.dirties_order());
        assert!(!ColumnEventKind::Filter.dirties_order());
        assert!(!ColumnEventKind::Width.dirties_order());
    }
}
