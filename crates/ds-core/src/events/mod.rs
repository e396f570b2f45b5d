//! Typed notification of notebook changes
//!
//! Subscribers register a closure for one event type and are called in
//! subscription order on every publish of that type. Handlers run under the
//! bus lock and must not publish or subscribe themselves.

use std::any::{Any, TypeId};

use ahash::AHashMap;
use parking_lot::Mutex;

type Handler = Box<dyn FnMut(&dyn Any) + Send>;

/// Notebook-wide event bus
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<AHashMap<TypeId, Vec<Handler>>>,
}

/// Marker for values that can travel over the bus
pub trait Event: Any + Send + Sync {}

/// Common notebook events
pub mod events {
    use super::Event;
    use crate::cells::{CellId, CellKind};

    /// A cell was inserted
    #[derive(Debug, Clone)]
    pub struct CellAdded {
        pub cell_id: CellId,
        pub kind: CellKind,
        pub index: usize,
    }

    /// A cell was deleted
    #[derive(Debug, Clone)]
    pub struct CellRemoved {
        pub cell_id: CellId,
    }

    /// A cell changed position
    #[derive(Debug, Clone)]
    pub struct CellMoved {
        pub cell_id: CellId,
        pub from: usize,
        pub to: usize,
    }

    /// A cell entered `executing`
    #[derive(Debug, Clone)]
    pub struct ExecutionStarted {
        pub cell_id: CellId,
        pub run: u64,
    }

    /// A run finished and was recorded on the cell
    #[derive(Debug, Clone)]
    pub struct ExecutionFinished {
        pub cell_id: CellId,
        pub run: u64,
        pub error: Option<String>,
    }

    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(impl Event for $t {})*
        };
    }

    impl_event!(CellAdded, CellRemoved, CellMoved, ExecutionStarted, ExecutionFinished);
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` with every `E` published from now on
    pub fn subscribe<E, F>(&self, mut handler: F)
    where
        E: Event,
        F: FnMut(&E) + Send + 'static,
    {
        let erased: Handler = Box::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });
        self.handlers.lock().entry(TypeId::of::<E>()).or_default().push(erased);
    }

    pub fn publish<E: Event>(&self, event: E) {
        let mut handlers = self.handlers.lock();
        for handler in handlers.get_mut(&TypeId::of::<E>()).into_iter().flatten() {
            handler(&event as &dyn Any);
        }
    }

    /// Number of handlers registered for `E`
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.handlers.lock().get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }
}
