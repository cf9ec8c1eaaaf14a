//! Event system shared by every dbgate component.
//!
//! Each component (connection manager, scheduler, cooldown gate, retry loop,
//! health monitor) defines its own event enum implementing [`GateEvent`] and
//! owns an [`EventListeners`] collection that callers populate through the
//! `on_*` builder methods.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by dbgate components.
pub trait GateEvent: Send + Sync + fmt::Debug {
    /// Short snake_case tag such as `connected` or `task_queued`.
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// Name given to the emitting instance at build time.
    fn component_name(&self) -> &str;
}

/// Receives events from a component.
pub trait EventListener<E: GateEvent>: Send + Sync {
    /// Called synchronously on the emitting task; keep it cheap.
    fn on_event(&self, event: &E);
}

pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// An ordered collection of listeners for one event type.
#[derive(Clone)]
pub struct EventListeners<E: GateEvent> {
    entries: Vec<BoxedEventListener<E>>,
}

impl<E: GateEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.entries.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener in registration order.
    ///
    /// A panicking listener is isolated: the panic is swallowed and the
    /// remaining listeners still run. Components call this while holding no
    /// locks, so a listener may safely call back into the component.
    pub fn emit(&self, event: &E) {
        for listener in &self.entries {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            #[cfg(feature = "tracing")]
            if outcome.is_err() {
                tracing::warn!(
                    component = event.component_name(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
            #[cfg(not(feature = "tracing"))]
            let _ = outcome;
        }
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<E: GateEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GateEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// A closure-backed listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps `f` as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: GateEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
