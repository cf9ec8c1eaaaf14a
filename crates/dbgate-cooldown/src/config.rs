//! Configuration for the cooldown gate.

use crate::events::CooldownEvent;
use crate::CircuitBreaker;
use dbgate_core::classifier::{ErrorClassifier, SharedClassifier, SignatureClassifier};
use dbgate_core::events::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Default length of a cooldown window: one hour.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Configuration for a [`CircuitBreaker`].
#[derive(Clone)]
pub struct CooldownConfig {
    pub(crate) duration: Duration,
    pub(crate) name: String,
    pub(crate) classifier: SharedClassifier,
    pub(crate) event_listeners: EventListeners<CooldownEvent>,
}

impl CooldownConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CooldownConfigBuilder {
        CooldownConfigBuilder::new()
    }

    /// Length of a cooldown window.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Name used in events, logs and metric labels.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CooldownConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownConfig")
            .field("duration", &self.duration)
            .field("name", &self.name)
            .field("listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`CooldownConfig`].
pub struct CooldownConfigBuilder {
    duration: Duration,
    name: String,
    classifier: SharedClassifier,
    event_listeners: EventListeners<CooldownEvent>,
}

impl CooldownConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            duration: DEFAULT_COOLDOWN,
            name: "cooldown".to_string(),
            classifier: Arc::new(SignatureClassifier::default()),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets how long the gate stays open after a quota-exhaustion error.
    ///
    /// Default: 1 hour
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the name of this gate.
    ///
    /// Default: "cooldown"
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the classifier used by [`CircuitBreaker::trip_if_quota_exhausted`].
    ///
    /// Default: [`SignatureClassifier::default`]
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Shares an existing classifier with other components.
    pub fn shared_classifier(mut self, classifier: SharedClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Registers a callback when the gate opens.
    ///
    /// # Callback Signature
    /// `Fn(Duration)` - Called with the length of the new window.
    ///
    /// # Example
    /// ```rust
    /// use dbgate_cooldown::CooldownConfig;
    ///
    /// let breaker = CooldownConfig::builder()
    ///     .on_tripped(|window| eprintln!("quota hit, backing off for {:?}", window))
    ///     .build();
    /// ```
    pub fn on_tripped<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CooldownEvent::Tripped { cooldown, .. } = event {
                f(*cooldown);
            }
        }));
        self
    }

    /// Registers a callback when an admission is refused.
    ///
    /// # Callback Signature
    /// `Fn(Duration)` - Called with the time left in the window.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CooldownEvent::Rejected { remaining, .. } = event {
                f(*remaining);
            }
        }));
        self
    }

    /// Registers a callback when the window elapses and the gate closes.
    pub fn on_expired<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CooldownEvent::Expired { .. } = event {
                f();
            }
        }));
        self
    }

    /// Registers a listener for every cooldown event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&CooldownEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    /// Builds the configuration without constructing a gate.
    pub fn into_config(self) -> CooldownConfig {
        CooldownConfig {
            duration: self.duration,
            name: self.name,
            classifier: self.classifier,
            event_listeners: self.event_listeners,
        }
    }

    /// Builds the gate.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.into_config())
    }
}

impl Default for CooldownConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
