//! Core infrastructure for dbgate.
//!
//! This crate provides the pieces every other dbgate crate builds on:
//! - [`DriverError`] and the unified [`DbError`] taxonomy
//! - failure classification ([`ErrorClassifier`], [`SignatureClassifier`])
//! - the event system used for observability

pub mod classifier;
pub mod error;
pub mod events;

pub use classifier::{
    ErrorClass, ErrorClassifier, FnClassifier, SharedClassifier, SignatureClassifier,
    SignatureClassifierBuilder,
};
pub use error::{DbError, DriverError, DriverErrorKind};
pub use events::{EventListener, EventListeners, FnListener, GateEvent};
