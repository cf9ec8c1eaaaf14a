//! Failure classification.
//!
//! Every failed driver call is sorted into one of three classes:
//!
//! - [`ErrorClass::QuotaExhausted`]: the provider's hard capacity limit was
//!   hit (e.g. connections-per-hour). Trips the cooldown gate; never retried.
//! - [`ErrorClass::Retryable`]: transient transport trouble (timeouts, resets,
//!   "engine is not yet connected", serialization failures).
//! - [`ErrorClass::Fatal`]: everything else, propagated immediately.
//!
//! Providers disagree on how they report these conditions, so the matching is
//! data-driven: [`SignatureClassifier`] holds lists of error codes and message
//! fragments that can be extended or replaced, and [`FnClassifier`] accepts
//! arbitrary logic.

use crate::error::{DriverError, DriverErrorKind};
use std::sync::Arc;

/// Outcome of classifying a driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Transient; may be retried with backoff.
    Retryable,
    /// Permanent; propagate immediately.
    Fatal,
    /// Provider capacity limit reached; open the cooldown gate.
    QuotaExhausted,
}

/// Decides which [`ErrorClass`] a driver error belongs to.
pub trait ErrorClassifier: Send + Sync {
    /// Classifies `error`. Must be pure and cheap.
    fn classify(&self, error: &DriverError) -> ErrorClass;
}

/// Shared, type-erased classifier.
pub type SharedClassifier = Arc<dyn ErrorClassifier>;

impl<C: ErrorClassifier + ?Sized> ErrorClassifier for Arc<C> {
    fn classify(&self, error: &DriverError) -> ErrorClass {
        (**self).classify(error)
    }
}

// Provider quotas only. Server-wide connection caps (MySQL 1040/1203,
// Postgres 53300) clear within seconds and are listed as retryable below.
const QUOTA_CODES: &[&str] = &["ER_USER_LIMIT_REACHED", "1226"];

const QUOTA_MESSAGES: &[&str] = &["max_connections_per_hour", "quota exceeded"];

const RETRYABLE_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "EPIPE",
    "PROTOCOL_CONNECTION_LOST",
    "40001",
    "40P01",
    "08001",
    "08006",
    "53300",
    "1040",
    "1203",
];

const RETRYABLE_MESSAGES: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection closed",
    "engine is not yet connected",
    "broken pipe",
    "server has gone away",
    "too many connections",
    "max_user_connections",
];

/// Classifier driven by lists of codes and message fragments.
///
/// Matching rules, in order:
///
/// 1. a quota code equals the error code, or a quota fragment occurs in the
///    message → `QuotaExhausted`
/// 2. the error kind is `Connection` or `Timeout` → `Retryable`
/// 3. a retryable code or fragment matches → `Retryable`
/// 4. otherwise → `Fatal`
///
/// Codes compare case-insensitively; fragments are matched against the
/// lowercased message.
///
/// ```rust
/// use dbgate_core::{DriverError, ErrorClass, ErrorClassifier, SignatureClassifier};
///
/// let classifier = SignatureClassifier::builder()
///     .quota_code("PLAN_LIMIT")
///     .build();
///
/// let err = DriverError::connection("denied").with_code("PLAN_LIMIT");
/// assert_eq!(classifier.classify(&err), ErrorClass::QuotaExhausted);
/// ```
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    quota_codes: Vec<String>,
    quota_messages: Vec<String>,
    retryable_codes: Vec<String>,
    retryable_messages: Vec<String>,
}

impl SignatureClassifier {
    /// Creates a builder seeded with the default signatures.
    pub fn builder() -> SignatureClassifierBuilder {
        SignatureClassifierBuilder::new()
    }

    fn code_matches(list: &[String], error: &DriverError) -> bool {
        error
            .code()
            .is_some_and(|code| list.iter().any(|c| c.eq_ignore_ascii_case(code)))
    }

    fn message_matches(list: &[String], lowered: &str) -> bool {
        list.iter().any(|fragment| lowered.contains(fragment.as_str()))
    }
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        SignatureClassifierBuilder::new().build()
    }
}

impl ErrorClassifier for SignatureClassifier {
    fn classify(&self, error: &DriverError) -> ErrorClass {
        let lowered = error.message().to_lowercase();

        if Self::code_matches(&self.quota_codes, error)
            || Self::message_matches(&self.quota_messages, &lowered)
        {
            return ErrorClass::QuotaExhausted;
        }

        if matches!(
            error.kind(),
            DriverErrorKind::Connection | DriverErrorKind::Timeout
        ) {
            return ErrorClass::Retryable;
        }

        if Self::code_matches(&self.retryable_codes, error)
            || Self::message_matches(&self.retryable_messages, &lowered)
        {
            return ErrorClass::Retryable;
        }

        ErrorClass::Fatal
    }
}

/// Builder for [`SignatureClassifier`].
#[derive(Debug, Clone)]
pub struct SignatureClassifierBuilder {
    quota_codes: Vec<String>,
    quota_messages: Vec<String>,
    retryable_codes: Vec<String>,
    retryable_messages: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl SignatureClassifierBuilder {
    /// Creates a builder with the default signature lists.
    pub fn new() -> Self {
        Self {
            quota_codes: owned(QUOTA_CODES),
            quota_messages: owned(QUOTA_MESSAGES),
            retryable_codes: owned(RETRYABLE_CODES),
            retryable_messages: owned(RETRYABLE_MESSAGES),
        }
    }

    /// Creates a builder with every list empty.
    pub fn empty() -> Self {
        Self {
            quota_codes: Vec::new(),
            quota_messages: Vec::new(),
            retryable_codes: Vec::new(),
            retryable_messages: Vec::new(),
        }
    }

    /// Adds an error code that signals quota exhaustion.
    pub fn quota_code(mut self, code: impl Into<String>) -> Self {
        self.quota_codes.push(code.into());
        self
    }

    /// Adds a message fragment that signals quota exhaustion.
    pub fn quota_message(mut self, fragment: impl AsRef<str>) -> Self {
        self.quota_messages.push(fragment.as_ref().to_lowercase());
        self
    }

    /// Adds an error code that signals a transient failure.
    pub fn retryable_code(mut self, code: impl Into<String>) -> Self {
        self.retryable_codes.push(code.into());
        self
    }

    /// Adds a message fragment that signals a transient failure.
    pub fn retryable_message(mut self, fragment: impl AsRef<str>) -> Self {
        self.retryable_messages
            .push(fragment.as_ref().to_lowercase());
        self
    }

    /// Builds the classifier.
    pub fn build(self) -> SignatureClassifier {
        SignatureClassifier {
            quota_codes: self.quota_codes,
            quota_messages: self.quota_messages,
            retryable_codes: self.retryable_codes,
            retryable_messages: self.retryable_messages,
        }
    }
}

impl Default for SignatureClassifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A classifier backed by a closure.
///
/// ```rust
/// use dbgate_core::{DriverError, ErrorClass, ErrorClassifier, FnClassifier};
///
/// let classifier = FnClassifier::new(|err: &DriverError| match err.code() {
///     Some("LIMIT") => ErrorClass::QuotaExhausted,
///     _ => ErrorClass::Fatal,
/// });
/// assert_eq!(
///     classifier.classify(&DriverError::query("x").with_code("LIMIT")),
///     ErrorClass::QuotaExhausted
/// );
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F>
where
    F: Fn(&DriverError) -> ErrorClass + Send + Sync,
{
    /// Creates a new `FnClassifier` from the given closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> ErrorClassifier for FnClassifier<F>
where
    F: Fn(&DriverError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &DriverError) -> ErrorClass {
        (self.f)(error)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("f", &"<closure>")
            .finish()
    }
}
