//! Asynchronous task records
//!
//! A long-running operation is observed by the Store as a sequence of
//! actions: `pending` when it starts, then `fulfilled`, `rejected` or
//! `aborted`. Every invocation carries a fresh [`RequestId`]. A
//! [`TaskRecord`] remembers the identity of the most recent invocation of
//! its category and only accepts completions carrying that identity, so an
//! older, slower request can never overwrite the result of a newer one.
//!
//! Completions that no longer match are dropped without error and counted in
//! [`TaskRecord::stale_dropped`].

use crate::action::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::reducer::Transition;

/// Identity of one task invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw identity
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identity
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Name of a logical task category, e.g. `"users/fetchById"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskCategory(Arc<str>);

impl TaskCategory {
    /// Create a category
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The category name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskCategory {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TaskCategory {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Where a task category currently stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Nothing outstanding
    #[default]
    Idle,
    /// An invocation is in flight
    Pending,
    /// The latest invocation completed successfully
    Succeeded,
    /// The latest invocation failed
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A failed operation, in a form that can be stored in state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Error class, e.g. `"AbortError"` or `"TransportError"`
    pub name: String,

    /// Human readable description
    pub message: String,

    /// Optional machine readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl TaskError {
    /// Name used for cancelled operations
    pub const ABORT_ERROR: &'static str = "AbortError";

    /// Create an error with a name and message
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
        }
    }

    /// Attach a code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The error recorded for an operation that was cancelled
    #[must_use]
    pub fn aborted() -> Self {
        Self::new(Self::ABORT_ERROR, "Aborted")
    }

    /// Whether this error describes a cancellation
    #[must_use]
    pub fn is_abort(&self) -> bool {
        self.name == Self::ABORT_ERROR
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {} ({code})", self.name, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new("Error", message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new("Error", message)
    }
}

/// Metadata shared by every action of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMeta<Arg> {
    /// Identity of the invocation
    pub request_id: RequestId,

    /// Argument the operation was invoked with
    pub arg: Arg,

    /// When the invocation started
    pub requested_at: DateTime<Utc>,

    /// When the event was produced; equals `requested_at` for `pending`
    pub emitted_at: DateTime<Utc>,

    /// Set once the invocation has been cancelled
    pub aborted: bool,
}

/// Which step of the lifecycle an event reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "value", rename_all = "lowercase")]
pub enum TaskPhase<T> {
    /// The invocation started
    Pending,
    /// The operation resolved with a value
    Fulfilled(T),
    /// The operation failed
    Rejected(TaskError),
    /// The invocation was cancelled before the operation resolved
    Aborted,
}

impl<T> TaskPhase<T> {
    /// Suffix appended to the category to form the action kind
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
            Self::Aborted => "aborted",
        }
    }
}

/// One lifecycle action: `{category}/{pending|fulfilled|rejected|aborted}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent<Arg, T> {
    /// Category the invocation belongs to
    pub category: TaskCategory,

    /// Invocation metadata
    pub meta: TaskMeta<Arg>,

    /// Lifecycle step
    pub phase: TaskPhase<T>,
}

impl<Arg, T> TaskEvent<Arg, T> {
    /// Event announcing a new invocation
    #[must_use]
    pub const fn pending(
        category: TaskCategory,
        request_id: RequestId,
        arg: Arg,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            category,
            meta: TaskMeta {
                request_id,
                arg,
                requested_at,
                emitted_at: requested_at,
                aborted: false,
            },
            phase: TaskPhase::Pending,
        }
    }

    /// Follow-up event for the same invocation
    #[must_use]
    pub fn settle(&self, phase: TaskPhase<T>, emitted_at: DateTime<Utc>, aborted: bool) -> Self
    where
        Arg: Clone,
    {
        Self {
            category: self.category.clone(),
            meta: TaskMeta {
                request_id: self.meta.request_id,
                arg: self.meta.arg.clone(),
                requested_at: self.meta.requested_at,
                emitted_at,
                aborted,
            },
            phase,
        }
    }

    /// Identity of the invocation this event belongs to
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.meta.request_id
    }

    /// The action kind, e.g. `"users/fetchById/fulfilled"`
    #[must_use]
    pub fn kind(&self) -> String {
        format!("{}/{}", self.category, self.phase.suffix())
    }
}

impl<Arg, T> Action for TaskEvent<Arg, T>
where
    Arg: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> Cow<'_, str> {
        Cow::Owned(Self::kind(self))
    }

    fn request_id(&self) -> Option<RequestId> {
        Some(self.meta.request_id)
    }
}

/// The state of one task category
///
/// Embed one record per category in application state and feed the
/// category's [`TaskEvent`]s through [`TaskRecord::reduce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord<T> {
    /// Current status
    pub status: TaskStatus,

    /// Identity of the outstanding invocation while `Pending`
    pub request_id: Option<RequestId>,

    /// Value of the last successful invocation
    pub result: Option<T>,

    /// Error of the last failed invocation
    pub error: Option<TaskError>,

    /// When the current or last invocation started
    pub started_at: Option<DateTime<Utc>>,

    /// When the last accepted completion arrived
    pub settled_at: Option<DateTime<Utc>>,

    /// Number of completions dropped because their identity was stale
    pub stale_dropped: u64,
}

impl<T> Default for TaskRecord<T> {
    fn default() -> Self {
        Self {
            status: TaskStatus::Idle,
            request_id: None,
            result: None,
            error: None,
            started_at: None,
            settled_at: None,
            stale_dropped: 0,
        }
    }
}

impl<T: Clone> TaskRecord<T> {
    /// Whether an invocation is outstanding
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }

    /// Whether `event` would be applied rather than dropped as stale
    ///
    /// `pending` always starts a new invocation. Any other phase applies
    /// only while pending and only for the outstanding identity.
    #[must_use]
    pub fn accepts<Arg>(&self, event: &TaskEvent<Arg, T>) -> bool {
        match event.phase {
            TaskPhase::Pending => true,
            TaskPhase::Fulfilled(_) | TaskPhase::Rejected(_) | TaskPhase::Aborted => {
                self.is_pending() && self.request_id == Some(event.request_id())
            },
        }
    }

    /// Compute the record that results from `event`
    ///
    /// A stale event leaves status, result and error untouched and only
    /// increments [`stale_dropped`](Self::stale_dropped).
    #[must_use]
    pub fn reduce<Arg>(&self, event: &TaskEvent<Arg, T>) -> Transition<Self> {
        if !self.accepts(event) {
            return Transition::update(self, |record| record.stale_dropped += 1);
        }

        match &event.phase {
            TaskPhase::Pending => Transition::update(self, |record| {
                record.status = TaskStatus::Pending;
                record.request_id = Some(event.request_id());
                record.error = None;
                record.started_at = Some(event.meta.requested_at);
            }),
            TaskPhase::Fulfilled(value) => Transition::update(self, |record| {
                record.status = TaskStatus::Succeeded;
                record.request_id = None;
                record.result = Some(value.clone());
                record.settled_at = Some(event.meta.emitted_at);
            }),
            TaskPhase::Rejected(error) => Transition::update(self, |record| {
                record.status = TaskStatus::Failed;
                record.request_id = None;
                record.error = Some(error.clone());
                record.settled_at = Some(event.meta.emitted_at);
            }),
            TaskPhase::Aborted => Transition::update(self, |record| {
                record.status = TaskStatus::Idle;
                record.request_id = None;
            }),
        }
    }
}
