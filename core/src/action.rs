//! Actions - immutable, tagged descriptions of something that happened
//!
//! Every action carries a discriminator (its *kind*), conventionally
//! namespaced as `"domain/event"`. Typed applications model their actions as
//! an enum and implement [`Action`] on it; callers without a closed set of
//! actions can use [`AnyAction`], whose kind is an arbitrary string.
//!
//! # Example
//!
//! ```
//! use statehub_core::action::{Action, AnyAction};
//!
//! let action = AnyAction::new("todos/added").with_payload(serde_json::json!({ "id": 7 }));
//! assert_eq!(action.kind(), "todos/added");
//! assert!(action.request_id().is_none());
//! ```

use crate::task::RequestId;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

/// An action that can be dispatched into a Store
///
/// Actions are values: they are created by callers (or by the async task
/// lifecycle), never mutated after creation, and consumed by the dispatch
/// pipeline.
pub trait Action: Clone + Send + Sync + 'static {
    /// The discriminator of this action, e.g. `"users/fetchById/pending"`
    fn kind(&self) -> Cow<'_, str>;

    /// The request identity carried in the action's metadata, if any
    fn request_id(&self) -> Option<RequestId> {
        None
    }
}

/// A kind that cannot act as a discriminator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidKind {
    /// The kind is the empty string
    #[error("action kind is empty")]
    Empty,

    /// The kind contains only whitespace
    #[error("action kind {0:?} contains only whitespace")]
    Blank(String),
}

/// Check that `kind` can serve as an action discriminator
///
/// # Errors
///
/// Returns [`InvalidKind`] if the kind is empty or only whitespace.
pub fn validate_kind(kind: &str) -> Result<(), InvalidKind> {
    if kind.is_empty() {
        return Err(InvalidKind::Empty);
    }
    if kind.trim().is_empty() {
        return Err(InvalidKind::Blank(kind.to_string()));
    }
    Ok(())
}

/// Auxiliary fields attached to an [`AnyAction`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    /// Identity of the async invocation this action belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    /// Any other metadata, kept opaque
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An untyped action: a string kind plus opaque payload and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyAction {
    /// Discriminator
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Auxiliary fields
    #[serde(default)]
    pub meta: ActionMeta,
}

impl AnyAction {
    /// Create an action with the given kind and no payload
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            meta: ActionMeta::default(),
        }
    }

    /// Attach a payload
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach a request identity
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.meta.request_id = Some(request_id);
        self
    }

    /// Attach an arbitrary metadata field
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.extra.insert(key.into(), value);
        self
    }
}

impl Action for AnyAction {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.kind)
    }

    fn request_id(&self) -> Option<RequestId> {
        self.meta.request_id
    }
}
