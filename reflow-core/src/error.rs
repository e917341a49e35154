//! Error Types
//!
//! Errors are split by subsystem. Graph-structural errors (cycles, runaway
//! feedback) abort the transaction that hit them and are returned to the
//! caller. Per-node errors (a failing effect, a failing measurement) are
//! isolated and reported without stopping the frame.

use thiserror::Error;

use crate::graph::NodeId;
use crate::invalidation::WidgetId;

/// Errors raised by the reactive graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A computation depends on itself, directly or transitively.
    #[error("cyclic dependency detected among nodes {nodes:?}")]
    CyclicDependency {
        /// The nodes participating in the cycle, in registration order.
        nodes: Vec<NodeId>,
    },

    /// Effects kept writing signals for more rounds than allowed.
    #[error("re-entrant write depth exceeded the limit of {limit}")]
    MaxDepthExceeded {
        /// The configured re-entrancy bound.
        limit: usize,
    },

    /// An effect callback failed. Reported, never fatal to the batch.
    #[error("effect {effect} failed: {message}")]
    EffectFailure {
        /// The effect that failed.
        effect: NodeId,
        /// The failure rendered as text.
        message: String,
    },

    /// The handle refers to a node that has been disposed.
    #[error("node {0} has been disposed")]
    Disposed(NodeId),

    /// The handle's value type does not match the stored value.
    #[error("node {0} does not hold a value of the requested type")]
    TypeMismatch(NodeId),

    /// A user callback reported a failure of its own.
    #[error("{0}")]
    Callback(String),
}

impl ReactiveError {
    /// Build a callback failure from any message.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Structural errors abort the whole transaction instead of being
    /// isolated to a single node.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. } | Self::MaxDepthExceeded { .. }
        )
    }
}

/// Errors raised while measuring a widget.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    /// The constraints cannot be satisfied (max below min, or NaN bounds).
    #[error("invalid constraints: {0}")]
    InvalidConstraints(String),

    /// The widget's own measurement logic failed.
    #[error("widget measurement failed: {0}")]
    Widget(String),

    /// The node being measured is not in the tree.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Errors raised by the invalidation tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The widget handle is stale or was never issued by this tree.
    #[error("widget {0:?} is not in the tree")]
    StaleWidget(WidgetId),

    /// Inserting the child would make a node its own ancestor.
    #[error("widget {child:?} cannot be attached under {parent:?}")]
    InvalidParent {
        /// The intended parent.
        parent: WidgetId,
        /// The child being attached.
        child: WidgetId,
    },
}

/// Errors that abort a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Draining queued writes hit a structural reactive error.
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    /// A tree operation referenced a missing widget.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A remote write was sent after its frame driver was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the frame driver receiving remote writes has been dropped")]
pub struct RemoteClosed;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed or produced.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value outside its allowed range.
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result alias for reactive operations.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
