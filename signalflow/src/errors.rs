//! Error types for the signalflow pipeline.
//!
//! Every stage failure is reported as a [`PipelineError`]. Stage errors carry an
//! [`ErrorContext`] naming the failing stage, strategy and content key so a
//! failed render can be traced back to the configuration that caused it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::StoreError;
use crate::core::TrackError;

/// Diagnostic context attached to a stage error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// The stage that failed (e.g. "smoothing").
    pub stage: Option<String>,
    /// Label of the strategy that was running (e.g. "read_count@v1").
    pub strategy: Option<String>,
    /// Content key of the failing job.
    pub key: Option<String>,
    /// Additional key-value pairs.
    #[serde(default)]
    pub detail: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the strategy label.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Sets the content key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Adds a single detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stage.is_none()
            && self.strategy.is_none()
            && self.key.is_none()
            && self.detail.is_empty()
    }

    /// Fills fields that are unset here from `other`.
    fn merge_missing(&mut self, other: Self) {
        if self.stage.is_none() {
            self.stage = other.stage;
        }
        if self.strategy.is_none() {
            self.strategy = other.strategy;
        }
        if self.key.is_none() {
            self.key = other.key;
        }
        for (k, v) in other.detail {
            self.detail.entry(k).or_insert(v);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }

        let mut parts = Vec::new();
        if let Some(ref stage) = self.stage {
            parts.push(format!("stage={stage}"));
        }
        if let Some(ref strategy) = self.strategy {
            parts.push(format!("strategy={strategy}"));
        }
        if let Some(ref key) = self.key {
            parts.push(format!("key={key}"));
        }
        for (k, v) in &self.detail {
            parts.push(format!("{k}={v}"));
        }
        write!(f, " [{}]", parts.join(", "))
    }
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad strategy parameters or request configuration.
    InvalidConfiguration,
    /// Dimension mismatch between windows, matrices or orderings.
    ShapeMismatch,
    /// An upstream job failed or a track query raised.
    DependencyUnavailable,
    /// A numeric procedure could not reach the requested result.
    NumericDegeneracy,
    /// The render backend failed.
    Render,
    /// The artifact store failed.
    Store,
    /// An artifact could not be (de)serialized.
    Serialization,
    /// An internal invariant was violated.
    Internal,
}

impl ErrorKind {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::ShapeMismatch => "SHAPE_MISMATCH",
            Self::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            Self::NumericDegeneracy => "NUMERIC_DEGENERACY",
            Self::Render => "RENDER",
            Self::Store => "STORE",
            Self::Serialization => "SERIALIZATION",
            Self::Internal => "INTERNAL",
        }
    }
}

/// The main error type for signalflow operations.
///
/// Errors are `Clone` so one job failure can be handed to every caller
/// waiting on the same content key.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Bad strategy parameters, e.g. a non-positive width.
    #[error("Invalid configuration: {message}{context}")]
    InvalidConfiguration {
        /// What was wrong.
        message: String,
        /// Where it was detected.
        context: ErrorContext,
    },

    /// Dimension mismatch between tracks, matrices or orderings.
    #[error("Shape mismatch: {message}{context}")]
    ShapeMismatch {
        /// What did not line up.
        message: String,
        /// Where it was detected.
        context: ErrorContext,
    },

    /// An upstream job failed or a track query raised.
    #[error("Dependency unavailable: {message}{context}")]
    DependencyUnavailable {
        /// Why the dependency could not be resolved.
        message: String,
        /// Where it was detected.
        context: ErrorContext,
    },

    /// A numeric procedure could not reach the requested result.
    #[error("Numeric degeneracy: {message}{context}")]
    NumericDegeneracy {
        /// What degenerated.
        message: String,
        /// Where it was detected.
        context: ErrorContext,
    },

    /// The render backend returned an error.
    #[error("Render backend error: {0}")]
    Render(Arc<anyhow::Error>),

    /// The artifact store failed.
    #[error("{source}{context}")]
    Store {
        /// The backend error.
        source: StoreError,
        /// The job that was reading or writing.
        context: ErrorContext,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Creates a dependency unavailable error.
    #[must_use]
    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Creates a numeric degeneracy error.
    #[must_use]
    pub fn numeric_degeneracy(message: impl Into<String>) -> Self {
        Self::NumericDegeneracy {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Wraps a render backend error unchanged.
    #[must_use]
    pub fn render(err: anyhow::Error) -> Self {
        Self::Render(Arc::new(err))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::NumericDegeneracy { .. } => ErrorKind::NumericDegeneracy,
            Self::Render(_) => ErrorKind::Render,
            Self::Store { .. } => ErrorKind::Store,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the stage context, if this kind of error carries one.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::InvalidConfiguration { context, .. }
            | Self::ShapeMismatch { context, .. }
            | Self::DependencyUnavailable { context, .. }
            | Self::NumericDegeneracy { context, .. }
            | Self::Store { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Attaches context, keeping any fields that are already set.
    #[must_use]
    pub fn in_context(mut self, ctx: ErrorContext) -> Self {
        match &mut self {
            Self::InvalidConfiguration { context, .. }
            | Self::ShapeMismatch { context, .. }
            | Self::DependencyUnavailable { context, .. }
            | Self::NumericDegeneracy { context, .. }
            | Self::Store { context, .. } => context.merge_missing(ctx),
            _ => {}
        }
        self
    }

    /// Adds a single detail entry to the context.
    #[must_use]
    pub fn with_detail(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.in_context(ErrorContext::new().with_detail(key, value))
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.kind().code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        if let Some(ctx) = self.context() {
            if let Some(ref stage) = ctx.stage {
                map.insert("stage".to_string(), serde_json::json!(stage));
            }
            if let Some(ref strategy) = ctx.strategy {
                map.insert("strategy".to_string(), serde_json::json!(strategy));
            }
            if let Some(ref key) = ctx.key {
                map.insert("key".to_string(), serde_json::json!(key));
            }
        }

        map
    }
}

impl From<TrackError> for PipelineError {
    fn from(err: TrackError) -> Self {
        Self::dependency_unavailable(err.to_string())
            .with_detail("track", err.track)
    }
}

impl From<StoreError> for PipelineError {
    fn from(source: StoreError) -> Self {
        Self::Store {
            source,
            context: ErrorContext::new(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
