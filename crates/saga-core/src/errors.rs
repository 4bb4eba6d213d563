//! Errores semánticos del motor de flujos.
//!
//! `FlowError` cubre ejecución/almacenamiento; `FlowBuildError` cubre la
//! validación estructural del builder (siempre antes de ejecutar).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("flow not found: {0}")]
    NotFound(String),
    #[error("storage conflict for flow {0} (stale version)")]
    Conflict(String),
    #[error("step failed: {0}")]
    StepFailed(String),
    #[error("flow cancelled")]
    Cancelled,
    #[error(transparent)]
    Build(#[from] FlowBuildError),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("ownership lost for flow {0}")]
    LostOwnership(String),
    #[error("flow {0} is owned by another node")]
    OwnedElsewhere(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errores estructurales detectados al construir un flujo.
///
/// Invariante: ninguno de estos errores puede sobrevivir a un `build()`
/// exitoso; la ejecución nunca ve un árbol mal formado.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowBuildError {
    #[error("'{closer}' without a matching open '{opener}' scope")]
    UnbalancedScope {
        opener: &'static str,
        closer: &'static str,
    },
    #[error("{0} unclosed scope(s) at build time")]
    UnclosedScopes(usize),
    #[error("'{0}' requires a preceding step to configure")]
    OptionWithoutStep(&'static str),
    #[error("'into' requires a step that produces a result")]
    IntoWithoutResult,
    #[error("'if_any_fail' is only valid after 'when_all'")]
    MisplacedAggregateCompensation,
    #[error("'{0}' requires at least one child message factory")]
    EmptyChildren(&'static str),
    #[error("'else' declared twice for the same 'if'")]
    DuplicateElse,
    #[error("'else_if'/'else' must come before closing 'end_if'")]
    BranchAfterElse,
    #[error("wait steps are not supported inside for_each bodies")]
    WaitInsideForEach,
    #[error("for_each requires a body")]
    MissingForEachBody,
    #[error("flow has no name")]
    MissingName,
}
