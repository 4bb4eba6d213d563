//! Modelo de steps: IR tipada y con forma de árbol de un flujo.

mod callbacks;
mod kind;
mod options;
mod position;

pub use callbacks::{CaseSelector, CompletionHook, FailEventHook, FlowEventHook, ItemHook, ItemSource, MessageFactory,
                    Predicate, ResultBinder, ResultPredicate, StepEventHook, TimeSelector};
pub use kind::{Branch, FlowStep, ForEachStep, StepKind};
pub use options::StepOptions;
pub use position::{FlowPosition, ELSE_BRANCH};

use std::sync::Arc;

/// Construye la secuencia de steps del body de un `for_each` para un ítem
/// concreto. Recibe el ítem por valor para que los closures internos
/// puedan capturarlo.
pub type SequenceFactory<S> = Arc<dyn Fn(serde_json::Value) -> Vec<FlowStep<S>> + Send + Sync>;
