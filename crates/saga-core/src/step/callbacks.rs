//! Aliases de los callbacks capturados en build-time.
//!
//! Todos son funciones puras sobre el estado (más el resultado/ítem cuando
//! aplica), envueltas en `Arc` para que el árbol sea clonable y los bodies
//! de iteración puedan moverse a tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::mediator::FlowMessage;

/// `state → mensaje saliente` (send/query/publish y cada hijo de un wait).
pub type MessageFactory<S> = Arc<dyn Fn(&S) -> FlowMessage + Send + Sync>;

/// `(state, resultado) → ()`: el binder "into" que escribe el resultado en
/// el estado.
pub type ResultBinder<S> = Arc<dyn Fn(&mut S, serde_json::Value) + Send + Sync>;

/// Predicado sobre el estado (`only_when`, condiciones de `if`).
pub type Predicate<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// Predicado sobre `(state, resultado)` (`fail_if`).
pub type ResultPredicate<S> = Arc<dyn Fn(&S, &serde_json::Value) -> bool + Send + Sync>;

/// Selector de caso para `switch`.
pub type CaseSelector<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Fuente de ítems de un `for_each`.
pub type ItemSource<S> = Arc<dyn Fn(&S) -> Vec<serde_json::Value> + Send + Sync>;

/// Hook por ítem exitoso: `(state, item)`.
pub type ItemHook<S> = Arc<dyn Fn(&mut S, &serde_json::Value) + Send + Sync>;

/// Hook de cierre de iteración.
pub type CompletionHook<S> = Arc<dyn Fn(&mut S) + Send + Sync>;

/// Selector de instante absoluto para `schedule_at`.
pub type TimeSelector<S> = Arc<dyn Fn(&S) -> DateTime<Utc> + Send + Sync>;

/// Hook global `(state, índice de step) → evento opcional`.
pub type StepEventHook<S> = Arc<dyn Fn(&S, u32) -> Option<FlowMessage> + Send + Sync>;

/// Hook global `state → evento opcional` al completar el flujo.
pub type FlowEventHook<S> = Arc<dyn Fn(&S) -> Option<FlowMessage> + Send + Sync>;

/// Hook global `(state, error) → evento opcional` al fallar el flujo.
pub type FailEventHook<S> = Arc<dyn Fn(&S, &str) -> Option<FlowMessage> + Send + Sync>;
