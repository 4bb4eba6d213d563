//! Builder fluido del flujo y configuración resultante.
//!
//! Contrato: el builder sólo registra, nunca ejecuta. `build()` consume el
//! builder, corre la validación estructural y entrega un `FlowConfig`
//! inmutable (la versión Rust del "Build repetido es no-op": no hay
//! nada mutable que re-construir).
//!
//! Ejemplo de uso:
//!
//! ```ignore
//! let config = FlowConfig::builder("order-processing")
//!     .retry(2)
//!     .persist()
//!     .query(|s: &OrderState| FlowMessage::new("risk.score", json!({"customer": s.customer_id})))
//!     .into_state(|s, v| s.set_risk(v.as_f64().unwrap_or(0.0)))
//!     .if_(|s| s.risk > 0.8)
//!         .send(|s| FlowMessage::new("order.review", json!({"id": s.flow_id()})))
//!     .end_if()
//!     .build()?;
//! ```

mod foreach;
mod sequence;
mod switch;

pub use foreach::ForEachBuilder;
pub use sequence::{child, SequenceBuilder, StepSink};
pub use switch::SwitchBuilder;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::FlowBuildError;
use crate::mediator::FlowMessage;
use crate::step::{FailEventHook, FlowEventHook, FlowStep, MessageFactory, StepEventHook, StepOptions};

/// Contenedor inmutable de un flujo construido: steps raíz + propiedades
/// globales + hooks de eventos.
pub struct FlowConfig<S> {
    pub name: String,
    pub steps: Vec<FlowStep<S>>,
    pub default_timeout: Option<Duration>,
    /// Timeouts por tag; un step sin override toma el primero de sus tags
    /// presente acá.
    pub tag_timeouts: HashMap<String, Duration>,
    /// Reintentos por step ante fallo no-opcional (0 = sin reintentos).
    pub retry: u32,
    /// Persistir snapshot tras cada step (apagado: sólo el terminal).
    pub persist: bool,
    /// Correr compensaciones también ante cancelación.
    pub compensate_on_cancel: bool,
    pub on_step_completed: Option<StepEventHook<S>>,
    pub on_flow_completed: Option<FlowEventHook<S>>,
    pub on_flow_failed: Option<FailEventHook<S>>,
}

impl<S: 'static> FlowConfig<S> {
    pub fn builder(name: &str) -> FlowBuilder<S> {
        FlowBuilder::new(name)
    }

    /// Timeout efectivo de un step: override del step > tag > default del
    /// flujo.
    pub fn effective_timeout(&self, options: &StepOptions<S>) -> Option<Duration> {
        if options.timeout.is_some() {
            return options.timeout;
        }
        for tag in &options.tags {
            if let Some(t) = self.tag_timeouts.get(tag) {
                return Some(*t);
            }
        }
        self.default_timeout
    }

    /// Reintentos efectivos de un step.
    pub fn effective_retry(&self, options: &StepOptions<S>) -> u32 {
        options.retry.unwrap_or(self.retry)
    }
}

pub struct FlowBuilder<S> {
    name: String,
    seq: SequenceBuilder<S>,
    default_timeout: Option<Duration>,
    tag_timeouts: HashMap<String, Duration>,
    retry: u32,
    persist: bool,
    compensate_on_cancel: bool,
    on_step_completed: Option<StepEventHook<S>>,
    on_flow_completed: Option<FlowEventHook<S>>,
    on_flow_failed: Option<FailEventHook<S>>,
}

impl<S: 'static> FlowBuilder<S> {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(),
               seq: SequenceBuilder::new(),
               default_timeout: None,
               tag_timeouts: HashMap::new(),
               retry: 0,
               persist: true,
               compensate_on_cancel: false,
               on_step_completed: None,
               on_flow_completed: None,
               on_flow_failed: None }
    }

    // ----- propiedades del flujo -----------------------------------------

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.default_timeout = Some(duration);
        self
    }

    /// Timeout aplicado a todos los steps que lleven alguno de `tags`.
    pub fn timeout_for_tags(mut self, duration: Duration, tags: &[&str]) -> Self {
        for tag in tags {
            self.tag_timeouts.insert((*tag).to_string(), duration);
        }
        self
    }

    pub fn retry(mut self, attempts: u32) -> Self {
        self.retry = attempts;
        self
    }

    pub fn persist(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Sólo el snapshot terminal se escribe; los intermedios quedan en
    /// memoria del ejecutor.
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    /// Opt-in: la cancelación también deshace los steps ya completados.
    pub fn compensate_on_cancel(mut self) -> Self {
        self.compensate_on_cancel = true;
        self
    }

    // ----- hooks de eventos ----------------------------------------------

    pub fn on_step_completed<F>(mut self, hook: F) -> Self
        where F: Fn(&S, u32) -> Option<FlowMessage> + Send + Sync + 'static
    {
        self.on_step_completed = Some(Arc::new(hook));
        self
    }

    pub fn on_flow_completed<F>(mut self, hook: F) -> Self
        where F: Fn(&S) -> Option<FlowMessage> + Send + Sync + 'static
    {
        self.on_flow_completed = Some(Arc::new(hook));
        self
    }

    pub fn on_flow_failed<F>(mut self, hook: F) -> Self
        where F: Fn(&S, &str) -> Option<FlowMessage> + Send + Sync + 'static
    {
        self.on_flow_failed = Some(Arc::new(hook));
        self
    }

    // ----- steps: delegación a la secuencia raíz --------------------------

    pub fn send<F>(mut self, factory: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.seq = self.seq.send(factory);
        self
    }

    pub fn query<F>(mut self, factory: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.seq = self.seq.query(factory);
        self
    }

    pub fn publish<F>(mut self, factory: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.seq = self.seq.publish(factory);
        self
    }

    pub fn when_all(mut self, children: Vec<MessageFactory<S>>) -> Self {
        self.seq = self.seq.when_all(children);
        self
    }

    pub fn when_any(mut self, children: Vec<MessageFactory<S>>) -> Self {
        self.seq = self.seq.when_any(children);
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.seq = self.seq.delay(duration);
        self
    }

    pub fn schedule_at<F>(mut self, at: F) -> Self
        where F: Fn(&S) -> DateTime<Utc> + Send + Sync + 'static
    {
        self.seq = self.seq.schedule_at(at);
        self
    }

    pub fn if_<F>(mut self, condition: F) -> Self
        where F: Fn(&S) -> bool + Send + Sync + 'static
    {
        self.seq = self.seq.if_(condition);
        self
    }

    pub fn else_if<F>(mut self, condition: F) -> Self
        where F: Fn(&S) -> bool + Send + Sync + 'static
    {
        self.seq = self.seq.else_if(condition);
        self
    }

    pub fn else_(mut self) -> Self {
        self.seq = self.seq.else_();
        self
    }

    pub fn end_if(mut self) -> Self {
        self.seq = self.seq.end_if();
        self
    }

    pub fn switch<F>(self, selector: F) -> SwitchBuilder<S, Self>
        where F: Fn(&S) -> String + Send + Sync + 'static
    {
        SwitchBuilder::new(self, Arc::new(selector))
    }

    pub fn for_each<F>(self, source: F) -> ForEachBuilder<S, Self>
        where F: Fn(&S) -> Vec<serde_json::Value> + Send + Sync + 'static
    {
        ForEachBuilder::new(self, Arc::new(source))
    }

    // ----- configuración del último step ----------------------------------

    pub fn into_state<F>(mut self, binder: F) -> Self
        where F: Fn(&mut S, serde_json::Value) + Send + Sync + 'static
    {
        self.seq = self.seq.into_state(binder);
        self
    }

    pub fn optional(mut self) -> Self {
        self.seq = self.seq.optional();
        self
    }

    pub fn only_when<F>(mut self, predicate: F) -> Self
        where F: Fn(&S) -> bool + Send + Sync + 'static
    {
        self.seq = self.seq.only_when(predicate);
        self
    }

    pub fn fail_if<F>(mut self, predicate: F) -> Self
        where F: Fn(&S, &serde_json::Value) -> bool + Send + Sync + 'static
    {
        self.seq = self.seq.fail_if(predicate);
        self
    }

    pub fn fail_if_with<F>(mut self, predicate: F, message: &str) -> Self
        where F: Fn(&S, &serde_json::Value) -> bool + Send + Sync + 'static
    {
        self.seq = self.seq.fail_if_with(predicate, message);
        self
    }

    pub fn tag(mut self, name: &str) -> Self {
        self.seq = self.seq.tag(name);
        self
    }

    pub fn if_fail<F>(mut self, compensation: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.seq = self.seq.if_fail(compensation);
        self
    }

    pub fn if_any_fail<F>(mut self, compensation: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.seq = self.seq.if_any_fail(compensation);
        self
    }

    pub fn step_timeout(mut self, duration: Duration) -> Self {
        self.seq = self.seq.step_timeout(duration);
        self
    }

    pub fn step_retry(mut self, attempts: u32) -> Self {
        self.seq = self.seq.step_retry(attempts);
        self
    }

    pub fn error_message(mut self, message: &str) -> Self {
        self.seq = self.seq.error_message(message);
        self
    }

    // ----- build ----------------------------------------------------------

    /// Valida y entrega el `FlowConfig`. El primer error estructural
    /// registrado aborta la construcción.
    pub fn build(self) -> Result<FlowConfig<S>, FlowBuildError> {
        if self.name.trim().is_empty() {
            return Err(FlowBuildError::MissingName);
        }
        let (steps, errors) = self.seq.finish();
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
        Ok(FlowConfig { name: self.name,
                        steps,
                        default_timeout: self.default_timeout,
                        tag_timeouts: self.tag_timeouts,
                        retry: self.retry,
                        persist: self.persist,
                        compensate_on_cancel: self.compensate_on_cancel,
                        on_step_completed: self.on_step_completed,
                        on_flow_completed: self.on_flow_completed,
                        on_flow_failed: self.on_flow_failed })
    }
}

impl<S: 'static> StepSink<S> for FlowBuilder<S> {
    fn push_step(&mut self, step: FlowStep<S>) {
        self.seq.push_step(step);
    }

    fn push_error(&mut self, error: FlowBuildError) {
        self.seq.push_error(error);
    }

    fn waits_allowed(&self) -> bool {
        self.seq.waits_allowed()
    }
}
