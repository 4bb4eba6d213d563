//! Builder de secuencias: la pieza compartida entre el builder de flujo y
//! los sub-árboles (casos de switch, bodies de iteración).
//!
//! Sólo registra; nada se ejecuta acá. Los errores estructurales se
//! acumulan y el `build()` del flujo los hace superficie antes de
//! cualquier ejecución.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::errors::FlowBuildError;
use crate::mediator::FlowMessage;
use crate::step::{Branch, FlowStep, MessageFactory, Predicate, StepKind};

/// Destino de steps: lo implementan el builder de flujo y el de secuencia
/// para que los sub-builders (`switch`, `for_each`) funcionen sobre ambos.
pub trait StepSink<S>: Sized {
    fn push_step(&mut self, step: FlowStep<S>);
    fn push_error(&mut self, error: FlowBuildError);
    fn waits_allowed(&self) -> bool;
}

/// Helper para las listas de hijos de `when_all`/`when_any`.
pub fn child<S, F>(f: F) -> MessageFactory<S>
    where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
{
    Arc::new(f)
}

pub struct SequenceBuilder<S> {
    frames: Vec<Frame<S>>,
    errors: Vec<FlowBuildError>,
    allow_waits: bool,
}

enum Frame<S> {
    Seq {
        steps: Vec<FlowStep<S>>,
    },
    If {
        branches: Vec<Branch<S>>,
        pending: Option<Predicate<S>>,
        current: Vec<FlowStep<S>>,
        in_else: bool,
        else_body: Vec<FlowStep<S>>,
    },
}

impl<S: 'static> SequenceBuilder<S> {
    pub fn new() -> Self {
        Self::with_waits(true)
    }

    /// Variante para bodies de `for_each`, donde los steps de espera no
    /// están soportados.
    pub(crate) fn without_waits() -> Self {
        Self::with_waits(false)
    }

    fn with_waits(allow_waits: bool) -> Self {
        Self { frames: vec![Frame::Seq { steps: Vec::new() }],
               errors: Vec::new(),
               allow_waits }
    }

    /// Cierra la secuencia: steps construidos + errores acumulados.
    pub(crate) fn finish(mut self) -> (Vec<FlowStep<S>>, Vec<FlowBuildError>) {
        if self.frames.len() > 1 {
            self.errors.push(FlowBuildError::UnclosedScopes(self.frames.len() - 1));
            // Colapsar frames abiertos para devolver algo consistente.
            while self.frames.len() > 1 {
                self.close_if_frame();
            }
        }
        let steps = match self.frames.pop() {
            Some(Frame::Seq { steps }) => steps,
            _ => Vec::new(),
        };
        (steps, self.errors)
    }

    fn current_steps_mut(&mut self) -> &mut Vec<FlowStep<S>> {
        match self.frames.last_mut().expect("sequence builder always has a root frame") {
            Frame::Seq { steps } => steps,
            Frame::If { current, in_else, else_body, .. } => {
                if *in_else {
                    else_body
                } else {
                    current
                }
            }
        }
    }

    fn last_step_mut(&mut self) -> Option<&mut FlowStep<S>> {
        self.current_steps_mut().last_mut()
    }

    // ----- leafs ---------------------------------------------------------

    pub fn send<F>(mut self, factory: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.push_step(FlowStep::new(StepKind::Send { factory: Arc::new(factory),
                                                      into: None }));
        self
    }

    pub fn query<F>(mut self, factory: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.push_step(FlowStep::new(StepKind::Query { factory: Arc::new(factory),
                                                       into: None }));
        self
    }

    pub fn publish<F>(mut self, factory: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        self.push_step(FlowStep::new(StepKind::Publish { factory: Arc::new(factory) }));
        self
    }

    pub fn when_all(mut self, children: Vec<MessageFactory<S>>) -> Self {
        if children.is_empty() {
            self.push_error(FlowBuildError::EmptyChildren("when_all"));
        }
        self.push_step(FlowStep::new(StepKind::WhenAll { children,
                                                         timeout: None,
                                                         compensation: None }));
        self
    }

    pub fn when_any(mut self, children: Vec<MessageFactory<S>>) -> Self {
        if children.is_empty() {
            self.push_error(FlowBuildError::EmptyChildren("when_any"));
        }
        self.push_step(FlowStep::new(StepKind::WhenAny { children,
                                                         timeout: None,
                                                         into: None }));
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.push_step(FlowStep::new(StepKind::Delay { duration }));
        self
    }

    pub fn schedule_at<F>(mut self, at: F) -> Self
        where F: Fn(&S) -> DateTime<Utc> + Send + Sync + 'static
    {
        self.push_step(FlowStep::new(StepKind::ScheduleAt { at: Arc::new(at) }));
        self
    }

    // ----- branching -----------------------------------------------------

    pub fn if_<F>(mut self, condition: F) -> Self
        where F: Fn(&S) -> bool + Send + Sync + 'static
    {
        self.frames.push(Frame::If { branches: Vec::new(),
                                     pending: Some(Arc::new(condition)),
                                     current: Vec::new(),
                                     in_else: false,
                                     else_body: Vec::new() });
        self
    }

    pub fn else_if<F>(mut self, condition: F) -> Self
        where F: Fn(&S) -> bool + Send + Sync + 'static
    {
        match self.frames.last_mut() {
            Some(Frame::If { branches, pending, current, in_else, .. }) => {
                if *in_else {
                    self.errors.push(FlowBuildError::BranchAfterElse);
                } else if let Some(cond) = pending.take() {
                    branches.push(Branch { condition: cond,
                                           body: mem::take(current) });
                    *pending = Some(Arc::new(condition));
                }
            }
            _ => self.errors.push(FlowBuildError::UnbalancedScope { opener: "if",
                                                                    closer: "else_if" }),
        }
        self
    }

    pub fn else_(mut self) -> Self {
        match self.frames.last_mut() {
            Some(Frame::If { branches, pending, current, in_else, .. }) => {
                if *in_else {
                    self.errors.push(FlowBuildError::DuplicateElse);
                } else {
                    if let Some(cond) = pending.take() {
                        branches.push(Branch { condition: cond,
                                               body: mem::take(current) });
                    }
                    *in_else = true;
                }
            }
            _ => self.errors.push(FlowBuildError::UnbalancedScope { opener: "if",
                                                                    closer: "else" }),
        }
        self
    }

    pub fn end_if(mut self) -> Self {
        if matches!(self.frames.last(), Some(Frame::If { .. })) {
            self.close_if_frame();
        } else {
            self.errors.push(FlowBuildError::UnbalancedScope { opener: "if",
                                                               closer: "end_if" });
        }
        self
    }

    fn close_if_frame(&mut self) {
        if let Some(Frame::If { mut branches, pending, current, in_else, else_body }) = self.frames.pop() {
            if let Some(cond) = pending {
                branches.push(Branch { condition: cond,
                                       body: current });
            }
            let step = FlowStep::new(StepKind::If { branches,
                                                    else_branch: in_else.then_some(else_body) });
            self.current_steps_mut().push(step);
        }
    }

    // ----- configuración del último step ---------------------------------

    pub fn into_state<F>(mut self, binder: F) -> Self
        where F: Fn(&mut S, serde_json::Value) + Send + Sync + 'static
    {
        let mut error = None;
        match self.last_step_mut() {
            None => error = Some(FlowBuildError::OptionWithoutStep("into")),
            Some(step) => {
                if !step.produces_result() {
                    error = Some(FlowBuildError::IntoWithoutResult);
                } else {
                    let binder = Arc::new(binder);
                    match &mut step.kind {
                        StepKind::Send { into, .. } | StepKind::Query { into, .. } | StepKind::WhenAny { into, .. } => {
                            *into = Some(binder);
                        }
                        _ => {}
                    }
                }
            }
        }
        if let Some(e) = error {
            self.push_error(e);
        }
        self
    }

    pub fn optional(self) -> Self {
        self.configure("optional", |step| step.options.optional = true)
    }

    pub fn only_when<F>(self, predicate: F) -> Self
        where F: Fn(&S) -> bool + Send + Sync + 'static
    {
        let predicate: Predicate<S> = Arc::new(predicate);
        self.configure("only_when", move |step| step.options.only_when = Some(predicate.clone()))
    }

    pub fn fail_if<F>(self, predicate: F) -> Self
        where F: Fn(&S, &serde_json::Value) -> bool + Send + Sync + 'static
    {
        let predicate: crate::step::ResultPredicate<S> = Arc::new(predicate);
        self.configure("fail_if", move |step| step.options.fail_if = Some(predicate.clone()))
    }

    pub fn fail_if_with<F>(self, predicate: F, message: &str) -> Self
        where F: Fn(&S, &serde_json::Value) -> bool + Send + Sync + 'static
    {
        let predicate: crate::step::ResultPredicate<S> = Arc::new(predicate);
        let message = message.to_string();
        self.configure("fail_if", move |step| {
                step.options.fail_if = Some(predicate.clone());
                step.options.fail_if_message = Some(message.clone());
            })
    }

    pub fn tag(self, name: &str) -> Self {
        let name = name.to_string();
        self.configure("tag", move |step| step.options.tags.push(name.clone()))
    }

    /// Compensación del step: mensaje que lo deshace si el flujo falla más
    /// adelante.
    pub fn if_fail<F>(self, compensation: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        let compensation: MessageFactory<S> = Arc::new(compensation);
        self.configure("if_fail", move |step| step.compensation = Some(compensation.clone()))
    }

    /// Compensación agregada de un `when_all`: se despacha si algún hijo
    /// falla.
    pub fn if_any_fail<F>(mut self, compensation: F) -> Self
        where F: Fn(&S) -> FlowMessage + Send + Sync + 'static
    {
        let mut error = None;
        match self.last_step_mut() {
            Some(FlowStep { kind: StepKind::WhenAll { compensation: slot, .. }, .. }) => {
                *slot = Some(Arc::new(compensation));
            }
            _ => error = Some(FlowBuildError::MisplacedAggregateCompensation),
        }
        if let Some(e) = error {
            self.push_error(e);
        }
        self
    }

    /// Timeout del step. Para `when_all`/`when_any` fija el deadline de la
    /// espera; para leafs acota la llamada al mediator.
    pub fn step_timeout(self, duration: Duration) -> Self {
        self.configure("timeout", move |step| match &mut step.kind {
                StepKind::WhenAll { timeout, .. } | StepKind::WhenAny { timeout, .. } => *timeout = Some(duration),
                _ => step.options.timeout = Some(duration),
            })
    }

    /// Override del retry del flujo para este step.
    pub fn step_retry(self, attempts: u32) -> Self {
        self.configure("retry", move |step| step.options.retry = Some(attempts))
    }

    pub fn error_message(self, message: &str) -> Self {
        let message = message.to_string();
        self.configure("error_message", move |step| step.options.error_message = Some(message.clone()))
    }

    fn configure<F>(mut self, option: &'static str, apply: F) -> Self
        where F: Fn(&mut FlowStep<S>)
    {
        match self.last_step_mut() {
            Some(step) => apply(step),
            None => self.push_error(FlowBuildError::OptionWithoutStep(option)),
        }
        self
    }
}

impl<S: 'static> Default for SequenceBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> StepSink<S> for SequenceBuilder<S> {
    fn push_step(&mut self, step: FlowStep<S>) {
        if !self.allow_waits && step.is_wait() {
            self.errors.push(FlowBuildError::WaitInsideForEach);
            return;
        }
        self.current_steps_mut().push(step);
    }

    fn push_error(&mut self, error: FlowBuildError) {
        self.errors.push(error);
    }

    fn waits_allowed(&self) -> bool {
        self.allow_waits
    }
}
