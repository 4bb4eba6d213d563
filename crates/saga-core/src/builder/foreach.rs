//! Sub-builder de `for_each`: iteración con checkpoint por ítem.

use std::sync::Arc;

use super::sequence::{SequenceBuilder, StepSink};
use crate::errors::FlowBuildError;
use crate::step::{FlowStep, ForEachStep, ItemSource, SequenceFactory, StepKind};

/// Configura la iteración hasta `end_for_each()`.
///
/// El body se declara como closure `(item, secuencia) -> secuencia` y se
/// construye una vez por ítem en ejecución. Para validar estructura antes
/// de ejecutar, `body()` lo construye una vez con un ítem nulo (los
/// closures internos no se invocan durante esa sonda).
pub struct ForEachBuilder<S, P> {
    owner: P,
    source: ItemSource<S>,
    body: Option<SequenceFactory<S>>,
    parallelism: usize,
    batch_size: usize,
    continue_on_failure: bool,
    on_item_success: Option<crate::step::ItemHook<S>>,
    on_complete: Option<crate::step::CompletionHook<S>>,
    errors: Vec<FlowBuildError>,
}

impl<S: 'static, P: StepSink<S>> ForEachBuilder<S, P> {
    pub(crate) fn new(owner: P, source: ItemSource<S>) -> Self {
        Self { owner,
               source,
               body: None,
               parallelism: 1,
               batch_size: 1,
               continue_on_failure: false,
               on_item_success: None,
               on_complete: None,
               errors: Vec::new() }
    }

    pub fn body<F>(mut self, body: F) -> Self
        where F: Fn(serde_json::Value, SequenceBuilder<S>) -> SequenceBuilder<S> + Send + Sync + 'static
    {
        // Sonda de validación: construir con ítem nulo para superficie
        // temprana de errores estructurales (waits, scopes sin cerrar).
        let (_, probe_errors) = body(serde_json::Value::Null, SequenceBuilder::without_waits()).finish();
        self.errors.extend(probe_errors);
        self.body = Some(Arc::new(move |item| body(item, SequenceBuilder::without_waits()).finish().0));
        self
    }

    /// Bodies concurrentes como máximo (1 = en línea, mutando el estado
    /// compartido).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Ítems entre checkpoints de progreso en modo paralelo.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    pub fn stop_on_first_failure(mut self) -> Self {
        self.continue_on_failure = false;
        self
    }

    pub fn on_item_success<F>(mut self, hook: F) -> Self
        where F: Fn(&mut S, &serde_json::Value) + Send + Sync + 'static
    {
        self.on_item_success = Some(Arc::new(hook));
        self
    }

    pub fn on_complete<F>(mut self, hook: F) -> Self
        where F: Fn(&mut S) + Send + Sync + 'static
    {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    pub fn end_for_each(mut self) -> P {
        for error in self.errors {
            self.owner.push_error(error);
        }
        let body = match self.body {
            Some(body) => body,
            None => {
                self.owner.push_error(FlowBuildError::MissingForEachBody);
                Arc::new(|_| Vec::new()) as SequenceFactory<S>
            }
        };
        self.owner.push_step(FlowStep::new(StepKind::ForEach(ForEachStep { source: self.source,
                                                                           body,
                                                                           parallelism: self.parallelism,
                                                                           batch_size: self.batch_size,
                                                                           continue_on_failure: self.continue_on_failure,
                                                                           on_item_success: self.on_item_success,
                                                                           on_complete: self.on_complete })));
        self.owner
    }
}

impl<S: 'static> SequenceBuilder<S> {
    pub fn for_each<F>(self, source: F) -> ForEachBuilder<S, Self>
        where F: Fn(&S) -> Vec<serde_json::Value> + Send + Sync + 'static
    {
        ForEachBuilder::new(self, Arc::new(source))
    }
}
