//! Opciones por step, ortogonales al kind.

use std::time::Duration;

use super::callbacks::{Predicate, ResultPredicate};

pub struct StepOptions<S> {
    /// Un fallo de este step no falla el flujo.
    pub optional: bool,
    /// Gate de ejecución: si el predicado da falso el step se saltea.
    pub only_when: Option<Predicate<S>>,
    /// Convierte un resultado exitoso en fallo cuando el predicado matchea.
    pub fail_if: Option<ResultPredicate<S>>,
    /// Mensaje usado cuando `fail_if` matchea (cae en `error_message` y
    /// luego en un default si no hay).
    pub fail_if_message: Option<String>,
    pub tags: Vec<String>,
    /// Override del timeout efectivo del step (gana a tags y al default del
    /// flujo).
    pub timeout: Option<Duration>,
    /// Override del retry del flujo para este step.
    pub retry: Option<u32>,
    /// Texto de error custom para fallos de este step.
    pub error_message: Option<String>,
}

impl<S> Default for StepOptions<S> {
    fn default() -> Self {
        Self { optional: false,
               only_when: None,
               fail_if: None,
               fail_if_message: None,
               tags: Vec::new(),
               timeout: None,
               retry: None,
               error_message: None }
    }
}

impl<S> Clone for StepOptions<S> {
    fn clone(&self) -> Self {
        Self { optional: self.optional,
               only_when: self.only_when.clone(),
               fail_if: self.fail_if.clone(),
               fail_if_message: self.fail_if_message.clone(),
               tags: self.tags.clone(),
               timeout: self.timeout,
               retry: self.retry,
               error_message: self.error_message.clone() }
    }
}
