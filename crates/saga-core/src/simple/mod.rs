//! Motor lineal: lista ordenada de acciones con compensación por step.
//!
//! Convive con el ejecutor DSL para el caso simple: side-effects
//! arbitrarios (no mensajes) en orden, deshacer en reversa ante fallo o
//! cancelación, y un protocolo de claim/heartbeat (`FlowExecutor`) que
//! garantiza a lo sumo un ejecutor por flow id.

mod executor;
mod state;

pub use executor::FlowExecutor;
pub use state::{SimpleFlowState, SimpleFlowStatus};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::cancel::CancellationToken;

/// Acción asincrónica de un step (avance o compensación). Recibe la señal
/// de cancelación; un `Err` es el texto del fallo.
pub type SimpleAction =
    Arc<dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

pub struct SimpleStep {
    pub name: String,
    pub forward: SimpleAction,
    pub compensation: Option<SimpleAction>,
}

/// Resultado de una ejecución del motor lineal. `cancelled` distingue la
/// cancelación del fallo genérico.
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub success: bool,
    pub completed_steps: usize,
    pub duration: Duration,
    pub error: Option<String>,
    pub cancelled: bool,
}

pub struct Flow {
    name: String,
    steps: Vec<SimpleStep>,
}

impl Flow {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(),
               steps: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn steps(&self) -> &[SimpleStep] {
        &self.steps
    }

    pub fn step<F, Fut>(mut self, name: &str, forward: F) -> Self
        where F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<(), String>> + Send + 'static
    {
        self.steps.push(SimpleStep { name: name.to_string(),
                                     forward: wrap(forward),
                                     compensation: None });
        self
    }

    pub fn step_with_compensation<F, Fut, C, CFut>(mut self, name: &str, forward: F, compensation: C) -> Self
        where F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<(), String>> + Send + 'static,
              C: Fn(CancellationToken) -> CFut + Send + Sync + 'static,
              CFut: Future<Output = Result<(), String>> + Send + 'static
    {
        self.steps.push(SimpleStep { name: name.to_string(),
                                     forward: wrap(forward),
                                     compensation: Some(wrap(compensation)) });
        self
    }

    /// Ejecuta todos los steps en orden.
    pub async fn execute(&self, cancel: CancellationToken) -> FlowResult {
        self.execute_from(0, cancel).await
    }

    /// Reanuda en `start` (los anteriores se asumen hechos en otra vida):
    /// sólo los steps ejecutados acá se compensan ante fallo.
    pub async fn execute_from(&self, start: usize, cancel: CancellationToken) -> FlowResult {
        let began = Instant::now();
        let mut executed: Vec<&SimpleStep> = Vec::new();

        for step in self.steps.iter().skip(start) {
            if cancel.is_cancelled() {
                compensate(&executed).await;
                return FlowResult { success: false,
                                    completed_steps: executed.len(),
                                    duration: began.elapsed(),
                                    error: Some("cancelled".into()),
                                    cancelled: true };
            }
            match (step.forward)(cancel.clone()).await {
                Ok(()) => executed.push(step),
                Err(error) => {
                    let cancelled = cancel.is_cancelled();
                    compensate(&executed).await;
                    return FlowResult { success: false,
                                        completed_steps: executed.len(),
                                        duration: began.elapsed(),
                                        error: Some(error),
                                        cancelled };
                }
            }
        }

        FlowResult { success: true,
                     completed_steps: executed.len(),
                     duration: began.elapsed(),
                     error: None,
                     cancelled: false }
    }
}

/// Compensa en reversa. Los fallos se tragan (con log) y no frenan las
/// compensaciones restantes.
async fn compensate(executed: &[&SimpleStep]) {
    for step in executed.iter().rev() {
        if let Some(comp) = &step.compensation {
            if let Err(error) = comp(CancellationToken::new()).await {
                warn!("compensación de '{}' falló: {error}", step.name);
            }
        }
    }
}

fn wrap<F, Fut>(f: F) -> SimpleAction
    where F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = Result<(), String>> + Send + 'static
{
    Arc::new(move |cancel| Box::pin(f(cancel)))
}
