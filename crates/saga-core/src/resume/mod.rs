//! Resume Event Handler: reacciona a la terminación de flujos hijos y
//! avanza a los padres bloqueados en una espera.
//!
//! Idempotencia: una señal repetida del mismo `(correlación, hijo)` es un
//! no-op; la deduplicación vive dentro del update atómico del store, no
//! acá, para que dos handlers concurrentes tampoco dupliquen.

use std::sync::Arc;

use log::{debug, warn};

use crate::cancel::CancellationToken;
use crate::errors::FlowError;
use crate::events::{FlowCompletedEvent, FlowResumeRequested};
use crate::mediator::Mediator;
use crate::snapshot::ChildResult;
use crate::store::WaitStore;

pub struct ResumeEventHandler {
    store: Arc<dyn WaitStore>,
    mediator: Arc<dyn Mediator>,
}

impl ResumeEventHandler {
    pub fn new(store: Arc<dyn WaitStore>, mediator: Arc<dyn Mediator>) -> Self {
        Self { store, mediator }
    }

    /// Variante para hosts que reciben `FlowMessage` crudos de su bus:
    /// ignora todo lo que no sea un `flow.completed` bien formado.
    pub async fn handle_message(&self, msg: &crate::mediator::FlowMessage) -> Result<Option<String>, FlowError> {
        match FlowCompletedEvent::from_message(msg) {
            Some(event) => self.handle(event).await,
            None => Ok(None),
        }
    }

    /// Procesa el evento terminal de un hijo.
    ///
    /// Devuelve `Some(parent_flow_id)` cuando la espera quedó satisfecha
    /// con esta señal: el host en proceso puede invocar `resume` directo;
    /// además se publica la notificación por el mediator para hosts
    /// desacoplados.
    pub async fn handle(&self, event: FlowCompletedEvent) -> Result<Option<String>, FlowError> {
        let Some(correlation_id) = event.parent_correlation_id else {
            return Ok(None); // el flujo no era hijo de nadie
        };

        // Señal repetida del mismo hijo: no-op (el update igual deduplica;
        // este chequeo evita re-notificar una espera ya satisfecha).
        match self.store.get_wait_condition(&correlation_id).await? {
            None => {
                debug!("señal para correlación desconocida {correlation_id}; se ignora");
                return Ok(None);
            }
            Some(existing) if existing.results.iter().any(|r| r.child_id == event.flow_id) => {
                debug!("señal duplicada de {} para {correlation_id}; se ignora", event.flow_id);
                return Ok(None);
            }
            Some(_) => {}
        }

        let result = ChildResult { child_id: event.flow_id,
                                   success: event.success,
                                   error: event.error,
                                   result: event.result };

        let Some(condition) = self.store.update_wait_condition(&correlation_id, result).await? else {
            debug!("señal para correlación desconocida {correlation_id}; se ignora");
            return Ok(None);
        };

        if !condition.is_satisfied() {
            debug!("espera {correlation_id}: {}/{} señales", condition.completed, condition.expected);
            return Ok(None);
        }

        let notice = FlowResumeRequested { flow_id: condition.parent_flow_id.clone() };
        if let Err(err) = self.mediator.publish(notice.into_message(), &CancellationToken::new()).await {
            warn!("notificación de reanudación para {} falló: {err}", condition.parent_flow_id);
        }
        Ok(Some(condition.parent_flow_id))
    }
}
