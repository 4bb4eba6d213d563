//! Mediator en proceso: registro de handlers por nombre de mensaje.
//!
//! No es un transporte de producción; es el host mínimo con el que los
//! flujos de este crate (y el binario demo) corren de punta a punta.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use serde_json::Value;

use saga_core::{CancellationToken, FlowMessage, Mediator, MediatorError};

pub type Handler = Arc<dyn Fn(&FlowMessage) -> Result<Value, String> + Send + Sync>;

#[derive(Default)]
pub struct InProcessMediator {
    handlers: DashMap<String, Handler>,
    published: Mutex<Vec<FlowMessage>>,
    dispatched: Mutex<Vec<String>>,
}

impl InProcessMediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el handler para `name`. El último registro gana.
    pub fn handle<F>(&self, name: &str, handler: F)
        where F: Fn(&FlowMessage) -> Result<Value, String> + Send + Sync + 'static
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Eventos publicados, en orden.
    pub fn published(&self) -> Vec<FlowMessage> {
        self.published.lock().expect("published lock").clone()
    }

    /// Nombres de los send/query despachados, en orden.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().expect("dispatched lock").clone()
    }

    fn invoke(&self, msg: &FlowMessage, cancel: &CancellationToken) -> Result<Value, MediatorError> {
        if cancel.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }
        self.dispatched.lock().expect("dispatched lock").push(msg.name.clone());
        let handler = self.handlers
                          .get(&msg.name)
                          .map(|h| h.clone())
                          .ok_or_else(|| MediatorError::Infrastructure(format!("no handler for '{}'", msg.name)))?;
        debug!("despachando '{}' (id {})", msg.name, msg.message_id);
        handler(msg).map_err(MediatorError::Logical)
    }
}

#[async_trait]
impl Mediator for InProcessMediator {
    async fn send(&self, msg: FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError> {
        self.invoke(&msg, cancel).map(|_| ())
    }

    async fn query(&self, msg: FlowMessage, cancel: &CancellationToken) -> Result<Value, MediatorError> {
        self.invoke(&msg, cancel)
    }

    async fn publish(&self, event: FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError> {
        if cancel.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }
        // Los eventos no exigen handler; siempre quedan registrados.
        if let Some(handler) = self.published_handler(&event) {
            let _ = handler(&event);
        }
        self.published.lock().expect("published lock").push(event);
        Ok(())
    }
}

impl InProcessMediator {
    fn published_handler(&self, event: &FlowMessage) -> Option<Handler> {
        self.handlers.get(&event.name).map(|h| h.clone())
    }
}
