//! Mediator de prueba: registra cada despacho y permite guionar
//! resultados o fallos por nombre de mensaje.
//!
//! Los tests del motor (y la suite e2e del paquete raíz) ejecutan todo
//! contra este doble; no hay ningún transporte real involucrado.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{FlowMessage, Mediator, MediatorError};
use crate::cancel::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Send,
    Query,
    Publish,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub message: FlowMessage,
}

#[derive(Default)]
pub struct RecordingMediator {
    calls: Mutex<Vec<RecordedCall>>,
    /// Resultados guionados por nombre (FIFO; el último se reutiliza).
    results: DashMap<String, VecDeque<Value>>,
    /// Fallos guionados por nombre: (error, veces restantes; None = siempre).
    failures: DashMap<String, (String, Option<u32>)>,
}

impl RecordingMediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guiona el resultado devuelto por `query` para `name`. Llamadas
    /// sucesivas encolan resultados; agotada la cola se repite el último.
    pub fn script_result(&self, name: &str, value: Value) {
        self.results.entry(name.to_string()).or_default().push_back(value);
    }

    /// Todo despacho de `name` falla lógicamente con `error`.
    pub fn fail_with(&self, name: &str, error: &str) {
        self.failures.insert(name.to_string(), (error.to_string(), None));
    }

    /// Sólo las primeras `times` invocaciones de `name` fallan.
    pub fn fail_times(&self, name: &str, error: &str, times: u32) {
        self.failures.insert(name.to_string(), (error.to_string(), Some(times)));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Nombres de mensaje en orden de despacho (comodidad para asserts).
    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.message.name).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    fn record(&self, kind: CallKind, message: &FlowMessage) {
        self.calls.lock().expect("calls lock").push(RecordedCall { kind, message: message.clone() });
    }

    fn scripted_failure(&self, name: &str) -> Option<String> {
        let mut remove = false;
        let hit = self.failures.get_mut(name).map(|mut entry| {
                                               let (error, remaining) = entry.value_mut();
                                               if let Some(n) = remaining {
                                                   *n -= 1;
                                                   if *n == 0 {
                                                       remove = true;
                                                   }
                                               }
                                               error.clone()
                                           });
        if remove {
            self.failures.remove(name);
        }
        hit
    }

    fn next_result(&self, name: &str) -> Value {
        match self.results.get_mut(name) {
            Some(mut queue) => {
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or(Value::Null)
                } else {
                    queue.front().cloned().unwrap_or(Value::Null)
                }
            }
            None => Value::Null,
        }
    }

    fn dispatch(&self, kind: CallKind, msg: &FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError> {
        if cancel.is_cancelled() {
            return Err(MediatorError::Cancelled);
        }
        self.record(kind, msg);
        match self.scripted_failure(&msg.name) {
            Some(error) => Err(MediatorError::Logical(error)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Mediator for RecordingMediator {
    async fn send(&self, msg: FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError> {
        self.dispatch(CallKind::Send, &msg, cancel)
    }

    async fn query(&self, msg: FlowMessage, cancel: &CancellationToken) -> Result<Value, MediatorError> {
        self.dispatch(CallKind::Query, &msg, cancel)?;
        Ok(self.next_result(&msg.name))
    }

    async fn publish(&self, event: FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError> {
        self.dispatch(CallKind::Publish, &event, cancel)
    }
}
