//! Contrato del mediator: la capacidad externa que despacha mensajes
//! (comandos / queries / eventos) hacia sus handlers.
//!
//! Rol en el flujo:
//! - El ejecutor nunca habla con servicios concretos; cada step produce un
//!   `FlowMessage` con su factory y lo entrega aquí.
//! - Un fallo lógico se reporta como `MediatorError::Logical` (texto del
//!   error); un problema de infraestructura como `Infrastructure`. Ambos
//!   fallan el step con su mensaje; `Cancelled` transiciona el flujo a
//!   `Cancelled` en vez de `Failed`.

mod recording;

pub use recording::{CallKind, RecordedCall, RecordingMediator};

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationToken;

static NEXT_MESSAGE_ID: AtomicI64 = AtomicI64::new(1);

/// Sobre neutral de un mensaje saliente.
///
/// `message_id` es único por proceso y sirve de correlación: un hijo
/// despachado desde `when_all`/`when_any` queda identificado por este id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowMessage {
    pub message_id: i64,
    /// Clave de ruteo (p.ej. "payment.charge").
    pub name: String,
    /// Correlación hacia una espera padre, si este mensaje inicia un hijo.
    pub correlation_id: Option<String>,
    pub payload: serde_json::Value,
}

impl FlowMessage {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { message_id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed),
               name: name.into(),
               correlation_id: None,
               payload }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediatorError {
    /// Fallo lógico reportado por el handler (no es una excepción).
    #[error("{0}")]
    Logical(String),
    /// Error de infraestructura (transporte, handler ausente, panic remoto).
    #[error("infrastructure: {0}")]
    Infrastructure(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Capacidad consumida por el motor. Debe ser segura para llamadas
/// concurrentes.
#[async_trait]
pub trait Mediator: Send + Sync {
    /// Despacha un comando sin resultado.
    async fn send(&self, msg: FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError>;

    /// Despacha un comando/query que produce un resultado.
    async fn query(&self, msg: FlowMessage, cancel: &CancellationToken) -> Result<serde_json::Value, MediatorError>;

    /// Publica un evento (fire-and-forget para el flujo).
    async fn publish(&self, event: FlowMessage, cancel: &CancellationToken) -> Result<(), MediatorError>;
}
