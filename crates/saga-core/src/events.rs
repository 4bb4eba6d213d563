//! Eventos emitidos por el motor vía mediator.

use serde::{Deserialize, Serialize};

use crate::mediator::FlowMessage;

/// Nombres de ruteo de los eventos del motor.
pub mod topics {
    /// Un flujo alcanzó estado terminal.
    pub const FLOW_COMPLETED: &str = "flow.completed";
    /// Una espera quedó satisfecha: el padre puede reanudarse.
    pub const FLOW_RESUME_REQUESTED: &str = "flow.resume.requested";
}

/// Evento terminal de un flujo. Si el flujo era hijo de una espera,
/// `parent_correlation_id` la referencia y el Resume Event Handler la
/// avanza con este evento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCompletedEvent {
    pub flow_id: String,
    pub parent_correlation_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl FlowCompletedEvent {
    pub fn into_message(self) -> FlowMessage {
        let correlation = self.parent_correlation_id.clone();
        let payload = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        let msg = FlowMessage::new(topics::FLOW_COMPLETED, payload);
        match correlation {
            Some(corr) => msg.with_correlation(corr),
            None => msg,
        }
    }

    /// Decodifica desde un mensaje del tópico `flow.completed`.
    pub fn from_message(msg: &FlowMessage) -> Option<Self> {
        if msg.name != topics::FLOW_COMPLETED {
            return None;
        }
        serde_json::from_value(msg.payload.clone()).ok()
    }
}

/// Notificación de que un padre suspendido quedó listo para reanudar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResumeRequested {
    pub flow_id: String,
}

impl FlowResumeRequested {
    pub fn into_message(self) -> FlowMessage {
        let payload = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        FlowMessage::new(topics::FLOW_RESUME_REQUESTED, payload)
    }
}
