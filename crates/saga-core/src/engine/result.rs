//! Resultado observable de una ejecución del motor DSL.

use crate::snapshot::FlowStatus;

/// Lo que el caller recibe de `run`/`resume`: éxito, estado final (si se
/// pudo materializar), status terminal o de suspensión, el error original
/// (las compensaciones nunca pisan este texto) y el conteo de steps
/// ejecutados en esta invocación.
#[derive(Debug)]
pub struct DslFlowResult<S> {
    pub is_success: bool,
    pub state: Option<S>,
    pub status: FlowStatus,
    pub error: Option<String>,
    pub completed_steps: u32,
    pub flow_id: String,
}

impl<S> DslFlowResult<S> {
    pub fn completed(flow_id: String, state: S, completed_steps: u32) -> Self {
        Self { is_success: true,
               state: Some(state),
               status: FlowStatus::Completed,
               error: None,
               completed_steps,
               flow_id }
    }

    pub fn failed(flow_id: String, state: Option<S>, error: String, completed_steps: u32) -> Self {
        Self { is_success: false,
               state,
               status: FlowStatus::Failed,
               error: Some(error),
               completed_steps,
               flow_id }
    }

    pub fn suspended(flow_id: String, state: S, completed_steps: u32) -> Self {
        Self { is_success: false,
               state: Some(state),
               status: FlowStatus::Suspended,
               error: None,
               completed_steps,
               flow_id }
    }

    pub fn cancelled(flow_id: String, state: Option<S>, completed_steps: u32) -> Self {
        Self { is_success: false,
               state,
               status: FlowStatus::Cancelled,
               error: None,
               completed_steps,
               flow_id }
    }
}
