//! Tipos persistentes del motor DSL: snapshot, estado, condición de espera
//! y progreso de iteración.
//!
//! Rol en el flujo:
//! - El `FlowSnapshot` es la unidad de durabilidad: se escribe después de
//!   cada step con la versión incrementada; cualquier nodo puede retomar
//!   desde él.
//! - La `WaitCondition` queda inline en el snapshot suspendido y además
//!   indexada por correlación en el store, para que señales y timeouts la
//!   alcancen sin cargar el snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::step::FlowPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    Running,
    /// Esperando señales de hijos o un timer (`WaitingForResponse` en la
    /// terminología del protocolo).
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub flow_id: String,
    /// Estado de usuario serializado (blob opaco para el store).
    pub state: serde_json::Value,
    /// Cursor de reanudación dentro del árbol de steps.
    pub position: FlowPosition,
    pub status: FlowStatus,
    pub error: Option<String>,
    /// Espera activa, inline, cuando `status == Suspended`.
    pub wait: Option<WaitCondition>,
    /// Correlación hacia la espera de un padre, si este flujo es hijo.
    pub parent_correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Versión monotónica; cada update exitoso la deja en `version + 1`.
    pub version: u64,
}

impl FlowSnapshot {
    pub fn new(flow_id: String, state: serde_json::Value) -> Self {
        let now = Utc::now();
        Self { flow_id,
               state,
               position: FlowPosition::root(),
               status: FlowStatus::Running,
               error: None,
               wait: None,
               parent_correlation_id: None,
               created_at: now,
               updated_at: now,
               version: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// Satisfecha cuando todos los hijos señalaron.
    All,
    /// Satisfecha con la primera señal.
    Any,
    /// Timer (`delay`/`schedule_at`): una única señal sintética que aporta
    /// el escaneo de timeouts al vencer el plazo.
    Timer,
}

/// Resultado reportado por un hijo (o sintetizado por el escaneo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildResult {
    pub child_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitCondition {
    pub correlation_id: String,
    pub kind: WaitKind,
    pub expected: u32,
    pub completed: u32,
    /// Ids de las señales esperadas (message ids de los hijos; para un
    /// timer, la propia correlación).
    pub child_ids: Vec<String>,
    /// Resultados en orden de llegada.
    pub results: Vec<ChildResult>,
    /// Deadline absoluto; pasado este instante el escaneo sintetiza las
    /// señales faltantes.
    pub timeout_at: DateTime<Utc>,
    pub parent_flow_id: String,
    pub parent_position: FlowPosition,
}

impl WaitCondition {
    /// Invariante: `completed <= expected`; la satisfacción transiciona al
    /// padre de `Suspended` a `Running`.
    pub fn is_satisfied(&self) -> bool {
        match self.kind {
            WaitKind::All => self.completed == self.expected,
            WaitKind::Any | WaitKind::Timer => self.completed >= 1,
        }
    }

    /// Ids de hijos que todavía no señalaron.
    pub fn missing_children(&self) -> Vec<String> {
        self.child_ids
            .iter()
            .filter(|id| !self.results.iter().any(|r| &r.child_id == *id))
            .cloned()
            .collect()
    }
}

/// Checkpoint de un `for_each`, bajo `(flow_id, path del step)`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForEachProgress {
    /// Próximo índice a intentar.
    pub current: usize,
    pub total: usize,
    pub completed: BTreeSet<usize>,
    pub failed: BTreeSet<usize>,
}

impl ForEachProgress {
    pub fn new(total: usize) -> Self {
        Self { current: 0,
               total,
               completed: BTreeSet::new(),
               failed: BTreeSet::new() }
    }

    pub fn all_completed(&self) -> bool {
        self.completed.len() == self.total
    }
}
