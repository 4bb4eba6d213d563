//! Contrato de almacenamiento: la única superficie que el motor conoce.
//!
//! Reglas transversales:
//! - Toda operación debe ser segura ante invocación concurrente.
//! - Las escrituras de snapshot son compare-and-set sobre `(id, version)`
//!   (y `(id, owner, version)` en el motor simple); el perdedor observa
//!   `false`/conflicto y reintenta releyendo.
//! - Los backends implementan la atomicidad con lo que tengan nativo
//!   (updates condicionales, CAS por clave, transacciones, revisiones).

mod memory;

pub use memory::MemoryFlowStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::FlowError;
use crate::simple::SimpleFlowState;
use crate::snapshot::{ChildResult, FlowSnapshot, ForEachProgress, WaitCondition};
use crate::step::FlowPosition;

/// CRUD de snapshots con versionado optimista.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Inserta si `flow_id` no existe. `true` = insertado, `false` =
    /// conflicto. Atómico.
    async fn create(&self, snapshot: FlowSnapshot) -> Result<bool, FlowError>;

    async fn get(&self, flow_id: &str) -> Result<Option<FlowSnapshot>, FlowError>;

    /// Escribe una revisión nueva sii la versión almacenada coincide con
    /// `snapshot.version`; la versión almacenada queda en
    /// `snapshot.version + 1`. `false` = versión vieja.
    async fn update(&self, snapshot: FlowSnapshot) -> Result<bool, FlowError>;

    /// Elimina el snapshot; devuelve si existía.
    async fn delete(&self, flow_id: &str) -> Result<bool, FlowError>;
}

/// Estado durable de esperas (señales de hijos / timers).
#[async_trait]
pub trait WaitStore: Send + Sync {
    /// Upsert idempotente por correlación.
    async fn set_wait_condition(&self, condition: WaitCondition) -> Result<(), FlowError>;

    async fn get_wait_condition(&self, correlation_id: &str) -> Result<Option<WaitCondition>, FlowError>;

    /// Apendea un resultado de hijo e incrementa `completed` en uno, de
    /// forma atómica y deduplicando por `child_id` (una señal repetida es
    /// un no-op). Devuelve la post-imagen, o `None` si la correlación no
    /// existe.
    async fn update_wait_condition(&self, correlation_id: &str, result: ChildResult)
                                   -> Result<Option<WaitCondition>, FlowError>;

    /// Remueve la condición; idempotente.
    async fn clear_wait_condition(&self, correlation_id: &str) -> Result<(), FlowError>;

    /// Esperas no satisfechas cuyo deadline ya pasó.
    async fn timed_out_wait_conditions(&self, now: DateTime<Utc>) -> Result<Vec<WaitCondition>, FlowError>;
}

/// Checkpoints de iteración de `for_each`.
#[async_trait]
pub trait ForEachStore: Send + Sync {
    async fn save_foreach_progress(&self, flow_id: &str, path: &FlowPosition, progress: ForEachProgress)
                                   -> Result<(), FlowError>;

    async fn get_foreach_progress(&self, flow_id: &str, path: &FlowPosition)
                                  -> Result<Option<ForEachProgress>, FlowError>;

    async fn clear_foreach_progress(&self, flow_id: &str, path: &FlowPosition) -> Result<(), FlowError>;
}

/// Paquete completo que consume el ejecutor DSL.
pub trait FlowStore: SnapshotStore + WaitStore + ForEachStore {}

impl<T> FlowStore for T where T: SnapshotStore + WaitStore + ForEachStore {}

/// Store del motor lineal con protocolo de claim/heartbeat.
#[async_trait]
pub trait SimpleFlowStore: Send + Sync {
    /// Inserta si el id no existe (el creador queda como dueño).
    async fn create(&self, state: SimpleFlowState) -> Result<bool, FlowError>;

    async fn get(&self, id: &str) -> Result<Option<SimpleFlowState>, FlowError>;

    /// CAS sobre `(id, owner, version)`: escribe sii dueño y versión
    /// coinciden con lo almacenado; la versión queda en `version + 1`.
    async fn update(&self, state: SimpleFlowState) -> Result<bool, FlowError>;

    /// Transfiere la propiedad a `node_id` sii el flujo no es terminal y
    /// el dueño actual está vacío o su heartbeat es más viejo que
    /// `claim_timeout_ms`. Devuelve la post-imagen reclamada.
    async fn try_claim(&self, id: &str, node_id: &str, claim_timeout_ms: i64)
                       -> Result<Option<SimpleFlowState>, FlowError>;

    /// Refresca `heartbeat_at` sii `(owner, version)` coinciden. Un
    /// `false` señala propiedad perdida; el ejecutor debe abortar.
    async fn heartbeat(&self, id: &str, owner: &str, version: u64) -> Result<bool, FlowError>;
}
