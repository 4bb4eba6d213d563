//! Implementación en memoria del contrato de almacenamiento.
//!
//! - Referencia de paridad para cualquier backend real: la suite de
//!   escenarios de `tests/store_parity.rs` se escribe contra los traits y
//!   corre tal cual sobre esta implementación.
//! - El locking por clave del `DashMap` (entry API) provee la atomicidad
//!   que el contrato exige para los compare-and-set.
//! - Volátil: útil para tests, demos y ejecución embebida.

use chrono::{DateTime, Utc};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::errors::FlowError;
use crate::simple::SimpleFlowState;
use crate::snapshot::{ChildResult, FlowSnapshot, ForEachProgress, WaitCondition};
use crate::step::FlowPosition;
use crate::store::{ForEachStore, SimpleFlowStore, SnapshotStore, WaitStore};

#[derive(Default)]
pub struct MemoryFlowStore {
    snapshots: DashMap<String, FlowSnapshot>,
    waits: DashMap<String, WaitCondition>,
    progress: DashMap<(String, FlowPosition), ForEachProgress>,
    simple: DashMap<String, SimpleFlowState>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cantidad de snapshots vivos (comodidad para tests).
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryFlowStore {
    async fn create(&self, snapshot: FlowSnapshot) -> Result<bool, FlowError> {
        match self.snapshots.entry(snapshot.flow_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
                Ok(true)
            }
        }
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowSnapshot>, FlowError> {
        Ok(self.snapshots.get(flow_id).map(|s| s.clone()))
    }

    async fn update(&self, mut snapshot: FlowSnapshot) -> Result<bool, FlowError> {
        match self.snapshots.entry(snapshot.flow_id.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().version != snapshot.version {
                    return Ok(false);
                }
                snapshot.version += 1;
                snapshot.updated_at = Utc::now();
                slot.insert(snapshot);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn delete(&self, flow_id: &str) -> Result<bool, FlowError> {
        Ok(self.snapshots.remove(flow_id).is_some())
    }
}

#[async_trait]
impl WaitStore for MemoryFlowStore {
    async fn set_wait_condition(&self, condition: WaitCondition) -> Result<(), FlowError> {
        self.waits.insert(condition.correlation_id.clone(), condition);
        Ok(())
    }

    async fn get_wait_condition(&self, correlation_id: &str) -> Result<Option<WaitCondition>, FlowError> {
        Ok(self.waits.get(correlation_id).map(|w| w.clone()))
    }

    async fn update_wait_condition(&self, correlation_id: &str, result: ChildResult)
                                   -> Result<Option<WaitCondition>, FlowError> {
        match self.waits.entry(correlation_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let condition = slot.get_mut();
                // Dedup por child_id dentro de la sección crítica de la clave:
                // la misma señal dos veces no puede contarse doble.
                if !condition.results.iter().any(|r| r.child_id == result.child_id) {
                    condition.results.push(result);
                    condition.completed += 1;
                }
                Ok(Some(condition.clone()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn clear_wait_condition(&self, correlation_id: &str) -> Result<(), FlowError> {
        self.waits.remove(correlation_id);
        Ok(())
    }

    async fn timed_out_wait_conditions(&self, now: DateTime<Utc>) -> Result<Vec<WaitCondition>, FlowError> {
        Ok(self.waits
               .iter()
               .filter(|w| w.timeout_at <= now && !w.is_satisfied())
               .map(|w| w.clone())
               .collect())
    }
}

#[async_trait]
impl ForEachStore for MemoryFlowStore {
    async fn save_foreach_progress(&self, flow_id: &str, path: &FlowPosition, progress: ForEachProgress)
                                   -> Result<(), FlowError> {
        self.progress.insert((flow_id.to_string(), path.clone()), progress);
        Ok(())
    }

    async fn get_foreach_progress(&self, flow_id: &str, path: &FlowPosition)
                                  -> Result<Option<ForEachProgress>, FlowError> {
        Ok(self.progress.get(&(flow_id.to_string(), path.clone())).map(|p| p.clone()))
    }

    async fn clear_foreach_progress(&self, flow_id: &str, path: &FlowPosition) -> Result<(), FlowError> {
        self.progress.remove(&(flow_id.to_string(), path.clone()));
        Ok(())
    }
}

#[async_trait]
impl SimpleFlowStore for MemoryFlowStore {
    async fn create(&self, state: SimpleFlowState) -> Result<bool, FlowError> {
        match self.simple.entry(state.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(state);
                Ok(true)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<SimpleFlowState>, FlowError> {
        Ok(self.simple.get(id).map(|s| s.clone()))
    }

    async fn update(&self, mut state: SimpleFlowState) -> Result<bool, FlowError> {
        match self.simple.entry(state.id.clone()) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get();
                if stored.version != state.version || stored.owner != state.owner {
                    return Ok(false);
                }
                state.version += 1;
                slot.insert(state);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn try_claim(&self, id: &str, node_id: &str, claim_timeout_ms: i64)
                       -> Result<Option<SimpleFlowState>, FlowError> {
        match self.simple.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                if stored.status.is_terminal() {
                    return Ok(None);
                }
                let now = Utc::now().timestamp_millis();
                let stale = now - stored.heartbeat_at >= claim_timeout_ms;
                if stored.owner.is_none() || stale {
                    stored.owner = Some(node_id.to_string());
                    stored.heartbeat_at = now;
                    stored.version += 1;
                    Ok(Some(stored.clone()))
                } else {
                    Ok(None)
                }
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn heartbeat(&self, id: &str, owner: &str, version: u64) -> Result<bool, FlowError> {
        match self.simple.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                if stored.owner.as_deref() != Some(owner) || stored.version != version {
                    return Ok(false);
                }
                stored.heartbeat_at = Utc::now().timestamp_millis();
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }
}