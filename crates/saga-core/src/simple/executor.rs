//! Ejecutor distribuido del motor lineal: create-o-claim, heartbeat y
//! failover.
//!
//! Propiedad garantizada: para un flow id, a lo sumo un ejecutor corre su
//! cuerpo en cualquier instante (con skew de reloj menor al claim
//! timeout). El que pierde el heartbeat aborta cooperativamente; el que
//! llega tarde recibe el resultado terminal almacenado.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use super::{Flow, FlowResult, SimpleFlowState, SimpleFlowStatus, SimpleStep};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::errors::FlowError;
use crate::store::SimpleFlowStore;

pub struct FlowExecutor<St: SimpleFlowStore + 'static> {
    store: Arc<St>,
    node_id: String,
    engine_config: EngineConfig,
}

impl<St: SimpleFlowStore + 'static> FlowExecutor<St> {
    pub fn new(store: Arc<St>, node_id: &str) -> Self {
        Self { store,
               node_id: node_id.to_string(),
               engine_config: EngineConfig::default() }
    }

    pub fn with_engine_config(mut self, engine_config: EngineConfig) -> Self {
        self.engine_config = engine_config;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Ejecuta `flow` bajo `flow_id` con a-lo-sumo-un-ejecutor:
    ///
    /// 1. `create` con este nodo como dueño; si el id ya existe,
    /// 2. un estado terminal devuelve su resultado (idempotencia), y
    /// 3. si está activo, `try_claim` transfiere la propiedad sólo con
    ///    heartbeat vencido; si no, el flujo es de otro nodo.
    pub async fn execute(&self,
                         flow_id: &str,
                         flow: &Flow,
                         data: Vec<u8>,
                         cancel: CancellationToken)
                         -> Result<FlowResult, FlowError> {
        let fresh = SimpleFlowState::new(flow_id.to_string(), flow.name().to_string(), self.node_id.clone(), data);

        let state = if self.store.create(fresh.clone()).await? {
            debug!("nodo {}: flow {flow_id} creado", self.node_id);
            fresh
        } else {
            let stored = self.store
                             .get(flow_id)
                             .await?
                             .ok_or_else(|| FlowError::Internal(format!("flow {flow_id} desapareció tras el create")))?;
            if stored.status.is_terminal() {
                debug!("nodo {}: flow {flow_id} ya terminal; resultado almacenado", self.node_id);
                return Ok(stored_result(&stored));
            }
            match self.store.try_claim(flow_id, &self.node_id, self.engine_config.claim_timeout_ms).await? {
                Some(claimed) => {
                    info!("nodo {}: claim de {flow_id} en step {}", self.node_id, claimed.step);
                    claimed
                }
                None => return Err(FlowError::OwnedElsewhere(flow_id.to_string())),
            }
        };

        self.run_owned(flow, state, cancel).await
    }

    async fn run_owned(&self, flow: &Flow, mut state: SimpleFlowState, cancel: CancellationToken)
                       -> Result<FlowResult, FlowError> {
        let began = Instant::now();
        let version = Arc::new(AtomicU64::new(state.version));
        let lost = Arc::new(AtomicBool::new(false));
        // El guard aborta el heartbeat también si este futuro se dropea a
        // mitad de camino (el "crash" que habilita el claim ajeno).
        let _heartbeat = AbortOnDrop(self.spawn_heartbeat(state.id.clone(), version.clone(), lost.clone()));

        let start = state.step;
        let mut executed: Vec<&SimpleStep> = Vec::new();
        let steps = flow.steps();

        for (i, step) in steps.iter().enumerate().skip(start) {
            if lost.load(Ordering::SeqCst) {
                return Err(FlowError::LostOwnership(state.id));
            }
            if cancel.is_cancelled() {
                return self.unwind(&mut state, &executed, "cancelled".into(), true, began, version).await;
            }

            match (step.forward)(cancel.clone()).await {
                Ok(()) => {
                    executed.push(step);
                    state.step = i + 1;
                    if !self.persist(&mut state, &version).await? {
                        return Err(FlowError::LostOwnership(state.id));
                    }
                }
                Err(error) => {
                    let cancelled = cancel.is_cancelled();
                    return self.unwind(&mut state, &executed, error, cancelled, began, version).await;
                }
            }
        }

        // El owner queda registrado en el estado terminal (auditoría); el
        // CAS exige que el escritor siga siendo el dueño.
        state.status = SimpleFlowStatus::Done;
        state.error = None;
        if !self.persist(&mut state, &version).await? {
            return Err(FlowError::LostOwnership(state.id));
        }
        info!("nodo {}: flow {} completado ({} steps en esta corrida)", self.node_id, state.id, executed.len());
        Ok(FlowResult { success: true,
                        completed_steps: executed.len(),
                        duration: began.elapsed(),
                        error: None,
                        cancelled: false })
    }

    /// Deshace lo ejecutado en esta corrida (reversa, errores tragados) y
    /// deja el estado terminal Failed.
    async fn unwind(&self,
                    state: &mut SimpleFlowState,
                    executed: &[&SimpleStep],
                    error: String,
                    cancelled: bool,
                    began: Instant,
                    version: Arc<AtomicU64>)
                    -> Result<FlowResult, FlowError> {
        state.status = SimpleFlowStatus::Compensating;
        // Best effort: si perdimos la versión acá igual compensamos; el
        // nuevo dueño reintentará los forwards, no las compensaciones.
        let _ = self.persist(state, &version).await;

        for step in executed.iter().rev() {
            if let Some(comp) = &step.compensation {
                if let Err(comp_error) = comp(CancellationToken::new()).await {
                    warn!("compensación de '{}' falló: {comp_error}", step.name);
                }
            }
        }

        state.status = SimpleFlowStatus::Failed;
        state.error = Some(error.clone());
        let _ = self.persist(state, &version).await;

        Ok(FlowResult { success: false,
                        completed_steps: executed.len(),
                        duration: began.elapsed(),
                        error: Some(error),
                        cancelled })
    }

    /// CAS sobre `(id, owner, version)`; sincroniza la versión local y la
    /// compartida con el heartbeat.
    async fn persist(&self, state: &mut SimpleFlowState, version: &Arc<AtomicU64>) -> Result<bool, FlowError> {
        state.version = version.load(Ordering::SeqCst);
        if SimpleFlowStore::update(&*self.store, state.clone()).await? {
            state.version += 1;
            version.store(state.version, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn spawn_heartbeat(&self, id: String, version: Arc<AtomicU64>, lost: Arc<AtomicBool>) -> JoinHandle<()> {
        let store = self.store.clone();
        let owner = self.node_id.clone();
        let interval = self.engine_config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // el primer tick resuelve inmediato
            loop {
                ticker.tick().await;
                match store.heartbeat(&id, &owner, version.load(Ordering::SeqCst)).await {
                    Ok(true) => {}
                    Ok(false) => {
                        // Puede ser una carrera benigna con un persist que
                        // acaba de subir la versión: sólo el cambio de dueño
                        // es pérdida real.
                        let still_owner = matches!(store.get(&id).await,
                                                   Ok(Some(s)) if s.owner.as_deref() == Some(owner.as_str()));
                        if !still_owner {
                            warn!("nodo {owner}: heartbeat rechazado para {id}; propiedad perdida");
                            lost.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                    Err(err) => warn!("nodo {owner}: heartbeat de {id} falló: {err}"),
                }
            }
        })
    }
}

/// Aborta el task al dropear el guard.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn stored_result(state: &SimpleFlowState) -> FlowResult {
    FlowResult { success: state.status == SimpleFlowStatus::Done,
                 completed_steps: state.step,
                 duration: std::time::Duration::ZERO,
                 error: state.error.clone(),
                 cancelled: false }
}
