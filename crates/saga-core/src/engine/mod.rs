//! Ejecutor DSL: la máquina de estados que recorre el árbol de steps.
//!
//! Operaciones públicas: `run` (crear y ejecutar), `resume` (continuar
//! desde el snapshot), `cancel` (transición atómica a `Cancelled`) y `get`
//! (lectura del snapshot). La semántica elegida para suspensiones es
//! durable: `run` devuelve `Suspended` apenas persiste el snapshot
//! suspendido, y la reanudación llega por el Resume Event Handler o el
//! escaneo de timeouts.

mod exec;
mod result;

pub use result::DslFlowResult;

pub(crate) use exec::{ExecCtx, SeqOutcome};

use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::builder::FlowConfig;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::errors::FlowError;
use crate::events::FlowCompletedEvent;
use crate::mediator::Mediator;
use crate::snapshot::{FlowSnapshot, FlowStatus};
use crate::state::UserState;
use crate::step::FlowPosition;
use crate::store::FlowStore;

pub struct FlowEngine<S: UserState> {
    pub(crate) config: Arc<FlowConfig<S>>,
    pub(crate) mediator: Arc<dyn Mediator>,
    pub(crate) store: Arc<dyn FlowStore>,
    pub(crate) engine_config: EngineConfig,
}

impl<S: UserState> Clone for FlowEngine<S> {
    fn clone(&self) -> Self {
        Self { config: self.config.clone(),
               mediator: self.mediator.clone(),
               store: self.store.clone(),
               engine_config: self.engine_config.clone() }
    }
}

impl<S: UserState> FlowEngine<S> {
    pub fn new(config: FlowConfig<S>, mediator: Arc<dyn Mediator>, store: Arc<dyn FlowStore>) -> Self {
        Self { config: Arc::new(config),
               mediator,
               store,
               engine_config: EngineConfig::default() }
    }

    pub fn with_engine_config(mut self, engine_config: EngineConfig) -> Self {
        self.engine_config = engine_config;
        self
    }

    pub fn config(&self) -> &FlowConfig<S> {
        &self.config
    }

    // ----- operaciones ----------------------------------------------------

    /// Crea el snapshot inicial y ejecuta hasta terminal o suspensión.
    pub async fn run(&self, state: S) -> DslFlowResult<S> {
        self.run_correlated(state, None, CancellationToken::new()).await
    }

    pub async fn run_with(&self, state: S, cancel: CancellationToken) -> DslFlowResult<S> {
        self.run_correlated(state, None, cancel).await
    }

    /// Variante para flujos hijos: el evento terminal llevará la
    /// correlación del padre.
    pub async fn run_correlated(&self,
                                mut state: S,
                                parent_correlation_id: Option<String>,
                                cancel: CancellationToken)
                                -> DslFlowResult<S> {
        if state.flow_id().is_empty() {
            state.set_flow_id(Uuid::new_v4().to_string());
        }
        let flow_id = state.flow_id().to_string();

        let initial = match serde_json::to_value(&state) {
            Ok(blob) => blob,
            Err(err) => return DslFlowResult::failed(flow_id, None, format!("serialization: {err}"), 0),
        };
        let mut snapshot = FlowSnapshot::new(flow_id.clone(), initial);
        snapshot.parent_correlation_id = parent_correlation_id.clone();
        let created_at = snapshot.created_at;

        match self.store.create(snapshot).await {
            Ok(true) => {}
            Ok(false) => {
                return DslFlowResult::failed(flow_id.clone(), Some(state), format!("flow {flow_id} already exists"), 0)
            }
            Err(err) => return DslFlowResult::failed(flow_id, Some(state), err.to_string(), 0),
        }

        if let Some(mask) = state.change_mask_mut() {
            mask.clear();
        }

        let mut ctx = ExecCtx { flow_id: flow_id.clone(),
                                cancel,
                                completed_steps: 0,
                                compensations: Vec::new(),
                                version: 1,
                                persist: self.config.persist,
                                hooks_enabled: true,
                                parent_correlation_id,
                                created_at,
                                pending_wait: None };

        debug!("flow {flow_id}: run de '{}' ({} steps raíz)", self.config.name, self.config.steps.len());
        let outcome = self.exec_sequence(&mut ctx, &mut state, &self.config.steps, Vec::new(), None).await;
        self.finalize(ctx, state, outcome).await
    }

    /// Continúa un flujo desde su snapshot. `Completed`/`Cancelled`
    /// devuelven su resultado almacenado tal cual; un flujo `Failed` se
    /// reintenta desde la posición del fallo; un id inexistente falla con
    /// un error que contiene "not found".
    pub async fn resume(&self, flow_id: &str) -> DslFlowResult<S> {
        self.resume_with(flow_id, CancellationToken::new()).await
    }

    pub async fn resume_with(&self, flow_id: &str, cancel: CancellationToken) -> DslFlowResult<S> {
        let snapshot = match self.store.get(flow_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return DslFlowResult::failed(flow_id.to_string(),
                                             None,
                                             FlowError::NotFound(flow_id.to_string()).to_string(),
                                             0)
            }
            Err(err) => return DslFlowResult::failed(flow_id.to_string(), None, err.to_string(), 0),
        };

        let state: Option<S> = serde_json::from_value(snapshot.state.clone()).ok();
        // Completed/Cancelled devuelven su resultado almacenado tal cual
        // (error incluido). Un flujo Failed sí se reintenta: el snapshot
        // recuerda la posición del fallo y el resume la reejecuta (el
        // retry automático nunca es del motor, es del caller).
        if snapshot.status.is_terminal() && snapshot.status != FlowStatus::Failed {
            return DslFlowResult { is_success: snapshot.status == FlowStatus::Completed,
                                   state,
                                   status: snapshot.status,
                                   error: snapshot.error,
                                   completed_steps: 0,
                                   flow_id: flow_id.to_string() };
        }

        let mut state = match state {
            Some(state) => state,
            None => {
                return DslFlowResult::failed(flow_id.to_string(), None, "stored state failed to deserialize".into(), 0)
            }
        };

        let mut ctx = ExecCtx { flow_id: flow_id.to_string(),
                                cancel,
                                completed_steps: 0,
                                compensations: Vec::new(),
                                version: snapshot.version,
                                persist: self.config.persist,
                                hooks_enabled: true,
                                parent_correlation_id: snapshot.parent_correlation_id.clone(),
                                created_at: snapshot.created_at,
                                pending_wait: snapshot.wait.clone() };

        debug!("flow {flow_id}: resume desde {}", snapshot.position);
        let resume_path = snapshot.position.components().to_vec();
        let outcome = self.exec_sequence(&mut ctx, &mut state, &self.config.steps, Vec::new(), Some(&resume_path))
                          .await;
        self.finalize(ctx, state, outcome).await
    }

    /// Transición atómica a `Cancelled`. `false` si el flujo ya era
    /// terminal (o no existe).
    pub async fn cancel(&self, flow_id: &str) -> Result<bool, FlowError> {
        loop {
            let Some(mut snapshot) = self.store.get(flow_id).await? else {
                return Ok(false);
            };
            if snapshot.status.is_terminal() {
                return Ok(false);
            }
            snapshot.status = FlowStatus::Cancelled;
            snapshot.wait = None;
            if self.store.update(snapshot).await? {
                info!("flow {flow_id}: cancelado");
                return Ok(true);
            }
            // Perdimos la carrera contra el ejecutor; releer y reintentar.
        }
    }

    pub async fn get(&self, flow_id: &str) -> Result<Option<FlowSnapshot>, FlowError> {
        self.store.get(flow_id).await
    }

    // ----- cierre ---------------------------------------------------------

    async fn finalize(&self,
                      mut ctx: ExecCtx<S>,
                      state: S,
                      outcome: Result<SeqOutcome, FlowError>)
                      -> DslFlowResult<S> {
        let end_position = FlowPosition(vec![self.config.steps.len() as i32]);
        match outcome {
            Ok(SeqOutcome::Done) => {
                if let Some(hook) = &self.config.on_flow_completed {
                    if let Some(event) = hook(&state) {
                        self.publish_event(event, &ctx.cancel).await;
                    }
                }
                if let Err(err) = self.write_terminal(&mut ctx, &state, end_position, FlowStatus::Completed, None).await
                {
                    return self.storage_failure(ctx, state, err).await;
                }
                self.emit_flow_completed(&ctx, &state, true, None).await;
                info!("flow {}: completado ({} steps)", ctx.flow_id, ctx.completed_steps);
                DslFlowResult::completed(ctx.flow_id, state, ctx.completed_steps)
            }
            Ok(SeqOutcome::Failed { error, position }) => {
                warn!("flow {}: falló en {}: {error}", ctx.flow_id, FlowPosition(position.clone()));
                self.run_compensations(&ctx.compensations, &state).await;
                if let Some(hook) = &self.config.on_flow_failed {
                    if let Some(event) = hook(&state, &error) {
                        self.publish_event(event, &ctx.cancel).await;
                    }
                }
                // La posición del fallo queda en el snapshot: un resume
                // posterior reintenta exactamente ese step.
                if let Err(err) = self.write_terminal(&mut ctx, &state, FlowPosition(position), FlowStatus::Failed,
                                                      Some(error.clone()))
                                      .await
                {
                    warn!("flow {}: no se pudo escribir el snapshot Failed: {err}", ctx.flow_id);
                }
                self.emit_flow_completed(&ctx, &state, false, Some(error.clone())).await;
                DslFlowResult::failed(ctx.flow_id, Some(state), error, ctx.completed_steps)
            }
            Ok(SeqOutcome::Suspended(wait)) => {
                let position = wait.parent_position.clone();
                if let Err(err) = self.write_snapshot(&mut ctx, &state, position, FlowStatus::Suspended, None,
                                                      Some(wait))
                                      .await
                {
                    return self.storage_failure(ctx, state, err).await;
                }
                DslFlowResult::suspended(ctx.flow_id, state, ctx.completed_steps)
            }
            Ok(SeqOutcome::Cancelled) => self.finalize_cancelled(ctx, state).await,
            Err(FlowError::Cancelled) => self.finalize_cancelled(ctx, state).await,
            Err(err) => self.storage_failure(ctx, state, err).await,
        }
    }

    async fn finalize_cancelled(&self, mut ctx: ExecCtx<S>, state: S) -> DslFlowResult<S> {
        // Por defecto cancelar es "parar, no deshacer"; el opt-in del flujo
        // habilita compensar lo ya hecho.
        if self.config.compensate_on_cancel {
            self.run_compensations(&ctx.compensations, &state).await;
        }
        let end_position = FlowPosition(vec![self.config.steps.len() as i32]);
        if let Err(err) = self.write_terminal(&mut ctx, &state, end_position, FlowStatus::Cancelled, None).await {
            warn!("flow {}: no se pudo escribir el snapshot Cancelled: {err}", ctx.flow_id);
        }
        self.emit_flow_completed(&ctx, &state, false, Some("cancelled".into())).await;
        info!("flow {}: cancelado tras {} steps", ctx.flow_id, ctx.completed_steps);
        DslFlowResult::cancelled(ctx.flow_id, Some(state), ctx.completed_steps)
    }

    async fn storage_failure(&self, mut ctx: ExecCtx<S>, state: S, err: FlowError) -> DslFlowResult<S> {
        let error = err.to_string();
        warn!("flow {}: error de ejecución: {error}", ctx.flow_id);
        let end_position = FlowPosition(vec![self.config.steps.len() as i32]);
        if let Err(write_err) = self.write_terminal(&mut ctx, &state, end_position, FlowStatus::Failed,
                                                    Some(error.clone()))
                                    .await
        {
            warn!("flow {}: snapshot Failed no escrito: {write_err}", ctx.flow_id);
        }
        DslFlowResult::failed(ctx.flow_id, Some(state), error, ctx.completed_steps)
    }

    /// Escritura terminal: siempre se intenta, aún con `persist` apagado.
    async fn write_terminal(&self,
                            ctx: &mut ExecCtx<S>,
                            state: &S,
                            position: FlowPosition,
                            status: FlowStatus,
                            error: Option<String>)
                            -> Result<(), FlowError> {
        self.write_snapshot(ctx, state, position, status, error, None).await
    }

    async fn emit_flow_completed(&self, ctx: &ExecCtx<S>, state: &S, success: bool, error: Option<String>) {
        let result = serde_json::to_value(state).ok();
        let event = FlowCompletedEvent { flow_id: ctx.flow_id.clone(),
                                         parent_correlation_id: ctx.parent_correlation_id.clone(),
                                         success,
                                         error,
                                         result };
        self.publish_event(event.into_message(), &CancellationToken::new()).await;
    }
}
