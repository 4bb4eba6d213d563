//! Intérprete interno del árbol de steps.
//!
//! La recursión sigue la forma del árbol: una secuencia ejecuta sus steps
//! en orden; los compuestos (`if`/`switch`) descienden a la rama elegida y
//! el path de posición registra ese descenso para que la recuperación
//! aterrice exactamente donde quedó. La persistencia ocurre después de
//! cada step hoja exitoso, con la versión incrementada.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::FlowEngine;
use crate::cancel::CancellationToken;
use crate::constants;
use crate::errors::FlowError;
use crate::mediator::MediatorError;
use crate::snapshot::{FlowSnapshot, FlowStatus, ForEachProgress, WaitCondition, WaitKind};
use crate::state::UserState;
use crate::step::{FlowPosition, FlowStep, ForEachStep, MessageFactory, StepKind, ELSE_BRANCH};

/// Contexto mutable de una invocación (`run`/`resume`).
pub(crate) struct ExecCtx<S> {
    pub flow_id: String,
    pub cancel: CancellationToken,
    pub completed_steps: u32,
    /// Compensaciones registradas en orden de ejecución de este proceso.
    pub compensations: Vec<MessageFactory<S>>,
    /// Versión del snapshot almacenado (CAS optimista).
    pub version: u64,
    pub persist: bool,
    /// Apagado dentro de bodies de iteración: ni hooks ni persistencia.
    pub hooks_enabled: bool,
    pub parent_correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Espera cargada del snapshot al reanudar, si había una.
    pub pending_wait: Option<WaitCondition>,
}

/// Resultado de ejecutar una secuencia (o el flujo completo).
pub(crate) enum SeqOutcome {
    Done,
    /// El fallo recuerda su posición: un `resume` posterior reintenta ahí.
    Failed { error: String, position: Vec<i32> },
    Suspended(WaitCondition),
    Cancelled,
}

/// Resultado de un step hoja (send/query/publish, for_each, waits).
enum LeafExec {
    Success,
    Failed(String),
    Suspended(WaitCondition),
    Cancelled,
}

/// Resultado de un body de iteración.
enum ItemOutcome {
    Ok,
    Failed(String),
    Cancelled,
}

type SeqFuture<'a> = Pin<Box<dyn Future<Output = Result<SeqOutcome, FlowError>> + Send + 'a>>;

impl<S: UserState> FlowEngine<S> {
    /// Ejecuta `steps` desde el principio o desde el path de reanudación.
    ///
    /// `base` es el prefijo de posición de esta secuencia; `resume` es el
    /// resto del path almacenado, relativo a ella. Un primer componente
    /// igual al largo de la secuencia significa "ya terminó".
    pub(crate) fn exec_sequence<'a>(&'a self,
                                    ctx: &'a mut ExecCtx<S>,
                                    state: &'a mut S,
                                    steps: &'a [FlowStep<S>],
                                    base: Vec<i32>,
                                    resume: Option<&'a [i32]>)
                                    -> SeqFuture<'a> {
        Box::pin(async move {
            let mut start = 0usize;
            let mut inner_resume: Option<&[i32]> = None;
            if let Some(path) = resume {
                let k = path.first().copied().unwrap_or(0).max(0) as usize;
                if k >= steps.len() {
                    return Ok(SeqOutcome::Done);
                }
                start = k;
                if path.len() > 1 {
                    inner_resume = Some(&path[1..]);
                }
                // Los steps anteriores al punto de reanudación ya corrieron
                // en otra vida: re-registrar sus compensaciones para que un
                // fallo posterior también los deshaga. El gate se re-evalúa
                // sobre el estado restaurado (un step saltado no compensa).
                for step in steps.iter().take(start) {
                    if let Some(comp) = &step.compensation {
                        let applied = step.options.only_when.as_ref().map_or(true, |pred| pred(state));
                        if applied {
                            ctx.compensations.push(comp.clone());
                        }
                    }
                }
            }

            for i in start..steps.len() {
                if ctx.cancel.is_cancelled() {
                    return Ok(SeqOutcome::Cancelled);
                }
                let step = &steps[i];
                let resume_here = if i == start { inner_resume } else { None };
                let at_resume_target = i == start && resume.is_some() && inner_resume.is_none();

                let mut path = base.clone();
                path.push(i as i32);

                // Gate de ejecución. No se re-evalúa al descender un resume
                // (la rama registrada manda) ni sobre una espera ya creada.
                let resuming_wait = at_resume_target && step.is_wait() && ctx.pending_wait.is_some();
                if resume_here.is_none() && !resuming_wait {
                    if let Some(pred) = &step.options.only_when {
                        if !pred(state) {
                            debug!("flow {}: step {} saltado por only_when", ctx.flow_id, FlowPosition(path.clone()));
                            continue;
                        }
                    }
                }

                let exec = match &step.kind {
                    StepKind::Send { .. } | StepKind::Query { .. } | StepKind::Publish { .. } => {
                        self.exec_leaf(ctx, state, step).await
                    }
                    StepKind::If { branches, else_branch } => {
                        let chosen = if let Some(sub) = resume_here {
                            // Descenso guiado: la rama ya quedó registrada.
                            let branch = sub[0];
                            let body = if branch == ELSE_BRANCH {
                                else_branch.as_deref()
                            } else {
                                branches.get(branch as usize).map(|b| b.body.as_slice())
                            };
                            body.map(|b| (branch, b, Some(&sub[1..])))
                        } else {
                            match branches.iter().enumerate().find(|(_, b)| (b.condition)(state)) {
                                Some((idx, b)) => Some((idx as i32, b.body.as_slice(), None)),
                                None => else_branch.as_deref().map(|b| (ELSE_BRANCH, b, None)),
                            }
                        };
                        match chosen {
                            Some((component, body, sub)) => {
                                let mut child_base = path.clone();
                                child_base.push(component);
                                match self.exec_sequence(ctx, state, body, child_base, sub.filter(|s| !s.is_empty()))
                                          .await?
                                {
                                    SeqOutcome::Done => {
                                        continue; // contenedor transparente
                                    }
                                    other => return Ok(other),
                                }
                            }
                            None => continue, // sin rama que matchee y sin else: no-op
                        }
                    }
                    StepKind::Switch { selector, cases, default } => {
                        let chosen = if let Some(sub) = resume_here {
                            let branch = sub[0];
                            let body = if branch == ELSE_BRANCH {
                                default.as_deref()
                            } else {
                                cases.get_index(branch as usize).map(|(_, b)| b.as_slice())
                            };
                            body.map(|b| (branch, b, Some(&sub[1..])))
                        } else {
                            let key = selector(state);
                            match cases.get_index_of(&key) {
                                Some(idx) => cases.get_index(idx).map(|(_, b)| (idx as i32, b.as_slice(), None)),
                                None => default.as_deref().map(|b| (ELSE_BRANCH, b, None)),
                            }
                        };
                        match chosen {
                            Some((component, body, sub)) => {
                                let mut child_base = path.clone();
                                child_base.push(component);
                                match self.exec_sequence(ctx, state, body, child_base, sub.filter(|s| !s.is_empty()))
                                          .await?
                                {
                                    SeqOutcome::Done => continue,
                                    other => return Ok(other),
                                }
                            }
                            None => continue, // valor sin caso ni default: no-op
                        }
                    }
                    StepKind::ForEach(fe) => self.exec_foreach(ctx, state, fe, &path).await,
                    StepKind::WhenAll { .. } | StepKind::WhenAny { .. } | StepKind::Delay { .. }
                    | StepKind::ScheduleAt { .. } => self.exec_wait(ctx, state, step, &path, at_resume_target).await,
                }?;

                let mut next = base.clone();
                next.push(i as i32 + 1);
                match exec {
                    LeafExec::Success => {
                        ctx.completed_steps += 1;
                        if let Some(comp) = &step.compensation {
                            ctx.compensations.push(comp.clone());
                        }
                        if ctx.hooks_enabled {
                            if let Some(hook) = &self.config.on_step_completed {
                                if let Some(event) = hook(state, ctx.completed_steps - 1) {
                                    self.publish_event(event, &ctx.cancel).await;
                                }
                            }
                        }
                        self.persist_after_step(ctx, state, next).await?;
                    }
                    LeafExec::Failed(error) => {
                        if step.options.optional {
                            debug!("flow {}: step opcional {} falló y se ignora: {error}", ctx.flow_id, step.kind_name());
                            self.persist_after_step(ctx, state, next).await?;
                            continue;
                        }
                        return Ok(SeqOutcome::Failed { error, position: path });
                    }
                    LeafExec::Suspended(wait) => return Ok(SeqOutcome::Suspended(wait)),
                    LeafExec::Cancelled => return Ok(SeqOutcome::Cancelled),
                }
            }
            Ok(SeqOutcome::Done)
        })
    }

    // ----- hojas ----------------------------------------------------------

    async fn exec_leaf(&self, ctx: &ExecCtx<S>, state: &mut S, step: &FlowStep<S>) -> Result<LeafExec, FlowError> {
        let attempts = self.config.effective_retry(&step.options) + 1;
        let timeout = self.config.effective_timeout(&step.options);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if ctx.cancel.is_cancelled() {
                return Ok(LeafExec::Cancelled);
            }
            match self.dispatch_leaf(state, step, timeout, &ctx.cancel).await {
                Ok(result) => {
                    if let Some(pred) = &step.options.fail_if {
                        let value = result.clone().unwrap_or(Value::Null);
                        if pred(state, &value) {
                            let message = step.options
                                              .fail_if_message
                                              .clone()
                                              .or_else(|| step.options.error_message.clone())
                                              .unwrap_or_else(|| format!("fail_if predicate matched on {} result",
                                                                         step.kind_name()));
                            return Ok(LeafExec::Failed(message));
                        }
                    }
                    if let Some(value) = result {
                        if let StepKind::Send { into: Some(binder), .. } | StepKind::Query { into: Some(binder), .. } =
                            &step.kind
                        {
                            binder(state, value);
                        }
                    }
                    return Ok(LeafExec::Success);
                }
                Err(MediatorError::Cancelled) => return Ok(LeafExec::Cancelled),
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < attempts {
                        warn!("flow {}: step {} falló (intento {attempt}/{attempts}): {last_error}",
                              ctx.flow_id,
                              step.kind_name());
                    }
                }
            }
        }

        let error = step.options.error_message.clone().unwrap_or(last_error);
        Ok(LeafExec::Failed(error))
    }

    /// Una llamada al mediator con timeout efectivo. `Some(valor)` cuando el
    /// step produce resultado.
    async fn dispatch_leaf(&self,
                           state: &S,
                           step: &FlowStep<S>,
                           timeout: Option<std::time::Duration>,
                           cancel: &CancellationToken)
                           -> Result<Option<Value>, MediatorError> {
        let call = async {
            match &step.kind {
                StepKind::Send { factory, into } => {
                    let msg = factory(state);
                    if into.is_some() {
                        self.mediator.query(msg, cancel).await.map(Some)
                    } else {
                        self.mediator.send(msg, cancel).await.map(|_| None)
                    }
                }
                StepKind::Query { factory, .. } => {
                    let msg = factory(state);
                    self.mediator.query(msg, cancel).await.map(Some)
                }
                StepKind::Publish { factory } => {
                    let msg = factory(state);
                    self.mediator.publish(msg, cancel).await.map(|_| None)
                }
                _ => unreachable!("dispatch_leaf sólo recibe send/query/publish"),
            }
        };
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(MediatorError::Infrastructure(format!("step timed out after {limit:?}"))),
            },
            None => call.await,
        }
    }

    // ----- iteración ------------------------------------------------------

    async fn exec_foreach(&self,
                          ctx: &mut ExecCtx<S>,
                          state: &mut S,
                          fe: &ForEachStep<S>,
                          path: &[i32])
                          -> Result<LeafExec, FlowError> {
        let position = FlowPosition(path.to_vec());
        let items = (fe.source)(state);
        let mut progress = if ctx.persist {
            self.store
                .get_foreach_progress(&ctx.flow_id, &position)
                .await?
                .unwrap_or_else(|| ForEachProgress::new(items.len()))
        } else {
            ForEachProgress::new(items.len())
        };
        // La fuente se re-evalúa al reanudar; el total sigue a los ítems.
        progress.total = items.len();

        let outcome = if fe.parallelism <= 1 {
            self.foreach_sequential(ctx, state, fe, &items, &mut progress, &position).await?
        } else {
            self.foreach_parallel(ctx, state, fe, &items, &mut progress, &position).await?
        };

        match outcome {
            ForEachOutcome::Stopped(error) => Ok(LeafExec::Failed(error)),
            ForEachOutcome::Cancelled => Ok(LeafExec::Cancelled),
            ForEachOutcome::Finished => {
                if let Some(hook) = &fe.on_complete {
                    hook(state);
                }
                if progress.all_completed() && ctx.persist {
                    self.store.clear_foreach_progress(&ctx.flow_id, &position).await?;
                }
                Ok(LeafExec::Success)
            }
        }
    }

    async fn foreach_sequential(&self,
                                ctx: &mut ExecCtx<S>,
                                state: &mut S,
                                fe: &ForEachStep<S>,
                                items: &[Value],
                                progress: &mut ForEachProgress,
                                position: &FlowPosition)
                                -> Result<ForEachOutcome, FlowError> {
        for idx in 0..items.len() {
            if progress.completed.contains(&idx) || progress.failed.contains(&idx) {
                continue;
            }
            if ctx.cancel.is_cancelled() {
                return Ok(ForEachOutcome::Cancelled);
            }
            let body = (fe.body)(items[idx].clone());
            match self.exec_item_body(ctx, state, &body).await? {
                ItemOutcome::Ok => {
                    progress.completed.insert(idx);
                    progress.current = idx + 1;
                    if let Some(hook) = &fe.on_item_success {
                        hook(state, &items[idx]);
                    }
                }
                ItemOutcome::Failed(error) => {
                    if fe.continue_on_failure {
                        warn!("flow {}: ítem {idx} falló y se registra: {error}", ctx.flow_id);
                        progress.failed.insert(idx);
                        progress.current = idx + 1;
                    } else {
                        // El cursor queda en el ítem fallido: el resume lo
                        // reintenta exactamente una vez más.
                        progress.current = idx;
                        self.save_progress(ctx, state, position, progress).await?;
                        return Ok(ForEachOutcome::Stopped(error));
                    }
                }
                ItemOutcome::Cancelled => return Ok(ForEachOutcome::Cancelled),
            }
            self.save_progress(ctx, state, position, progress).await?;
        }
        Ok(ForEachOutcome::Finished)
    }

    async fn foreach_parallel(&self,
                              ctx: &mut ExecCtx<S>,
                              state: &mut S,
                              fe: &ForEachStep<S>,
                              items: &[Value],
                              progress: &mut ForEachProgress,
                              position: &FlowPosition)
                              -> Result<ForEachOutcome, FlowError> {
        let pending: Vec<usize> = (0..items.len()).filter(|i| !progress.completed.contains(i) && !progress.failed.contains(i))
                                                  .collect();
        let mut stopped: Option<String> = None;
        let mut cancelled = false;

        'chunks: for chunk in pending.chunks(fe.batch_size.max(fe.parallelism)) {
            for wave in chunk.chunks(fe.parallelism) {
                if ctx.cancel.is_cancelled() {
                    cancelled = true;
                    break 'chunks;
                }
                let mut join: JoinSet<(usize, Result<ItemOutcome, FlowError>)> = JoinSet::new();
                for &idx in wave {
                    let engine = self.clone();
                    let item = items[idx].clone();
                    let body = (fe.body)(item);
                    // Cada body corre contra un clon del estado: las
                    // mutaciones cross-ítem pasan por on_item_success, que
                    // se aplica en serie sobre el estado compartido.
                    let mut local = state.clone();
                    let cancel = ctx.cancel.clone();
                    let flow_id = ctx.flow_id.clone();
                    join.spawn(async move {
                        let mut scratch = scratch_ctx(flow_id, cancel);
                        let out = engine.exec_item_scratch(&mut scratch, &mut local, &body).await;
                        (idx, out)
                    });
                }
                while let Some(joined) = join.join_next().await {
                    let (idx, out) = joined.map_err(|e| FlowError::Internal(format!("item task join: {e}")))?;
                    match out? {
                        ItemOutcome::Ok => {
                            progress.completed.insert(idx);
                            if let Some(hook) = &fe.on_item_success {
                                hook(state, &items[idx]);
                            }
                        }
                        ItemOutcome::Failed(error) => {
                            if fe.continue_on_failure {
                                warn!("flow {}: ítem {idx} falló y se registra: {error}", ctx.flow_id);
                                progress.failed.insert(idx);
                            } else if stopped.is_none() {
                                stopped = Some(error);
                            }
                        }
                        ItemOutcome::Cancelled => cancelled = true,
                    }
                }
                if stopped.is_some() || cancelled {
                    break;
                }
            }
            progress.current = chunk.last().map(|i| i + 1).unwrap_or(progress.current);
            self.save_progress(ctx, state, position, progress).await?;
            if stopped.is_some() || cancelled {
                break;
            }
        }

        if cancelled {
            return Ok(ForEachOutcome::Cancelled);
        }
        match stopped {
            Some(error) => Ok(ForEachOutcome::Stopped(error)),
            None => Ok(ForEachOutcome::Finished),
        }
    }

    /// Body de un ítem en modo secuencial: muta el estado compartido.
    async fn exec_item_body(&self,
                            ctx: &ExecCtx<S>,
                            state: &mut S,
                            body: &[FlowStep<S>])
                            -> Result<ItemOutcome, FlowError> {
        let mut scratch = scratch_ctx(ctx.flow_id.clone(), ctx.cancel.clone());
        self.exec_item_scratch(&mut scratch, state, body).await
    }

    /// Ejecuta un body como mini-saga: sus propios steps completados se
    /// compensan en reversa si el body falla.
    async fn exec_item_scratch(&self,
                               scratch: &mut ExecCtx<S>,
                               state: &mut S,
                               body: &[FlowStep<S>])
                               -> Result<ItemOutcome, FlowError> {
        match self.exec_sequence(scratch, state, body, Vec::new(), None).await? {
            SeqOutcome::Done => Ok(ItemOutcome::Ok),
            SeqOutcome::Failed { error, .. } => {
                self.run_compensations(&scratch.compensations, state).await;
                Ok(ItemOutcome::Failed(error))
            }
            SeqOutcome::Cancelled => Ok(ItemOutcome::Cancelled),
            SeqOutcome::Suspended(_) => {
                // El builder rechaza waits dentro de bodies; esto es un bug.
                Err(FlowError::Internal("wait step inside for_each body".into()))
            }
        }
    }

    /// Checkpoint de iteración: progreso + snapshot del estado, con la
    /// posición clavada en el propio `for_each` para que el resume vuelva
    /// a entrar ahí y saltee lo completado.
    async fn save_progress(&self, ctx: &mut ExecCtx<S>, state: &S, position: &FlowPosition, progress: &ForEachProgress)
                           -> Result<(), FlowError> {
        if ctx.persist {
            self.store.save_foreach_progress(&ctx.flow_id, position, progress.clone()).await?;
            self.write_snapshot(ctx, state, position.clone(), FlowStatus::Running, None, None).await?;
        }
        Ok(())
    }

    // ----- esperas --------------------------------------------------------

    async fn exec_wait(&self,
                       ctx: &mut ExecCtx<S>,
                       state: &mut S,
                       step: &FlowStep<S>,
                       path: &[i32],
                       resuming: bool)
                       -> Result<LeafExec, FlowError> {
        let position = FlowPosition(path.to_vec());

        // ¿Reanudación sobre una espera ya creada?
        if resuming {
            if let Some(pending) = ctx.pending_wait.clone() {
                if pending.parent_position == position {
                    return self.resolve_wait(ctx, state, step, pending).await;
                }
            }
        }

        // Primera llegada: crear la condición, despachar hijos y suspender.
        let correlation_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let default_timeout = self.engine_config.default_wait_timeout;

        let condition = match &step.kind {
            StepKind::WhenAll { children, timeout, .. } | StepKind::WhenAny { children, timeout, .. } => {
                let kind = if matches!(step.kind, StepKind::WhenAll { .. }) {
                    WaitKind::All
                } else {
                    WaitKind::Any
                };
                let mut child_ids = Vec::with_capacity(children.len());
                for factory in children {
                    let msg = factory(state).with_correlation(correlation_id.clone());
                    child_ids.push(msg.message_id.to_string());
                    match self.mediator.send(msg, &ctx.cancel).await {
                        Ok(()) => {}
                        Err(MediatorError::Cancelled) => return Ok(LeafExec::Cancelled),
                        Err(err) => return Ok(LeafExec::Failed(format!("child dispatch failed: {err}"))),
                    }
                }
                WaitCondition { correlation_id: correlation_id.clone(),
                                kind,
                                expected: child_ids.len() as u32,
                                completed: 0,
                                child_ids,
                                results: Vec::new(),
                                timeout_at: now + timeout.unwrap_or(default_timeout),
                                parent_flow_id: ctx.flow_id.clone(),
                                parent_position: position }
            }
            StepKind::Delay { duration } => timer_condition(&correlation_id, now + *duration, ctx, position),
            StepKind::ScheduleAt { at } => timer_condition(&correlation_id, at(state), ctx, position),
            _ => unreachable!("exec_wait sólo recibe steps de espera"),
        };

        self.store.set_wait_condition(condition.clone()).await?;
        debug!("flow {}: suspendido en {} esperando {} señal(es)",
               ctx.flow_id,
               condition.parent_position,
               condition.expected);
        Ok(LeafExec::Suspended(condition))
    }

    /// La espera existía: decidir si quedó satisfecha y resolver el step.
    async fn resolve_wait(&self,
                          ctx: &mut ExecCtx<S>,
                          state: &mut S,
                          step: &FlowStep<S>,
                          pending: WaitCondition)
                          -> Result<LeafExec, FlowError> {
        // Preferir la post-imagen del store (las señales llegan por fuera
        // del snapshot).
        let condition = self.store
                            .get_wait_condition(&pending.correlation_id)
                            .await?
                            .unwrap_or(pending);

        if !condition.is_satisfied() {
            return Ok(LeafExec::Suspended(condition));
        }

        ctx.pending_wait = None;
        let correlation_id = condition.correlation_id.clone();

        let resolution = match &step.kind {
            StepKind::WhenAll { compensation, .. } => {
                match condition.results.iter().find(|r| !r.success) {
                    Some(failed) => {
                        if let Some(comp) = compensation {
                            let msg = comp(state);
                            if let Err(err) = self.mediator.send(msg, &CancellationToken::new()).await {
                                warn!("flow {}: compensación agregada falló: {err}", ctx.flow_id);
                            }
                        }
                        LeafExec::Failed(format!("child flow {} failed: {}",
                                                 failed.child_id,
                                                 failed.error.clone().unwrap_or_else(|| "unknown error".into())))
                    }
                    None => LeafExec::Success,
                }
            }
            StepKind::WhenAny { into, .. } => match condition.results.first() {
                Some(first) if first.success => {
                    if let Some(binder) = into {
                        binder(state, first.result.clone().unwrap_or(Value::Null));
                    }
                    LeafExec::Success
                }
                Some(first) => LeafExec::Failed(format!("child flow {} failed: {}",
                                                        first.child_id,
                                                        first.error.clone().unwrap_or_else(|| "unknown error".into()))),
                None => LeafExec::Failed("wait satisfied without results".into()),
            },
            StepKind::Delay { .. } | StepKind::ScheduleAt { .. } => LeafExec::Success,
            _ => unreachable!("resolve_wait sólo recibe steps de espera"),
        };

        self.store.clear_wait_condition(&correlation_id).await?;
        Ok(resolution)
    }

    // ----- persistencia y compensación ------------------------------------

    async fn persist_after_step(&self, ctx: &mut ExecCtx<S>, state: &mut S, next_path: Vec<i32>)
                                -> Result<(), FlowError> {
        if !ctx.persist {
            return Ok(());
        }
        self.write_snapshot(ctx, state, FlowPosition(next_path), FlowStatus::Running, None, None).await?;
        if let Some(mask) = state.change_mask_mut() {
            mask.clear();
        }
        Ok(())
    }

    /// Escritura CAS del snapshot. El perdedor relee y reintenta; si el
    /// ganador externo canceló el flujo, se aborta cooperativamente.
    pub(crate) async fn write_snapshot(&self,
                                       ctx: &mut ExecCtx<S>,
                                       state: &S,
                                       position: FlowPosition,
                                       status: FlowStatus,
                                       error: Option<String>,
                                       wait: Option<WaitCondition>)
                                       -> Result<(), FlowError> {
        let mut snapshot = FlowSnapshot { flow_id: ctx.flow_id.clone(),
                                          state: serde_json::to_value(state)?,
                                          position,
                                          status,
                                          error,
                                          wait,
                                          parent_correlation_id: ctx.parent_correlation_id.clone(),
                                          created_at: ctx.created_at,
                                          updated_at: Utc::now(),
                                          version: ctx.version };
        for _ in 0..constants::MAX_SNAPSHOT_WRITE_RETRIES {
            if self.store.update(snapshot.clone()).await? {
                ctx.version = snapshot.version + 1;
                return Ok(());
            }
            match self.store.get(&ctx.flow_id).await? {
                Some(stored) => {
                    if stored.status == FlowStatus::Cancelled && status != FlowStatus::Cancelled {
                        return Err(FlowError::Cancelled);
                    }
                    snapshot.version = stored.version;
                }
                None => return Err(FlowError::NotFound(ctx.flow_id.clone())),
            }
        }
        Err(FlowError::Conflict(ctx.flow_id.clone()))
    }

    /// Corre compensaciones en orden inverso al de ejecución. Los errores
    /// se loguean y no frenan las restantes.
    pub(crate) async fn run_compensations(&self, compensations: &[MessageFactory<S>], state: &S) {
        // Token fresco: compensar debe funcionar aún con el flujo cancelado.
        let cancel = CancellationToken::new();
        for factory in compensations.iter().rev() {
            let msg = factory(state);
            let name = msg.name.clone();
            if let Err(err) = self.mediator.send(msg, &cancel).await {
                warn!("compensación '{name}' falló: {err}");
            }
        }
    }

    /// Publica un evento de hook; el fallo no afecta al flujo.
    pub(crate) async fn publish_event(&self, event: crate::mediator::FlowMessage, cancel: &CancellationToken) {
        let name = event.name.clone();
        if let Err(err) = self.mediator.publish(event, cancel).await {
            warn!("evento '{name}' no pudo publicarse: {err}");
        }
    }
}

enum ForEachOutcome {
    Finished,
    Stopped(String),
    Cancelled,
}

fn scratch_ctx<S>(flow_id: String, cancel: CancellationToken) -> ExecCtx<S> {
    ExecCtx { flow_id,
              cancel,
              completed_steps: 0,
              compensations: Vec::new(),
              version: 0,
              persist: false,
              hooks_enabled: false,
              parent_correlation_id: None,
              created_at: Utc::now(),
              pending_wait: None }
}

fn timer_condition<S>(correlation_id: &str,
                      timeout_at: DateTime<Utc>,
                      ctx: &ExecCtx<S>,
                      position: FlowPosition)
                      -> WaitCondition {
    WaitCondition { correlation_id: correlation_id.to_string(),
                    kind: WaitKind::Timer,
                    expected: 1,
                    completed: 0,
                    child_ids: vec![correlation_id.to_string()],
                    results: Vec::new(),
                    timeout_at,
                    parent_flow_id: ctx.flow_id.clone(),
                    parent_position: position }
}
