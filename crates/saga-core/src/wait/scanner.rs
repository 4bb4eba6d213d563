//! Task de fondo que vence esperas cuyo deadline pasó.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::constants;
use crate::errors::FlowError;
use crate::events::FlowResumeRequested;
use crate::mediator::Mediator;
use crate::snapshot::{ChildResult, WaitKind};
use crate::store::WaitStore;

pub struct WaitTimeoutScanner {
    store: Arc<dyn WaitStore>,
    mediator: Arc<dyn Mediator>,
    interval: std::time::Duration,
}

impl WaitTimeoutScanner {
    pub fn new(store: Arc<dyn WaitStore>, mediator: Arc<dyn Mediator>, interval: std::time::Duration) -> Self {
        Self { store, mediator, interval }
    }

    /// Lanza el loop de escaneo; termina cuando `cancel` dispare.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.scan_once().await {
                            warn!("escaneo de timeouts falló: {err}");
                        }
                    }
                }
            }
        })
    }

    /// Un tick del escaneo. Devuelve los flow ids de padres notificados.
    ///
    /// Para cada espera vencida: completa a los hijos faltantes con una
    /// señal sintética (fallo "timed out" para All/Any, éxito para un
    /// timer) y publica la notificación de reanudación. Correr esto dos
    /// veces sobre la misma condición no emite doble: tras la primera
    /// pasada la espera queda satisfecha y la consulta deja de devolverla.
    pub async fn scan_once(&self) -> Result<Vec<String>, FlowError> {
        let now = Utc::now();
        let expired = self.store.timed_out_wait_conditions(now).await?;
        let mut resumed = Vec::with_capacity(expired.len());

        for condition in expired {
            debug!("espera {} vencida ({} señal(es) faltantes)",
                   condition.correlation_id,
                   condition.missing_children().len());
            let synthetic_success = condition.kind == WaitKind::Timer;
            for child_id in condition.missing_children() {
                let result = ChildResult { child_id,
                                           success: synthetic_success,
                                           error: (!synthetic_success).then(|| constants::TIMED_OUT_ERROR.to_string()),
                                           result: None };
                self.store.update_wait_condition(&condition.correlation_id, result).await?;
            }

            let notice = FlowResumeRequested { flow_id: condition.parent_flow_id.clone() };
            if let Err(err) = self.mediator.publish(notice.into_message(), &CancellationToken::new()).await {
                warn!("notificación de reanudación para {} falló: {err}", condition.parent_flow_id);
            }
            resumed.push(condition.parent_flow_id);
        }
        Ok(resumed)
    }
}
