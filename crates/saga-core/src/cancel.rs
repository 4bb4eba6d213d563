//! Señal cooperativa de cancelación.
//!
//! El token se propaga del caller al ejecutor y de ahí a cada llamada al
//! mediator; la cancelación nunca interrumpe un step a mitad de camino, se
//! observa entre steps o dentro del mediator.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: watch::Sender<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { tx: watch::Sender::new(false) }
    }

    /// Dispara la señal. Idempotente.
    pub fn cancel(&self) {
        let _ = self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Espera hasta que alguien llame `cancel()`.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for resuelve inmediatamente si ya está cancelado
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
