//! Constantes y defaults del motor.

/// Intervalo por defecto del escaneo de timeouts de esperas (segundos).
pub const DEFAULT_WAIT_SCAN_INTERVAL_SECS: u64 = 30;

/// Deadline por defecto de una condición de espera sin timeout explícito
/// (segundos).
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 3_600;

/// Antigüedad mínima del heartbeat para poder reclamar un flow ajeno (ms).
pub const DEFAULT_CLAIM_TIMEOUT_MS: i64 = 30_000;

/// Intervalo entre heartbeats del ejecutor simple (ms).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Reintentos de escritura de snapshot ante conflicto optimista antes de
/// rendirse.
pub const MAX_SNAPSHOT_WRITE_RETRIES: u32 = 3;

/// Texto sintético usado por el escaneo de timeouts para señales faltantes.
pub const TIMED_OUT_ERROR: &str = "timed out";
