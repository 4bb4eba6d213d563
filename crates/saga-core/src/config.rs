//! Carga de configuración del motor desde variables de entorno.
//! Convención `SAGA_*` con defaults de `constants`.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::constants;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Intervalo del escaneo de timeouts de esperas.
    pub wait_scan_interval: Duration,
    /// Deadline de esperas sin timeout explícito en el flujo.
    pub default_wait_timeout: Duration,
    /// Antigüedad del heartbeat a partir de la cual un nodo puede reclamar.
    pub claim_timeout_ms: i64,
    /// Intervalo entre heartbeats del ejecutor simple.
    pub heartbeat_interval: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let wait_scan = parse_env("SAGA_WAIT_SCAN_INTERVAL_SECS", constants::DEFAULT_WAIT_SCAN_INTERVAL_SECS);
        let wait_timeout = parse_env("SAGA_WAIT_TIMEOUT_SECS", constants::DEFAULT_WAIT_TIMEOUT_SECS);
        let claim_timeout_ms = parse_env("SAGA_CLAIM_TIMEOUT_MS", constants::DEFAULT_CLAIM_TIMEOUT_MS);
        let heartbeat_ms = parse_env("SAGA_HEARTBEAT_INTERVAL_MS", constants::DEFAULT_HEARTBEAT_INTERVAL_MS);
        Self { wait_scan_interval: Duration::from_secs(wait_scan),
               default_wait_timeout: Duration::from_secs(wait_timeout),
               claim_timeout_ms,
               heartbeat_interval: Duration::from_millis(heartbeat_ms) }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { wait_scan_interval: Duration::from_secs(constants::DEFAULT_WAIT_SCAN_INTERVAL_SECS),
               default_wait_timeout: Duration::from_secs(constants::DEFAULT_WAIT_TIMEOUT_SECS),
               claim_timeout_ms: constants::DEFAULT_CLAIM_TIMEOUT_MS,
               heartbeat_interval: Duration::from_millis(constants::DEFAULT_HEARTBEAT_INTERVAL_MS) }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
