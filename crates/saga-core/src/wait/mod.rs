//! Coordinación de esperas: escaneo de timeouts.
//!
//! Las señales normales llegan por el Resume Event Handler; este módulo
//! cubre el otro camino: esperas vencidas. El escaneo sintetiza las
//! señales faltantes con el mismo update atómico que usan las señales
//! reales, por lo que es idempotente sin estado extra: una espera ya
//! satisfecha no vuelve a aparecer en la consulta.

mod scanner;

pub use scanner::WaitTimeoutScanner;
