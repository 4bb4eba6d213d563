//! sagaflow-rust: workspace del motor de flujos durable.
//!
//! - `saga-core`: el motor (builder, ejecutor DSL, store contract, esperas,
//!   motor lineal con claim/heartbeat).
//! - `saga-adapters`: dominio de ejemplo + mediator en proceso.
//!
//! Este paquete raíz re-exporta ambos y aloja el binario demo
//! (`main-core`) y los tests de punta a punta.

pub use saga_adapters;
pub use saga_core;
