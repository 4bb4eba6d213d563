//! saga-core: motor de flujos durable y reanudable.
//!
//! Propósito:
//! - Ejecutar flujos declarativos de steps heterogéneos (comandos,
//!   queries, eventos, branching, iteración, fan-out con espera, timers)
//!   persistiendo el snapshot tras cada step, de modo que cualquier
//!   instancia pueda recuperarse de un crash, cancelarse, reanudarse o
//!   transferirse entre nodos.
//! - Coordinar flujos hijos con señales atómicas (all/any) y aplicar
//!   compensaciones en reversa cuando un step falla.
//!
//! Componentes principales:
//! - `step`: IR tipada del flujo (kinds, opciones, posición en el árbol).
//! - `builder`: construcción fluida y validación estructural en build.
//! - `engine`: el ejecutor DSL (`FlowEngine`) con su loop de estados.
//! - `store`: contrato de almacenamiento (CAS optimista) + referencia en
//!   memoria.
//! - `wait` / `resume`: escaneo de timeouts y avance de padres suspendidos.
//! - `simple`: motor lineal (`Flow`/`FlowExecutor`) con claim/heartbeat.
//! - `state`: contrato del estado de usuario y máscara de cambios.
//! - `mediator`: capacidad externa de despacho de mensajes.
//!
//! Re-exports: se exponen los símbolos clave para uso directo desde
//! binarios y tests.

pub mod builder;
pub mod cancel;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod events;
pub mod mediator;
pub mod resume;
pub mod simple;
pub mod snapshot;
pub mod state;
pub mod step;
pub mod store;
pub mod wait;

// Re-exports públicos principales
pub use builder::{child, FlowBuilder, FlowConfig, SequenceBuilder};
pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use engine::{DslFlowResult, FlowEngine};
pub use errors::{FlowBuildError, FlowError};
pub use events::{FlowCompletedEvent, FlowResumeRequested};
pub use mediator::{FlowMessage, Mediator, MediatorError, RecordingMediator};
pub use resume::ResumeEventHandler;
pub use simple::{Flow, FlowExecutor, FlowResult, SimpleFlowState, SimpleFlowStatus};
pub use snapshot::{ChildResult, FlowSnapshot, FlowStatus, ForEachProgress, WaitCondition, WaitKind};
pub use state::{ChangeMask, FlowState, UserState};
pub use step::{FlowPosition, FlowStep, StepKind, ELSE_BRANCH};
pub use store::{FlowStore, ForEachStore, MemoryFlowStore, SimpleFlowStore, SnapshotStore, WaitStore};
pub use wait::WaitTimeoutScanner;
