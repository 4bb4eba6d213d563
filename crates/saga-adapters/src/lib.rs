//! saga-adapters: dominio de ejemplo atado al motor.
//!
//! Provee lo que un host real aporta por fuera del core:
//! - `order`: un estado de negocio (procesamiento de órdenes) con tracking
//!   de cambios.
//! - `mediator`: un mediator en proceso que rutea mensajes a handlers
//!   registrados (suficiente para demos y tests de integración).
//! - `flows`: flujos armados con el builder, listos para ejecutar.

pub mod flows;
pub mod mediator;
pub mod order;

pub use flows::{fanout_flow, order_flow};
pub use mediator::InProcessMediator;
pub use order::OrderState;
