//! Estado de usuario y tracking de cambios.
//!
//! El motor es genérico sobre el estado (`S`); sólo exige poder leer y
//! fijar el `flow_id` de infraestructura y, opcionalmente, consultar una
//! máscara de cambios para decidir si un step sin efectos amerita
//! persistencia.

mod change_mask;

pub use change_mask::ChangeMask;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Contrato mínimo del estado de usuario de un flujo.
///
/// El campo `flow_id` es infraestructura: nunca participa de la máscara de
/// cambios y el ejecutor lo completa con un uuid v4 cuando llega vacío.
pub trait FlowState: Send + Sync {
    fn flow_id(&self) -> &str;
    fn set_flow_id(&mut self, id: String);

    /// Máscara de cambios del estado, si el tipo la declara.
    fn change_mask(&self) -> Option<&ChangeMask> {
        None
    }

    fn change_mask_mut(&mut self) -> Option<&mut ChangeMask> {
        None
    }
}

/// Bound agregado que piden las APIs del ejecutor. Implementado de forma
/// automática para cualquier estado que cumpla las partes.
pub trait UserState: FlowState + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> UserState for T where T: FlowState + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
