//! Posición dentro del árbol de steps: el cursor de reanudación.
//!
//! Este módulo es el único lugar que define el mapeo del path. Un path es
//! una secuencia de enteros que alterna índice de step e índice de rama:
//!
//! - `[i]`                → step `i` de la secuencia raíz.
//! - `[i, b, j]`          → el step `i` es un `if`/`switch`; `b` es la rama
//!   tomada y `j` el step dentro de esa rama. Ramas de `if`: `0` = then,
//!   `1..` = else-ifs en orden de declaración, `ELSE_BRANCH` = else. Casos
//!   de `switch`: índice 0-based de declaración, `ELSE_BRANCH` = default.
//! - Anidamientos más profundos extienden el path con más pares `(b, j)`.
//! - Un índice de step igual al largo de su secuencia significa "esa
//!   secuencia ya terminó": el recovery sube al scope padre y continúa.
//!
//! `for_each` no extiende el path: su avance por item vive en el registro
//! de progreso (`ForEachProgress`) bajo `(flow_id, path-del-step)`.

use serde::{Deserialize, Serialize};

/// Sentinela para la rama `else` de un `if` y el caso `default` de un
/// `switch`.
pub const ELSE_BRANCH: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct FlowPosition(pub Vec<i32>);

impl FlowPosition {
    /// Posición inicial: primer step de la raíz.
    pub fn root() -> Self {
        Self(vec![0])
    }

    pub fn child(&self, component: i32) -> Self {
        let mut path = self.0.clone();
        path.push(component);
        Self(path)
    }

    /// Reemplaza el último componente (avance dentro de la misma secuencia).
    pub fn with_last(&self, component: i32) -> Self {
        let mut path = self.0.clone();
        if let Some(last) = path.last_mut() {
            *last = component;
        } else {
            path.push(component);
        }
        Self(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[i32] {
        &self.0
    }
}

impl std::fmt::Display for FlowPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join("."))
    }
}
