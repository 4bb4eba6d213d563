//! Estado persistente del motor lineal.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleFlowStatus {
    Running,
    Compensating,
    Done,
    Failed,
}

impl SimpleFlowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Fila compacta de un flujo lineal: cursor + dueño + heartbeat.
///
/// La corrección del protocolo de claim depende de que el store haga
/// updates condicionales atómicos sobre `(id, owner, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleFlowState {
    pub id: String,
    /// Nombre del tipo de flujo (el `name` del `Flow`).
    pub flow_type: String,
    pub status: SimpleFlowStatus,
    /// Cursor dentro de la lista lineal de steps: próximo a ejecutar.
    pub step: usize,
    pub version: u64,
    /// Nodo dueño de la ejecución; vacío cuando nadie la corre.
    pub owner: Option<String>,
    /// Epoch millis del último heartbeat del dueño.
    pub heartbeat_at: i64,
    /// Payload opaco del caller; viaja como base64 en el JSON del store.
    #[serde(serialize_with = "ser_b64", deserialize_with = "de_b64")]
    pub data: Vec<u8>,
    pub error: Option<String>,
}

impl SimpleFlowState {
    pub fn new(id: String, flow_type: String, owner: String, data: Vec<u8>) -> Self {
        Self { id,
               flow_type,
               status: SimpleFlowStatus::Running,
               step: 0,
               version: 1,
               owner: Some(owner),
               heartbeat_at: chrono::Utc::now().timestamp_millis(),
               data,
               error: None }
    }
}

fn ser_b64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

fn de_b64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let text = String::deserialize(deserializer)?;
    BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrips_as_base64() {
        let state = SimpleFlowState::new("f1".into(), "demo".into(), "node-a".into(), vec![1, 2, 250]);
        let json = serde_json::to_string(&state).expect("serialize");
        assert!(json.contains("\"data\":\""));
        let back: SimpleFlowState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.data, vec![1, 2, 250]);
        assert_eq!(back.version, 1);
    }
}
