//! Estado de una orden en proceso.

use saga_core::{ChangeMask, FlowState};
use serde::{Deserialize, Serialize};

/// Campos trackeados por la máscara de cambios. El `flow_id` es
/// infraestructura y queda afuera.
pub const ORDER_FIELDS: &[&str] = &["status", "risk_score", "payment_id", "shipment_ids", "history"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    pub flow_id: String,
    pub customer_id: String,
    pub payment_method: String,
    pub total: f64,
    pub items: Vec<String>,
    pub status: String,
    pub risk_score: f64,
    pub payment_id: Option<String>,
    pub shipment_ids: Vec<String>,
    pub history: Vec<String>,
    #[serde(skip, default = "order_mask")]
    mask: ChangeMask,
}

fn order_mask() -> ChangeMask {
    ChangeMask::new(ORDER_FIELDS)
}

impl OrderState {
    pub fn new(customer_id: &str, payment_method: &str, total: f64, items: &[&str]) -> Self {
        Self { flow_id: String::new(),
               customer_id: customer_id.to_string(),
               payment_method: payment_method.to_string(),
               total,
               items: items.iter().map(|i| i.to_string()).collect(),
               status: "received".into(),
               risk_score: 0.0,
               payment_id: None,
               shipment_ids: Vec::new(),
               history: Vec::new(),
               mask: order_mask() }
    }

    pub fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
        self.mask.mark(0);
        self.record(status);
    }

    pub fn set_risk_score(&mut self, score: f64) {
        self.risk_score = score;
        self.mask.mark(1);
    }

    pub fn set_payment_id(&mut self, id: &str) {
        self.payment_id = Some(id.to_string());
        self.mask.mark(2);
    }

    pub fn add_shipment(&mut self, id: &str) {
        self.shipment_ids.push(id.to_string());
        self.mask.mark(3);
    }

    fn record(&mut self, entry: &str) {
        self.history.push(entry.to_string());
        self.mask.mark(4);
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        self.mask.changed_field_names()
    }
}

impl FlowState for OrderState {
    fn flow_id(&self) -> &str {
        &self.flow_id
    }

    fn set_flow_id(&mut self, id: String) {
        self.flow_id = id;
    }

    fn change_mask(&self) -> Option<&ChangeMask> {
        Some(&self.mask)
    }

    fn change_mask_mut(&mut self) -> Option<&mut ChangeMask> {
        Some(&mut self.mask)
    }
}
