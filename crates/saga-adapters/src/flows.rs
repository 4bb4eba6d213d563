//! Flujos armados sobre el estado de órdenes.

use std::time::Duration;

use serde_json::json;

use saga_core::{child, FlowBuildError, FlowConfig, FlowMessage};

use crate::order::OrderState;

/// Flujo principal de procesamiento de una orden:
/// scoring de riesgo → revisión condicional → cobro según método de pago
/// (con compensación) → envío por ítem → confirmación.
pub fn order_flow() -> Result<FlowConfig<OrderState>, FlowBuildError> {
    FlowConfig::builder("order-processing")
        .retry(1)
        .timeout_for_tags(Duration::from_secs(5), &["external"])
        .query(|s: &OrderState| {
            FlowMessage::new("risk.score", json!({"customer": s.customer_id, "total": s.total}))
        })
        .into_state(|s, v| s.set_risk_score(v.as_f64().unwrap_or(0.0)))
        .tag("external")
        .if_(|s| s.risk_score >= 0.8)
        .send(|s| FlowMessage::new("order.flag_review", json!({"order": s.flow_id, "score": s.risk_score})))
        .end_if()
        .switch(|s| s.payment_method.clone())
        .case("credit", |seq| {
            seq.query(|s: &OrderState| FlowMessage::new("payment.charge_card", json!({"amount": s.total})))
               .into_state(|s, v| {
                   let id = v.as_str().unwrap_or("").to_string();
                   s.set_payment_id(&id);
                   s.set_status("paid");
               })
               .if_fail(|s| FlowMessage::new("payment.refund_card", json!({"payment": s.payment_id})))
               .tag("external")
        })
        .case("paypal", |seq| {
            seq.query(|s: &OrderState| FlowMessage::new("payment.charge_paypal", json!({"amount": s.total})))
               .into_state(|s, v| {
                   let id = v.as_str().unwrap_or("").to_string();
                   s.set_payment_id(&id);
                   s.set_status("paid");
               })
               .if_fail(|s| FlowMessage::new("payment.refund_paypal", json!({"payment": s.payment_id})))
               .tag("external")
        })
        .default_case(|seq| {
            seq.send(|s: &OrderState| FlowMessage::new("payment.manual_review", json!({"order": s.flow_id})))
        })
        .end_switch()
        .for_each(|s: &OrderState| s.items.iter().map(|i| json!(i)).collect())
        .body(|item, seq| {
            let item_name = item.as_str().unwrap_or("?").to_string();
            seq.query(move |_: &OrderState| FlowMessage::new("shipping.dispatch", json!({"item": item_name.clone()})))
               .into_state(|s, v| {
                   let id = v.as_str().unwrap_or("").to_string();
                   s.add_shipment(&id);
               })
        })
        .continue_on_failure()
        .end_for_each()
        .send(|s| FlowMessage::new("order.confirm", json!({"order": s.flow_id, "shipments": s.shipment_ids})))
        .if_fail(|s| FlowMessage::new("order.cancel", json!({"order": s.flow_id})))
        .on_flow_completed(|s| Some(FlowMessage::new("order.completed", json!({"order": s.flow_id}))))
        .on_flow_failed(|s, error| {
            Some(FlowMessage::new("order.failed", json!({"order": s.flow_id, "error": error})))
        })
        .build()
}

/// Fan-out de fulfilment: pick y pack corren como flujos hijos; la orden
/// espera a ambos antes de facturar.
pub fn fanout_flow() -> Result<FlowConfig<OrderState>, FlowBuildError> {
    FlowConfig::builder("order-fulfilment")
        .send(|s: &OrderState| FlowMessage::new("stock.hold", json!({"items": s.items})))
        .if_fail(|s| FlowMessage::new("stock.release", json!({"items": s.items})))
        .when_all(vec![child(|s: &OrderState| FlowMessage::new("fulfil.pick", json!({"items": s.items}))),
                       child(|s: &OrderState| FlowMessage::new("fulfil.pack", json!({"items": s.items})))])
        .if_any_fail(|s| FlowMessage::new("fulfil.abort", json!({"order": s.flow_id})))
        .step_timeout(Duration::from_secs(30))
        .send(|s| FlowMessage::new("billing.invoice", json!({"order": s.flow_id})))
        .build()
}
