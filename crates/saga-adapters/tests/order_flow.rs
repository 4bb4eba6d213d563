//! Integración del flujo de órdenes contra el mediator en proceso.

use std::sync::Arc;

use serde_json::json;

use saga_adapters::{order_flow, InProcessMediator, OrderState};
use saga_core::{FlowEngine, FlowStatus, MemoryFlowStore};

fn wired_mediator() -> Arc<InProcessMediator> {
    let mediator = Arc::new(InProcessMediator::new());
    mediator.handle("risk.score", |msg| {
                let total = msg.payload["total"].as_f64().unwrap_or(0.0);
                Ok(json!(if total > 1000.0 { 0.9 } else { 0.2 }))
            });
    mediator.handle("payment.charge_card", |_| Ok(json!("card-pay-1")));
    mediator.handle("payment.charge_paypal", |_| Ok(json!("pp-pay-1")));
    mediator.handle("payment.manual_review", |_| Ok(json!(null)));
    mediator.handle("order.flag_review", |_| Ok(json!(null)));
    mediator.handle("shipping.dispatch", |msg| {
                let item = msg.payload["item"].as_str().unwrap_or("?");
                if item == "broken" {
                    Err("item cannot ship".into())
                } else {
                    Ok(json!(format!("ship-{item}")))
                }
            });
    mediator.handle("order.confirm", |_| Ok(json!(null)));
    mediator.handle("order.cancel", |_| Ok(json!(null)));
    mediator.handle("payment.refund_card", |_| Ok(json!(null)));
    mediator
}

fn engine(mediator: Arc<InProcessMediator>) -> FlowEngine<OrderState> {
    let store = Arc::new(MemoryFlowStore::new());
    FlowEngine::new(order_flow().expect("flujo válido"), mediator, store)
}

#[tokio::test]
async fn credit_order_completes_with_payment_and_shipments() {
    let mediator = wired_mediator();
    let engine = engine(mediator.clone());

    let order = OrderState::new("cust-1", "credit", 120.0, &["keyboard", "mouse"]);
    let result = engine.run(order).await;

    assert!(result.is_success, "error: {:?}", result.error);
    let state = result.state.expect("estado final");
    assert_eq!(state.status, "paid");
    assert_eq!(state.payment_id.as_deref(), Some("card-pay-1"));
    assert_eq!(state.shipment_ids, vec!["ship-keyboard", "ship-mouse"]);

    // El hook de cierre publicó el evento de orden completada.
    assert!(mediator.published().iter().any(|e| e.name == "order.completed"));
}

#[tokio::test]
async fn unknown_payment_method_goes_to_manual_review() {
    let mediator = wired_mediator();
    let engine = engine(mediator.clone());

    let order = OrderState::new("cust-2", "bitcoin", 50.0, &[]);
    let result = engine.run(order).await;

    assert!(result.is_success);
    let state = result.state.expect("estado final");
    // El default no cobra: sin payment_id y sin status "paid".
    assert!(state.payment_id.is_none());
    assert_ne!(state.status, "paid");
}

#[tokio::test]
async fn high_risk_orders_are_flagged_before_payment() {
    let mediator = wired_mediator();
    let engine = engine(mediator.clone());

    let order = OrderState::new("cust-3", "credit", 5000.0, &[]);
    let result = engine.run(order).await;

    assert!(result.is_success);
    assert!(result.state.expect("estado").risk_score >= 0.8);
}

#[tokio::test]
async fn broken_item_is_recorded_but_does_not_abort_the_order() {
    let mediator = wired_mediator();
    let engine = engine(mediator.clone());

    let order = OrderState::new("cust-4", "credit", 80.0, &["keyboard", "broken", "mouse"]);
    let result = engine.run(order).await;

    // continue_on_failure: el ítem roto queda registrado y el flujo cierra.
    assert!(result.is_success);
    let state = result.state.expect("estado final");
    assert_eq!(state.shipment_ids, vec!["ship-keyboard", "ship-mouse"]);
}

#[tokio::test]
async fn confirm_failure_compensates_the_charge() {
    let mediator = wired_mediator();
    mediator.handle("order.confirm", |_| Err("confirmation service down".into()));
    let engine = engine(mediator.clone());

    let order = OrderState::new("cust-5", "credit", 10.0, &[]);
    let result = engine.run(order).await;

    assert_eq!(result.status, FlowStatus::Failed);
    assert!(result.error.as_deref().unwrap_or("").contains("confirmation service down"));
    // El refund de la tarjeta corrió como compensación y el hook de fallo
    // publicó su evento.
    assert!(mediator.dispatched().contains(&"payment.refund_card".to_string()));
    assert!(mediator.published().iter().any(|e| e.name == "order.failed"));
}
