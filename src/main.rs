//! Demo en memoria del motor: corre el flujo de órdenes contra el store
//! en memoria y el mediator en proceso, y muestra el motor lineal con su
//! resultado.

use std::sync::Arc;

use serde_json::json;

use saga_adapters::{order_flow, InProcessMediator, OrderState};
use saga_core::{CancellationToken, EngineConfig, Flow, FlowEngine, MemoryFlowStore};

#[tokio::main]
async fn main() {
    let mediator = Arc::new(InProcessMediator::new());
    wire_handlers(&mediator);

    let store = Arc::new(MemoryFlowStore::new());
    let engine = FlowEngine::new(order_flow().expect("flujo de órdenes válido"), mediator.clone(), store.clone())
        .with_engine_config(EngineConfig::from_env());

    // Una orden con tarjeta: scoring, cobro, envíos y confirmación.
    let order = OrderState::new("cust-42", "credit", 180.0, &["keyboard", "mouse"]);
    let result = engine.run(order).await;
    println!("orden {} -> {:?} ({} steps)", result.flow_id, result.status, result.completed_steps);
    if let Some(state) = &result.state {
        println!("  status={} payment={:?} envíos={:?}", state.status, state.payment_id, state.shipment_ids);
    }
    let snapshot = engine.get(&result.flow_id).await.unwrap().expect("snapshot");
    println!("  snapshot v{} en {}", snapshot.version, snapshot.position);

    // Un método de pago desconocido cae al default del switch.
    let other = OrderState::new("cust-7", "bitcoin", 50.0, &[]);
    let result = engine.run(other).await;
    println!("orden {} -> {:?} (pago manual)", result.flow_id, result.status);

    // Motor lineal: transferencia con compensación.
    let transfer = Flow::new("transfer")
        .step_with_compensation("debit",
                                |_| async { Ok(()) },
                                |_| async {
                                    println!("  compensación: crédito devuelto");
                                    Ok(())
                                })
        .step("credit", |_| async { Err("cuenta destino cerrada".to_string()) });
    let outcome = transfer.execute(CancellationToken::new()).await;
    println!("transfer -> success={} error={:?} ({} steps en {:?})",
             outcome.success,
             outcome.error,
             outcome.completed_steps,
             outcome.duration);

    println!("eventos publicados: {:?}",
             mediator.published().iter().map(|e| e.name.clone()).collect::<Vec<_>>());
}

fn wire_handlers(mediator: &InProcessMediator) {
    mediator.handle("risk.score", |msg| {
                let total = msg.payload["total"].as_f64().unwrap_or(0.0);
                Ok(json!(if total > 1000.0 { 0.9 } else { 0.25 }))
            });
    mediator.handle("payment.charge_card", |_| Ok(json!("card-pay-001")));
    mediator.handle("payment.charge_paypal", |_| Ok(json!("pp-pay-001")));
    mediator.handle("payment.manual_review", |_| Ok(json!(null)));
    mediator.handle("order.flag_review", |_| Ok(json!(null)));
    mediator.handle("shipping.dispatch", |msg| {
                let item = msg.payload["item"].as_str().unwrap_or("?");
                Ok(json!(format!("ship-{item}")))
            });
    mediator.handle("order.confirm", |_| Ok(json!(null)));
}
