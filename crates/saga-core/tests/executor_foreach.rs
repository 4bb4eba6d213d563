//! Iteración: checkpoint por ítem, reanudación exacta, continue-on-failure
//! y paralelismo con hooks serializados.


use saga_core::{FlowConfig, FlowMessage, FlowStatus};
use serde_json::json;
use test_support::*;

fn item_flow(parallelism: usize, continue_on_failure: bool) -> FlowConfig<DemoState> {
    let builder = FlowConfig::builder("items")
        .for_each(|_: &DemoState| {
            vec![json!("A"), json!("B"), json!("FAIL"), json!("C"), json!("D")]
        })
        .body(|item, seq| {
            let name = format!("item.{}", item.as_str().unwrap_or("null"));
            seq.send(move |_| FlowMessage::new(name.clone(), json!({})))
        })
        .with_parallelism(parallelism)
        .on_item_success(|s, item| {
            let tag = item.as_str().unwrap_or("?").to_string();
            s.processed.push(tag);
        });
    let builder = if continue_on_failure {
        builder.continue_on_failure()
    } else {
        builder.stop_on_first_failure()
    };
    builder.end_for_each().build().expect("flujo válido")
}

#[tokio::test]
async fn foreach_processes_every_item_in_order() {
    let h = harness(item_flow(1, false));
    let result = h.engine.run(DemoState::new()).await;

    assert!(result.is_success);
    assert_eq!(result.completed_steps, 1, "el for_each cuenta como un step");
    assert_eq!(dispatch_names(&h.mediator),
               vec!["item.A", "item.B", "item.FAIL", "item.C", "item.D"]);
    assert_eq!(result.state.expect("estado").processed, vec!["A", "B", "FAIL", "C", "D"]);
}

#[tokio::test]
async fn foreach_interruption_resumes_exactly_once_per_item() {
    let h = harness(item_flow(1, false));
    // El ítem FAIL falla sólo la primera vez.
    h.mediator.fail_times("item.FAIL", "transient item error", 1);

    let first = h.engine.run(DemoState::new()).await;
    assert_eq!(first.status, FlowStatus::Failed);
    assert_eq!(first.state.as_ref().expect("estado").processed, vec!["A", "B"]);

    let resumed = h.engine.resume(&first.flow_id).await;
    assert!(resumed.is_success, "el resume reintenta FAIL y termina: {:?}", resumed.error);

    // A y B exactamente una vez; FAIL dos (fallo + reintento); C y D una.
    let names = dispatch_names(&h.mediator);
    let count = |n: &str| names.iter().filter(|x| *x == n).count();
    assert_eq!(count("item.A"), 1);
    assert_eq!(count("item.B"), 1);
    assert_eq!(count("item.FAIL"), 2);
    assert_eq!(count("item.C"), 1);
    assert_eq!(count("item.D"), 1);
    assert_eq!(resumed.state.expect("estado").processed, vec!["A", "B", "FAIL", "C", "D"]);
}

#[tokio::test]
async fn foreach_continue_on_failure_records_and_keeps_going() {
    let h = harness(item_flow(1, true));
    h.mediator.fail_with("item.FAIL", "always broken");

    let result = h.engine.run(DemoState::new()).await;

    assert!(result.is_success, "con continue_on_failure el flujo termina");
    assert_eq!(result.state.expect("estado").processed, vec!["A", "B", "C", "D"]);

    // El registro de progreso queda con el fallo anotado (no se limpia).
    let snapshot = h.engine.get(&result.flow_id).await.unwrap().expect("snapshot");
    assert_eq!(snapshot.status, FlowStatus::Completed);
}

#[tokio::test]
async fn foreach_parallel_completes_all_items() {
    let h = harness(item_flow(3, false));
    let result = h.engine.run(DemoState::new()).await;

    assert!(result.is_success);
    let mut processed = result.state.expect("estado").processed;
    processed.sort();
    assert_eq!(processed, vec!["A", "B", "C", "D", "FAIL"],
               "el orden entre ítems paralelos no está garantizado, el conjunto sí");
    assert_eq!(dispatch_names(&h.mediator).len(), 5);
}

#[tokio::test]
async fn foreach_on_complete_runs_once_at_the_end() {
    let config = FlowConfig::builder("closing")
        .for_each(|_: &DemoState| vec![json!("x"), json!("y")])
        .body(|item, seq| {
            let name = format!("item.{}", item.as_str().unwrap_or("?"));
            seq.send(move |_| FlowMessage::new(name.clone(), json!({})))
        })
        .on_complete(|s| s.note("done"))
        .end_for_each()
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::new()).await;
    assert_eq!(result.state.expect("estado").notes, vec!["done"]);
}

#[tokio::test]
async fn foreach_empty_source_succeeds_without_dispatches() {
    let config = FlowConfig::builder("empty-items")
        .for_each(|_: &DemoState| Vec::new())
        .body(|_, seq| seq.send(|_| msg("never")))
        .end_for_each()
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::new()).await;
    assert!(result.is_success);
    assert!(dispatch_names(&h.mediator).is_empty());
}
