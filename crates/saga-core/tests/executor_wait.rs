//! Esperas: when_all/when_any con el Resume Event Handler, timers con el
//! escaneo de timeouts, e idempotencia de señales y escaneos.


use std::time::Duration;

use saga_core::mediator::CallKind;
use saga_core::{child, FlowCompletedEvent, FlowConfig, FlowStatus, ResumeEventHandler, WaitKind, WaitTimeoutScanner};
use serde_json::json;
use test_support::*;

fn fan_out_config() -> FlowConfig<DemoState> {
    FlowConfig::builder("parent")
        .send(|_: &DemoState| msg("prep"))
        .when_all(vec![child(|_| msg("child.one")), child(|_| msg("child.two"))])
        .if_any_fail(|_| msg("undo.fanout"))
        .send(|_| msg("finish"))
        .build()
        .expect("flujo válido")
}

/// Ids de hijos despachados (message ids de los sends con ese nombre).
fn child_ids(h: &Harness, names: &[&str]) -> Vec<String> {
    h.mediator
     .calls()
     .into_iter()
     .filter(|c| c.kind == CallKind::Send && names.contains(&c.message.name.as_str()))
     .map(|c| c.message.message_id.to_string())
     .collect()
}

#[tokio::test]
async fn when_all_suspends_with_expected_two() {
    let h = harness(fan_out_config());
    let result = h.engine.run(DemoState::new()).await;

    assert_eq!(result.status, FlowStatus::Suspended);
    let snapshot = h.engine.get(&result.flow_id).await.unwrap().expect("snapshot");
    assert_eq!(snapshot.status, FlowStatus::Suspended);
    let wait = snapshot.wait.expect("condición inline");
    assert_eq!(wait.kind, WaitKind::All);
    assert_eq!(wait.expected, 2);
    assert_eq!(wait.completed, 0);
    assert_eq!(wait.child_ids.len(), 2);
}

#[tokio::test]
async fn when_all_resumes_after_both_children_signal() {
    let h = harness(fan_out_config());
    let result = h.engine.run(DemoState::new()).await;
    let snapshot = h.engine.get(&result.flow_id).await.unwrap().unwrap();
    let correlation = snapshot.wait.unwrap().correlation_id;

    let handler = ResumeEventHandler::new(h.store.clone(), h.mediator.clone());
    let ids = child_ids(&h, &["child.one", "child.two"]);

    let first = handler.handle(FlowCompletedEvent { flow_id: ids[0].clone(),
                                                    parent_correlation_id: Some(correlation.clone()),
                                                    success: true,
                                                    error: None,
                                                    result: Some(json!({"ok": 1})) })
                       .await
                       .unwrap();
    assert!(first.is_none(), "1/2 señales: el padre sigue suspendido");

    let second = handler.handle(FlowCompletedEvent { flow_id: ids[1].clone(),
                                                     parent_correlation_id: Some(correlation.clone()),
                                                     success: true,
                                                     error: None,
                                                     result: Some(json!({"ok": 2})) })
                        .await
                        .unwrap();
    assert_eq!(second.as_deref(), Some(result.flow_id.as_str()), "2/2: el padre queda listo");

    let resumed = h.engine.resume(&result.flow_id).await;
    assert!(resumed.is_success);
    assert_eq!(resumed.status, FlowStatus::Completed);
    let names = dispatch_names(&h.mediator);
    assert_eq!(names, vec!["prep", "child.one", "child.two", "finish"]);
}

#[tokio::test]
async fn duplicate_child_signal_is_a_noop() {
    let h = harness(fan_out_config());
    let result = h.engine.run(DemoState::new()).await;
    let correlation = h.engine.get(&result.flow_id).await.unwrap().unwrap().wait.unwrap().correlation_id;
    let ids = child_ids(&h, &["child.one", "child.two"]);
    let handler = ResumeEventHandler::new(h.store.clone(), h.mediator.clone());

    let event = FlowCompletedEvent { flow_id: ids[0].clone(),
                                     parent_correlation_id: Some(correlation.clone()),
                                     success: true,
                                     error: None,
                                     result: None };
    assert!(handler.handle(event.clone()).await.unwrap().is_none());
    assert!(handler.handle(event).await.unwrap().is_none(), "señal duplicada: no-op");

    let wait = h.engine.get(&result.flow_id).await.unwrap().unwrap().wait;
    // La condición inline del snapshot no cambió (el padre no corrió), y la
    // del store cuenta una sola señal.
    assert!(wait.is_some());
    let resumed = h.engine.resume(&result.flow_id).await;
    assert_eq!(resumed.status, FlowStatus::Suspended, "1 de 2 señales reales");
}

#[tokio::test]
async fn when_all_child_failure_fails_parent_and_compensates() {
    let h = harness(fan_out_config());
    let result = h.engine.run(DemoState::new()).await;
    let correlation = h.engine.get(&result.flow_id).await.unwrap().unwrap().wait.unwrap().correlation_id;
    let ids = child_ids(&h, &["child.one", "child.two"]);
    let handler = ResumeEventHandler::new(h.store.clone(), h.mediator.clone());

    for (id, success) in ids.iter().zip([true, false]) {
        handler.handle(FlowCompletedEvent { flow_id: id.clone(),
                                            parent_correlation_id: Some(correlation.clone()),
                                            success,
                                            error: (!success).then(|| "child exploded".into()),
                                            result: None })
               .await
               .unwrap();
    }

    let resumed = h.engine.resume(&result.flow_id).await;
    assert_eq!(resumed.status, FlowStatus::Failed);
    assert!(resumed.error.as_deref().unwrap_or("").contains("child exploded"));
    assert!(dispatch_names(&h.mediator).contains(&"undo.fanout".to_string()),
            "la compensación agregada del when_all se despacha");
    assert!(!dispatch_names(&h.mediator).contains(&"finish".to_string()));
}

#[tokio::test]
async fn when_any_binds_the_first_result() {
    let config = FlowConfig::builder("race")
        .when_any(vec![child(|_: &DemoState| msg("child.fast")), child(|_| msg("child.slow"))])
        .into_state(|s, v| s.set_status(v.as_str().unwrap_or("?")))
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::new()).await;
    assert_eq!(result.status, FlowStatus::Suspended);
    let correlation = h.engine.get(&result.flow_id).await.unwrap().unwrap().wait.unwrap().correlation_id;
    let ids = child_ids(&h, &["child.fast", "child.slow"]);

    let handler = ResumeEventHandler::new(h.store.clone(), h.mediator.clone());
    let ready = handler.handle(FlowCompletedEvent { flow_id: ids[0].clone(),
                                                    parent_correlation_id: Some(correlation),
                                                    success: true,
                                                    error: None,
                                                    result: Some(json!("fast-won")) })
                       .await
                       .unwrap();
    assert!(ready.is_some(), "any: la primera señal satisface");

    let resumed = h.engine.resume(&result.flow_id).await;
    assert!(resumed.is_success);
    assert_eq!(resumed.state.expect("estado").status, "fast-won");
}

#[tokio::test]
async fn delay_resumes_via_timeout_scan() {
    let config = FlowConfig::builder("paced")
        .send(|_: &DemoState| msg("before"))
        .delay(Duration::from_millis(30))
        .send(|_| msg("after"))
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::new()).await;
    assert_eq!(result.status, FlowStatus::Suspended);

    let scanner = WaitTimeoutScanner::new(h.store.clone(), h.mediator.clone(), Duration::from_secs(30));
    assert!(scanner.scan_once().await.unwrap().is_empty(), "antes del deadline no hay nada que vencer");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scanner.scan_once().await.unwrap(), vec![result.flow_id.clone()]);
    assert!(scanner.scan_once().await.unwrap().is_empty(), "el segundo escaneo no re-emite");

    let resumed = h.engine.resume(&result.flow_id).await;
    assert!(resumed.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["before", "after"]);
}

#[tokio::test]
async fn when_all_timeout_fails_missing_children() {
    let config = FlowConfig::builder("slow-children")
        .when_all(vec![child(|_: &DemoState| msg("child.one")), child(|_| msg("child.two"))])
        .step_timeout(Duration::from_millis(30))
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::new()).await;
    assert_eq!(result.status, FlowStatus::Suspended);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let scanner = WaitTimeoutScanner::new(h.store.clone(), h.mediator.clone(), Duration::from_secs(30));
    let resumed_parents = scanner.scan_once().await.unwrap();
    assert_eq!(resumed_parents, vec![result.flow_id.clone()]);

    let resumed = h.engine.resume(&result.flow_id).await;
    assert_eq!(resumed.status, FlowStatus::Failed);
    assert!(resumed.error.as_deref().unwrap_or("").contains("timed out"));
}

#[tokio::test]
async fn signal_for_unknown_correlation_is_ignored() {
    let h = harness(fan_out_config());
    let handler = ResumeEventHandler::new(h.store.clone(), h.mediator.clone());
    let outcome = handler.handle(FlowCompletedEvent { flow_id: "ghost".into(),
                                                      parent_correlation_id: Some("missing-corr".into()),
                                                      success: true,
                                                      error: None,
                                                      result: None })
                         .await
                         .unwrap();
    assert!(outcome.is_none());
}
