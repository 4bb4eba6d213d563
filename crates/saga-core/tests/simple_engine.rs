//! Motor lineal standalone: orden, compensación en reversa, cancelación y
//! reanudación por índice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use saga_core::{CancellationToken, Flow};

/// Log compartido de acciones para verificar orden.
fn log_action(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
    log.lock().unwrap().push(entry.to_string());
}

fn logged_flow(log: Arc<Mutex<Vec<String>>>, fail_step: Option<&'static str>) -> Flow {
    let mk = move |name: &'static str, log: Arc<Mutex<Vec<String>>>| {
        move |_c: CancellationToken| {
            let log = log.clone();
            async move {
                log_action(&log, name);
                if Some(name) == fail_step {
                    Err(format!("{name} failed"))
                } else {
                    Ok(())
                }
            }
        }
    };
    let mk_comp = |name: &'static str, log: Arc<Mutex<Vec<String>>>| {
        move |_c: CancellationToken| {
            let log = log.clone();
            async move {
                log_action(&log, name);
                Ok(())
            }
        }
    };
    Flow::new("booking")
        .step_with_compensation("reserve", mk("reserve", log.clone()), mk_comp("undo.reserve", log.clone()))
        .step_with_compensation("charge", mk("charge", log.clone()), mk_comp("undo.charge", log.clone()))
        .step("notify", mk("notify", log.clone()))
}

#[tokio::test]
async fn forward_actions_run_in_declared_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let flow = logged_flow(log.clone(), None);

    let result = flow.execute(CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.completed_steps, 3);
    assert!(result.error.is_none());
    assert!(!result.cancelled);
    assert_eq!(*log.lock().unwrap(), vec!["reserve", "charge", "notify"]);
}

#[tokio::test]
async fn failure_compensates_completed_steps_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let flow = logged_flow(log.clone(), Some("notify"));

    let result = flow.execute(CancellationToken::new()).await;

    assert!(!result.success);
    assert!(!result.cancelled);
    assert_eq!(result.error.as_deref(), Some("notify failed"));
    assert_eq!(*log.lock().unwrap(),
               vec!["reserve", "charge", "notify", "undo.charge", "undo.reserve"]);
}

#[tokio::test]
async fn compensation_failures_are_swallowed() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let log_a = log.clone();
    let log_b = log.clone();
    let log_c = log.clone();
    let flow = Flow::new("fragile")
        .step_with_compensation("one",
                                move |_| {
                                    let log = log_a.clone();
                                    async move {
                                        log_action(&log, "one");
                                        Ok(())
                                    }
                                },
                                move |_| {
                                    let log = log_b.clone();
                                    async move {
                                        log_action(&log, "undo.one");
                                        Ok(())
                                    }
                                })
        .step_with_compensation("two",
                                {
                                    let calls = calls.clone();
                                    move |_| {
                                        let calls = calls.clone();
                                        async move {
                                            calls.fetch_add(1, Ordering::SeqCst);
                                            Ok(())
                                        }
                                    }
                                },
                                |_| async { Err("undo two broke".to_string()) })
        .step("three", move |_| {
            let log = log_c.clone();
            async move {
                log_action(&log, "three");
                Err("three failed".to_string())
            }
        });

    let result = flow.execute(CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "two corrió una vez");
    // La compensación de "two" falla pero la de "one" corre igual.
    assert!(log.lock().unwrap().contains(&"undo.one".to_string()));
}

#[tokio::test]
async fn cancellation_compensates_and_sets_the_flag() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let log_a = log.clone();
    let log_b = log.clone();
    let log_c = log.clone();
    let flow = Flow::new("cancelled")
        .step_with_compensation("first",
                                move |_| {
                                    let log = log_a.clone();
                                    let trigger = trigger.clone();
                                    async move {
                                        log_action(&log, "first");
                                        trigger.cancel(); // se observa antes del siguiente step
                                        Ok(())
                                    }
                                },
                                move |_| {
                                    let log = log_b.clone();
                                    async move {
                                        log_action(&log, "undo.first");
                                        Ok(())
                                    }
                                })
        .step("second", move |_| {
            let log = log_c.clone();
            async move {
                log_action(&log, "second");
                Ok(())
            }
        });

    let result = flow.execute(cancel).await;

    assert!(!result.success);
    assert!(result.cancelled, "la cancelación se distingue del fallo genérico");
    assert_eq!(*log.lock().unwrap(), vec!["first", "undo.first"], "second nunca corre y first se deshace");
}

#[tokio::test]
async fn execute_from_skips_earlier_steps_and_limits_compensation() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let flow = logged_flow(log.clone(), Some("notify"));

    let result = flow.execute_from(1, CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.completed_steps, 1, "sólo charge completó en esta corrida");
    // reserve no corrió acá, por lo tanto tampoco se compensa.
    assert_eq!(*log.lock().unwrap(), vec!["charge", "notify", "undo.charge"]);
}

#[tokio::test]
async fn empty_flow_succeeds_immediately() {
    let flow = Flow::new("empty");
    let result = flow.execute(CancellationToken::new()).await;
    assert!(result.success);
    assert_eq!(result.completed_steps, 0);
}
