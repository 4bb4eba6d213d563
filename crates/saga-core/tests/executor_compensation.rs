//! Compensaciones: orden inverso, errores tragados, opcionales y
//! cancelación con y sin opt-in.


use saga_core::{CancellationToken, FlowConfig, FlowStatus};
use test_support::*;

fn saga_config() -> FlowConfig<DemoState> {
    FlowConfig::builder("booking")
        .send(|_: &DemoState| msg("step.a"))
        .if_fail(|_| msg("undo.a"))
        .send(|_| msg("step.b"))
        .if_fail(|_| msg("undo.b"))
        .send(|_| msg("step.c"))
        .if_fail(|_| msg("undo.c"))
        .build()
        .expect("flujo válido")
}

#[tokio::test]
async fn failure_compensates_in_reverse_order() {
    let h = harness(saga_config());
    h.mediator.fail_with("step.c", "C failed");

    let result = h.engine.run(DemoState::new()).await;

    assert!(!result.is_success);
    assert_eq!(result.status, FlowStatus::Failed);
    assert!(result.error.as_deref().unwrap_or("").contains("C failed"));
    assert_eq!(dispatch_names(&h.mediator),
               vec!["step.a", "step.b", "step.c", "undo.b", "undo.a"],
               "compensación en reversa y sin undo.c");
    assert_eq!(result.completed_steps, 2);
}

#[tokio::test]
async fn compensation_errors_do_not_stop_the_rest() {
    let h = harness(saga_config());
    h.mediator.fail_with("step.c", "C failed");
    h.mediator.fail_with("undo.b", "undo b broken");

    let result = h.engine.run(DemoState::new()).await;

    // El error original se preserva; el fallo de undo.b no frena undo.a.
    assert!(result.error.as_deref().unwrap_or("").contains("C failed"));
    let names = dispatch_names(&h.mediator);
    assert!(names.contains(&"undo.a".to_string()));
}

#[tokio::test]
async fn optional_failed_step_is_not_compensated() {
    let config = FlowConfig::builder("optional-comp")
        .send(|_: &DemoState| msg("step.a"))
        .if_fail(|_| msg("undo.a"))
        .send(|_| msg("step.b"))
        .optional()
        .if_fail(|_| msg("undo.b"))
        .send(|_| msg("step.c"))
        .build()
        .expect("flujo válido");
    let h = harness(config);
    h.mediator.fail_with("step.b", "b broke");
    h.mediator.fail_with("step.c", "c broke");

    let result = h.engine.run(DemoState::new()).await;

    assert!(!result.is_success);
    let names = dispatch_names(&h.mediator);
    assert!(names.contains(&"undo.a".to_string()));
    assert!(!names.contains(&"undo.b".to_string()), "un opcional fallido no registra compensación");
}

#[tokio::test]
async fn branch_steps_compensate_with_their_ancestors() {
    let config = FlowConfig::builder("branchy")
        .send(|_: &DemoState| msg("root.one"))
        .if_fail(|_| msg("undo.root"))
        .if_(|s| s.risk > 10.0)
        .send(|_| msg("branch.pay"))
        .if_fail(|_| msg("undo.pay"))
        .send(|_| msg("branch.boom"))
        .end_if()
        .build()
        .expect("flujo válido");
    let h = harness(config);
    h.mediator.fail_with("branch.boom", "boom");

    h.engine.run(DemoState::with_risk(99.0)).await;

    assert_eq!(dispatch_names(&h.mediator),
               vec!["root.one", "branch.pay", "branch.boom", "undo.pay", "undo.root"]);
}

#[tokio::test]
async fn cancellation_does_not_compensate_by_default() {
    // La factory del segundo step dispara la cancelación: el mediator la
    // observa en ese mismo despacho.
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let config = FlowConfig::builder("cancelling")
        .send(|_: &DemoState| msg("step.a"))
        .if_fail(|_| msg("undo.a"))
        .send(move |_| {
            token.cancel();
            msg("step.b")
        })
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run_with(DemoState::new(), cancel).await;

    assert_eq!(result.status, FlowStatus::Cancelled);
    assert!(!dispatch_names(&h.mediator).contains(&"undo.a".to_string()),
            "cancelar es parar, no deshacer (sin opt-in)");
}

#[tokio::test]
async fn cancellation_compensates_with_flow_level_opt_in() {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let config = FlowConfig::builder("cancelling-undo")
        .compensate_on_cancel()
        .send(|_: &DemoState| msg("step.a"))
        .if_fail(|_| msg("undo.a"))
        .send(move |_| {
            token.cancel();
            msg("step.b")
        })
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run_with(DemoState::new(), cancel).await;

    assert_eq!(result.status, FlowStatus::Cancelled);
    assert!(dispatch_names(&h.mediator).contains(&"undo.a".to_string()),
            "con el opt-in, cancelar deshace lo ya hecho");
}
