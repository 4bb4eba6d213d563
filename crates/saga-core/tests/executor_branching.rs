//! Branching: if/else-if/else, switch con default y primera-gana, y
//! reanudación dentro de ramas anidadas.


use saga_core::{FlowConfig, FlowStatus, WaitTimeoutScanner};
use std::time::Duration;
use test_support::*;

fn banded_config() -> FlowConfig<DemoState> {
    FlowConfig::builder("banded")
        .if_(|s: &DemoState| s.risk < 25.0)
        .send(|_| msg("band.low"))
        .else_if(|s| s.risk < 75.0)
        .send(|_| msg("band.medium"))
        .else_if(|s| s.risk < 100.0)
        .send(|_| msg("band.high"))
        .else_()
        .send(|_| msg("band.very_high"))
        .end_if()
        .build()
        .expect("flujo válido")
}

#[tokio::test]
async fn if_selects_first_matching_branch() {
    let h = harness(banded_config());
    let result = h.engine.run(DemoState::with_risk(50.0)).await;

    assert!(result.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["band.medium"], "sólo la rama Medium ejecuta");
}

#[tokio::test]
async fn if_falls_back_to_else() {
    let h = harness(banded_config());
    let result = h.engine.run(DemoState::with_risk(500.0)).await;

    assert!(result.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["band.very_high"]);
}

#[tokio::test]
async fn if_without_match_and_without_else_is_noop() {
    let config = FlowConfig::builder("maybe")
        .if_(|s: &DemoState| s.risk > 10.0)
        .send(|_| msg("branch.taken"))
        .end_if()
        .send(|_| msg("after"))
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::with_risk(1.0)).await;
    assert!(result.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["after"]);
    assert_eq!(result.completed_steps, 1);
}

#[tokio::test]
async fn switch_routes_unknown_value_to_default() {
    let config = FlowConfig::builder("payment")
        .switch(|s: &DemoState| s.status.clone())
        .case("credit", |seq| seq.send(|_| msg("pay.credit")))
        .case("paypal", |seq| seq.send(|_| msg("pay.paypal")))
        .default_case(|seq| seq.send(|_| msg("pay.manual_review")))
        .end_switch()
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let mut state = DemoState::new();
    state.status = "bitcoin".into();
    let result = h.engine.run(state).await;

    assert!(result.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["pay.manual_review"], "sólo el default ejecuta");
}

#[tokio::test]
async fn switch_duplicate_case_keys_first_wins() {
    let config = FlowConfig::builder("dup")
        .switch(|s: &DemoState| s.status.clone())
        .case("x", |seq| seq.send(|_| msg("first.body")))
        .case("x", |seq| seq.send(|_| msg("second.body")))
        .end_switch()
        .build()
        .expect("los duplicados se ignoran, no fallan");
    let h = harness(config);

    let mut state = DemoState::new();
    state.status = "x".into();
    h.engine.run(state).await;

    assert_eq!(dispatch_names(&h.mediator), vec!["first.body"]);
}

#[tokio::test]
async fn switch_without_match_and_without_default_is_noop() {
    let config = FlowConfig::builder("nocase")
        .switch(|s: &DemoState| s.status.clone())
        .case("a", |seq| seq.send(|_| msg("case.a")))
        .end_switch()
        .send(|_| msg("after"))
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let mut state = DemoState::new();
    state.status = "zzz".into();
    let result = h.engine.run(state).await;

    assert!(result.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["after"]);
}

#[tokio::test]
async fn thousand_case_switch_dispatches_a_single_case() {
    let mut switch = FlowConfig::builder("big").switch(|s: &DemoState| s.status.clone());
    for i in 0..1000 {
        let name = format!("case.{i}");
        switch = switch.case(&format!("c{i}"), move |seq| {
                           let name = name.clone();
                           seq.send(move |_| msg(&name))
                       });
    }
    let config = switch.default_case(|seq| seq.send(|_| msg("case.default")))
                       .end_switch()
                       .build()
                       .expect("switch de 1000 casos");
    let h = harness(config);

    let mut state = DemoState::new();
    state.status = "c777".into();
    let result = h.engine.run(state).await;

    assert!(result.is_success);
    assert_eq!(dispatch_names(&h.mediator), vec!["case.777"]);
}

#[tokio::test]
async fn resume_lands_inside_the_recorded_branch() {
    // La rama then contiene una espera: al reanudar, el ejecutor debe
    // descender a [0, 0, 1] sin re-evaluar la condición.
    let config = FlowConfig::builder("nested")
        .if_(|s: &DemoState| s.risk > 10.0)
        .send(|_| msg("branch.first"))
        .delay(Duration::from_millis(30))
        .send(|_| msg("branch.second"))
        .end_if()
        .send(|_| msg("root.tail"))
        .build()
        .expect("flujo válido");
    let h = harness(config);

    let result = h.engine.run(DemoState::with_risk(50.0)).await;
    assert_eq!(result.status, FlowStatus::Suspended);

    let snapshot = h.engine.get(&result.flow_id).await.unwrap().expect("snapshot");
    assert_eq!(snapshot.position.components(), &[0, 0, 1], "posición dentro de la rama then");

    // Vencer el timer y reanudar.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let scanner = WaitTimeoutScanner::new(h.store.clone(), h.mediator.clone(), Duration::from_secs(30));
    let resumed_parents = scanner.scan_once().await.unwrap();
    assert_eq!(resumed_parents, vec![result.flow_id.clone()]);

    let resumed = h.engine.resume(&result.flow_id).await;
    assert!(resumed.is_success);
    assert_eq!(dispatch_names(&h.mediator),
               vec!["branch.first", "branch.second", "root.tail"],
               "el resume continúa dentro de la rama y no repite nada");
}
