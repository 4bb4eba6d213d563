//! Sub-builder de `switch`: case map con orden de declaración.

use indexmap::IndexMap;

use super::sequence::{SequenceBuilder, StepSink};
use crate::errors::FlowBuildError;
use crate::step::{CaseSelector, FlowStep, StepKind};

/// Acumula casos hasta `end_switch()`, que devuelve el builder dueño.
///
/// Claves duplicadas: gana la primera declaración, las siguientes se
/// ignoran (misma decisión que documenta `StepKind::Switch`).
pub struct SwitchBuilder<S, P> {
    owner: P,
    selector: CaseSelector<S>,
    cases: IndexMap<String, Vec<FlowStep<S>>>,
    default: Option<Vec<FlowStep<S>>>,
    errors: Vec<FlowBuildError>,
}

impl<S: 'static, P: StepSink<S>> SwitchBuilder<S, P> {
    pub(crate) fn new(owner: P, selector: CaseSelector<S>) -> Self {
        Self { owner,
               selector,
               cases: IndexMap::new(),
               default: None,
               errors: Vec::new() }
    }

    pub fn case<F>(mut self, key: &str, body: F) -> Self
        where F: FnOnce(SequenceBuilder<S>) -> SequenceBuilder<S>
    {
        let (steps, errors) = body(self.sub_sequence()).finish();
        self.errors.extend(errors);
        if !self.cases.contains_key(key) {
            self.cases.insert(key.to_string(), steps);
        }
        self
    }

    pub fn default_case<F>(mut self, body: F) -> Self
        where F: FnOnce(SequenceBuilder<S>) -> SequenceBuilder<S>
    {
        let (steps, errors) = body(self.sub_sequence()).finish();
        self.errors.extend(errors);
        self.default = Some(steps);
        self
    }

    pub fn end_switch(mut self) -> P {
        for error in self.errors {
            self.owner.push_error(error);
        }
        self.owner.push_step(FlowStep::new(StepKind::Switch { selector: self.selector,
                                                              cases: self.cases,
                                                              default: self.default }));
        self.owner
    }

    fn sub_sequence(&self) -> SequenceBuilder<S> {
        if self.owner.waits_allowed() {
            SequenceBuilder::new()
        } else {
            SequenceBuilder::without_waits()
        }
    }
}

impl<S: 'static> SequenceBuilder<S> {
    pub fn switch<F>(self, selector: F) -> SwitchBuilder<S, Self>
        where F: Fn(&S) -> String + Send + Sync + 'static
    {
        SwitchBuilder::new(self, std::sync::Arc::new(selector))
    }
}
