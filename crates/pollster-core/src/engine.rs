//! Rule propagation engine.
//!
//! Every external change runs to completion before the call returns: the
//! triggering event, then every synthetic follow-up it causes (exclusive
//! groups clearing siblings, derived options flipping), depth-first. A derived
//! option is flipped only when its own follow-up is handled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::datatype::{DataType, DataTypeSite, DataTypes};
use crate::derived;
use crate::form::FormState;
use crate::ids::{ChangeEvent, InputRef, OptionId, QuestionId};
use crate::prior::PriorAnswers;
use crate::relay::EventRelay;
use crate::rules::{QuestionState, Rule, RuleBehavior, RuleId};
use crate::survey::{RuntimePolicy, SurveySpec};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid data type for {site}: {source}")]
    DataType {
        site: DataTypeSite,
        #[source]
        source: regex::Error,
    },
    #[error("propagation exceeded {limit} events; {dropped} pending events were dropped")]
    PropagationLimit { limit: usize, dropped: usize },
}

/// One user-level mutation of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Change {
    SetValue { question: QuestionId, value: String },
    Check { option: OptionId },
    Uncheck { option: OptionId },
    SetOpenAnswer { option: OptionId, value: String },
}

/// Rule application recorded during a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Application {
    pub rule: RuleId,
    pub active: bool,
}

/// What one dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Events handled, in processing order, the triggering one first.
    pub events: Vec<ChangeEvent>,
    /// Events whose input did not resolve to a question.
    pub ignored: usize,
    pub applied: Vec<Application>,
}

impl DispatchReport {
    pub fn synthetic_events_for(&self, input: InputRef) -> usize {
        self.events
            .iter()
            .filter(|event| event.synthetic && event.input == input)
            .count()
    }

    fn merge(&mut self, other: DispatchReport) {
        self.events.extend(other.events);
        self.ignored += other.ignored;
        self.applied.extend(other.applied);
    }
}

/// Decides whether a rule's effect must run after its active flag was recomputed.
///
/// An active necessary rule waits while a necessary homolog is still
/// inactive. An inactive sufficient rule leaves the effect alone while a
/// sufficient homolog keeps it alive. Rules without a target always apply.
fn should_apply(catalog: &Catalog, id: RuleId) -> bool {
    let rule = catalog.rule(id);
    let Some(target) = rule.object_signature().and_then(|sig| catalog.target(sig)) else {
        return true;
    };
    let mut homologs = target.homologous(id, rule.effect(), catalog.rules());
    if rule.active {
        rule.sufficient || !homologs.any(|hr: &Rule| !hr.sufficient && !hr.active)
    } else {
        !rule.sufficient || !homologs.any(|hr: &Rule| hr.sufficient && hr.active)
    }
}

/// Builder for [`Runtime`], used to inject host data types.
pub struct RuntimeBuilder<'a> {
    survey: &'a SurveySpec,
    prior: Option<PriorAnswers>,
    policy: Option<RuntimePolicy>,
    question_types: Vec<(QuestionId, Box<dyn DataType>)>,
    open_types: Vec<(OptionId, Box<dyn DataType>)>,
}

impl<'a> RuntimeBuilder<'a> {
    pub fn prior(mut self, prior: Option<PriorAnswers>) -> Self {
        self.prior = prior;
        self
    }

    /// Overrides the survey's own runtime policy.
    pub fn policy(mut self, policy: RuntimePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn data_type(mut self, question: QuestionId, data_type: Box<dyn DataType>) -> Self {
        self.question_types.push((question, data_type));
        self
    }

    pub fn open_option_data_type(mut self, option: OptionId, data_type: Box<dyn DataType>) -> Self {
        self.open_types.push((option, data_type));
        self
    }

    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let catalog = Catalog::build(self.survey)?;
        let mut data_types = DataTypes::from_survey(self.survey)
            .map_err(|(site, source)| RuntimeError::DataType { site, source })?;
        for (question, data_type) in self.question_types {
            data_types.set_question(question, data_type);
        }
        for (option, data_type) in self.open_types {
            data_types.set_open_option(option, data_type);
        }

        let policy = self.policy.unwrap_or_else(|| self.survey.policy());
        let mut runtime = Runtime {
            form: FormState::from_survey(self.survey),
            catalog,
            data_types,
            relay: EventRelay::default(),
            policy,
        };
        let start = runtime.start(self.prior.as_ref())?;
        tracing::debug!(
            survey = %self.survey.id,
            events = start.events.len(),
            "survey runtime started"
        );
        Ok(runtime)
    }
}

/// A live survey: catalog, target states, form state and event relay.
#[derive(Debug)]
pub struct Runtime {
    form: FormState,
    catalog: Catalog,
    data_types: DataTypes,
    relay: EventRelay,
    policy: RuntimePolicy,
}

impl Runtime {
    pub fn new(survey: &SurveySpec, prior: Option<PriorAnswers>) -> Result<Self, RuntimeError> {
        Runtime::builder(survey).prior(prior).build()
    }

    pub fn builder(survey: &SurveySpec) -> RuntimeBuilder<'_> {
        RuntimeBuilder {
            survey,
            prior: None,
            policy: None,
            question_types: Vec::new(),
            open_types: Vec::new(),
        }
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn policy(&self) -> RuntimePolicy {
        self.policy
    }

    pub fn submission(&self) -> PriorAnswers {
        self.form.submission()
    }

    fn start(&mut self, prior: Option<&PriorAnswers>) -> Result<DispatchReport, RuntimeError> {
        self.form.disable_open_answers();
        if let Some(prior) = prior {
            self.form.prefill(prior);
        }

        for (question, data_type) in self.data_types.question_types() {
            if let Some(binding) = self.form.bind_field(question) {
                data_type.bind(binding);
            }
        }
        for (option, data_type) in self.data_types.open_option_types() {
            if let Some(binding) = self.form.bind_open_answer(option) {
                data_type.bind(binding);
            }
        }

        for target in self.catalog.targets() {
            self.form.vote(&target.signature, target.state.visible());
        }

        let seeds: Vec<(RuleId, bool)> = self
            .catalog
            .rules()
            .iter()
            .enumerate()
            .map(|(index, rule)| (RuleId(index), rule.init(&self.form, prior)))
            .collect();
        for (id, active) in seeds {
            self.catalog.set_active(id, active);
        }

        if !self.policy.sync_on_start {
            return Ok(DispatchReport::default());
        }
        let mut report = DispatchReport::default();
        for input in self.form.inputs() {
            report.merge(self.dispatch(ChangeEvent::synthetic(input))?);
        }
        Ok(report)
    }

    pub fn set_value(
        &mut self,
        question: QuestionId,
        value: impl Into<String>,
    ) -> Result<DispatchReport, RuntimeError> {
        self.form.set_value(question, value);
        self.dispatch(ChangeEvent::user(InputRef::Field(question)))
    }

    pub fn set_checked(
        &mut self,
        option: OptionId,
        checked: bool,
    ) -> Result<DispatchReport, RuntimeError> {
        self.form.set_checked(option, checked);
        self.dispatch(ChangeEvent::user(InputRef::Option(option)))
    }

    pub fn set_open_answer(
        &mut self,
        option: OptionId,
        value: impl Into<String>,
    ) -> Result<DispatchReport, RuntimeError> {
        self.form.set_open_answer(option, value);
        self.dispatch(ChangeEvent::user(InputRef::OpenAnswer(option)))
    }

    pub fn apply_change(&mut self, change: &Change) -> Result<DispatchReport, RuntimeError> {
        match change {
            Change::SetValue { question, value } => self.set_value(*question, value.as_str()),
            Change::Check { option } => self.set_checked(*option, true),
            Change::Uncheck { option } => self.set_checked(*option, false),
            Change::SetOpenAnswer { option, value } => {
                self.set_open_answer(*option, value.as_str())
            }
        }
    }

    /// Handles `event` and every follow-up it causes.
    pub fn dispatch(&mut self, event: ChangeEvent) -> Result<DispatchReport, RuntimeError> {
        if !self.relay.push(event) {
            return Ok(DispatchReport::default());
        }
        // The triggering event always runs.
        let limit = self.policy.max_events_per_dispatch.max(1);
        let mut report = DispatchReport::default();
        self.relay.begin();
        while let Some(event) = self.relay.next(limit) {
            report.events.push(event);
            match self.handle(&event, &mut report) {
                Some(follow_ups) => self.relay.push_follow_ups(follow_ups),
                None => report.ignored += 1,
            }
        }
        let dropped = self.relay.finish();
        if dropped > 0 {
            tracing::warn!(limit, dropped, "change propagation did not converge");
            return Err(RuntimeError::PropagationLimit { limit, dropped });
        }
        tracing::debug!(
            input = %event.input,
            events = report.events.len(),
            applied = report.applied.len(),
            "change dispatched"
        );
        Ok(report)
    }

    /// Resolves one event. Returns `None` when its input belongs to no question.
    fn handle(
        &mut self,
        event: &ChangeEvent,
        report: &mut DispatchReport,
    ) -> Option<Vec<ChangeEvent>> {
        let Some(question) = self.form.question_of(&event.input) else {
            tracing::trace!(input = %event.input, "ignoring change on unknown input");
            return None;
        };
        if let InputRef::OpenAnswer(option) = event.input {
            self.check_open_answer(option, event);
            return Some(Vec::new());
        }

        let derived_input = self.form.is_derived_input(&event.input);
        if derived_input
            && event.synthetic
            && let InputRef::Option(option) = event.input
        {
            derived::realign(
                &mut self.form,
                question,
                option,
                self.catalog.derived_for(question),
            );
        }

        let state = self.contribute(question, event);

        let rules = self.catalog.rules_for(question).to_vec();
        for id in &rules {
            let active = self
                .catalog
                .rule(*id)
                .activate(&self.form, &state, event);
            self.catalog.set_active(*id, active);
        }

        let mut follow_ups = Vec::new();
        for id in rules {
            if !should_apply(&self.catalog, id) {
                continue;
            }
            let active = self.catalog.rule(id).active;
            let cleared = self.catalog.apply(id, &mut self.form, event);
            tracing::trace!(rule = id.0, active, input = %event.input, "rule applied");
            report.applied.push(Application { rule: id, active });
            follow_ups.extend(
                cleared
                    .into_iter()
                    .map(|option| ChangeEvent::synthetic(InputRef::Option(option))),
            );
        }

        if !derived_input {
            let stale = derived::stale(&self.form, question, self.catalog.derived_for(question));
            follow_ups.extend(
                stale
                    .into_iter()
                    .map(|option| ChangeEvent::synthetic(InputRef::Option(option))),
            );
        }
        Some(follow_ups)
    }

    /// Validates an open annex. Like fields, only user edits move its error indicator.
    fn check_open_answer(&mut self, option: OptionId, event: &ChangeEvent) {
        if event.synthetic {
            return;
        }
        let valid = match (
            self.data_types.open_option(option),
            self.form.open_answer(option),
        ) {
            (Some(data_type), Some(open)) => data_type.check(&open.value),
            _ => true,
        };
        self.form.set_open_error(option, !valid);
    }

    /// Folds the triggering input into its question: open annexes for
    /// choices, validation and the error indicator for fields.
    fn contribute(&mut self, question: QuestionId, event: &ChangeEvent) -> QuestionState {
        match event.input {
            InputRef::Field(_) => {
                let value = self.form.field_value(question).unwrap_or_default();
                let valid = self
                    .data_types
                    .question(question)
                    .is_none_or(|data_type| data_type.check(value));
                let empty = value.is_empty();
                let mandatory = self
                    .form
                    .question(question)
                    .is_some_and(|view| view.mandatory);
                let has_error = !valid || (mandatory && empty);
                if !event.synthetic {
                    self.form.set_error(question, has_error);
                }
                QuestionState {
                    question,
                    answered: !empty,
                    has_error,
                }
            }
            _ => {
                self.form.sync_open_answers(question);
                // Derived options never answer a question that has its own field.
                let answered = match self.form.field_value(question) {
                    Some(value) => !value.is_empty(),
                    None => self.form.any_checked(question),
                };
                QuestionState {
                    question,
                    answered,
                    has_error: self.form.has_error(question),
                }
            }
        }
    }
}
