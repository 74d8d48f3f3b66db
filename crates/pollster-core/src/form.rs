//! In-memory model of the rendered form.
//!
//! The rendering layer observes this state; the engine reads it from rule
//! activation and writes it only from rule effects, derived propagation and
//! the error indicator.

use std::collections::BTreeMap;

use crate::datatype::FieldBinding;
use crate::ids::{InputRef, OptionId, QuestionId};
use crate::prior::PriorAnswers;
use crate::survey::{QuestionKind, SurveySpec};
use crate::target::ObjectSignature;

/// Visibility votes published by every target covering an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility {
    starts_hidden: bool,
    votes: BTreeMap<ObjectSignature, bool>,
}

impl Visibility {
    fn starting(starts_hidden: bool) -> Self {
        Self {
            starts_hidden,
            votes: BTreeMap::new(),
        }
    }

    pub fn visible(&self) -> bool {
        if self.votes.is_empty() {
            !self.starts_hidden
        } else {
            self.votes.values().all(|visible| *visible)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAnswer {
    pub value: String,
    pub enabled: bool,
    pub error: bool,
    pub binding: FieldBinding,
}

#[derive(Debug, Clone)]
pub struct QuestionView {
    pub id: QuestionId,
    pub kind: QuestionKind,
    pub mandatory: bool,
    pub value: String,
    pub error: bool,
    pub binding: FieldBinding,
    pub options: Vec<OptionId>,
    visibility: Visibility,
}

impl QuestionView {
    pub fn visible(&self) -> bool {
        self.visibility.visible()
    }
}

#[derive(Debug, Clone)]
pub struct OptionView {
    pub id: OptionId,
    pub question: QuestionId,
    pub value: String,
    pub checked: bool,
    pub derived: bool,
    pub open: Option<OpenAnswer>,
    visibility: Visibility,
}

impl OptionView {
    pub fn visible(&self) -> bool {
        self.visibility.visible()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormState {
    questions: BTreeMap<QuestionId, QuestionView>,
    options: BTreeMap<OptionId, OptionView>,
    timestamp: Option<String>,
}

impl FormState {
    pub fn from_survey(survey: &SurveySpec) -> Self {
        let mut form = FormState::default();
        for question in &survey.questions {
            form.questions.insert(
                question.id,
                QuestionView {
                    id: question.id,
                    kind: question.kind,
                    mandatory: question.mandatory,
                    value: String::new(),
                    error: false,
                    binding: FieldBinding::default(),
                    options: question.option_ids().collect(),
                    visibility: Visibility::starting(question.starts_hidden),
                },
            );
            for option in &question.options {
                form.options.insert(
                    option.id,
                    OptionView {
                        id: option.id,
                        question: question.id,
                        value: option.value.clone(),
                        checked: false,
                        derived: option.is_derived(),
                        open: option.is_open.then(|| OpenAnswer {
                            value: String::new(),
                            enabled: false,
                            error: false,
                            binding: FieldBinding::default(),
                        }),
                        visibility: Visibility::starting(option.starts_hidden),
                    },
                );
            }
        }
        form
    }

    pub fn question(&self, id: QuestionId) -> Option<&QuestionView> {
        self.questions.get(&id)
    }

    pub fn option(&self, id: OptionId) -> Option<&OptionView> {
        self.options.get(&id)
    }

    pub fn questions(&self) -> impl Iterator<Item = &QuestionView> {
        self.questions.values()
    }

    pub fn options(&self) -> impl Iterator<Item = &OptionView> {
        self.options.values()
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Resolves the question owning `input`, if the input exists on this form.
    pub fn question_of(&self, input: &InputRef) -> Option<QuestionId> {
        match input {
            InputRef::Field(question) => self
                .questions
                .get(question)
                .filter(|view| view.kind.has_field())
                .map(|view| view.id),
            InputRef::Option(option) => self.options.get(option).map(|view| view.question),
            InputRef::OpenAnswer(option) => self
                .options
                .get(option)
                .filter(|view| view.open.is_some())
                .map(|view| view.question),
        }
    }

    pub fn is_derived_input(&self, input: &InputRef) -> bool {
        match input {
            InputRef::Option(option) => self.options.get(option).is_some_and(|view| view.derived),
            _ => false,
        }
    }

    pub fn is_checked(&self, option: OptionId) -> Option<bool> {
        self.options.get(&option).map(|view| view.checked)
    }

    pub fn any_checked(&self, question: QuestionId) -> bool {
        self.sibling_views(question).any(|view| view.checked)
    }

    fn sibling_views(&self, question: QuestionId) -> impl Iterator<Item = &OptionView> {
        self.questions
            .get(&question)
            .into_iter()
            .flat_map(|view| view.options.iter())
            .filter_map(|option| self.options.get(option))
    }

    /// Other options of the question owning `option`, in declaration order.
    pub fn siblings(&self, option: OptionId) -> Vec<OptionId> {
        let Some(question) = self.options.get(&option).map(|view| view.question) else {
            return Vec::new();
        };
        self.sibling_views(question)
            .map(|view| view.id)
            .filter(|id| *id != option)
            .collect()
    }

    /// Sets the value of a question field. Returns false when the question has no field.
    pub fn set_value(&mut self, question: QuestionId, value: impl Into<String>) -> bool {
        match self.questions.get_mut(&question) {
            Some(view) if view.kind.has_field() => {
                view.value = value.into();
                true
            }
            _ => false,
        }
    }

    pub fn field_value(&self, question: QuestionId) -> Option<&str> {
        self.questions
            .get(&question)
            .filter(|view| view.kind.has_field())
            .map(|view| view.value.as_str())
    }

    /// Checks or unchecks an option as a user would. Checking a radio
    /// unchecks the other non-derived options of its question.
    pub fn set_checked(&mut self, option: OptionId, checked: bool) -> bool {
        let Some(view) = self.options.get(&option) else {
            return false;
        };
        let question = view.question;
        let radio = !view.derived
            && self
                .questions
                .get(&question)
                .is_some_and(|q| q.kind == QuestionKind::SingleChoice);
        if radio && checked {
            for sibling in self.siblings(option) {
                if let Some(view) = self.options.get_mut(&sibling)
                    && !view.derived
                {
                    view.checked = false;
                }
            }
        }
        self.force_checked(option, checked);
        true
    }

    /// Sets the checked flag without any grouping semantics.
    pub(crate) fn force_checked(&mut self, option: OptionId, checked: bool) {
        if let Some(view) = self.options.get_mut(&option) {
            view.checked = checked;
        }
    }

    pub fn set_open_answer(&mut self, option: OptionId, value: impl Into<String>) -> bool {
        match self
            .options
            .get_mut(&option)
            .and_then(|view| view.open.as_mut())
        {
            Some(open) => {
                open.value = value.into();
                true
            }
            None => false,
        }
    }

    pub fn open_answer(&self, option: OptionId) -> Option<&OpenAnswer> {
        self.options.get(&option).and_then(|view| view.open.as_ref())
    }

    pub(crate) fn set_open_error(&mut self, option: OptionId, error: bool) {
        if let Some(open) = self
            .options
            .get_mut(&option)
            .and_then(|view| view.open.as_mut())
        {
            open.error = error;
        }
    }

    /// Value fed to derived matchers: the field value, or the value of the
    /// first checked non-derived option for choice questions.
    pub fn question_value(&self, question: QuestionId) -> String {
        match self.questions.get(&question) {
            Some(view) if view.kind.has_field() => view.value.clone(),
            Some(_) => self
                .sibling_views(question)
                .find(|option| option.checked && !option.derived)
                .map(|option| option.value.clone())
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    pub fn has_error(&self, question: QuestionId) -> bool {
        self.questions.get(&question).is_some_and(|view| view.error)
    }

    pub(crate) fn set_error(&mut self, question: QuestionId, error: bool) {
        if let Some(view) = self.questions.get_mut(&question) {
            view.error = error;
        }
    }

    /// Enables each open annex of `question` exactly when its option is checked.
    pub(crate) fn sync_open_answers(&mut self, question: QuestionId) {
        let Some(options) = self.questions.get(&question).map(|view| view.options.clone()) else {
            return;
        };
        for option in options {
            if let Some(view) = self.options.get_mut(&option) {
                let checked = view.checked;
                if let Some(open) = view.open.as_mut() {
                    open.enabled = checked;
                }
            }
        }
    }

    pub(crate) fn disable_open_answers(&mut self) {
        for open in self.options.values_mut().filter_map(|view| view.open.as_mut()) {
            open.enabled = false;
        }
    }

    pub(crate) fn bind_field(&mut self, question: QuestionId) -> Option<&mut FieldBinding> {
        self.questions.get_mut(&question).map(|view| &mut view.binding)
    }

    pub(crate) fn bind_open_answer(&mut self, option: OptionId) -> Option<&mut FieldBinding> {
        self.options
            .get_mut(&option)
            .and_then(|view| view.open.as_mut())
            .map(|open| &mut open.binding)
    }

    /// Records the visibility a target publishes for every object it covers.
    pub(crate) fn vote(&mut self, signature: &ObjectSignature, visible: bool) {
        match signature {
            ObjectSignature::Question(question) => {
                if let Some(view) = self.questions.get_mut(question) {
                    view.visibility.votes.insert(signature.clone(), visible);
                }
            }
            ObjectSignature::Options(options) => {
                for option in options {
                    if let Some(view) = self.options.get_mut(option) {
                        view.visibility.votes.insert(signature.clone(), visible);
                    }
                }
            }
        }
    }

    pub fn question_visible(&self, question: QuestionId) -> bool {
        self.questions
            .get(&question)
            .is_some_and(QuestionView::visible)
    }

    pub fn option_visible(&self, option: OptionId) -> bool {
        self.options.get(&option).is_some_and(OptionView::visible)
    }

    /// Hidden objects disable their inputs.
    pub fn is_enabled(&self, input: &InputRef) -> bool {
        match input {
            InputRef::Field(question) => self.question_visible(*question),
            InputRef::Option(option) => self.options.get(option).is_some_and(|view| {
                view.visible() && self.question_visible(view.question)
            }),
            InputRef::OpenAnswer(option) => {
                self.is_enabled(&InputRef::Option(*option))
                    && self
                        .options
                        .get(option)
                        .and_then(|view| view.open.as_ref())
                        .is_some_and(|open| open.enabled)
            }
        }
    }

    /// Every input that takes part in change propagation, field first then options.
    pub fn inputs(&self) -> Vec<InputRef> {
        let mut inputs = Vec::new();
        for view in self.questions.values() {
            if view.kind.has_field() {
                inputs.push(InputRef::Field(view.id));
            }
            inputs.extend(view.options.iter().copied().map(InputRef::Option));
        }
        inputs
    }

    /// Pre-fills fields and options from a previous participation.
    pub(crate) fn prefill(&mut self, prior: &PriorAnswers) {
        self.timestamp = prior.timestamp.clone();
        for view in self.questions.values_mut() {
            if let Some(value) = prior.values.get(&view.id) {
                if view.kind.has_field() {
                    view.value = value.clone();
                }
            } else if view.kind == QuestionKind::Builtin
                && let Some(timestamp) = &prior.timestamp
            {
                view.value = timestamp.clone();
            }
        }
        for view in self.options.values_mut() {
            view.checked = prior.is_checked(view.id);
            if let (Some(open), Some(value)) = (view.open.as_mut(), prior.open.get(&view.id)) {
                open.value = value.clone();
            }
        }
    }

    /// Answers carried by enabled inputs, in the shape accepted as prior answers.
    pub fn submission(&self) -> PriorAnswers {
        let mut answers = PriorAnswers {
            timestamp: self.timestamp.clone(),
            ..PriorAnswers::default()
        };
        for view in self.questions.values() {
            if view.kind.has_field()
                && !view.value.is_empty()
                && self.is_enabled(&InputRef::Field(view.id))
            {
                answers.values.insert(view.id, view.value.clone());
            }
        }
        for view in self.options.values() {
            if view.checked && self.is_enabled(&InputRef::Option(view.id)) {
                answers.checked.insert(view.id);
            }
            if let Some(open) = &view.open
                && !open.value.is_empty()
                && self.is_enabled(&InputRef::OpenAnswer(view.id))
            {
                answers.open.insert(view.id, open.value.clone());
            }
        }
        answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn survey() -> SurveySpec {
        serde_json::from_value(json!({
            "id": "form",
            "title": "Form",
            "version": "1",
            "questions": [
                { "id": 1, "type": "single-choice", "title": "Pick", "options": [
                    { "id": 10, "value": "a" },
                    { "id": 11, "value": "b", "is_open": true }
                ]},
                { "id": 2, "type": "text", "title": "Age", "options": [
                    { "id": 20, "derived": { "type": "equals", "value": "yes" } }
                ]}
            ]
        }))
        .expect("survey")
    }

    #[test]
    fn radios_uncheck_siblings() {
        let mut form = FormState::from_survey(&survey());
        assert!(form.set_checked(OptionId(10), true));
        assert!(form.set_checked(OptionId(11), true));
        assert_eq!(form.is_checked(OptionId(10)), Some(false));
        assert_eq!(form.is_checked(OptionId(11)), Some(true));
        assert_eq!(form.question_value(QuestionId(1)), "b");
    }

    #[test]
    fn resolves_inputs_to_questions() {
        let form = FormState::from_survey(&survey());
        assert_eq!(
            form.question_of(&InputRef::Option(OptionId(20))),
            Some(QuestionId(2))
        );
        assert_eq!(
            form.question_of(&InputRef::Field(QuestionId(2))),
            Some(QuestionId(2))
        );
        assert_eq!(form.question_of(&InputRef::Field(QuestionId(1))), None);
        assert_eq!(form.question_of(&InputRef::OpenAnswer(OptionId(10))), None);
        assert_eq!(form.question_of(&InputRef::Option(OptionId(99))), None);
        assert!(form.is_derived_input(&InputRef::Option(OptionId(20))));
    }

    #[test]
    fn votes_combine_per_object() {
        let mut form = FormState::from_survey(&survey());
        let narrow = ObjectSignature::options([OptionId(10)]);
        let wide = ObjectSignature::options([OptionId(10), OptionId(11)]);
        form.vote(&narrow, true);
        form.vote(&wide, false);
        assert!(!form.option_visible(OptionId(10)));
        form.vote(&wide, true);
        assert!(form.option_visible(OptionId(10)));
        form.vote(&ObjectSignature::Question(QuestionId(1)), false);
        assert!(!form.is_enabled(&InputRef::Option(OptionId(10))));
    }

    #[test]
    fn submission_skips_disabled_inputs() {
        let mut form = FormState::from_survey(&survey());
        form.set_checked(OptionId(11), true);
        form.set_open_answer(OptionId(11), "other");
        form.sync_open_answers(QuestionId(1));
        form.set_value(QuestionId(2), "yes");
        let answers = form.submission();
        assert!(answers.checked.contains(&OptionId(11)));
        assert_eq!(answers.open.get(&OptionId(11)).map(String::as_str), Some("other"));

        form.vote(&ObjectSignature::Question(QuestionId(2)), false);
        assert!(!form.submission().values.contains_key(&QuestionId(2)));
    }
}
