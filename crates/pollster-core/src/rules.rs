//! Rule variants and the behaviour they share.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::form::FormState;
use crate::ids::{ChangeEvent, InputRef, OptionId, QuestionId};
use crate::prior::PriorAnswers;
use crate::target::{Homology, ObjectSignature, RuleTarget};

/// Position of a rule inside its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RuleId(pub usize);

/// Effect category; rules with the same signature and effect are homologous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Exclusive,
    Show,
    Hide,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Exclusive => "exclusive",
            Effect::Show => "show",
            Effect::Hide => "hide",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contribution of the triggering input to its question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionState {
    pub question: QuestionId,
    pub answered: bool,
    pub has_error: bool,
}

/// Everything an effect may touch.
pub struct ApplyContext<'a> {
    pub form: &'a mut FormState,
    pub event: &'a ChangeEvent,
    /// The rule's freshly computed active flag.
    pub active: bool,
    /// Shared target and homology snapshot; absent for self-contained rules.
    pub target: Option<(&'a mut RuleTarget, Homology)>,
}

/// Shared interface of every rule variant.
pub trait RuleBehavior {
    /// Recomputes the active flag. Must not touch target state.
    fn activate(&self, form: &FormState, question: &QuestionState, event: &ChangeEvent) -> bool;

    /// Performs the effect and returns the options it checked or unchecked.
    /// Calling it again with an unchanged active-set snapshot changes nothing.
    fn apply(&self, cx: ApplyContext<'_>) -> Vec<OptionId>;

    /// Seeds the active flag from a previous participation.
    fn init(&self, form: &FormState, prior: Option<&PriorAnswers>) -> bool;
}

/// Keeps at most one option of the group checked. Derived options follow
/// their question value and are never part of the contest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusiveRule {
    pub options: BTreeSet<OptionId>,
}

impl RuleBehavior for ExclusiveRule {
    fn activate(&self, form: &FormState, _question: &QuestionState, event: &ChangeEvent) -> bool {
        match event.input {
            InputRef::Option(option) => {
                self.options.contains(&option)
                    && !form.is_derived_input(&event.input)
                    && form.is_checked(option).unwrap_or(false)
            }
            _ => false,
        }
    }

    fn apply(&self, cx: ApplyContext<'_>) -> Vec<OptionId> {
        if !cx.active {
            return Vec::new();
        }
        let keep = match cx.event.input {
            InputRef::Option(option) if self.options.contains(&option) => option,
            _ => return Vec::new(),
        };
        let mut cleared = Vec::new();
        for option in self.options.iter().copied().filter(|option| *option != keep) {
            if cx.form.is_checked(option) == Some(true)
                && !cx.form.is_derived_input(&InputRef::Option(option))
            {
                cx.form.force_checked(option, false);
                cleared.push(option);
            }
        }
        cleared
    }

    fn init(&self, _form: &FormState, _prior: Option<&PriorAnswers>) -> bool {
        false
    }
}

/// Shows or hides a question or a set of options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityRule {
    pub question: QuestionId,
    pub effect: Effect,
    pub object: ObjectSignature,
    /// Watched options; empty means "the subject question is answered".
    pub subjects: BTreeSet<OptionId>,
}

impl RuleBehavior for VisibilityRule {
    fn activate(&self, form: &FormState, question: &QuestionState, _event: &ChangeEvent) -> bool {
        if self.subjects.is_empty() {
            question.answered
        } else {
            self.subjects
                .iter()
                .any(|option| form.is_checked(*option).unwrap_or(false))
        }
    }

    fn apply(&self, cx: ApplyContext<'_>) -> Vec<OptionId> {
        let Some((target, class)) = cx.target else {
            return Vec::new();
        };
        target.state.set_engaged(self.effect, class.engaged());
        cx.form.vote(&target.signature, target.state.visible());
        Vec::new()
    }

    fn init(&self, _form: &FormState, prior: Option<&PriorAnswers>) -> bool {
        let Some(prior) = prior else {
            return false;
        };
        if self.subjects.is_empty() {
            prior.has_value(self.question)
        } else {
            self.subjects.iter().any(|option| prior.is_checked(*option))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Exclusive(ExclusiveRule),
    Visibility(VisibilityRule),
}

/// A rule as held by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub question: QuestionId,
    pub sufficient: bool,
    /// Written only by the engine's evaluation step.
    pub active: bool,
    /// Generated by the catalog to cover options no explicit exclusive rule claims.
    pub synthesized: bool,
    pub kind: RuleKind,
}

impl Rule {
    pub fn effect(&self) -> Effect {
        match &self.kind {
            RuleKind::Exclusive(_) => Effect::Exclusive,
            RuleKind::Visibility(rule) => rule.effect,
        }
    }

    pub fn object_signature(&self) -> Option<&ObjectSignature> {
        match &self.kind {
            RuleKind::Exclusive(_) => None,
            RuleKind::Visibility(rule) => Some(&rule.object),
        }
    }

    pub fn subject_options(&self) -> &BTreeSet<OptionId> {
        match &self.kind {
            RuleKind::Exclusive(rule) => &rule.options,
            RuleKind::Visibility(rule) => &rule.subjects,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.kind, RuleKind::Exclusive(_))
    }
}

impl RuleBehavior for Rule {
    fn activate(&self, form: &FormState, question: &QuestionState, event: &ChangeEvent) -> bool {
        match &self.kind {
            RuleKind::Exclusive(rule) => rule.activate(form, question, event),
            RuleKind::Visibility(rule) => rule.activate(form, question, event),
        }
    }

    fn apply(&self, cx: ApplyContext<'_>) -> Vec<OptionId> {
        match &self.kind {
            RuleKind::Exclusive(rule) => rule.apply(cx),
            RuleKind::Visibility(rule) => rule.apply(cx),
        }
    }

    fn init(&self, form: &FormState, prior: Option<&PriorAnswers>) -> bool {
        match &self.kind {
            RuleKind::Exclusive(rule) => rule.init(form, prior),
            RuleKind::Visibility(rule) => rule.init(form, prior),
        }
    }
}
