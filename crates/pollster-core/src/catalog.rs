//! Rule catalog: rules per question, rules per target and derived options.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::derived::{DerivedError, DerivedMatch, DerivedValue};
use crate::form::FormState;
use crate::ids::{ChangeEvent, OptionId, QuestionId};
use crate::rules::{
    ApplyContext, Effect, ExclusiveRule, Rule, RuleBehavior, RuleId, RuleKind, VisibilityRule,
};
use crate::survey::{QuestionSpec, RuleSpec, RuleType, SurveySpec};
use crate::target::{Homology, ObjectSignature, RuleTarget, TargetState};

/// Structural mismatches between rule definitions and the survey.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} is declared more than once")]
    DuplicateQuestion(QuestionId),
    #[error("{0} is declared more than once")]
    DuplicateOption(OptionId),
    #[error("rule #{index} references unknown {question}")]
    UnknownQuestion { index: usize, question: QuestionId },
    #[error("rule #{index} references unknown {option}")]
    UnknownOption { index: usize, option: OptionId },
    #[error("rule #{index} watches {option}, which does not belong to {question}")]
    ForeignOption {
        index: usize,
        option: OptionId,
        question: QuestionId,
    },
    #[error("rule #{index} ({kind}) does not name an object")]
    MissingObject { index: usize, kind: &'static str },
    #[error("{option} is claimed by more than one exclusive rule")]
    OverlappingExclusive { option: OptionId },
    #[error("derived {option} is invalid: {source}")]
    Derived {
        option: OptionId,
        #[source]
        source: DerivedError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rules: Vec<Rule>,
    by_question: BTreeMap<QuestionId, Vec<RuleId>>,
    targets: BTreeMap<ObjectSignature, RuleTarget>,
    derived: BTreeMap<QuestionId, Vec<DerivedValue>>,
}

fn ensure_unique_ids(survey: &SurveySpec) -> Result<(), CatalogError> {
    let mut questions = BTreeSet::new();
    let mut options = BTreeSet::new();
    for question in &survey.questions {
        if !questions.insert(question.id) {
            return Err(CatalogError::DuplicateQuestion(question.id));
        }
        for option in question.option_ids() {
            if !options.insert(option) {
                return Err(CatalogError::DuplicateOption(option));
            }
        }
    }
    Ok(())
}

fn subject_options(
    survey: &SurveySpec,
    question: &QuestionSpec,
    index: usize,
    spec: &RuleSpec,
) -> Result<BTreeSet<OptionId>, CatalogError> {
    spec.subject_options
        .iter()
        .map(|option| {
            if question.has_option(*option) {
                Ok(*option)
            } else if survey.option(*option).is_some() {
                Err(CatalogError::ForeignOption {
                    index,
                    option: *option,
                    question: question.id,
                })
            } else {
                Err(CatalogError::UnknownOption {
                    index,
                    option: *option,
                })
            }
        })
        .collect()
}

fn object_signature(
    survey: &SurveySpec,
    index: usize,
    spec: &RuleSpec,
) -> Result<ObjectSignature, CatalogError> {
    match spec.kind {
        RuleType::ShowQuestion | RuleType::HideQuestion => {
            let question = spec.object_question.ok_or(CatalogError::MissingObject {
                index,
                kind: spec.kind.as_str(),
            })?;
            if survey.question(question).is_none() {
                return Err(CatalogError::UnknownQuestion { index, question });
            }
            Ok(ObjectSignature::Question(question))
        }
        _ => {
            if spec.object_options.is_empty() {
                return Err(CatalogError::MissingObject {
                    index,
                    kind: spec.kind.as_str(),
                });
            }
            if let Some(option) = spec
                .object_options
                .iter()
                .find(|option| survey.option(**option).is_none())
            {
                return Err(CatalogError::UnknownOption {
                    index,
                    option: *option,
                });
            }
            Ok(ObjectSignature::options(spec.object_options.iter().copied()))
        }
    }
}

fn compile_rule(
    survey: &SurveySpec,
    question: &QuestionSpec,
    index: usize,
    spec: &RuleSpec,
) -> Result<Rule, CatalogError> {
    let subjects = subject_options(survey, question, index, spec)?;
    let kind = match spec.kind {
        RuleType::Exclusive => RuleKind::Exclusive(ExclusiveRule { options: subjects }),
        RuleType::ShowQuestion | RuleType::ShowOptions => RuleKind::Visibility(VisibilityRule {
            question: question.id,
            effect: Effect::Show,
            object: object_signature(survey, index, spec)?,
            subjects,
        }),
        RuleType::HideQuestion | RuleType::HideOptions => RuleKind::Visibility(VisibilityRule {
            question: question.id,
            effect: Effect::Hide,
            object: object_signature(survey, index, spec)?,
            subjects,
        }),
    };
    Ok(Rule {
        question: question.id,
        sufficient: spec.sufficient,
        active: false,
        synthesized: false,
        kind,
    })
}

impl Catalog {
    /// Builds the catalog for `survey`.
    ///
    /// Every question ends up with exactly one exclusive rule per option: the
    /// explicit ones, plus a synthesized rule appended last that covers the
    /// options none of them claims (possibly none).
    pub fn build(survey: &SurveySpec) -> Result<Self, CatalogError> {
        ensure_unique_ids(survey)?;
        if let Some((index, spec)) = survey
            .rules
            .iter()
            .enumerate()
            .find(|(_, spec)| survey.question(spec.subject_question).is_none())
        {
            return Err(CatalogError::UnknownQuestion {
                index,
                question: spec.subject_question,
            });
        }

        let mut catalog = Catalog::default();
        for question in &survey.questions {
            let mut remaining: Vec<OptionId> = question.option_ids().collect();
            let mut claimed = BTreeSet::new();
            let mut ids = Vec::new();

            for (index, spec) in survey.rules_for(question.id) {
                let rule = compile_rule(survey, question, index, spec)?;
                if rule.is_exclusive() {
                    for option in rule.subject_options() {
                        if !claimed.insert(*option) {
                            return Err(CatalogError::OverlappingExclusive { option: *option });
                        }
                    }
                    remaining.retain(|option| !claimed.contains(option));
                }
                ids.push(catalog.register(rule));
            }

            ids.push(catalog.register(Rule {
                question: question.id,
                sufficient: true,
                active: false,
                synthesized: true,
                kind: RuleKind::Exclusive(ExclusiveRule {
                    options: remaining.into_iter().collect(),
                }),
            }));
            catalog.by_question.insert(question.id, ids);

            let mut derived = Vec::new();
            for option in &question.options {
                if let Some(spec) = &option.derived {
                    let matcher = DerivedMatch::compile(spec).map_err(|source| {
                        CatalogError::Derived {
                            option: option.id,
                            source,
                        }
                    })?;
                    derived.push(DerivedValue {
                        option: option.id,
                        matcher,
                    });
                }
            }
            if !derived.is_empty() {
                catalog.derived.insert(question.id, derived);
            }
        }

        for target in catalog.targets.values_mut() {
            let starts_hidden = match &target.signature {
                ObjectSignature::Question(question) => survey
                    .question(*question)
                    .is_some_and(|spec| spec.starts_hidden),
                ObjectSignature::Options(options) => options.iter().all(|option| {
                    survey
                        .option(*option)
                        .is_some_and(|(_, spec)| spec.starts_hidden)
                }),
            };
            if starts_hidden {
                target.state.starts_hidden = true;
            }
        }

        tracing::debug!(
            survey = %survey.id,
            rules = catalog.rules.len(),
            targets = catalog.targets.len(),
            "rule catalog built"
        );
        Ok(catalog)
    }

    fn register(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len());
        if let Some(signature) = rule.object_signature() {
            let target = self
                .targets
                .entry(signature.clone())
                .or_insert_with(|| RuleTarget::new(signature.clone()));
            target.rules.push(id);
            if rule.effect() == Effect::Show {
                target.state.starts_hidden = true;
            }
        }
        self.rules.push(rule);
        id
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    /// Rules attached to `question`, synthesized exclusive rule last. Unknown questions have none.
    pub fn rules_for(&self, question: QuestionId) -> &[RuleId] {
        self.by_question
            .get(&question)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn targets(&self) -> impl Iterator<Item = &RuleTarget> {
        self.targets.values()
    }

    pub fn target(&self, signature: &ObjectSignature) -> Option<&RuleTarget> {
        self.targets.get(signature)
    }

    pub fn derived_for(&self, question: QuestionId) -> &[DerivedValue] {
        self.derived
            .get(&question)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Subject sets of every exclusive rule attached to `question`.
    pub fn exclusive_groups(&self, question: QuestionId) -> Vec<&BTreeSet<OptionId>> {
        self.rules_for(question)
            .iter()
            .map(|id| self.rule(*id))
            .filter(|rule| rule.is_exclusive())
            .map(Rule::subject_options)
            .collect()
    }

    pub(crate) fn set_active(&mut self, id: RuleId, active: bool) {
        self.rules[id.0].active = active;
    }

    /// Invokes the effect of rule `id` against its target, if it has one.
    pub(crate) fn apply(
        &mut self,
        id: RuleId,
        form: &mut FormState,
        event: &ChangeEvent,
    ) -> Vec<OptionId> {
        let rule = &self.rules[id.0];
        let target = match rule.object_signature() {
            Some(signature) => match self.targets.get_mut(signature) {
                Some(target) => {
                    let class = Homology::of(target, rule.effect(), &self.rules);
                    Some((target, class))
                }
                None => None,
            },
            None => None,
        };
        rule.apply(ApplyContext {
            form,
            event,
            active: rule.active,
            target,
        })
    }

    pub fn summary(&self) -> CatalogSummary {
        let questions = self
            .by_question
            .iter()
            .map(|(question, ids)| QuestionRules {
                question: *question,
                rules: ids.iter().map(|id| self.describe(*id)).collect(),
                derived: self.derived_for(*question).iter().map(|d| d.option).collect(),
            })
            .collect();
        let targets = self
            .targets
            .values()
            .map(|target| TargetSummary {
                signature: target.signature.to_string(),
                state: target.state,
                visible: target.state.visible(),
                rules: target.rules.clone(),
            })
            .collect();
        CatalogSummary { questions, targets }
    }

    fn describe(&self, id: RuleId) -> RuleSummary {
        let rule = self.rule(id);
        RuleSummary {
            id,
            effect: rule.effect(),
            object: rule.object_signature().map(ToString::to_string),
            subjects: rule.subject_options().iter().copied().collect(),
            sufficient: rule.sufficient,
            active: rule.active,
            synthesized: rule.synthesized,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub subjects: Vec<OptionId>,
    pub sufficient: bool,
    pub active: bool,
    pub synthesized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionRules {
    pub question: QuestionId,
    pub rules: Vec<RuleSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub derived: Vec<OptionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub signature: String,
    pub state: TargetState,
    pub visible: bool,
    pub rules: Vec<RuleId>,
}

/// Serializable view of a catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub questions: Vec<QuestionRules>,
    pub targets: Vec<TargetSummary>,
}
