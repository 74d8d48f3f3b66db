pub mod question;
pub mod rule;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{OptionId, QuestionId};

pub use question::{DataTypeSpec, DerivedSpec, DerivedType, OptionSpec, QuestionKind, QuestionSpec};
pub use rule::{RuleSpec, RuleType};

/// Limits and start-up behaviour of a survey runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimePolicy {
    /// Upper bound on events handled by one external dispatch, synthetic follow-ups included.
    #[serde(default = "default_max_events")]
    pub max_events_per_dispatch: usize,
    /// Replay a synthetic change on every input once the runtime is built.
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,
}

fn default_max_events() -> usize {
    256
}

fn default_sync_on_start() -> bool {
    true
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            max_events_per_dispatch: default_max_events(),
            sync_on_start: default_sync_on_start(),
        }
    }
}

/// Top-level survey definition, as produced from the server-side survey schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SurveySpec {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_policy: Option<RuntimePolicy>,
    pub questions: Vec<QuestionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSpec>,
}

impl SurveySpec {
    pub fn question(&self, id: QuestionId) -> Option<&QuestionSpec> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// Finds an option together with the question that owns it.
    pub fn option(&self, id: OptionId) -> Option<(&QuestionSpec, &OptionSpec)> {
        self.questions.iter().find_map(|question| {
            question
                .options
                .iter()
                .find(|option| option.id == id)
                .map(|option| (question, option))
        })
    }

    pub fn policy(&self) -> RuntimePolicy {
        self.runtime_policy.unwrap_or_default()
    }

    /// Rule definitions watching `question`, with their position in `rules`.
    pub fn rules_for(&self, question: QuestionId) -> impl Iterator<Item = (usize, &RuleSpec)> {
        self.rules
            .iter()
            .enumerate()
            .filter(move |(_, rule)| rule.subject_question == question)
    }
}
