use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{OptionId, QuestionId};

/// Rule families understood by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RuleType {
    Exclusive,
    ShowQuestion,
    HideQuestion,
    ShowOptions,
    HideOptions,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Exclusive => "exclusive",
            RuleType::ShowQuestion => "show-question",
            RuleType::HideQuestion => "hide-question",
            RuleType::ShowOptions => "show-options",
            RuleType::HideOptions => "hide-options",
        }
    }
}

fn default_sufficient() -> bool {
    true
}

/// Declarative rule attached to the question whose options it watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleSpec {
    #[serde(rename = "type")]
    pub kind: RuleType,
    /// Whether the rule alone can force its effect.
    #[serde(default = "default_sufficient")]
    pub sufficient: bool,
    pub subject_question: QuestionId,
    #[serde(default)]
    pub subject_options: Vec<OptionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_question: Option<QuestionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_options: Vec<OptionId>,
}
