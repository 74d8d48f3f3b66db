use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifier of a survey question.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct QuestionId(pub u32);

/// Identifier of a question option.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct OptionId(pub u32);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "question-{}", self.0)
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "option-{}", self.0)
    }
}

/// Addresses one input of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum InputRef {
    /// Free field of a text or builtin question.
    Field(QuestionId),
    /// Checkbox or radio button of an option.
    Option(OptionId),
    /// Free-text annex attached to an open option.
    OpenAnswer(OptionId),
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRef::Field(question) => write!(f, "{}-field", question),
            InputRef::Option(option) => write!(f, "{}", option),
            InputRef::OpenAnswer(option) => write!(f, "{}-field-open", option),
        }
    }
}

/// Content-change notification for one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub input: InputRef,
    /// Set on events generated by the runtime itself; these skip the error indicator.
    #[serde(default)]
    pub synthetic: bool,
}

impl ChangeEvent {
    pub fn user(input: InputRef) -> Self {
        Self {
            input,
            synthetic: false,
        }
    }

    pub fn synthetic(input: InputRef) -> Self {
        Self {
            input,
            synthetic: true,
        }
    }
}
