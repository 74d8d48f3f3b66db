use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{OptionId, QuestionId};

/// Supported question layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Hidden bookkeeping field such as the participation timestamp.
    Builtin,
    /// Single free field, optionally carrying derived options.
    #[default]
    Text,
    /// Radio buttons.
    SingleChoice,
    /// Checkboxes.
    MultipleChoice,
}

impl QuestionKind {
    pub fn has_field(&self) -> bool {
        matches!(self, QuestionKind::Builtin | QuestionKind::Text)
    }

    pub fn is_choice(&self) -> bool {
        !self.has_field()
    }
}

/// Content validator assigned to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DataTypeSpec {
    #[default]
    Text,
    Integer,
    Numeric,
    Date,
    YearMonth,
    Timestamp,
    PostalCode {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Pattern {
        pattern: String,
    },
}

/// Matcher family of a derived option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DerivedType {
    Equals,
    NumericRange,
    TextRange,
    Pattern,
}

/// Declares an option whose checked state mirrors the value of its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DerivedSpec {
    #[serde(rename = "type")]
    pub kind: DerivedType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl DerivedSpec {
    /// True when the parameters the matcher family needs are present.
    pub fn has_parameters(&self) -> bool {
        match self.kind {
            DerivedType::Equals => self.value.is_some(),
            DerivedType::NumericRange | DerivedType::TextRange => {
                self.inf.is_some() || self.sup.is_some()
            }
            DerivedType::Pattern => self.regex.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OptionSpec {
    pub id: OptionId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: String,
    /// Carries a free-text annex enabled only while the option is checked.
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub starts_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedSpec>,
}

impl OptionSpec {
    pub fn is_derived(&self) -> bool {
        self.derived.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    pub id: QuestionId,
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    /// Hidden until a show rule reveals it.
    #[serde(default)]
    pub starts_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataTypeSpec>,
    /// Validator for open annexes; falls back to `data_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_option_data_type: Option<DataTypeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSpec>,
}

impl QuestionSpec {
    pub fn option_ids(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.options.iter().map(|option| option.id)
    }

    pub fn has_option(&self, id: OptionId) -> bool {
        self.options.iter().any(|option| option.id == id)
    }
}
