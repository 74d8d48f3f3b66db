//! Field content validators.
//!
//! The propagation engine never interprets field content itself: every text
//! field is bound to a [`DataType`] that decides whether the current value is
//! acceptable. Builtin types are compiled from [`DataTypeSpec`]; hosts may
//! register their own implementation for any question or open option.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;

use crate::ids::{OptionId, QuestionId};
use crate::survey::{DataTypeSpec, SurveySpec};

const DEFAULT_POSTAL_CODE: &str = r"^[0-9A-Za-z][0-9A-Za-z\- ]{1,9}$";

/// Presentation hints a data type attaches to the field it is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldBinding {
    pub classes: BTreeSet<String>,
    pub placeholder: Option<String>,
}

/// Input mechanics and content validation for one field.
pub trait DataType: fmt::Debug {
    fn name(&self) -> &str;

    /// Wires the field to the type. The default only tags the field with the type name.
    fn bind(&self, field: &mut FieldBinding) {
        field.classes.insert(format!("{}-type", self.name()));
    }

    /// Returns whether `value` is acceptable. Empty values are judged by the mandatory flag.
    fn check(&self, value: &str) -> bool;
}

#[derive(Debug, Clone)]
pub enum BuiltinDataType {
    Text,
    Integer,
    Numeric,
    Date(Regex),
    YearMonth(Regex),
    Timestamp,
    PostalCode(Regex),
    Pattern(Regex),
}

impl BuiltinDataType {
    pub fn compile(spec: &DataTypeSpec) -> Result<Self, regex::Error> {
        Ok(match spec {
            DataTypeSpec::Text => BuiltinDataType::Text,
            DataTypeSpec::Integer => BuiltinDataType::Integer,
            DataTypeSpec::Numeric => BuiltinDataType::Numeric,
            DataTypeSpec::Date => {
                BuiltinDataType::Date(Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$")?)
            }
            DataTypeSpec::YearMonth => BuiltinDataType::YearMonth(Regex::new(r"^(\d{4})-(\d{2})$")?),
            DataTypeSpec::Timestamp => BuiltinDataType::Timestamp,
            DataTypeSpec::PostalCode { pattern } => BuiltinDataType::PostalCode(Regex::new(
                pattern.as_deref().unwrap_or(DEFAULT_POSTAL_CODE),
            )?),
            DataTypeSpec::Pattern { pattern } => BuiltinDataType::Pattern(Regex::new(pattern)?),
        })
    }
}

fn valid_month(raw: &str) -> bool {
    raw.parse::<u32>()
        .map(|month| (1..=12).contains(&month))
        .unwrap_or(false)
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl DataType for BuiltinDataType {
    fn name(&self) -> &str {
        match self {
            BuiltinDataType::Text => "text",
            BuiltinDataType::Integer => "integer",
            BuiltinDataType::Numeric => "numeric",
            BuiltinDataType::Date(_) => "date",
            BuiltinDataType::YearMonth(_) => "year-month",
            BuiltinDataType::Timestamp => "timestamp",
            BuiltinDataType::PostalCode(_) => "postal-code",
            BuiltinDataType::Pattern(_) => "pattern",
        }
    }

    fn bind(&self, field: &mut FieldBinding) {
        field.classes.insert(format!("{}-type", self.name()));
        field.placeholder = match self {
            BuiltinDataType::Date(_) => Some("YYYY-MM-DD".into()),
            BuiltinDataType::YearMonth(_) => Some("YYYY-MM".into()),
            _ => None,
        };
    }

    fn check(&self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return true;
        }
        match self {
            BuiltinDataType::Text | BuiltinDataType::Timestamp => true,
            BuiltinDataType::Integer => value.parse::<i64>().is_ok(),
            BuiltinDataType::Numeric => value
                .parse::<f64>()
                .map(|number| number.is_finite())
                .unwrap_or(false),
            BuiltinDataType::Date(regex) => regex.captures(value).is_some_and(|caps| {
                let year = caps[1].parse::<u32>().unwrap_or(0);
                let month = caps[2].parse::<u32>().unwrap_or(0);
                let day = caps[3].parse::<u32>().unwrap_or(0);
                valid_month(&caps[2]) && day >= 1 && day <= days_in_month(year, month)
            }),
            BuiltinDataType::YearMonth(regex) => regex
                .captures(value)
                .is_some_and(|caps| valid_month(&caps[2])),
            BuiltinDataType::PostalCode(regex) | BuiltinDataType::Pattern(regex) => {
                regex.is_match(value)
            }
        }
    }
}

/// Data types bound to question fields and open annexes.
#[derive(Debug, Default)]
pub struct DataTypes {
    questions: BTreeMap<QuestionId, Box<dyn DataType>>,
    open_options: BTreeMap<OptionId, Box<dyn DataType>>,
}

/// Identifies which declaration carried an invalid pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeSite {
    Question(QuestionId),
    OpenOption(OptionId),
}

impl fmt::Display for DataTypeSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTypeSite::Question(id) => write!(f, "{}", id),
            DataTypeSite::OpenOption(id) => write!(f, "{} open annex", id),
        }
    }
}

impl DataTypes {
    /// Compiles the builtin data types declared by the survey.
    pub fn from_survey(survey: &SurveySpec) -> Result<Self, (DataTypeSite, regex::Error)> {
        let mut types = DataTypes::default();
        for question in &survey.questions {
            if question.kind.has_field() {
                let spec = question.data_type.clone().unwrap_or_default();
                let compiled = BuiltinDataType::compile(&spec)
                    .map_err(|err| (DataTypeSite::Question(question.id), err))?;
                types.questions.insert(question.id, Box::new(compiled));
            }
            let open_spec = question
                .open_option_data_type
                .as_ref()
                .or(question.data_type.as_ref())
                .cloned()
                .unwrap_or_default();
            for option in question.options.iter().filter(|option| option.is_open) {
                let compiled = BuiltinDataType::compile(&open_spec)
                    .map_err(|err| (DataTypeSite::OpenOption(option.id), err))?;
                types.open_options.insert(option.id, Box::new(compiled));
            }
        }
        Ok(types)
    }

    pub fn set_question(&mut self, question: QuestionId, data_type: Box<dyn DataType>) {
        self.questions.insert(question, data_type);
    }

    pub fn set_open_option(&mut self, option: OptionId, data_type: Box<dyn DataType>) {
        self.open_options.insert(option, data_type);
    }

    pub fn question(&self, question: QuestionId) -> Option<&dyn DataType> {
        self.questions.get(&question).map(|data_type| data_type.as_ref())
    }

    pub fn open_option(&self, option: OptionId) -> Option<&dyn DataType> {
        self.open_options.get(&option).map(|data_type| data_type.as_ref())
    }

    pub fn question_types(&self) -> impl Iterator<Item = (QuestionId, &dyn DataType)> {
        self.questions
            .iter()
            .map(|(id, data_type)| (*id, data_type.as_ref()))
    }

    pub fn open_option_types(&self) -> impl Iterator<Item = (OptionId, &dyn DataType)> {
        self.open_options
            .iter()
            .map(|(id, data_type)| (*id, data_type.as_ref()))
    }
}
