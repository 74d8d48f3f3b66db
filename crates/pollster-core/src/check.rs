use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::datatype::DataTypes;
use crate::survey::{QuestionKind, QuestionSpec, SurveySpec};

static IDENTIFIER_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z0-9_]*$").expect("identifier pattern"));

/// One lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub valid: bool,
    pub errors: Vec<CheckIssue>,
    pub warnings: Vec<CheckIssue>,
}

/// Lints a survey definition before it is handed to a runtime.
pub fn check_survey(survey: &SurveySpec) -> CheckReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut seen_questions = BTreeSet::new();
    let mut seen_options = BTreeSet::new();
    for question in &survey.questions {
        if !seen_questions.insert(question.id) {
            errors.push(issue(
                question_path(question),
                "question id is declared more than once",
                "duplicate_question",
            ));
        }
        for option in &question.options {
            if !seen_options.insert(option.id) {
                errors.push(issue(
                    format!("{}/{}", question_path(question), option.id),
                    "option id is declared more than once",
                    "duplicate_option",
                ));
            }
        }
        check_question(question, &mut errors, &mut warnings);
    }

    for (index, rule) in survey.rules.iter().enumerate() {
        if rule.object_question == Some(rule.subject_question) {
            warnings.push(issue(
                format!("/rules/{}", index),
                "rule acts on its own subject question",
                "self_target",
            ));
        }
    }

    if survey.policy().max_events_per_dispatch == 0 {
        errors.push(issue(
            "/runtime_policy/max_events_per_dispatch".to_string(),
            "event limit must allow at least the triggering event",
            "event_limit",
        ));
    }

    if let Err((site, source)) = DataTypes::from_survey(survey) {
        errors.push(CheckIssue {
            path: None,
            message: format!("invalid data type pattern for {}: {}", site, source),
            code: "data_type".into(),
        });
    }

    // Structural errors above already explain most catalog failures.
    if errors.is_empty()
        && let Err(error) = Catalog::build(survey)
    {
        errors.push(CheckIssue {
            path: None,
            message: error.to_string(),
            code: "catalog".into(),
        });
    }

    CheckReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_question(
    question: &QuestionSpec,
    errors: &mut Vec<CheckIssue>,
    warnings: &mut Vec<CheckIssue>,
) {
    let path = question_path(question);
    if question.kind.is_choice() && question.options.is_empty() {
        errors.push(issue(
            path.clone(),
            "choice question has no options",
            "no_options",
        ));
    }

    for option in &question.options {
        let option_path = format!("{}/{}", path, option.id);
        match &option.derived {
            Some(derived) => {
                if !derived.has_parameters() {
                    errors.push(issue(
                        option_path.clone(),
                        "missing parameters for derived value",
                        "derived_parameters",
                    ));
                }
                if question.kind.is_choice() {
                    warnings.push(issue(
                        option_path,
                        "derived option on a choice question mirrors the checked option value",
                        "derived_on_choice",
                    ));
                }
            }
            None if question.kind.is_choice() => {
                if option.value.is_empty() {
                    errors.push(issue(
                        option_path,
                        "option value is missing",
                        "missing_value",
                    ));
                } else if question.kind == QuestionKind::MultipleChoice
                    && !IDENTIFIER_VALUE.is_match(&option.value)
                {
                    errors.push(issue(
                        option_path,
                        "multiple-choice values may only contain letters, digits and underscores",
                        "invalid_value",
                    ));
                }
            }
            None => {}
        }
    }
}

fn question_path(question: &QuestionSpec) -> String {
    format!("/{}", question.id)
}

fn issue(path: String, message: &str, code: &str) -> CheckIssue {
    CheckIssue {
        path: Some(path),
        message: message.into(),
        code: code.into(),
    }
}
