use regex::Regex;

use crate::form::FormState;
use crate::ids::{OptionId, QuestionId};
use crate::survey::{DerivedSpec, DerivedType};

/// Compiled predicate deciding whether a derived option should be checked.
#[derive(Debug, Clone)]
pub enum DerivedMatch {
    Equals(String),
    NumericRange { inf: Option<f64>, sup: Option<f64> },
    TextRange { inf: Option<String>, sup: Option<String> },
    Pattern(Regex),
}

/// Reasons a derived declaration cannot be compiled.
#[derive(Debug, thiserror::Error)]
pub enum DerivedError {
    #[error("missing parameters for {0:?} matcher")]
    MissingParameters(DerivedType),
    #[error("bound '{0}' is not a number")]
    InvalidBound(String),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

fn parse_bound(raw: Option<&String>) -> Result<Option<f64>, DerivedError> {
    raw.map(|text| {
        text.trim()
            .parse::<f64>()
            .map_err(|_| DerivedError::InvalidBound(text.clone()))
    })
    .transpose()
}

impl DerivedMatch {
    pub fn compile(spec: &DerivedSpec) -> Result<Self, DerivedError> {
        if !spec.has_parameters() {
            return Err(DerivedError::MissingParameters(spec.kind));
        }
        Ok(match spec.kind {
            DerivedType::Equals => DerivedMatch::Equals(spec.value.clone().unwrap_or_default()),
            DerivedType::NumericRange => DerivedMatch::NumericRange {
                inf: parse_bound(spec.inf.as_ref())?,
                sup: parse_bound(spec.sup.as_ref())?,
            },
            DerivedType::TextRange => DerivedMatch::TextRange {
                inf: spec.inf.clone(),
                sup: spec.sup.clone(),
            },
            DerivedType::Pattern => {
                DerivedMatch::Pattern(Regex::new(spec.regex.as_deref().unwrap_or_default())?)
            }
        })
    }

    /// Lower bounds are inclusive, upper bounds exclusive. Empty values only match `Equals("")`.
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            DerivedMatch::Equals(expected) => value == expected,
            _ if value.is_empty() => false,
            DerivedMatch::NumericRange { inf, sup } => match value.parse::<f64>() {
                Ok(number) if number.is_finite() => {
                    inf.is_none_or(|inf| number >= inf) && sup.is_none_or(|sup| number < sup)
                }
                _ => false,
            },
            DerivedMatch::TextRange { inf, sup } => {
                inf.as_deref().is_none_or(|inf| value >= inf)
                    && sup.as_deref().is_none_or(|sup| value < sup)
            }
            DerivedMatch::Pattern(regex) => regex.is_match(value),
        }
    }
}

/// Mirror declaration: `option` is checked exactly when its question's value matches.
#[derive(Debug, Clone)]
pub struct DerivedValue {
    pub option: OptionId,
    pub matcher: DerivedMatch,
}

impl DerivedValue {
    pub fn matches(&self, value: &str) -> bool {
        self.matcher.matches(value)
    }
}

/// Derived options of `question` whose checked state disagrees with the
/// question value, in declaration order.
///
/// Nothing is flipped here: the caller queues one synthetic event per option
/// and each mirror is brought in line by [`realign`] when its own event is
/// handled, so one sibling is fully resolved before the next one changes.
pub(crate) fn stale(
    form: &FormState,
    question: QuestionId,
    derived: &[DerivedValue],
) -> Vec<OptionId> {
    if derived.is_empty() {
        return Vec::new();
    }
    let value = form.question_value(question);
    derived
        .iter()
        .filter(|declaration| {
            form.is_checked(declaration.option)
                .is_some_and(|checked| checked != declaration.matches(&value))
        })
        .map(|declaration| declaration.option)
        .collect()
}

/// Sets the derived `option` to the current match of its question value.
/// Returns whether its checked state changed.
pub(crate) fn realign(
    form: &mut FormState,
    question: QuestionId,
    option: OptionId,
    derived: &[DerivedValue],
) -> bool {
    let Some(declaration) = derived.iter().find(|candidate| candidate.option == option) else {
        return false;
    };
    let matched = declaration.matches(&form.question_value(question));
    if form.is_checked(option) == Some(matched) {
        return false;
    }
    tracing::trace!(%option, matched, "derived option flipped");
    form.force_checked(option, matched);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: DerivedType) -> DerivedSpec {
        DerivedSpec {
            kind,
            value: None,
            inf: None,
            sup: None,
            regex: None,
        }
    }

    #[test]
    fn numeric_range_is_half_open() {
        let matcher = DerivedMatch::compile(&DerivedSpec {
            inf: Some("18".into()),
            sup: Some("65".into()),
            ..spec(DerivedType::NumericRange)
        })
        .expect("compile");
        assert!(matcher.matches("18"));
        assert!(matcher.matches("64.5"));
        assert!(!matcher.matches("65"));
        assert!(!matcher.matches("abc"));
        assert!(!matcher.matches(""));
    }

    #[test]
    fn open_ended_text_range() {
        let matcher = DerivedMatch::compile(&DerivedSpec {
            sup: Some("2000-01-01".into()),
            ..spec(DerivedType::TextRange)
        })
        .expect("compile");
        assert!(matcher.matches("1999-12-31"));
        assert!(!matcher.matches("2000-01-01"));
    }

    #[test]
    fn equals_and_pattern() {
        let yes = DerivedMatch::compile(&DerivedSpec {
            value: Some("yes".into()),
            ..spec(DerivedType::Equals)
        })
        .expect("compile");
        assert!(yes.matches("yes"));
        assert!(!yes.matches("no"));

        let pattern = DerivedMatch::compile(&DerivedSpec {
            regex: Some("^[0-9]{4}$".into()),
            ..spec(DerivedType::Pattern)
        })
        .expect("compile");
        assert!(pattern.matches("1234"));
        assert!(!pattern.matches("12345"));
    }

    #[test]
    fn stale_mirrors_flip_one_at_a_time() {
        use crate::survey::SurveySpec;

        let survey: SurveySpec = serde_json::from_value(serde_json::json!({
            "id": "ages",
            "title": "Ages",
            "version": "1",
            "questions": [
                { "id": 1, "type": "text", "title": "Age", "options": [
                    { "id": 10, "derived": { "type": "numeric-range", "inf": "18" } },
                    { "id": 11, "derived": { "type": "numeric-range", "inf": "65" } }
                ]}
            ]
        }))
        .expect("survey");
        let mut form = FormState::from_survey(&survey);
        let derived: Vec<DerivedValue> = survey.questions[0]
            .options
            .iter()
            .map(|option| DerivedValue {
                option: option.id,
                matcher: DerivedMatch::compile(option.derived.as_ref().expect("derived"))
                    .expect("compile"),
            })
            .collect();
        let question = QuestionId(1);

        form.set_value(question, "70");
        assert_eq!(
            stale(&form, question, &derived),
            vec![OptionId(10), OptionId(11)]
        );
        assert_eq!(form.is_checked(OptionId(10)), Some(false));

        assert!(realign(&mut form, question, OptionId(10), &derived));
        assert!(!realign(&mut form, question, OptionId(10), &derived));
        assert_eq!(stale(&form, question, &derived), vec![OptionId(11)]);
        assert!(realign(&mut form, question, OptionId(11), &derived));
        assert!(stale(&form, question, &derived).is_empty());
    }

    #[test]
    fn missing_parameters_are_rejected() {
        assert!(matches!(
            DerivedMatch::compile(&spec(DerivedType::NumericRange)),
            Err(DerivedError::MissingParameters(DerivedType::NumericRange))
        ));
        assert!(matches!(
            DerivedMatch::compile(&DerivedSpec {
                inf: Some("ten".into()),
                ..spec(DerivedType::NumericRange)
            }),
            Err(DerivedError::InvalidBound(_))
        ));
    }
}
