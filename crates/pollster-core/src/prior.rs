use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{OptionId, QuestionId};

/// Snapshot of a previous participation, also the shape of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Free field values keyed by question.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<QuestionId, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub checked: BTreeSet<OptionId>,
    /// Open annex values keyed by option.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub open: BTreeMap<OptionId, String>,
}

impl PriorAnswers {
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.values.is_empty()
            && self.checked.is_empty()
            && self.open.is_empty()
    }

    pub fn is_checked(&self, option: OptionId) -> bool {
        self.checked.contains(&option)
    }

    pub fn has_value(&self, question: QuestionId) -> bool {
        self.values
            .get(&question)
            .is_some_and(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_integer_keyed_maps() {
        let prior: PriorAnswers = serde_json::from_str(
            r#"{"timestamp":"1700000000","values":{"3":"42"},"checked":[10,11],"open":{"12":"other"}}"#,
        )
        .expect("prior answers");
        assert_eq!(prior.values.get(&QuestionId(3)).map(String::as_str), Some("42"));
        assert!(prior.is_checked(OptionId(11)));
        assert!(prior.has_value(QuestionId(3)));
        assert!(!prior.has_value(QuestionId(4)));
        assert!(!prior.is_empty());
    }

    #[test]
    fn empty_snapshot_serializes_to_empty_object() {
        let value = serde_json::to_value(PriorAnswers::default()).expect("serialize");
        assert_eq!(value, serde_json::json!({}));
    }
}
