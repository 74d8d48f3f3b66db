use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{OptionId, QuestionId};
use crate::rules::{Effect, Rule, RuleId};

/// Names the UI object a rule acts upon. Rules with equal signatures share one [`RuleTarget`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum ObjectSignature {
    Question(QuestionId),
    /// Sorted, deduplicated option set.
    Options(Vec<OptionId>),
}

impl ObjectSignature {
    pub fn options(ids: impl IntoIterator<Item = OptionId>) -> Self {
        let mut ids: Vec<OptionId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        ObjectSignature::Options(ids)
    }
}

impl fmt::Display for ObjectSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectSignature::Question(id) => write!(f, "{}", id),
            ObjectSignature::Options(ids) => {
                write!(f, "options")?;
                for id in ids {
                    write!(f, "-{}", id.0)?;
                }
                Ok(())
            }
        }
    }
}

/// Mutable state of one target. Written only by rule effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetState {
    pub starts_hidden: bool,
    pub shown: bool,
    pub hidden: bool,
}

impl TargetState {
    pub fn visible(&self) -> bool {
        !self.hidden && (self.shown || !self.starts_hidden)
    }

    pub(crate) fn set_engaged(&mut self, effect: Effect, engaged: bool) {
        match effect {
            Effect::Show => self.shown = engaged,
            Effect::Hide => self.hidden = engaged,
            Effect::Exclusive => {}
        }
    }
}

/// Shared state plus every rule referencing one object signature.
#[derive(Debug, Clone)]
pub struct RuleTarget {
    pub signature: ObjectSignature,
    pub state: TargetState,
    pub rules: Vec<RuleId>,
}

impl RuleTarget {
    pub(crate) fn new(signature: ObjectSignature) -> Self {
        Self {
            signature,
            state: TargetState::default(),
            rules: Vec::new(),
        }
    }

    /// Rules sharing `effect` with the rule `id`, the rule itself excluded.
    pub fn homologous<'a>(
        &'a self,
        id: RuleId,
        effect: Effect,
        rules: &'a [Rule],
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |other| **other != id)
            .map(move |other| &rules[other.0])
            .filter(move |rule| rule.effect() == effect)
    }
}

/// Active-set snapshot of one homology class, taken right before an effect is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Homology {
    pub sufficient: usize,
    pub sufficient_active: usize,
    pub necessary: usize,
    pub necessary_active: usize,
}

impl Homology {
    pub fn of(target: &RuleTarget, effect: Effect, rules: &[Rule]) -> Self {
        let mut class = Homology::default();
        for rule in target
            .rules
            .iter()
            .map(|id| &rules[id.0])
            .filter(|rule| rule.effect() == effect)
        {
            if rule.sufficient {
                class.sufficient += 1;
                class.sufficient_active += usize::from(rule.active);
            } else {
                class.necessary += 1;
                class.necessary_active += usize::from(rule.active);
            }
        }
        class
    }

    /// Whether the class as a whole currently forces its effect.
    ///
    /// Any active sufficient rule engages the class. Necessary rules engage it
    /// only in classes without sufficient members, and only once all of them
    /// are active.
    pub fn engaged(&self) -> bool {
        self.sufficient_active > 0
            || (self.sufficient == 0
                && self.necessary > 0
                && self.necessary_active == self.necessary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_signatures_are_canonical() {
        let left = ObjectSignature::options([OptionId(5), OptionId(3), OptionId(5)]);
        let right = ObjectSignature::options([OptionId(3), OptionId(5)]);
        assert_eq!(left, right);
        assert_eq!(left.to_string(), "options-3-5");
        assert_eq!(
            ObjectSignature::Question(QuestionId(9)).to_string(),
            "question-9"
        );
    }

    #[test]
    fn hide_wins_over_show() {
        let state = TargetState {
            starts_hidden: true,
            shown: true,
            hidden: true,
        };
        assert!(!state.visible());
        let state = TargetState {
            hidden: false,
            ..state
        };
        assert!(state.visible());
        assert!(TargetState::default().visible());
    }

    #[test]
    fn class_outcome() {
        let necessary_only = Homology {
            necessary: 2,
            necessary_active: 2,
            ..Homology::default()
        };
        assert!(necessary_only.engaged());
        assert!(
            !Homology {
                necessary_active: 1,
                ..necessary_only
            }
            .engaged()
        );
        let mixed = Homology {
            sufficient: 1,
            sufficient_active: 0,
            necessary: 1,
            necessary_active: 1,
        };
        assert!(!mixed.engaged());
        assert!(
            Homology {
                sufficient_active: 1,
                ..mixed
            }
            .engaged()
        );
        assert!(!Homology::default().engaged());
    }
}
