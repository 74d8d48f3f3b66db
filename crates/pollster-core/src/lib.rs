#![allow(missing_docs)]

pub mod catalog;
pub mod check;
pub mod datatype;
pub mod derived;
pub mod engine;
pub mod form;
pub mod ids;
pub mod prior;
pub mod relay;
pub mod render;
pub mod rules;
pub mod survey;
pub mod target;

pub use catalog::{Catalog, CatalogError, CatalogSummary};
pub use check::{CheckIssue, CheckReport, check_survey};
pub use datatype::{BuiltinDataType, DataType, DataTypeSite, DataTypes, FieldBinding};
pub use derived::{DerivedError, DerivedMatch, DerivedValue};
pub use engine::{Application, Change, DispatchReport, Runtime, RuntimeBuilder, RuntimeError};
pub use form::{FormState, OpenAnswer, OptionView, QuestionView};
pub use ids::{ChangeEvent, InputRef, OptionId, QuestionId};
pub use prior::PriorAnswers;
pub use render::{RenderStatus, render_json, render_text};
pub use rules::{Effect, Rule, RuleBehavior, RuleId, RuleKind};
pub use survey::{
    DataTypeSpec, DerivedSpec, DerivedType, OptionSpec, QuestionKind, QuestionSpec, RuleSpec,
    RuleType, RuntimePolicy, SurveySpec,
};
pub use target::{Homology, ObjectSignature, RuleTarget, TargetState};
