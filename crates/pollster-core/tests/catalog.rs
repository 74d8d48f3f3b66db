use std::collections::BTreeSet;

use serde_json::json;

use pollster_core::{
    Catalog, CatalogError, ObjectSignature, OptionId, QuestionId, SurveySpec, check_survey,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "panel" => include_str!("../tests/fixtures/panel.json"),
        "health_survey" => include_str!("../tests/fixtures/health_survey.json"),
        "derived" => include_str!("../tests/fixtures/derived.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn load(name: &str) -> SurveySpec {
    serde_json::from_str(fixture(name)).expect("deserialize")
}

fn survey_with_rules(rules: serde_json::Value) -> SurveySpec {
    serde_json::from_value(json!({
        "id": "rules",
        "title": "Rules",
        "version": "1",
        "questions": [
            { "id": 1, "type": "multiple-choice", "title": "Q1", "options": [
                { "id": 10, "value": "a" }, { "id": 11, "value": "b" }, { "id": 12, "value": "c" }
            ]},
            { "id": 2, "type": "single-choice", "title": "Q2", "options": [
                { "id": 20, "value": "yes" }, { "id": 21, "value": "no" }
            ]}
        ],
        "rules": rules
    }))
    .expect("survey")
}

#[test]
fn every_option_is_covered_by_exactly_one_exclusive_rule() {
    for name in ["panel", "health_survey", "derived"] {
        let survey = load(name);
        let catalog = Catalog::build(&survey).expect("catalog");
        for question in &survey.questions {
            let mut covered = BTreeSet::new();
            for group in catalog.exclusive_groups(question.id) {
                for option in group {
                    assert!(covered.insert(*option), "{} claimed twice in {}", option, name);
                }
            }
            let expected: BTreeSet<OptionId> = question.option_ids().collect();
            assert_eq!(covered, expected, "coverage of {} in {}", question.id, name);
        }
    }
}

#[test]
fn synthesized_rule_is_appended_even_when_empty() {
    let catalog = Catalog::build(&load("panel")).expect("catalog");
    let ids = catalog.rules_for(QuestionId(1));
    assert_eq!(ids.len(), 5);
    let last = catalog.rule(*ids.last().expect("rules"));
    assert!(last.synthesized);
    assert!(last.is_exclusive());
    assert!(last.subject_options().is_empty());

    // Questions without rules still get their synthesized rule.
    let ids = catalog.rules_for(QuestionId(2));
    assert_eq!(ids.len(), 1);
    assert!(catalog.rule(ids[0]).synthesized);
    assert!(catalog.rules_for(QuestionId(99)).is_empty());
}

#[test]
fn homologous_rules_share_one_target() {
    let catalog = Catalog::build(&load("panel")).expect("catalog");
    let target = catalog
        .target(&ObjectSignature::Question(QuestionId(2)))
        .expect("target");
    assert_eq!(target.rules.len(), 2);
    assert!(target.state.starts_hidden);
    assert!(!target.state.visible());
    assert_eq!(catalog.targets().count(), 1);
}

#[test]
fn option_targets_start_hidden_only_for_hidden_options() {
    let survey = load("health_survey");
    let catalog = Catalog::build(&survey).expect("catalog");
    let options = catalog
        .target(&ObjectSignature::options([OptionId(52)]))
        .expect("options target");
    assert!(options.state.starts_hidden);

    let survey = survey_with_rules(json!([
        { "type": "hide-options", "subject_question": 2, "subject_options": [21], "object_options": [11, 10] }
    ]));
    let catalog = Catalog::build(&survey).expect("catalog");
    let target = catalog
        .target(&ObjectSignature::options([OptionId(10), OptionId(11)]))
        .expect("canonical signature");
    assert!(!target.state.starts_hidden);
    assert!(target.state.visible());
}

#[test]
fn overlapping_exclusive_rules_are_rejected() {
    let survey = survey_with_rules(json!([
        { "type": "exclusive", "subject_question": 1, "subject_options": [10, 11] },
        { "type": "exclusive", "subject_question": 1, "subject_options": [11] }
    ]));
    let err = Catalog::build(&survey).expect_err("overlap");
    assert!(matches!(
        err,
        CatalogError::OverlappingExclusive { option } if option == OptionId(11)
    ));
}

#[test]
fn structural_mismatches_are_configuration_errors() {
    let foreign = survey_with_rules(json!([
        { "type": "show-question", "subject_question": 1, "subject_options": [20], "object_question": 2 }
    ]));
    assert!(matches!(
        Catalog::build(&foreign),
        Err(CatalogError::ForeignOption { index: 0, .. })
    ));

    let unknown = survey_with_rules(json!([
        { "type": "hide-options", "subject_question": 1, "subject_options": [10], "object_options": [77] }
    ]));
    assert!(matches!(
        Catalog::build(&unknown),
        Err(CatalogError::UnknownOption { option, .. }) if option == OptionId(77)
    ));

    let missing = survey_with_rules(json!([
        { "type": "show-question", "subject_question": 1, "subject_options": [10] }
    ]));
    let err = Catalog::build(&missing).expect_err("missing object");
    assert_eq!(err.to_string(), "rule #0 (show-question) does not name an object");

    let subject = survey_with_rules(json!([
        { "type": "exclusive", "subject_question": 5, "subject_options": [] }
    ]));
    assert!(matches!(
        Catalog::build(&subject),
        Err(CatalogError::UnknownQuestion { question, .. }) if question == QuestionId(5)
    ));
}

#[test]
fn building_twice_yields_the_same_catalog() {
    let survey = load("health_survey");
    let first = Catalog::build(&survey).expect("catalog");
    let second = Catalog::build(&survey).expect("catalog");
    assert_eq!(
        serde_json::to_value(first.summary()).expect("summary"),
        serde_json::to_value(second.summary()).expect("summary")
    );
    assert_eq!(survey, load("health_survey"));
}

#[test]
fn fixtures_pass_the_lint() {
    for name in ["panel", "health_survey", "derived"] {
        let report = check_survey(&load(name));
        assert!(report.valid, "{}: {:?}", name, report.errors);
    }
}
